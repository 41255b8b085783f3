//! PathCast CLI — forecast and direction backtest commands.
//!
//! Commands:
//! - `forecast` — ensemble forecast of the next `pred_len` bars for one symbol
//! - `backtest` — rolling-origin direction backtest from a TOML config or flags
//!
//! A `.env` file in the working directory is loaded first, so the
//! `PATHCAST_*` knobs and `RUST_LOG` can live there.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pathcast_core::{
    CalibratedForecast, CentralTendency, ForecastRequest, ForecastService, RandomWalkSampler,
    RollingSummary,
};
use pathcast_runner::{
    export_forecast_csv, load_series, policy_from_env, run_direction_backtest, save_artifacts,
    BacktestConfig, BacktestReport, LoadOptions, Period,
};

#[derive(Parser)]
#[command(
    name = "pathcast",
    about = "PathCast CLI — ensemble price-path forecasts and direction backtests"
)]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast the next bars for one symbol.
    Forecast {
        /// Symbol (CSV file stem under --data).
        #[arg(long, default_value = "000968")]
        stock: String,

        /// CSV file, or directory containing `{stock}.csv`.
        #[arg(long)]
        data: Option<PathBuf>,

        /// Use synthetic data when no CSV is found.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// History window: 6mo, 1y, 2y, 5y, max.
        #[arg(long, default_value = "5y")]
        period: Period,

        /// Last date of the series (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        #[arg(long, default_value_t = 400)]
        lookback: usize,

        /// Steps to forecast.
        #[arg(long, default_value_t = 30)]
        pred_len: usize,

        #[arg(long, default_value_t = 1.0)]
        temperature: f64,

        #[arg(long, default_value_t = 0.9)]
        top_p: f64,

        /// Paths sampled per forecast.
        #[arg(long, default_value_t = 30)]
        sample_count: usize,

        /// median or mean.
        #[arg(long, default_value = "median")]
        tendency: CentralTendency,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Run the sampler calls on the rayon pool.
        #[arg(long, default_value_t = false)]
        parallel_samples: bool,

        /// Write the per-step forecast as CSV.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Rolling-origin direction backtest.
    Backtest {
        /// Path to a TOML config file. Flags below are ignored when set.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        stock: Option<String>,

        #[arg(long)]
        period: Option<Period>,

        #[arg(long)]
        lookback: Option<usize>,

        #[arg(long)]
        pred_len: Option<usize>,

        /// Comma-separated horizons, e.g. `1,5,10`.
        #[arg(long, value_delimiter = ',')]
        horizons: Option<Vec<usize>>,

        #[arg(long)]
        temperature: Option<f64>,

        #[arg(long)]
        top_p: Option<f64>,

        #[arg(long)]
        sample_count: Option<usize>,

        /// Bars between consecutive origins.
        #[arg(long)]
        step: Option<usize>,

        /// Minimum |realized return| counted by the filtered accuracy.
        #[arg(long)]
        eps: Option<f64>,

        /// First origin index. Defaults to `lookback + pred_len - 1`.
        #[arg(long)]
        start_origin: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        /// Per-origin time budget in milliseconds.
        #[arg(long)]
        origin_timeout_ms: Option<u64>,

        /// Evaluate origins one at a time.
        #[arg(long, default_value_t = false)]
        no_parallel: bool,

        /// Also run each forecast's sampler calls on the rayon pool.
        #[arg(long, default_value_t = false)]
        parallel_samples: bool,

        #[arg(long)]
        tendency: Option<CentralTendency>,

        /// CSV file, or directory containing `{stock}.csv`.
        #[arg(long)]
        data: Option<PathBuf>,

        /// Use synthetic data when no CSV is found.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Last date of the series (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Write the artifact set (manifest, CSVs, report) under this directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

/// Flag overrides for the backtest config.
struct BacktestOverrides {
    stock: Option<String>,
    period: Option<Period>,
    lookback: Option<usize>,
    pred_len: Option<usize>,
    horizons: Option<Vec<usize>>,
    temperature: Option<f64>,
    top_p: Option<f64>,
    sample_count: Option<usize>,
    step: Option<usize>,
    eps: Option<f64>,
    start_origin: Option<usize>,
    seed: Option<u64>,
    origin_timeout_ms: Option<u64>,
    no_parallel: bool,
    parallel_samples: bool,
    tendency: Option<CentralTendency>,
}

impl BacktestOverrides {
    fn apply(self, config: &mut BacktestConfig) {
        if let Some(v) = self.stock {
            config.stock = v;
        }
        if let Some(v) = self.period {
            config.period = v;
        }
        if let Some(v) = self.lookback {
            config.lookback = v;
        }
        if let Some(v) = self.pred_len {
            config.pred_len = v;
        }
        if let Some(v) = self.horizons {
            config.horizons = v;
        }
        if let Some(v) = self.temperature {
            config.temperature = v;
        }
        if let Some(v) = self.top_p {
            config.top_p = v;
        }
        if let Some(v) = self.sample_count {
            config.sample_count = v;
        }
        if let Some(v) = self.step {
            config.step = v;
        }
        if let Some(v) = self.eps {
            config.eps = v;
        }
        if self.start_origin.is_some() {
            config.start_origin = self.start_origin;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if self.origin_timeout_ms.is_some() {
            config.origin_timeout_ms = self.origin_timeout_ms;
        }
        if self.no_parallel {
            config.parallel = false;
        }
        if self.parallel_samples {
            config.parallel_samples = true;
        }
        if let Some(v) = self.tendency {
            config.tendency = v;
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Forecast {
            stock,
            data,
            synthetic,
            period,
            end,
            lookback,
            pred_len,
            temperature,
            top_p,
            sample_count,
            tendency,
            seed,
            parallel_samples,
            output,
        } => {
            let opts = LoadOptions {
                data_path: data,
                period,
                synthetic,
                end: parse_end(end.as_deref())?,
            };
            let request = ForecastRequest {
                lookback,
                horizon: pred_len,
                temperature,
                top_p,
                sample_count,
            };
            let service = ForecastService::new(Arc::new(RandomWalkSampler::new(seed)))
                .with_tendency(tendency)
                .with_seed(seed)
                .with_parallel(parallel_samples);
            run_forecast_cmd(&stock, &opts, &request, service, output)
        }
        Commands::Backtest {
            config,
            stock,
            period,
            lookback,
            pred_len,
            horizons,
            temperature,
            top_p,
            sample_count,
            step,
            eps,
            start_origin,
            seed,
            origin_timeout_ms,
            no_parallel,
            parallel_samples,
            tendency,
            data,
            synthetic,
            end,
            output_dir,
        } => {
            let mut backtest_config = match config {
                Some(path) => BacktestConfig::from_file(&path)
                    .with_context(|| format!("failed to load config {}", path.display()))?,
                None => {
                    let mut c = BacktestConfig::default();
                    BacktestOverrides {
                        stock,
                        period,
                        lookback,
                        pred_len,
                        horizons,
                        temperature,
                        top_p,
                        sample_count,
                        step,
                        eps,
                        start_origin,
                        seed,
                        origin_timeout_ms,
                        no_parallel,
                        parallel_samples,
                        tendency,
                    }
                    .apply(&mut c);
                    c
                }
            };
            backtest_config
                .apply_process_env()
                .context("invalid environment override")?;
            let opts = LoadOptions {
                data_path: data,
                period: backtest_config.period,
                synthetic,
                end: parse_end(end.as_deref())?,
            };
            run_backtest_cmd(&backtest_config, &opts, output_dir)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn parse_end(end: Option<&str>) -> Result<Option<NaiveDate>> {
    end.map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("--end must be YYYY-MM-DD")
}

fn run_forecast_cmd(
    stock: &str,
    opts: &LoadOptions,
    request: &ForecastRequest,
    service: ForecastService,
    output: Option<PathBuf>,
) -> Result<()> {
    let loaded = load_series(stock, opts)?;
    tracing::info!(stock, bars = loaded.series.len(), source = ?loaded.source, "series loaded");
    let policy = policy_from_env(|key| std::env::var(key).ok())?;
    let service = service.with_policy(policy);

    let forecast = service
        .forecast(&loaded.series.bars, request)
        .with_context(|| format!("forecast failed for {stock}"))?;

    let last_date = loaded
        .series
        .date_at(loaded.series.len() - 1)
        .map(|d| d.to_string())
        .unwrap_or_default();
    print_forecast(stock, &last_date, loaded.has_synthetic(), &forecast);

    if let Some(path) = output {
        std::fs::write(&path, export_forecast_csv(&forecast)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Forecast written to: {}", path.display());
    }
    Ok(())
}

fn run_backtest_cmd(
    config: &BacktestConfig,
    opts: &LoadOptions,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let loaded = load_series(&config.stock, opts)?;
    tracing::info!(
        stock = %config.stock,
        bars = loaded.series.len(),
        source = ?loaded.source,
        run_id = %config.run_id()?,
        "series loaded"
    );
    if loaded.series.is_empty() {
        bail!("no bars loaded for {}", config.stock);
    }

    let service = config.forecast_service(Arc::new(RandomWalkSampler::new(config.seed)));

    let report = run_direction_backtest(&service, &loaded, config, None)?;
    print_backtest(&report);

    if let Some(dir) = output_dir {
        let run_dir = save_artifacts(&report, &dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn print_forecast(stock: &str, last_date: &str, synthetic: bool, forecast: &CalibratedForecast) {
    let s = forecast.summary();
    let cal = forecast.calibration();
    println!();
    println!("=== Forecast ===");
    println!("Stock:          {stock} (as of {last_date})");
    println!("Current:        {:.2}", s.current_price);
    println!(
        "Predicted:      {:.2} ({:+.2}, {:+.2}%)",
        s.predicted_price, s.change_amount, s.change_pct
    );
    println!("Trend:          {}", s.trend.label());
    println!("Volatility:     {:.2}% annualized", s.annualized_volatility_pct);
    println!(
        "Samples:        {} used, {} failed, {} rejected as outliers",
        forecast.samples_used(),
        forecast.samples_failed(),
        forecast.filter().rejected
    );
    if cal.applied {
        println!(
            "Calibration:    gap {:+.2}% -> {:+.2}% (x{:.4})",
            cal.pre_gap * 100.0,
            cal.post_gap * 100.0,
            cal.factor
        );
    }
    println!();
    println!(
        "{:>4} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "Step", "Open", "High", "Low", "Close", "Lower", "Upper"
    );
    println!("{}", "-".repeat(70));
    let bands = forecast.bands();
    for (t, bar) in forecast.path().bars().iter().enumerate() {
        println!(
            "{:>4} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
            t + 1,
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bands.lower[t],
            bands.upper[t]
        );
    }
    if synthetic {
        println!();
        println!("WARNING: Forecast based on SYNTHETIC data");
    }
    println!();
}

fn print_backtest(report: &BacktestReport) {
    let c = &report.config;
    println!();
    println!("=== Direction Backtest ===");
    println!("Stock:          {}", report.stock);
    println!(
        "Period:         {} to {} ({} bars)",
        report.start_date, report.end_date, report.bar_count
    );
    println!(
        "Lookback:       {} (pred_len {})",
        c.lookback,
        c.effective_pred_len()
    );
    println!(
        "Origins:        {} evaluated, {} skipped (step {})",
        report.evaluated_origins,
        report.skipped.len(),
        c.step
    );
    for (label, count) in report.skip_counts() {
        println!("  {label}: {count}");
    }
    println!();
    print!("{}", format_summary_table(&report.summary));
    if report.has_synthetic() {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}

/// Per-horizon table, columns in `summary.csv` order.
fn format_summary_table(summary: &RollingSummary) -> String {
    let pct = |v: Option<f64>| {
        v.map(|r| format!("{:.2}%", r * 100.0))
            .unwrap_or_else(|| "n/a".into())
    };
    let mut out = format!(
        "{:>7} {:>9} {:>9} {:>6} {:>6} {:>10} {:>9}\n",
        "Horizon", "Accuracy", "Filtered", "Total", "Hits", "Filt.Total", "Filt.Hits"
    );
    out.push_str(&"-".repeat(62));
    out.push('\n');
    for row in summary.rows() {
        out.push_str(&format!(
            "{:>7} {:>9} {:>9} {:>6} {:>6} {:>10} {:>9}\n",
            row.horizon,
            pct(row.accuracy()),
            pct(row.accuracy_filtered()),
            row.total,
            row.hits,
            row.total_filtered,
            row.hits_filtered
        ));
    }
    out.push_str(&format!(
        "(filtered: |realized return| >= {})\n",
        summary.eps
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathcast_core::DirectionRecord;

    #[test]
    fn summary_table_has_every_count_column() {
        let records = [
            DirectionRecord::new(10, 5, 100.0, 101.0, 100.3),
            DirectionRecord::new(15, 5, 100.0, 102.0, 103.0),
            DirectionRecord::new(20, 5, 100.0, 102.0, 97.0),
        ];
        let summary = RollingSummary::from_records(&[5], 0.005, &records);
        let table = format_summary_table(&summary);
        let lines: Vec<&str> = table.lines().collect();

        let header: Vec<&str> = lines[0].split_whitespace().collect();
        assert_eq!(
            header,
            ["Horizon", "Accuracy", "Filtered", "Total", "Hits", "Filt.Total", "Filt.Hits"]
        );
        let row: Vec<&str> = lines[2].split_whitespace().collect();
        assert_eq!(row, ["5", "66.67%", "50.00%", "3", "2", "2", "1"]);
    }

    #[test]
    fn eps_footer_matches_inclusive_filter() {
        let summary = RollingSummary::new(&[1], 0.005);
        let table = format_summary_table(&summary);
        assert!(table.ends_with("(filtered: |realized return| >= 0.005)\n"));

        // A move of exactly eps is counted by the filtered statistics.
        let mut summary = RollingSummary::new(&[1], 0.5);
        summary.push(&DirectionRecord::new(0, 1, 2.0, 3.0, 3.0));
        assert_eq!(summary.get(1).unwrap().total_filtered, 1);
    }
}
