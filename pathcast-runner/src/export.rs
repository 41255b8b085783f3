//! Reporting and export — JSON, CSV, and Markdown artifact generation.
//!
//! Backtest artifacts:
//! - **JSON**: the full report with schema versioning
//! - **CSV**: per-horizon summary and per-record detail tables
//! - **Markdown**: a human-readable run report
//!
//! Forecasts export as a per-step CSV. Unknown schema versions are rejected on
//! load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use pathcast_core::{CalibratedForecast, DirectionRecord, RollingSummary};

use crate::harness::{BacktestReport, SCHEMA_VERSION};

fn opt_ratio(v: Option<f64>) -> String {
    v.map(|r| format!("{r:.6}")).unwrap_or_default()
}

fn opt_pct(v: Option<f64>) -> String {
    v.map(|r| format!("{:.2}%", r * 100.0))
        .unwrap_or_else(|| "n/a".into())
}

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestReport` to pretty JSON.
pub fn export_json(report: &BacktestReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize BacktestReport to JSON")
}

/// Deserialize a `BacktestReport` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestReport> {
    let report: BacktestReport =
        serde_json::from_str(json).context("failed to deserialize BacktestReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Per-horizon summary.
///
/// Columns: horizon, accuracy, accuracy_filtered, total, hits, total_filtered,
/// hits_filtered, eps. Undefined accuracies are empty cells.
pub fn export_summary_csv(summary: &RollingSummary) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "horizon",
        "accuracy",
        "accuracy_filtered",
        "total",
        "hits",
        "total_filtered",
        "hits_filtered",
        "eps",
    ])?;
    for row in summary.rows() {
        wtr.write_record([
            &row.horizon.to_string(),
            &opt_ratio(row.accuracy()),
            &opt_ratio(row.accuracy_filtered()),
            &row.total.to_string(),
            &row.hits.to_string(),
            &row.total_filtered.to_string(),
            &row.hits_filtered.to_string(),
            &summary.eps.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One row per (origin, horizon) record.
pub fn export_details_csv(records: &[DirectionRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "origin",
        "horizon",
        "origin_close",
        "predicted_close",
        "predicted_return",
        "realized_close",
        "realized_return",
        "predicted_sign",
        "realized_sign",
        "hit",
    ])?;
    for r in records {
        wtr.write_record([
            &r.origin.to_string(),
            &r.horizon.to_string(),
            &format!("{:.6}", r.origin_close),
            &format!("{:.6}", r.predicted_close),
            &format!("{:.6}", r.predicted_return),
            &format!("{:.6}", r.realized_close),
            &format!("{:.6}", r.realized_return),
            &r.predicted_sign.as_i8().to_string(),
            &r.realized_sign.as_i8().to_string(),
            &u8::from(r.is_hit()).to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Per-step forecast: calibrated OHLCV plus the dispersion band.
pub fn export_forecast_csv(forecast: &CalibratedForecast) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "step", "open", "high", "low", "close", "volume", "lower", "upper", "min", "max", "std",
    ])?;
    let bands = forecast.bands();
    for (t, bar) in forecast.path().bars().iter().enumerate() {
        wtr.write_record([
            &(t + 1).to_string(),
            &format!("{:.4}", bar.open),
            &format!("{:.4}", bar.high),
            &format!("{:.4}", bar.low),
            &format!("{:.4}", bar.close),
            &format!("{:.0}", bar.volume),
            &format!("{:.4}", bands.lower[t]),
            &format!("{:.4}", bands.upper[t]),
            &format!("{:.4}", bands.min[t]),
            &format!("{:.4}", bands.max[t]),
            &format!("{:.4}", bands.std[t]),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a backtest run.
///
/// Creates `{stock}_{timestamp}/` under `output_dir` containing
/// `manifest.json`, `summary.csv`, `details.csv` and `report.md`.
/// Returns the path to the created directory.
pub fn save_artifacts(report: &BacktestReport, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        report.stock,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("manifest.json"), export_json(report)?)?;
    std::fs::write(run_dir.join("summary.csv"), export_summary_csv(&report.summary)?)?;
    std::fs::write(run_dir.join("details.csv"), export_details_csv(&report.records)?)?;
    std::fs::write(run_dir.join("report.md"), generate_report(report))?;

    Ok(run_dir)
}

/// Load a `BacktestReport` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestReport> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

/// Generate a Markdown report for a direction backtest.
pub fn generate_report(report: &BacktestReport) -> String {
    let mut md = String::with_capacity(2048);
    let c = &report.config;

    md.push_str("# Direction Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Stock | {} |\n", report.stock));
    md.push_str(&format!(
        "| Period | {} ({} to {}) |\n",
        c.period.label(),
        report.start_date,
        report.end_date
    ));
    md.push_str(&format!("| Bars | {} |\n", report.bar_count));
    md.push_str(&format!("| Sampler | {} |\n", report.sampler));
    md.push_str(&format!(
        "| Lookback / Pred Len | {} / {} |\n",
        c.lookback,
        c.effective_pred_len()
    ));
    md.push_str(&format!(
        "| Temperature / Top-p | {} / {} |\n",
        c.temperature, c.top_p
    ));
    md.push_str(&format!(
        "| Samples | {} ({}) |\n",
        c.sample_count,
        c.tendency.name()
    ));
    md.push_str(&format!("| Step | {} |\n", c.step));
    md.push_str(&format!("| Eps | {} |\n", c.eps));
    md.push_str(&format!(
        "| Calibration | {} |\n",
        if c.policy.calibration_enabled { "on" } else { "off" }
    ));
    md.push_str(&format!("| Run Id | {} |\n", report.run_id));
    md.push_str(&format!("| Dataset Hash | {} |\n", report.dataset_hash));
    if report.has_synthetic() {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    md.push_str("## Direction Accuracy\n\n");
    md.push_str("| Horizon | Accuracy | Filtered Accuracy | Total | Hits | Filtered Total | Filtered Hits |\n");
    md.push_str("| ---: | ---: | ---: | ---: | ---: | ---: | ---: |\n");
    for row in report.summary.rows() {
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} |\n",
            row.horizon,
            opt_pct(row.accuracy()),
            opt_pct(row.accuracy_filtered()),
            row.total,
            row.hits,
            row.total_filtered,
            row.hits_filtered
        ));
    }
    md.push('\n');

    md.push_str("## Origins\n\n");
    md.push_str(&format!(
        "- Evaluated: {} ({} skipped)\n",
        report.evaluated_origins,
        report.skipped.len()
    ));
    for (label, count) in report.skip_counts() {
        md.push_str(&format!("- {label}: {count}\n"));
    }
    md.push('\n');

    md
}
