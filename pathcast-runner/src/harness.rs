//! Direction backtest harness — rolling origins, point-in-time forecasts,
//! sign comparison.
//!
//! For each origin `o` the forecast service sees only `bars[..=o]`. The
//! realized closes at `o + h` are read here, after the forecast returns, and
//! never enter the pipeline.

use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pathcast_core::{
    Bar, Budget, DirectionRecord, ForecastError, ForecastRequest, ForecastService, RollingSummary,
};

use crate::config::{BacktestConfig, ConfigError, RunId};
use crate::data_loader::{DataSource, LoadError, LoadedSeries};

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors that abort a whole backtest run.
///
/// Per-origin failures do not land here; they become [`SkippedOrigin`]s.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("forecast error: {0}")]
    Forecast(#[from] ForecastError),
    #[error("not enough bars: {bars} available, first origin {first_origin} needs {required}")]
    NoOrigins {
        bars: usize,
        first_origin: usize,
        required: usize,
    },
}

/// Why an origin produced no records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    TimedOut,
    Cancelled,
    InsufficientHistory,
    Error(String),
}

impl SkipReason {
    fn from_error(err: &ForecastError) -> Self {
        match err {
            ForecastError::TimedOut => SkipReason::TimedOut,
            ForecastError::Cancelled => SkipReason::Cancelled,
            ForecastError::InsufficientHistory { .. } => SkipReason::InsufficientHistory,
            other => SkipReason::Error(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            SkipReason::TimedOut => "timed out",
            SkipReason::Cancelled => "cancelled",
            SkipReason::InsufficientHistory => "insufficient history",
            SkipReason::Error(_) => "pipeline error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedOrigin {
    pub origin: usize,
    pub reason: SkipReason,
}

/// Records and skips from one pass over the origins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarnessOutput {
    pub origins: Vec<usize>,
    pub records: Vec<DirectionRecord>,
    pub skipped: Vec<SkippedOrigin>,
}

/// Complete result of a direction backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub dataset_hash: String,
    pub stock: String,
    pub source: DataSource,
    pub start_date: String,
    pub end_date: String,
    pub bar_count: usize,
    pub sampler: String,
    pub config: BacktestConfig,
    pub evaluated_origins: usize,
    pub records: Vec<DirectionRecord>,
    pub skipped: Vec<SkippedOrigin>,
    pub summary: RollingSummary,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestReport {
    pub fn has_synthetic(&self) -> bool {
        self.source == DataSource::Synthetic
    }

    /// Rebuild the summary from the record log.
    pub fn recompute_summary(&self) -> RollingSummary {
        RollingSummary::from_records(&self.config.sorted_horizons(), self.config.eps, &self.records)
    }

    /// Skips per reason label, in first-seen order.
    pub fn skip_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for skip in &self.skipped {
            let label = skip.reason.label();
            match counts.iter_mut().find(|(l, _)| l == label) {
                Some((_, n)) => *n += 1,
                None => counts.push((label.to_string(), 1)),
            }
        }
        counts
    }
}

// ─── Origin selection ───────────────────────────────────────────────

/// Origins `start, start + step, ...` with `o + max_horizon <= series_len - 1`.
pub fn rolling_origins(
    series_len: usize,
    start: usize,
    step: usize,
    max_horizon: usize,
) -> Vec<usize> {
    let Some(last) = series_len.checked_sub(1 + max_horizon) else {
        return Vec::new();
    };
    if start > last {
        return Vec::new();
    }
    (start..=last).step_by(step.max(1)).collect()
}

// ─── Evaluation ─────────────────────────────────────────────────────

/// Forecast at `origin` from `bars[..=origin]` and score every horizon.
fn evaluate_origin(
    service: &ForecastService,
    bars: &[Bar],
    origin: usize,
    horizons: &[usize],
    request: &ForecastRequest,
    budget: &Budget<'_>,
) -> Result<Vec<DirectionRecord>, ForecastError> {
    let visible = &bars[..=origin];
    let forecast = service.forecast_with_budget(visible, request, budget)?;
    let origin_close = bars[origin].close;

    horizons
        .iter()
        .map(|&h| {
            let predicted = forecast.close_at(h - 1).ok_or_else(|| {
                ForecastError::InvalidRequest(format!(
                    "horizon {h} is beyond the forecast length {}",
                    forecast.path().len()
                ))
            })?;
            Ok(DirectionRecord::new(
                origin,
                h,
                origin_close,
                predicted,
                bars[origin + h].close,
            ))
        })
        .collect()
}

/// Run the forecast at every rolling origin of `bars`.
///
/// Origins are independent: with `config.parallel` they run on the rayon
/// pool, and the output is in origin order either way.
pub fn evaluate_origins(
    service: &ForecastService,
    bars: &[Bar],
    config: &BacktestConfig,
    cancel: Option<&AtomicBool>,
) -> HarnessOutput {
    let horizons = config.sorted_horizons();
    let origins = rolling_origins(
        bars.len(),
        config.first_origin(),
        config.step,
        config.max_horizon(),
    );
    let request = config.forecast_request();
    let timeout = config.origin_timeout_ms.map(Duration::from_millis);

    let run_one = |&origin: &usize| {
        let budget = Budget {
            cancel,
            deadline: timeout.map(|t| Instant::now() + t),
        };
        tracing::debug!(origin, "evaluating origin");
        let outcome = evaluate_origin(service, bars, origin, &horizons, &request, &budget);
        (origin, outcome)
    };

    let outcomes: Vec<(usize, Result<Vec<DirectionRecord>, ForecastError>)> = if config.parallel {
        origins.par_iter().map(run_one).collect()
    } else {
        origins.iter().map(run_one).collect()
    };

    let mut output = HarnessOutput {
        origins: origins.clone(),
        ..Default::default()
    };
    for (origin, outcome) in outcomes {
        match outcome {
            Ok(records) => output.records.extend(records),
            Err(err) => {
                let reason = SkipReason::from_error(&err);
                if reason != SkipReason::Cancelled {
                    tracing::warn!(origin, reason = reason.label(), error = %err, "origin skipped");
                }
                output.skipped.push(SkippedOrigin { origin, reason });
            }
        }
    }
    output
}

/// Run a full direction backtest over a loaded series.
pub fn run_direction_backtest(
    service: &ForecastService,
    loaded: &LoadedSeries,
    config: &BacktestConfig,
    cancel: Option<&AtomicBool>,
) -> Result<BacktestReport, RunError> {
    config.validate()?;
    let series = &loaded.series;
    let first_origin = config.first_origin();
    let required = first_origin + config.max_horizon() + 1;
    if series.len() < required {
        return Err(RunError::NoOrigins {
            bars: series.len(),
            first_origin,
            required,
        });
    }

    let start = Instant::now();
    let output = evaluate_origins(service, &series.bars, config, cancel);
    let summary = RollingSummary::from_records(&config.sorted_horizons(), config.eps, &output.records);

    tracing::info!(
        stock = %config.stock,
        origins = output.origins.len(),
        records = output.records.len(),
        skipped = output.skipped.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "direction backtest complete"
    );

    let fmt_date = |i: usize| series.date_at(i).map(|d| d.to_string()).unwrap_or_default();
    Ok(BacktestReport {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id()?,
        dataset_hash: loaded.dataset_hash.clone(),
        stock: config.stock.clone(),
        source: loaded.source,
        start_date: fmt_date(0),
        end_date: fmt_date(series.len() - 1),
        bar_count: series.len(),
        sampler: service.sampler_name().to_string(),
        config: config.clone(),
        evaluated_origins: output.origins.len(),
        records: output.records,
        skipped: output.skipped,
        summary,
    })
}
