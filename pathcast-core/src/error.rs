//! Error types for the forecast pipeline.

use thiserror::Error;

use crate::domain::Bar;

/// Errors surfaced by a forecast request.
///
/// Outlier starvation is not here: the anomaly filter handles it locally by
/// falling back to the unfiltered set.
#[derive(Debug, Error, PartialEq)]
pub enum ForecastError {
    #[error("insufficient history: {available} bars available, {required} required (lookback + horizon)")]
    InsufficientHistory { available: usize, required: usize },

    #[error("invalid sample count {0}: at least one sample is required")]
    InvalidSampleCount(usize),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid calibration policy: {0}")]
    InvalidPolicy(String),

    #[error("degenerate forecast: calibration anchor {anchor} is zero or non-finite")]
    DegenerateForecast { anchor: f64 },

    #[error("sampler failed for all {failed} samples: {reason}")]
    SamplerFailure { failed: usize, reason: String },

    #[error("reconstructed bar {step} breaks OHLC ordering: {bar:?}")]
    InvariantViolation { step: usize, bar: Bar },

    #[error("forecast cancelled")]
    Cancelled,

    #[error("forecast timed out")]
    TimedOut,
}

/// Failure of a single upstream sampler call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SamplerError {
    #[error("sampler '{sampler}' failed: {reason}")]
    Failed { sampler: String, reason: String },

    #[error("sampler returned {actual} steps, expected {expected}")]
    WrongLength { expected: usize, actual: usize },

    #[error("sampler returned a non-finite or non-positive close at step {step}")]
    InvalidClose { step: usize },
}
