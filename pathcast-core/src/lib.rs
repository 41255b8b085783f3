//! PathCast Core — turn many stochastic price paths into one calibrated forecast.
//!
//! This crate holds the forecast pipeline:
//! - Domain types (bars, price paths, sample sets, forecasts, direction records)
//! - The upstream sampler contract and per-sample jitter schedule
//! - Anomaly filter, aggregator, continuity calibrator, OHLC reconstructor
//! - [`ForecastService`], which chains them for one request
//! - A deterministic RNG hierarchy and a built-in random-walk sampler

pub mod aggregate;
pub mod anomaly;
pub mod calibrate;
pub mod domain;
pub mod error;
pub mod ohlc;
pub mod pipeline;
pub mod policy;
pub mod rng;
pub mod sampler;
pub mod stats;

pub use domain::{
    Bar, CalibratedForecast, CalibrationReport, DirectionRecord, DispersionBands, FilterReport,
    ForecastSummary, HorizonStats, PricePath, RollingSummary, SampleSet, Sign, Trend,
};
pub use error::{ForecastError, SamplerError};
pub use pipeline::{Budget, ForecastRequest, ForecastService};
pub use policy::{CalibrationPolicy, CentralTendency};
pub use sampler::{JitterSchedule, PathSampler, RandomWalkSampler, SampleRequest, SamplingParams};
