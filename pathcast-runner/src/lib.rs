//! PathCast Runner — direction backtests, configuration, data loading, export.
//!
//! This crate builds on `pathcast-core` to provide:
//! - TOML run configuration with environment overrides and content-hash run ids
//! - CSV bar loading with period windowing and a synthetic fallback
//! - The rolling-origin direction backtest harness
//! - CSV/JSON/Markdown artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod harness;

pub use config::{policy_from_env, BacktestConfig, ConfigError, Period, RunId};
pub use data_loader::{load_series, BarSeries, DataSource, LoadError, LoadOptions, LoadedSeries};
pub use export::{
    export_details_csv, export_forecast_csv, export_json, export_summary_csv, generate_report,
    import_json, load_artifacts, save_artifacts,
};
pub use harness::{
    evaluate_origins, rolling_origins, run_direction_backtest, BacktestReport, HarnessOutput,
    RunError, SkipReason, SkippedOrigin, SCHEMA_VERSION,
};
