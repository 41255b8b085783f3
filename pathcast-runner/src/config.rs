//! Serializable backtest configuration.
//!
//! Loaded from TOML, then optionally overridden by environment knobs. The run
//! id is a BLAKE3 hash of the canonical JSON form, so two runs with identical
//! settings share an id.

use std::path::Path;
use std::sync::Arc;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pathcast_core::{
    CalibrationPolicy, CentralTendency, ForecastError, ForecastRequest, ForecastService,
    PathSampler,
};

/// Unique identifier for a backtest run (content-addressable hash).
pub type RunId = String;

/// Environment knob toggling first-step calibration.
pub const ENV_CALIBRATION: &str = "PATHCAST_CALIBRATION";
/// Environment knob overriding the intraday range ceiling.
pub const ENV_DAILY_LIMIT_PCT: &str = "PATHCAST_DAILY_LIMIT_PCT";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid value '{value}' for {var}: {reason}")]
    Env {
        var: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// History window fed to the backtest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[default]
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "max")]
    Max,
}

impl Period {
    pub fn label(&self) -> &'static str {
        match self {
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
            Period::TwoYears => "2y",
            Period::FiveYears => "5y",
            Period::Max => "max",
        }
    }

    fn months(&self) -> Option<u32> {
        match self {
            Period::SixMonths => Some(6),
            Period::OneYear => Some(12),
            Period::TwoYears => Some(24),
            Period::FiveYears => Some(60),
            Period::Max => None,
        }
    }

    /// First date inside the window ending at `end`; `None` for `max`.
    pub fn start_from(&self, end: NaiveDate) -> Option<NaiveDate> {
        self.months()
            .and_then(|m| end.checked_sub_months(Months::new(m)))
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "6mo" => Ok(Period::SixMonths),
            "1y" => Ok(Period::OneYear),
            "2y" => Ok(Period::TwoYears),
            "5y" => Ok(Period::FiveYears),
            "max" => Ok(Period::Max),
            other => Err(format!("unknown period '{other}' (expected 6mo, 1y, 2y, 5y or max)")),
        }
    }
}

/// Everything needed to reproduce a direction backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub stock: String,
    pub period: Period,
    /// Bars of history handed to the sampler at each origin.
    pub lookback: usize,
    /// Forecast length; raised to the largest horizon if shorter.
    pub pred_len: usize,
    pub horizons: Vec<usize>,
    pub temperature: f64,
    pub top_p: f64,
    pub sample_count: usize,
    /// Bars between consecutive origins.
    pub step: usize,
    /// Realized moves smaller than this are left out of the filtered stats.
    pub eps: f64,
    /// First origin; defaults to the first bar with enough history.
    pub start_origin: Option<usize>,
    pub seed: u64,
    /// Per-origin wall-clock budget.
    pub origin_timeout_ms: Option<u64>,
    /// Evaluate origins on the rayon pool.
    pub parallel: bool,
    /// Also run the N sampler calls of each forecast on the rayon pool.
    pub parallel_samples: bool,
    pub tendency: CentralTendency,
    pub policy: CalibrationPolicy,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            stock: "000968".into(),
            period: Period::default(),
            lookback: 1024,
            pred_len: 10,
            horizons: vec![1, 5, 10],
            temperature: 0.6,
            top_p: 0.8,
            sample_count: 3,
            step: 5,
            eps: 0.005,
            start_origin: None,
            seed: 42,
            origin_timeout_ms: None,
            parallel: true,
            parallel_samples: false,
            tendency: CentralTendency::default(),
            policy: CalibrationPolicy::default(),
        }
    }
}

impl BacktestConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stock.trim().is_empty() {
            return Err(ConfigError::Invalid("stock must not be empty".into()));
        }
        if self.horizons.is_empty() {
            return Err(ConfigError::Invalid("at least one horizon is required".into()));
        }
        if self.horizons.contains(&0) {
            return Err(ConfigError::Invalid("horizons must be at least 1".into()));
        }
        if self.step == 0 {
            return Err(ConfigError::Invalid("step must be at least 1".into()));
        }
        if !(self.eps.is_finite() && self.eps >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "eps must be non-negative, got {}",
                self.eps
            )));
        }
        if self.origin_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("origin_timeout_ms must be positive".into()));
        }
        if self.sample_count < 1 {
            return Err(ForecastError::InvalidSampleCount(self.sample_count).into());
        }
        self.forecast_request().validate()?;
        self.policy.validate()?;
        Ok(())
    }

    pub fn max_horizon(&self) -> usize {
        self.horizons.iter().copied().max().unwrap_or(1)
    }

    /// Forecast length actually requested: `pred_len` raised to cover every horizon.
    pub fn effective_pred_len(&self) -> usize {
        self.pred_len.max(self.max_horizon())
    }

    /// Default first origin: the earliest bar with `lookback + pred_len` bars visible.
    pub fn first_origin(&self) -> usize {
        self.start_origin
            .unwrap_or(self.lookback + self.effective_pred_len() - 1)
    }

    pub fn forecast_request(&self) -> ForecastRequest {
        ForecastRequest {
            lookback: self.lookback,
            horizon: self.effective_pred_len(),
            temperature: self.temperature,
            top_p: self.top_p,
            sample_count: self.sample_count,
        }
    }

    /// Forecast service configured from this run's policy, tendency and seed.
    pub fn forecast_service(&self, sampler: Arc<dyn PathSampler>) -> ForecastService {
        ForecastService::new(sampler)
            .with_policy(self.policy.clone())
            .with_tendency(self.tendency)
            .with_seed(self.seed)
            .with_parallel(self.parallel_samples)
    }

    /// Horizons sorted and deduplicated.
    pub fn sorted_horizons(&self) -> Vec<usize> {
        let mut horizons = self.horizons.clone();
        horizons.sort_unstable();
        horizons.dedup();
        horizons
    }

    /// Computes a deterministic hash ID for this configuration.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_vec(self)?;
        Ok(blake3::hash(&json).to_hex().to_string())
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Taking a lookup function keeps this testable without touching the
    /// process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_CALIBRATION) {
            self.policy.calibration_enabled =
                parse_bool(&raw).ok_or_else(|| ConfigError::Env {
                    var: ENV_CALIBRATION.into(),
                    value: raw.clone(),
                    reason: "expected 1/0/true/false/on/off".into(),
                })?;
        }
        if let Some(raw) = lookup(ENV_DAILY_LIMIT_PCT) {
            let value: f64 = raw.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_DAILY_LIMIT_PCT.into(),
                value: raw.clone(),
                reason: "expected a number".into(),
            })?;
            if !(value.is_finite() && value > 0.0 && value < 1.0) {
                return Err(ConfigError::Env {
                    var: ENV_DAILY_LIMIT_PCT.into(),
                    value: raw,
                    reason: "expected a fraction in (0, 1)".into(),
                });
            }
            self.policy.daily_limit_pct = value;
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }
}

/// Apply environment knobs to a bare policy (used by the forecast command).
pub fn policy_from_env<F>(lookup: F) -> Result<CalibrationPolicy, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = BacktestConfig::default();
    config.apply_env(lookup)?;
    Ok(config.policy)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
