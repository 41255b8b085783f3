//! CalibratedForecast — the result of one forecast request.

use serde::{Deserialize, Serialize};

use super::PricePath;

/// What the continuity calibrator did to the central path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// First-step gap of the aggregated path, before any rescale.
    pub pre_gap: f64,
    /// First-step gap of the calibrated close series.
    pub post_gap: f64,
    /// Uniform factor applied to the close series (1.0 when not applied).
    pub factor: f64,
    pub applied: bool,
}

impl CalibrationReport {
    pub fn identity(gap: f64) -> Self {
        Self {
            pre_gap: gap,
            post_gap: gap,
            factor: 1.0,
            applied: false,
        }
    }
}

/// What the anomaly filter kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterReport {
    pub retained: usize,
    pub rejected: usize,
    /// True when the filter would have kept fewer than half the samples and
    /// the unfiltered set was used instead.
    pub fallback: bool,
}

/// Per-step dispersion of sample closes, after calibration rescale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispersionBands {
    /// 25th percentile close per step.
    pub lower: Vec<f64>,
    /// 75th percentile close per step.
    pub upper: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub std: Vec<f64>,
}

/// Coarse direction label for a forecast's total change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    StrongUp,
    Up,
    Sideways,
    Down,
    StrongDown,
}

impl Trend {
    /// Classify a percent change (e.g. `1.5` for +1.5%).
    pub fn from_change_pct(change_pct: f64) -> Self {
        if change_pct > 2.0 {
            Trend::StrongUp
        } else if change_pct > 0.5 {
            Trend::Up
        } else if change_pct >= -0.5 {
            Trend::Sideways
        } else if change_pct >= -2.0 {
            Trend::Down
        } else {
            Trend::StrongDown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Trend::StrongUp => "strong up",
            Trend::Up => "up",
            Trend::Sideways => "sideways",
            Trend::Down => "down",
            Trend::StrongDown => "strong down",
        }
    }
}

/// Headline numbers for a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub current_price: f64,
    pub predicted_price: f64,
    pub change_amount: f64,
    pub change_pct: f64,
    pub trend: Trend,
    /// Annualized close-to-close volatility of the history, in percent.
    pub annualized_volatility_pct: f64,
}

impl ForecastSummary {
    pub fn compute(current_price: f64, path: &PricePath, daily_volatility: f64) -> Self {
        let predicted_price = path.last().map(|b| b.close).unwrap_or(current_price);
        let change_amount = predicted_price - current_price;
        let change_pct = if current_price != 0.0 {
            change_amount / current_price * 100.0
        } else {
            0.0
        };
        Self {
            current_price,
            predicted_price,
            change_amount,
            change_pct,
            trend: Trend::from_change_pct(change_pct),
            annualized_volatility_pct: daily_volatility * 252f64.sqrt() * 100.0,
        }
    }
}

/// Calibrated central forecast plus dispersion bands.
///
/// Created fresh per request and handed to the caller; there are no mutating
/// accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedForecast {
    path: PricePath,
    bands: DispersionBands,
    calibration: CalibrationReport,
    filter: FilterReport,
    samples_used: usize,
    samples_failed: usize,
    summary: ForecastSummary,
}

impl CalibratedForecast {
    pub(crate) fn new(
        path: PricePath,
        bands: DispersionBands,
        calibration: CalibrationReport,
        filter: FilterReport,
        samples_failed: usize,
        summary: ForecastSummary,
    ) -> Self {
        Self {
            path,
            bands,
            calibration,
            samples_used: filter.retained,
            filter,
            samples_failed,
            summary,
        }
    }

    pub fn path(&self) -> &PricePath {
        &self.path
    }

    pub fn lower_band(&self) -> &[f64] {
        &self.bands.lower
    }

    pub fn upper_band(&self) -> &[f64] {
        &self.bands.upper
    }

    pub fn bands(&self) -> &DispersionBands {
        &self.bands
    }

    pub fn calibration(&self) -> &CalibrationReport {
        &self.calibration
    }

    pub fn filter(&self) -> &FilterReport {
        &self.filter
    }

    /// Samples that went into the aggregate.
    pub fn samples_used(&self) -> usize {
        self.samples_used
    }

    /// Sampler calls that failed for this request.
    pub fn samples_failed(&self) -> usize {
        self.samples_failed
    }

    pub fn summary(&self) -> &ForecastSummary {
        &self.summary
    }

    /// Calibrated close at step `step` (0-based).
    pub fn close_at(&self, step: usize) -> Option<f64> {
        self.path.bars().get(step).map(|b| b.close)
    }
}
