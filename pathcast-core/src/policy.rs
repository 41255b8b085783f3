//! Calibration policy — every clamp the pipeline applies, in one place.
//!
//! The anomaly filter, calibrator and OHLC reconstructor read their limits
//! from [`CalibrationPolicy`]; none of them carries a local literal.

use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

/// Reduction used to collapse samples into one path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralTendency {
    /// Robust to a single extreme sample.
    #[default]
    Median,
    /// Outlier-sensitive; one runaway sample drags the whole step.
    Mean,
}

impl CentralTendency {
    pub fn name(&self) -> &'static str {
        match self {
            CentralTendency::Median => "median",
            CentralTendency::Mean => "mean",
        }
    }
}

impl std::str::FromStr for CentralTendency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "median" => Ok(CentralTendency::Median),
            "mean" => Ok(CentralTendency::Mean),
            other => Err(format!("unknown central tendency '{other}' (expected median or mean)")),
        }
    }
}

/// All pipeline clamps and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationPolicy {
    /// Max |first-step gap| for a sample to survive the anomaly filter.
    pub outlier_threshold: f64,
    /// |first-step gap| above which the calibrator rescales.
    pub gap_tolerance: f64,
    /// Gap magnitude the calibrator rescales to.
    pub target_gap: f64,
    /// Base of the decaying open/high/low correction.
    pub decay_base: f64,
    /// Steps covered by the decaying correction (step 0 excluded).
    pub decay_window: usize,
    /// `decay_base^i` below this counts as zero.
    pub decay_cutoff: f64,
    /// Ceiling on `(high - low) / open` for reconstructed bars.
    pub daily_limit_pct: f64,
    /// Ceiling on the per-step volatility estimate.
    pub volatility_ceiling: f64,
    /// Number of trailing returns used for the volatility estimate.
    pub volatility_window: usize,
    /// Max |open[t] / close[t-1] - 1| before the decaying correction.
    pub open_drift_limit: f64,
    /// Bands narrower than this fraction of the central close get widened.
    pub min_band_width_pct: f64,
    /// First-step calibration switch.
    pub calibration_enabled: bool,
}

impl Default for CalibrationPolicy {
    fn default() -> Self {
        Self {
            outlier_threshold: 0.05,
            gap_tolerance: 0.03,
            target_gap: 0.02,
            decay_base: 0.7,
            decay_window: 3,
            decay_cutoff: 0.1,
            daily_limit_pct: 0.10,
            volatility_ceiling: 0.03,
            volatility_window: 20,
            open_drift_limit: 0.015,
            min_band_width_pct: 0.01,
            calibration_enabled: true,
        }
    }
}

impl CalibrationPolicy {
    /// Reject values that would make a clamp meaningless.
    pub fn validate(&self) -> Result<(), ForecastError> {
        let positive = [
            ("outlier_threshold", self.outlier_threshold),
            ("gap_tolerance", self.gap_tolerance),
            ("daily_limit_pct", self.daily_limit_pct),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ForecastError::InvalidPolicy(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        let non_negative = [
            ("target_gap", self.target_gap),
            ("decay_cutoff", self.decay_cutoff),
            ("volatility_ceiling", self.volatility_ceiling),
            ("open_drift_limit", self.open_drift_limit),
            ("min_band_width_pct", self.min_band_width_pct),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ForecastError::InvalidPolicy(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }

        if self.target_gap > self.gap_tolerance {
            return Err(ForecastError::InvalidPolicy(format!(
                "target_gap {} exceeds gap_tolerance {}",
                self.target_gap, self.gap_tolerance
            )));
        }
        if !(self.decay_base.is_finite() && (0.0..1.0).contains(&self.decay_base)) {
            return Err(ForecastError::InvalidPolicy(format!(
                "decay_base must be in [0, 1), got {}",
                self.decay_base
            )));
        }
        if self.daily_limit_pct >= 1.0 {
            return Err(ForecastError::InvalidPolicy(format!(
                "daily_limit_pct must be below 1.0, got {}",
                self.daily_limit_pct
            )));
        }
        Ok(())
    }

    /// Multiplier for the decaying correction at `step`, given the close
    /// rescale `factor`. Step 0 and steps at or past the window get 1.0.
    pub fn decay_multiplier(&self, step: usize, factor: f64) -> f64 {
        if step == 0 || step >= self.decay_window {
            return 1.0;
        }
        let weight = self.decay_base.powi(step as i32);
        if weight < self.decay_cutoff {
            return 1.0;
        }
        1.0 + (factor - 1.0) * weight
    }
}
