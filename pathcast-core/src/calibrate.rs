//! Continuity calibrator — pull an excessive first-step gap back to target.
//!
//! When `|central[0] / C0 - 1| > gap_tolerance`, the whole close series is
//! multiplied by `factor = C0 * (1 ± target_gap) / central[0]`. The rescale is
//! uniform, so the shape of the path survives and only its anchor moves. The
//! same factor later drives the decaying open/high/low correction in the
//! OHLC reconstructor (see [`CalibrationPolicy::decay_multiplier`]).

use crate::domain::CalibrationReport;
use crate::error::ForecastError;
use crate::policy::CalibrationPolicy;

/// Calibrated closes and the factor that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub closes: Vec<f64>,
    pub report: CalibrationReport,
}

impl Calibration {
    pub fn factor(&self) -> f64 {
        self.report.factor
    }

    /// Apply this calibration's factor to another per-step series (bands).
    pub fn rescale(&self, values: &mut [f64]) {
        if self.report.applied {
            values.iter_mut().for_each(|v| *v *= self.report.factor);
        }
    }
}

pub fn calibrate(
    central_closes: &[f64],
    last_close: f64,
    policy: &CalibrationPolicy,
) -> Result<Calibration, ForecastError> {
    if !(last_close.is_finite() && last_close > 0.0) {
        return Err(ForecastError::DegenerateForecast { anchor: last_close });
    }
    let first = match central_closes.first() {
        Some(&c) => c,
        None => return Err(ForecastError::InvalidRequest("empty close series".into())),
    };
    if !first.is_finite() || first == 0.0 {
        return Err(ForecastError::DegenerateForecast { anchor: first });
    }

    let pre_gap = (first - last_close) / last_close;
    if !policy.calibration_enabled || pre_gap.abs() <= policy.gap_tolerance {
        return Ok(Calibration {
            closes: central_closes.to_vec(),
            report: CalibrationReport::identity(pre_gap),
        });
    }

    let target = last_close * (1.0 + pre_gap.signum() * policy.target_gap);
    let factor = target / first;
    let closes: Vec<f64> = central_closes.iter().map(|c| c * factor).collect();
    let post_gap = (closes[0] - last_close) / last_close;

    tracing::info!(
        pre_gap,
        post_gap,
        factor,
        "first-step gap exceeded tolerance; close series rescaled"
    );

    Ok(Calibration {
        closes,
        report: CalibrationReport {
            pre_gap,
            post_gap,
            factor,
            applied: true,
        },
    })
}
