//! Upstream sampler contract and the per-sample parameter schedule.
//!
//! The forecaster that produces raw paths is external. The pipeline only sees
//! the [`PathSampler`] trait: given the lookback window and a
//! [`SampleRequest`], return one [`PricePath`] of `horizon` steps.

mod random_walk;

pub use random_walk::RandomWalkSampler;

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, PricePath};
use crate::error::SamplerError;

/// Nucleus/temperature parameters for one sampler call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_p: f64,
}

/// Spread and valid ranges for the per-sample jitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterSchedule {
    /// Half-width of the temperature spread around the base value.
    pub temperature_span: f64,
    /// Half-width of the top_p spread around the base value.
    pub top_p_span: f64,
    pub temperature_range: (f64, f64),
    pub top_p_range: (f64, f64),
}

impl Default for JitterSchedule {
    fn default() -> Self {
        Self {
            temperature_span: 0.1,
            top_p_span: 0.05,
            temperature_range: (0.05, 2.0),
            top_p_range: (0.5, 1.0),
        }
    }
}

impl JitterSchedule {
    /// Parameters for sample `index` of `count`.
    ///
    /// Offsets run linearly from `-span` (first sample) to `+span` (last
    /// sample); a single sample gets the base values. Results are clamped to
    /// the valid ranges.
    pub fn jitter(&self, index: usize, count: usize, base: SamplingParams) -> SamplingParams {
        let position = if count > 1 {
            index.min(count - 1) as f64 / (count - 1) as f64 - 0.5
        } else {
            0.0
        };
        let temperature = base.temperature + 2.0 * self.temperature_span * position;
        let top_p = base.top_p + 2.0 * self.top_p_span * position;
        SamplingParams {
            temperature: temperature.clamp(self.temperature_range.0, self.temperature_range.1),
            top_p: top_p.clamp(self.top_p_range.0, self.top_p_range.1),
        }
    }
}

/// One call to the upstream sampler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleRequest {
    pub lookback: usize,
    pub horizon: usize,
    pub temperature: f64,
    pub top_p: f64,
    /// Position of this call within the request's N samples.
    pub sample_index: usize,
}

/// The upstream forecaster, seen as a black box.
///
/// Implementations must be pure functions of `(history, request)`: the same
/// inputs give the same path, and nothing outside `history` is consulted.
pub trait PathSampler: Send + Sync {
    /// Human-readable name, used in logs and errors.
    fn name(&self) -> &str;

    /// Produce one path of `request.horizon` steps from the lookback window.
    fn sample(&self, history: &[Bar], request: &SampleRequest) -> Result<PricePath, SamplerError>;
}

/// Reject paths the pipeline cannot use: wrong length or unusable closes.
pub fn validate_path(path: &PricePath, horizon: usize) -> Result<(), SamplerError> {
    if path.len() != horizon {
        return Err(SamplerError::WrongLength {
            expected: horizon,
            actual: path.len(),
        });
    }
    if let Some(step) = path
        .bars()
        .iter()
        .position(|b| !(b.close.is_finite() && b.close > 0.0))
    {
        return Err(SamplerError::InvalidClose { step });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SamplingParams {
        SamplingParams {
            temperature: 0.6,
            top_p: 0.8,
        }
    }

    #[test]
    fn single_sample_uses_base_params() {
        let p = JitterSchedule::default().jitter(0, 1, base());
        assert_eq!(p, base());
    }

    #[test]
    fn jitter_spans_symmetric_range() {
        let schedule = JitterSchedule::default();
        let first = schedule.jitter(0, 5, base());
        let mid = schedule.jitter(2, 5, base());
        let last = schedule.jitter(4, 5, base());
        assert!((first.temperature - 0.5).abs() < 1e-12);
        assert!((last.temperature - 0.7).abs() < 1e-12);
        assert!((mid.temperature - 0.6).abs() < 1e-12);
        assert!((first.top_p - 0.75).abs() < 1e-12);
        assert!((last.top_p - 0.85).abs() < 1e-12);
    }

    #[test]
    fn jitter_is_pure() {
        let schedule = JitterSchedule::default();
        assert_eq!(schedule.jitter(3, 7, base()), schedule.jitter(3, 7, base()));
    }

    #[test]
    fn jitter_clamps_to_valid_range() {
        let schedule = JitterSchedule::default();
        let hot = SamplingParams {
            temperature: 1.98,
            top_p: 0.99,
        };
        let p = schedule.jitter(4, 5, hot);
        assert_eq!(p.temperature, 2.0);
        assert_eq!(p.top_p, 1.0);
    }

    #[test]
    fn validate_rejects_wrong_length() {
        let path = PricePath::from_closes(&[1.0, 2.0]);
        assert_eq!(
            validate_path(&path, 3),
            Err(SamplerError::WrongLength {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn validate_rejects_non_positive_close() {
        let path = PricePath::from_closes(&[1.0, 0.0, 2.0]);
        assert_eq!(validate_path(&path, 3), Err(SamplerError::InvalidClose { step: 1 }));
    }
}
