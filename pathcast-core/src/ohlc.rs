//! OHLC reconstructor — rebuild full bars around the calibrated closes.
//!
//! Closes are taken as given. Opens chain from the previous close with a small
//! bounded drift, wicks are drawn from the volatility estimate and then squeezed
//! so the intraday range never exceeds `open * daily_limit_pct`.

use rand::rngs::StdRng;
use rand::Rng;

use crate::domain::{Bar, CalibrationReport, PricePath};
use crate::error::ForecastError;
use crate::policy::CalibrationPolicy;

/// Everything the reconstructor reads besides the policy and RNG.
#[derive(Debug, Clone, Copy)]
pub struct OhlcInputs<'a> {
    /// Calibrated close series, one per step.
    pub closes: &'a [f64],
    /// Aggregated volume, one per step.
    pub volumes: &'a [f64],
    /// Last visible close (C0).
    pub last_close: f64,
    /// Per-step volatility, already clamped to the policy ceiling.
    pub volatility: f64,
    pub calibration: &'a CalibrationReport,
}

pub fn reconstruct(
    inputs: &OhlcInputs<'_>,
    policy: &CalibrationPolicy,
    rng: &mut StdRng,
) -> Result<PricePath, ForecastError> {
    let v = inputs.volatility.clamp(0.0, policy.volatility_ceiling);
    let factor = inputs.calibration.factor;
    let mut bars = Vec::with_capacity(inputs.closes.len());

    for (t, &close) in inputs.closes.iter().enumerate() {
        let open = if t == 0 {
            let bounded_gap = inputs
                .calibration
                .post_gap
                .clamp(-policy.target_gap, policy.target_gap);
            inputs.last_close * (1.0 + bounded_gap)
        } else {
            let drift = ((rng.gen::<f64>() - 0.5) * v)
                .clamp(-policy.open_drift_limit, policy.open_drift_limit);
            inputs.closes[t - 1] * (1.0 + drift) * policy.decay_multiplier(t, factor)
        };

        let body_high = open.max(close);
        let body_low = open.min(close);
        let mut eps_high = rng.gen::<f64>() * v * body_high;
        let mut eps_low = rng.gen::<f64>() * v * body_low;

        let limit = open * policy.daily_limit_pct;
        let body = body_high - body_low;
        let wicks = eps_high + eps_low;
        if body + wicks > limit {
            let scale = if body >= limit || wicks <= 0.0 {
                0.0
            } else {
                (limit - body) / wicks
            };
            eps_high *= scale;
            eps_low *= scale;
        }

        let volume = inputs.volumes.get(t).copied().unwrap_or(0.0);
        let volume = if volume.is_finite() { volume.max(0.0) } else { 0.0 };

        bars.push(Bar::new(
            open,
            body_high + eps_high,
            body_low - eps_low,
            close,
            volume,
        ));
    }

    verify_bars(&bars)?;
    Ok(PricePath::new(bars))
}

/// Final gate on reconstructed bars. A failure here is a defect, not bad input.
pub fn verify_bars(bars: &[Bar]) -> Result<(), ForecastError> {
    match bars.iter().position(|b| !b.is_sane()) {
        Some(step) => Err(ForecastError::InvariantViolation {
            step,
            bar: bars[step],
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn report(post_gap: f64, factor: f64) -> CalibrationReport {
        CalibrationReport {
            pre_gap: post_gap,
            post_gap,
            factor,
            applied: factor != 1.0,
        }
    }

    fn run(closes: &[f64], last_close: f64, v: f64, cal: &CalibrationReport) -> PricePath {
        let volumes = vec![1_000.0; closes.len()];
        let inputs = OhlcInputs {
            closes,
            volumes: &volumes,
            last_close,
            volatility: v,
            calibration: cal,
        };
        let mut rng = StdRng::seed_from_u64(11);
        reconstruct(&inputs, &CalibrationPolicy::default(), &mut rng).unwrap()
    }

    #[test]
    fn bars_are_ordered_and_keep_closes() {
        let closes = [101.0, 102.5, 101.8, 103.0, 104.2];
        let path = run(&closes, 100.0, 0.02, &report(0.01, 1.0));
        for (bar, &close) in path.bars().iter().zip(&closes) {
            assert!(bar.is_sane(), "{bar:?}");
            assert_eq!(bar.close, close);
        }
    }

    #[test]
    fn first_open_uses_bounded_gap() {
        let path = run(&[106.0, 107.0], 100.0, 0.02, &report(0.06, 1.0));
        assert!((path.bars()[0].open - 102.0).abs() < 1e-9);

        let path = run(&[99.0, 98.0], 100.0, 0.02, &report(-0.01, 1.0));
        assert!((path.bars()[0].open - 99.0).abs() < 1e-9);
    }

    #[test]
    fn later_opens_stay_near_previous_close() {
        let closes = [100.0, 101.0, 99.0, 100.5, 102.0, 101.0];
        let path = run(&closes, 100.0, 0.03, &report(0.0, 1.0));
        for t in 1..closes.len() {
            let drift = path.bars()[t].open / closes[t - 1] - 1.0;
            assert!(drift.abs() <= 0.015 + 1e-12, "step {t} drift {drift}");
        }
    }

    #[test]
    fn range_respects_daily_limit() {
        let closes = [100.0, 100.5, 101.0, 100.0];
        let path = run(&closes, 100.0, 0.03, &report(0.0, 1.0));
        for bar in path.bars() {
            assert!(bar.range_pct() <= 0.10 + 1e-12);
        }
    }

    #[test]
    fn body_wider_than_limit_gets_no_wicks() {
        // 20% jump between open and close: the body alone overflows the limit
        let path = run(&[120.0], 100.0, 0.03, &report(0.0, 1.0));
        let bar = path.bars()[0];
        assert_eq!(bar.high, 120.0);
        assert_eq!(bar.low, bar.open);
    }

    #[test]
    fn zero_volatility_gives_flat_wicks() {
        let path = run(&[100.0, 100.0], 100.0, 0.0, &report(0.0, 1.0));
        for bar in path.bars() {
            assert_eq!(bar.high, bar.open.max(bar.close));
            assert_eq!(bar.low, bar.open.min(bar.close));
        }
    }

    #[test]
    fn decay_lifts_early_opens_only() {
        let closes = [102.0, 102.0, 102.0, 102.0];
        let flat = run(&closes, 100.0, 0.0, &report(0.02, 1.0));
        let lifted = run(&closes, 100.0, 0.0, &report(0.02, 1.05));
        assert!(lifted.bars()[1].open > flat.bars()[1].open);
        assert!(lifted.bars()[2].open > flat.bars()[2].open);
        assert_eq!(lifted.bars()[3].open, flat.bars()[3].open);
    }

    #[test]
    fn negative_volume_clamped() {
        let closes = [100.0];
        let cal = report(0.0, 1.0);
        let inputs = OhlcInputs {
            closes: &closes,
            volumes: &[-5.0],
            last_close: 100.0,
            volatility: 0.01,
            calibration: &cal,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let path = reconstruct(&inputs, &CalibrationPolicy::default(), &mut rng).unwrap();
        assert_eq!(path.bars()[0].volume, 0.0);
    }

    #[test]
    fn verify_flags_broken_bar() {
        let bars = [
            Bar::flat(10.0, 0.0),
            Bar::new(10.0, 9.0, 11.0, 10.0, 0.0),
        ];
        assert!(matches!(
            verify_bars(&bars),
            Err(ForecastError::InvariantViolation { step: 1, .. })
        ));
    }
}
