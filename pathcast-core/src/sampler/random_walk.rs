//! Built-in random-walk sampler.
//!
//! Stands in for the external forecaster in offline runs and tests. Each path
//! continues the lookback window with a decaying drift plus temperature-scaled
//! noise truncated by `top_p`.

use rand::rngs::StdRng;
use rand::Rng;

use super::{PathSampler, SampleRequest};
use crate::domain::{Bar, PricePath};
use crate::error::SamplerError;
use crate::rng::{history_key, RngHierarchy};
use crate::stats::{close_returns, mean, sample_std};

/// Bars of the lookback window that feed the RNG key.
const KEY_TAIL: usize = 32;

#[derive(Debug, Clone)]
pub struct RandomWalkSampler {
    rng: RngHierarchy,
    /// Trailing returns averaged into the drift estimate.
    drift_window: usize,
}

impl RandomWalkSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RngHierarchy::new(seed),
            drift_window: 10,
        }
    }

    pub fn with_drift_window(mut self, drift_window: usize) -> Self {
        self.drift_window = drift_window.max(1);
        self
    }
}

/// Standard normal draw (Box-Muller).
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

impl PathSampler for RandomWalkSampler {
    fn name(&self) -> &str {
        "random_walk"
    }

    fn sample(&self, history: &[Bar], request: &SampleRequest) -> Result<PricePath, SamplerError> {
        let last = match history.last() {
            Some(bar) if history.len() >= 2 && bar.close > 0.0 => *bar,
            _ => {
                return Err(SamplerError::Failed {
                    sampler: self.name().to_string(),
                    reason: "needs at least two bars ending in a positive close".into(),
                })
            }
        };

        let returns = close_returns(history);
        let volatility = sample_std(&returns).max(1e-4);
        let drift_start = returns.len().saturating_sub(self.drift_window);
        let drift = match mean(&returns[drift_start..]) {
            d if d.is_finite() => d,
            _ => 0.0,
        };

        let key = history_key(history, KEY_TAIL);
        let mut rng = self
            .rng
            .rng_for(self.name(), &key, request.sample_index as u64);
        let z_bound = 1.0 + 2.0 * request.top_p;

        let mut price = last.close;
        let mut volume = last.volume.max(0.0);
        let mut bars = Vec::with_capacity(request.horizon);

        for step in 0..request.horizon {
            let trend = (1.0 - 0.1 * step as f64).max(0.1);
            let z = standard_normal(&mut rng).clamp(-z_bound, z_bound);
            let ret = drift * trend + volatility * request.temperature * z;
            let close = (price * (1.0 + ret)).max(price * 0.5);

            let open = price;
            let high = open.max(close) * (1.0 + rng.gen::<f64>() * volatility * 0.5);
            let low = open.min(close) * (1.0 - rng.gen::<f64>() * volatility * 0.5);
            volume = (volume * (1.0 + 0.2 * standard_normal(&mut rng).clamp(-2.0, 2.0))).max(0.0);

            bars.push(Bar::new(open, high, low, close, volume));
            price = close;
        }

        Ok(PricePath::new(bars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::validate_path;

    fn history(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.3).sin() * 5.0;
                Bar::new(close - 0.2, close + 1.0, close - 1.0, close, 1_000.0)
            })
            .collect()
    }

    fn request(index: usize) -> SampleRequest {
        SampleRequest {
            lookback: 60,
            horizon: 10,
            temperature: 0.6,
            top_p: 0.8,
            sample_index: index,
        }
    }

    #[test]
    fn produces_valid_path() {
        let sampler = RandomWalkSampler::new(7);
        let path = sampler.sample(&history(60), &request(0)).unwrap();
        assert!(validate_path(&path, 10).is_ok());
        assert!(path.bars().iter().all(|b| b.is_sane()));
    }

    #[test]
    fn same_inputs_same_path() {
        let sampler = RandomWalkSampler::new(7);
        let h = history(60);
        assert_eq!(
            sampler.sample(&h, &request(3)).unwrap(),
            sampler.sample(&h, &request(3)).unwrap()
        );
    }

    #[test]
    fn sample_index_changes_path() {
        let sampler = RandomWalkSampler::new(7);
        let h = history(60);
        assert_ne!(
            sampler.sample(&h, &request(0)).unwrap(),
            sampler.sample(&h, &request(1)).unwrap()
        );
    }

    #[test]
    fn too_short_history_fails() {
        let sampler = RandomWalkSampler::new(7);
        assert!(sampler.sample(&history(1), &request(0)).is_err());
    }
}
