//! Look-ahead contamination tests for the forecast pipeline.
//!
//! Invariant: a forecast made at origin `o` may not depend on any bar after `o`.
//!
//! Method: forecast from the truncated series `bars[..=o]`, then again from the
//! same origin after the series has been extended with arbitrary future bars
//! that are sliced away before the call. The two forecasts must be identical,
//! and they must not change when the future bars are rewritten.

use std::sync::Arc;

use pathcast_core::{Bar, ForecastRequest, ForecastService, RandomWalkSampler};

/// Deterministic pseudo-random walk using a simple LCG.
fn make_test_bars(n: usize, salt: u64) -> Vec<Bar> {
    let mut bars = Vec::with_capacity(n);
    let mut price = 100.0;
    for i in 0..n {
        let seed = (i as u64 ^ salt)
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        let change = ((seed % 200) as f64 - 100.0) * 0.0005;
        price *= 1.0 + change;
        let open = price * 0.998;
        bars.push(Bar::new(
            open,
            price.max(open) * 1.01,
            price.min(open) * 0.99,
            price,
            10_000.0 + i as f64,
        ));
    }
    bars
}

fn service() -> ForecastService {
    ForecastService::new(Arc::new(RandomWalkSampler::new(2024))).with_seed(7)
}

fn request() -> ForecastRequest {
    ForecastRequest {
        lookback: 60,
        horizon: 10,
        temperature: 0.6,
        top_p: 0.8,
        sample_count: 9,
    }
}

#[test]
fn deleting_future_bars_does_not_change_forecast() {
    let full = make_test_bars(200, 0);
    let origin = 120;

    let from_full = service().forecast(&full[..=origin], &request()).unwrap();
    let truncated: Vec<Bar> = full[..=origin].to_vec();
    let from_truncated = service().forecast(&truncated, &request()).unwrap();

    assert_eq!(from_full, from_truncated);
}

#[test]
fn rewriting_future_bars_does_not_change_forecast() {
    let origin = 120;
    let mut a = make_test_bars(200, 0);
    let b_future = make_test_bars(200, 99);
    let mut b = a.clone();
    b[origin + 1..].copy_from_slice(&b_future[origin + 1..]);
    a.truncate(origin + 1);

    let fa = service().forecast(&a, &request()).unwrap();
    let fb = service().forecast(&b[..=origin], &request()).unwrap();
    assert_eq!(fa, fb);
}

#[test]
fn bars_outside_lookback_do_not_matter() {
    let origin = 150;
    let full = make_test_bars(200, 0);
    let mut altered = full.clone();
    // Rewrite the distant past; only the last 60 bars are visible to the sampler
    for bar in altered.iter_mut().take(origin - 70) {
        *bar = Bar::new(1.0, 1.0, 1.0, 1.0, 0.0);
    }

    let a = service().forecast(&full[..=origin], &request()).unwrap();
    let b = service().forecast(&altered[..=origin], &request()).unwrap();
    assert_eq!(a, b);
}
