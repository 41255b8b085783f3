//! Criterion benchmarks for PathCast hot paths.
//!
//! Benchmarks:
//! 1. Full forecast (sequential and parallel sampling)
//! 2. Aggregation across sample counts
//! 3. OHLC reconstruction over a long horizon

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use pathcast_core::aggregate::aggregate;
use pathcast_core::ohlc::{reconstruct, OhlcInputs};
use pathcast_core::{
    Bar, CalibrationPolicy, CalibrationReport, CentralTendency, ForecastRequest, ForecastService,
    PathSampler, PricePath, RandomWalkSampler, SampleRequest,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            Bar::new(close - 0.3, close + 1.5, close - 1.5, close, 1_000_000.0)
        })
        .collect()
}

fn make_paths(history: &[Bar], n: usize, horizon: usize) -> Vec<PricePath> {
    let sampler = RandomWalkSampler::new(1);
    (0..n)
        .filter_map(|i| {
            sampler
                .sample(
                    history,
                    &SampleRequest {
                        lookback: history.len(),
                        horizon,
                        temperature: 0.6,
                        top_p: 0.8,
                        sample_index: i,
                    },
                )
                .ok()
        })
        .collect()
}

// ── 1. Full forecast ─────────────────────────────────────────────────

fn bench_forecast(c: &mut Criterion) {
    let bars = make_bars(1_500);
    let request = ForecastRequest {
        lookback: 1_024,
        horizon: 10,
        temperature: 0.6,
        top_p: 0.8,
        sample_count: 30,
    };
    let sampler: Arc<dyn PathSampler> = Arc::new(RandomWalkSampler::new(42));

    let mut group = c.benchmark_group("forecast");
    for parallel in [false, true] {
        let service = ForecastService::new(Arc::clone(&sampler)).with_parallel(parallel);
        group.bench_with_input(
            BenchmarkId::new("n30_h10", if parallel { "parallel" } else { "sequential" }),
            &service,
            |b, service| b.iter(|| service.forecast(black_box(&bars), black_box(&request))),
        );
    }
    group.finish();
}

// ── 2. Aggregation ───────────────────────────────────────────────────

fn bench_aggregate(c: &mut Criterion) {
    let bars = make_bars(200);
    let mut group = c.benchmark_group("aggregate");
    for n in [5usize, 30, 100] {
        let paths = make_paths(&bars, n, 30);
        let refs: Vec<&PricePath> = paths.iter().collect();
        group.bench_with_input(BenchmarkId::new("median", n), &refs, |b, refs| {
            b.iter(|| aggregate(black_box(refs), CentralTendency::Median))
        });
    }
    group.finish();
}

// ── 3. OHLC reconstruction ───────────────────────────────────────────

fn bench_reconstruct(c: &mut Criterion) {
    let closes: Vec<f64> = (0..250).map(|i| 100.0 + (i as f64 * 0.05).cos() * 3.0).collect();
    let volumes = vec![1_000.0; closes.len()];
    let report = CalibrationReport {
        pre_gap: 0.05,
        post_gap: 0.02,
        factor: 0.97,
        applied: true,
    };
    let policy = CalibrationPolicy::default();

    c.bench_function("reconstruct_h250", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(3);
            let inputs = OhlcInputs {
                closes: &closes,
                volumes: &volumes,
                last_close: 100.0,
                volatility: 0.02,
                calibration: &report,
            };
            reconstruct(black_box(&inputs), &policy, &mut rng)
        })
    });
}

criterion_group!(benches, bench_forecast, bench_aggregate, bench_reconstruct);
criterion_main!(benches);
