//! Forecast service — sampler fan-out, filter, aggregate, calibrate, rebuild.
//!
//! [`ForecastService`] is an explicit value. Callers construct it with a
//! sampler and a policy and pass it to every forecast; there is no shared
//! global instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate, widen_bands};
use crate::anomaly::filter_outliers;
use crate::calibrate::calibrate;
use crate::domain::{Bar, CalibratedForecast, ForecastSummary, PricePath, SampleSet};
use crate::error::{ForecastError, SamplerError};
use crate::ohlc::{reconstruct, OhlcInputs};
use crate::policy::{CalibrationPolicy, CentralTendency};
use crate::rng::{history_key, RngHierarchy};
use crate::sampler::{validate_path, JitterSchedule, PathSampler, SampleRequest, SamplingParams};
use crate::stats::trailing_volatility;

/// Bars of the lookback window hashed into the reconstructor's RNG key.
const OHLC_KEY_TAIL: usize = 32;

/// Longest single wait on a deadline-bound sampler call before the budget is
/// re-checked, so cancellation is seen while a call is in flight.
const BUDGET_POLL: Duration = Duration::from_millis(10);

// ─── Request ─────────────────────────────────────────────────────────

/// One forecast request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastRequest {
    /// Bars of visible history handed to the sampler.
    pub lookback: usize,
    /// Steps to forecast.
    pub horizon: usize,
    pub temperature: f64,
    pub top_p: f64,
    /// Number of sampler calls (N).
    pub sample_count: usize,
}

impl Default for ForecastRequest {
    fn default() -> Self {
        Self {
            lookback: 400,
            horizon: 30,
            temperature: 1.0,
            top_p: 0.9,
            sample_count: 30,
        }
    }
}

impl ForecastRequest {
    /// Shape checks that do not need history. Sample count is checked
    /// separately so it is always rejected first.
    pub fn validate(&self) -> Result<(), ForecastError> {
        if self.horizon == 0 {
            return Err(ForecastError::InvalidRequest("horizon must be at least 1".into()));
        }
        if self.lookback == 0 {
            return Err(ForecastError::InvalidRequest("lookback must be at least 1".into()));
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(ForecastError::InvalidRequest(format!(
                "temperature must be positive and finite, got {}",
                self.temperature
            )));
        }
        if !(self.top_p.is_finite() && self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ForecastError::InvalidRequest(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        Ok(())
    }

    /// Bars of history needed before a forecast can run.
    pub fn required_history(&self) -> usize {
        self.lookback + self.horizon
    }

    fn base_params(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

// ─── Budget ──────────────────────────────────────────────────────────

/// Limits for one forecast.
///
/// Checked before and after every sampler call and again before aggregation.
/// With a deadline set, each sampler call runs on its own thread and is
/// abandoned once the deadline passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Budget<'a> {
    pub cancel: Option<&'a AtomicBool>,
    pub deadline: Option<Instant>,
}

impl<'a> Budget<'a> {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn check(&self) -> Result<(), ForecastError> {
        if self.cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
            return Err(ForecastError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ForecastError::TimedOut);
        }
        Ok(())
    }
}

// ─── Service ─────────────────────────────────────────────────────────

enum SampleFault {
    Budget(ForecastError),
    Sampler(SamplerError),
}

/// The forecast pipeline bound to one sampler and one policy.
#[derive(Clone)]
pub struct ForecastService {
    sampler: Arc<dyn PathSampler>,
    policy: CalibrationPolicy,
    tendency: CentralTendency,
    jitter: JitterSchedule,
    rng: RngHierarchy,
    parallel: bool,
}

impl std::fmt::Debug for ForecastService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastService")
            .field("sampler", &self.sampler.name())
            .field("policy", &self.policy)
            .field("tendency", &self.tendency)
            .field("jitter", &self.jitter)
            .field("seed", &self.rng.master_seed())
            .field("parallel", &self.parallel)
            .finish()
    }
}

impl ForecastService {
    pub fn new(sampler: Arc<dyn PathSampler>) -> Self {
        Self {
            sampler,
            policy: CalibrationPolicy::default(),
            tendency: CentralTendency::default(),
            jitter: JitterSchedule::default(),
            rng: RngHierarchy::new(42),
            parallel: false,
        }
    }

    pub fn with_policy(mut self, policy: CalibrationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_tendency(mut self, tendency: CentralTendency) -> Self {
        self.tendency = tendency;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterSchedule) -> Self {
        self.jitter = jitter;
        self
    }

    /// Seed for the reconstructor's RNG.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = RngHierarchy::new(seed);
        self
    }

    /// Run the N sampler calls on the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn policy(&self) -> &CalibrationPolicy {
        &self.policy
    }

    pub fn tendency(&self) -> CentralTendency {
        self.tendency
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn sampler_name(&self) -> &str {
        self.sampler.name()
    }

    /// Issue N jittered sampler calls over the last `lookback` bars.
    ///
    /// Failed calls reduce N; if every call fails the request fails with
    /// [`ForecastError::SamplerFailure`].
    pub fn build_sample_set(
        &self,
        history: &[Bar],
        request: &ForecastRequest,
        budget: &Budget<'_>,
    ) -> Result<SampleSet, ForecastError> {
        let origin_close = match history.last() {
            Some(bar) => bar.close,
            None => {
                return Err(ForecastError::InsufficientHistory {
                    available: 0,
                    required: request.required_history(),
                })
            }
        };
        let window = &history[history.len().saturating_sub(request.lookback)..];
        let n = request.sample_count;
        let base = request.base_params();
        let shared_window: Option<Arc<[Bar]>> = budget.deadline.map(|_| Arc::from(window));

        let run_one = |index: usize| -> Result<PricePath, SampleFault> {
            budget.check().map_err(SampleFault::Budget)?;
            let params = self.jitter.jitter(index, n, base);
            let call = SampleRequest {
                lookback: request.lookback,
                horizon: request.horizon,
                temperature: params.temperature,
                top_p: params.top_p,
                sample_index: index,
            };
            let path = match &shared_window {
                Some(shared) => self.sample_bounded(shared, call, budget)?,
                None => self
                    .sampler
                    .sample(window, &call)
                    .map_err(SampleFault::Sampler)?,
            };
            budget.check().map_err(SampleFault::Budget)?;
            validate_path(&path, request.horizon).map_err(SampleFault::Sampler)?;
            Ok(path)
        };

        let outcomes: Vec<_> = if self.parallel {
            (0..n).into_par_iter().map(run_one).collect()
        } else {
            (0..n).map(run_one).collect()
        };

        let mut paths = Vec::with_capacity(n);
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(path) => paths.push(path),
                Err(SampleFault::Budget(e)) => return Err(e),
                Err(SampleFault::Sampler(e)) => failures.push(e),
            }
        }

        if paths.is_empty() {
            let reason = failures
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no samples produced".into());
            return Err(ForecastError::SamplerFailure {
                failed: failures.len(),
                reason,
            });
        }
        if !failures.is_empty() {
            tracing::warn!(
                sampler = self.sampler.name(),
                failed = failures.len(),
                requested = n,
                first_error = %failures[0],
                "some sampler calls failed; continuing with the rest"
            );
        }

        Ok(SampleSet::new(origin_close, request.horizon, paths, failures.len()))
    }

    /// One sampler call on a detached thread, waited on until the budget runs
    /// out. A call that misses the deadline keeps running in the background
    /// but its result is dropped.
    fn sample_bounded(
        &self,
        window: &Arc<[Bar]>,
        call: SampleRequest,
        budget: &Budget<'_>,
    ) -> Result<PricePath, SampleFault> {
        let (tx, rx) = mpsc::channel();
        let sampler = Arc::clone(&self.sampler);
        let window = Arc::clone(window);
        std::thread::Builder::new()
            .name(format!("pathcast-sample-{}", call.sample_index))
            .spawn(move || {
                // The receiver is gone once the deadline has passed.
                let _ = tx.send(sampler.sample(&window, &call));
            })
            .map_err(|e| {
                SampleFault::Sampler(SamplerError::Failed {
                    sampler: self.sampler.name().to_string(),
                    reason: format!("could not spawn sampler thread: {e}"),
                })
            })?;

        loop {
            let wait = match budget.deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => BUDGET_POLL,
            };
            match rx.recv_timeout(wait.min(BUDGET_POLL)) {
                Ok(result) => return result.map_err(SampleFault::Sampler),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    budget.check().map_err(SampleFault::Budget)?;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(SampleFault::Sampler(SamplerError::Failed {
                        sampler: self.sampler.name().to_string(),
                        reason: "sampler thread exited without a result".into(),
                    }))
                }
            }
        }
    }

    pub fn forecast(
        &self,
        history: &[Bar],
        request: &ForecastRequest,
    ) -> Result<CalibratedForecast, ForecastError> {
        self.forecast_with_budget(history, request, &Budget::unlimited())
    }

    /// Full pipeline. `history` is everything visible at the forecast origin;
    /// its last bar is C0.
    pub fn forecast_with_budget(
        &self,
        history: &[Bar],
        request: &ForecastRequest,
        budget: &Budget<'_>,
    ) -> Result<CalibratedForecast, ForecastError> {
        if request.sample_count < 1 {
            return Err(ForecastError::InvalidSampleCount(request.sample_count));
        }
        request.validate()?;
        self.policy.validate()?;
        let required = request.required_history();
        if history.len() < required {
            return Err(ForecastError::InsufficientHistory {
                available: history.len(),
                required,
            });
        }
        let last_close = history[history.len() - 1].close;
        if !(last_close.is_finite() && last_close > 0.0) {
            return Err(ForecastError::DegenerateForecast { anchor: last_close });
        }
        budget.check()?;

        let samples = self.build_sample_set(history, request, budget)?;
        budget.check()?;
        let filtered = filter_outliers(&samples, self.policy.outlier_threshold);
        let aggregated = aggregate(&filtered.retained, self.tendency);
        let calibration = calibrate(&aggregated.central_closes(), last_close, &self.policy)?;

        let window = &history[history.len() - request.lookback..];
        let raw_volatility = trailing_volatility(window, self.policy.volatility_window);
        let volatility = raw_volatility.min(self.policy.volatility_ceiling);

        let mut bands = aggregated.bands;
        calibration.rescale(&mut bands.lower);
        calibration.rescale(&mut bands.upper);
        calibration.rescale(&mut bands.min);
        calibration.rescale(&mut bands.max);
        calibration.rescale(&mut bands.std);
        let widened = widen_bands(
            &mut bands,
            &calibration.closes,
            volatility,
            self.policy.min_band_width_pct,
        );

        let volumes: Vec<f64> = aggregated.central.bars().iter().map(|b| b.volume).collect();
        let key = history_key(window, OHLC_KEY_TAIL);
        let mut rng = self.rng.rng_for("ohlc", &key, 0);
        let path = reconstruct(
            &OhlcInputs {
                closes: &calibration.closes,
                volumes: &volumes,
                last_close,
                volatility,
                calibration: &calibration.report,
            },
            &self.policy,
            &mut rng,
        )?;

        let daily_volatility = trailing_volatility(window, window.len());
        let summary = ForecastSummary::compute(last_close, &path, daily_volatility);

        tracing::debug!(
            sampler = self.sampler.name(),
            samples = samples.len(),
            retained = filtered.report.retained,
            fallback = filtered.report.fallback,
            factor = calibration.report.factor,
            widened,
            "forecast complete"
        );

        Ok(CalibratedForecast::new(
            path,
            bands,
            calibration.report,
            filtered.report,
            samples.failed(),
            summary,
        ))
    }
}
