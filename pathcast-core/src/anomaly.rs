//! Anomaly filter — drop samples whose first step jumps too far.
//!
//! A sample is retained when `|path[0].close / C0 - 1| <= threshold`. If fewer
//! than `ceil(N / 2)` samples survive, the filter is discarded and every
//! sample is used: an over-eager filter must never starve the aggregator.

use crate::domain::{FilterReport, PricePath, SampleSet};

/// Retained paths plus what the filter did.
#[derive(Debug, Clone)]
pub struct FilterOutcome<'a> {
    pub retained: Vec<&'a PricePath>,
    pub report: FilterReport,
}

pub fn filter_outliers(samples: &SampleSet, threshold: f64) -> FilterOutcome<'_> {
    let anchor = samples.origin_close();
    let total = samples.len();

    let kept: Vec<&PricePath> = samples
        .paths()
        .iter()
        .filter(|path| {
            path.first_step_gap(anchor)
                .is_some_and(|gap| gap.abs() <= threshold)
        })
        .collect();

    let required = total.div_ceil(2);
    if kept.len() < required {
        tracing::warn!(
            kept = kept.len(),
            total,
            threshold,
            "anomaly filter would starve the aggregator; using unfiltered samples"
        );
        return FilterOutcome {
            retained: samples.paths().iter().collect(),
            report: FilterReport {
                retained: total,
                rejected: 0,
                fallback: true,
            },
        };
    }

    let rejected = total - kept.len();
    if rejected > 0 {
        tracing::debug!(rejected, total, threshold, "anomaly filter dropped samples");
    }
    FilterOutcome {
        report: FilterReport {
            retained: kept.len(),
            rejected,
            fallback: false,
        },
        retained: kept,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(first_closes: &[f64]) -> SampleSet {
        let paths = first_closes
            .iter()
            .map(|&c| PricePath::from_closes(&[c, c]))
            .collect();
        SampleSet::new(100.0, 2, paths, 0)
    }

    #[test]
    fn drops_samples_beyond_threshold() {
        let samples = set(&[101.0, 99.0, 100.5, 112.0, 98.0]);
        let outcome = filter_outliers(&samples, 0.05);
        assert_eq!(outcome.retained.len(), 4);
        assert_eq!(outcome.report.rejected, 1);
        assert!(!outcome.report.fallback);
    }

    #[test]
    fn threshold_is_inclusive() {
        let samples = set(&[105.0, 95.0]);
        let outcome = filter_outliers(&samples, 0.05 + 1e-12);
        assert_eq!(outcome.retained.len(), 2);
    }

    #[test]
    fn falls_back_when_fewer_than_half_survive() {
        // ceil(5 / 2) = 3 needed, only 2 survive
        let samples = set(&[101.0, 99.0, 120.0, 80.0, 130.0]);
        let outcome = filter_outliers(&samples, 0.05);
        assert!(outcome.report.fallback);
        assert_eq!(outcome.retained.len(), 5);
        assert_eq!(outcome.report.rejected, 0);
    }

    #[test]
    fn exactly_half_rounded_up_is_enough() {
        // ceil(4 / 2) = 2 survive
        let samples = set(&[101.0, 99.0, 120.0, 80.0]);
        let outcome = filter_outliers(&samples, 0.05);
        assert!(!outcome.report.fallback);
        assert_eq!(outcome.retained.len(), 2);
    }

    #[test]
    fn single_outlier_sample_is_kept_by_fallback() {
        let samples = set(&[150.0]);
        let outcome = filter_outliers(&samples, 0.05);
        assert!(outcome.report.fallback);
        assert_eq!(outcome.retained.len(), 1);
    }
}
