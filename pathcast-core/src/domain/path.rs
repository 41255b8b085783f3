//! Price paths and sample sets.

use serde::{Deserialize, Serialize};

use super::Bar;

/// One forecast path: an ordered sequence of bars, one per horizon step.
///
/// Immutable once built; the bars are only reachable through read accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePath {
    bars: Vec<Bar>,
}

impl PricePath {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars }
    }

    /// Path built from closes only; every bar is flat with zero volume.
    pub fn from_closes(closes: &[f64]) -> Self {
        Self::new(closes.iter().map(|&c| Bar::flat(c, 0.0)).collect())
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Number of steps (the horizon this path covers).
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Relative gap between the first close and `anchor`.
    pub fn first_step_gap(&self, anchor: f64) -> Option<f64> {
        self.first().map(|b| (b.close - anchor) / anchor)
    }
}

/// `N` sample paths sharing one origin close and one horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSet {
    origin_close: f64,
    horizon: usize,
    paths: Vec<PricePath>,
    failed: usize,
}

impl SampleSet {
    /// Build a sample set. Paths whose length differs from `horizon` are a
    /// caller bug; the builder rejects them before they get here.
    pub fn new(origin_close: f64, horizon: usize, paths: Vec<PricePath>, failed: usize) -> Self {
        debug_assert!(paths.iter().all(|p| p.len() == horizon));
        Self {
            origin_close,
            horizon,
            paths,
            failed,
        }
    }

    pub fn origin_close(&self) -> f64 {
        self.origin_close
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn paths(&self) -> &[PricePath] {
        &self.paths
    }

    /// Number of sampler calls that failed while building this set.
    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_closes_builds_flat_bars() {
        let path = PricePath::from_closes(&[7.05, 7.10]);
        assert_eq!(path.len(), 2);
        assert_eq!(path.closes(), vec![7.05, 7.10]);
        assert!(path.bars().iter().all(|b| b.is_sane()));
    }

    #[test]
    fn first_step_gap_is_relative() {
        let path = PricePath::from_closes(&[6.67, 6.70]);
        let gap = path.first_step_gap(7.08).unwrap();
        assert!((gap - (-0.0579)).abs() < 1e-3);
    }

    #[test]
    fn empty_path_has_no_gap() {
        assert!(PricePath::new(vec![]).first_step_gap(1.0).is_none());
    }
}
