//! Aggregator — reduce retained samples to one central path plus bands.

use crate::domain::{Bar, DispersionBands, PricePath};
use crate::policy::CentralTendency;
use crate::stats::{mean, median, percentile_sorted, population_std, sorted};

/// Central path and per-step dispersion of sample closes.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedPath {
    /// Every OHLCV field reduced by the tendency policy, step by step.
    pub central: PricePath,
    pub bands: DispersionBands,
}

impl AggregatedPath {
    pub fn central_closes(&self) -> Vec<f64> {
        self.central.closes()
    }
}

fn reduce(values: &[f64], tendency: CentralTendency) -> f64 {
    match tendency {
        CentralTendency::Median => median(values),
        CentralTendency::Mean => mean(values),
    }
}

/// Reduce `paths` step by step. All paths must share one horizon.
///
/// With a single path the central path is that path, bar for bar.
pub fn aggregate(paths: &[&PricePath], tendency: CentralTendency) -> AggregatedPath {
    let horizon = paths.first().map(|p| p.len()).unwrap_or(0);
    debug_assert!(paths.iter().all(|p| p.len() == horizon));

    let mut central = Vec::with_capacity(horizon);
    let mut bands = DispersionBands {
        lower: Vec::with_capacity(horizon),
        upper: Vec::with_capacity(horizon),
        min: Vec::with_capacity(horizon),
        max: Vec::with_capacity(horizon),
        std: Vec::with_capacity(horizon),
    };

    let column = |t: usize, field: fn(&Bar) -> f64| -> Vec<f64> {
        paths.iter().map(|p| field(&p.bars()[t])).collect()
    };

    for t in 0..horizon {
        let closes = column(t, |b: &Bar| b.close);
        central.push(Bar::new(
            reduce(&column(t, |b: &Bar| b.open), tendency),
            reduce(&column(t, |b: &Bar| b.high), tendency),
            reduce(&column(t, |b: &Bar| b.low), tendency),
            reduce(&closes, tendency),
            reduce(&column(t, |b: &Bar| b.volume), tendency),
        ));

        let sorted_closes = sorted(&closes);
        bands.lower.push(percentile_sorted(&sorted_closes, 25.0));
        bands.upper.push(percentile_sorted(&sorted_closes, 75.0));
        bands.min.push(sorted_closes[0]);
        bands.max.push(sorted_closes[sorted_closes.len() - 1]);
        bands.std.push(population_std(&closes));
    }

    AggregatedPath {
        central: PricePath::new(central),
        bands,
    }
}

/// Widen collapsed bands so uncertainty still grows with the horizon.
///
/// A step whose `upper - lower` is below `central * min_width_pct` gets a
/// symmetric half-width of `central * max(v * sqrt(t + 1) * 0.8, 0.015 + 0.005 * t)`.
pub fn widen_bands(
    bands: &mut DispersionBands,
    central_closes: &[f64],
    volatility: f64,
    min_width_pct: f64,
) -> usize {
    let mut widened = 0;
    for (t, &center) in central_closes.iter().enumerate() {
        if bands.upper[t] - bands.lower[t] >= center * min_width_pct {
            continue;
        }
        let time_scaled = volatility * ((t + 1) as f64).sqrt() * 0.8;
        let floor = 0.015 + 0.005 * t as f64;
        let half_width = center * time_scaled.max(floor);
        bands.upper[t] = center + half_width;
        bands.lower[t] = center - half_width;
        bands.std[t] = half_width / 1.5;
        widened += 1;
    }
    widened
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths_with_first_closes(closes: &[f64]) -> Vec<PricePath> {
        closes
            .iter()
            .map(|&c| PricePath::from_closes(&[c, c * 1.01]))
            .collect()
    }

    #[test]
    fn median_ignores_single_extreme_sample() {
        let paths = paths_with_first_closes(&[7.05, 7.12, 7.01, 6.95, 6.22]);
        let refs: Vec<&PricePath> = paths.iter().collect();

        let median = aggregate(&refs, CentralTendency::Median);
        let mean = aggregate(&refs, CentralTendency::Mean);

        assert_eq!(median.central_closes()[0], 7.01);
        assert!((mean.central_closes()[0] - 6.87).abs() < 1e-9);
        // The median stays closer to the last close of 7.08.
        assert!((median.central_closes()[0] - 7.08).abs() < (mean.central_closes()[0] - 7.08).abs());
    }

    #[test]
    fn single_path_is_identity() {
        let path = PricePath::new(vec![
            Bar::new(10.0, 10.5, 9.8, 10.2, 1_000.0),
            Bar::new(10.2, 10.9, 10.1, 10.7, 1_200.0),
        ]);
        for tendency in [CentralTendency::Median, CentralTendency::Mean] {
            let agg = aggregate(&[&path], tendency);
            assert_eq!(agg.central, path);
            assert_eq!(agg.bands.lower, path.closes());
            assert_eq!(agg.bands.upper, path.closes());
        }
    }

    #[test]
    fn bands_are_quartiles() {
        let paths = paths_with_first_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let refs: Vec<&PricePath> = paths.iter().collect();
        let agg = aggregate(&refs, CentralTendency::Median);
        assert_eq!(agg.bands.lower[0], 2.0);
        assert_eq!(agg.bands.upper[0], 4.0);
        assert_eq!(agg.bands.min[0], 1.0);
        assert_eq!(agg.bands.max[0], 5.0);
    }

    #[test]
    fn widen_bands_grows_with_step() {
        let path = PricePath::from_closes(&[100.0, 100.0, 100.0]);
        let mut agg = aggregate(&[&path], CentralTendency::Median);
        let closes = agg.central_closes();
        let widened = widen_bands(&mut agg.bands, &closes, 0.0, 0.01);
        assert_eq!(widened, 3);
        let widths: Vec<f64> = (0..3).map(|t| agg.bands.upper[t] - agg.bands.lower[t]).collect();
        assert!((widths[0] - 3.0).abs() < 1e-9);
        assert!(widths[1] > widths[0] && widths[2] > widths[1]);
    }

    #[test]
    fn wide_bands_untouched() {
        let paths = paths_with_first_closes(&[90.0, 100.0, 110.0]);
        let refs: Vec<&PricePath> = paths.iter().collect();
        let mut agg = aggregate(&refs, CentralTendency::Median);
        let before = agg.bands.clone();
        let closes = agg.central_closes();
        let widened = widen_bands(&mut agg.bands, &closes, 0.02, 0.01);
        assert_eq!(widened, 0);
        assert_eq!(agg.bands, before);
    }
}
