//! Small statistics helpers over `f64` slices.

use crate::domain::Bar;

/// Percentile of a sorted slice using linear interpolation between closest
/// ranks. `p` is in `[0, 100]`.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    if frac == 0.0 {
        return sorted[lo];
    }
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Sorted copy of `values` (NaNs compare equal, so they stay in place).
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    out
}

pub fn percentile(values: &[f64], p: f64) -> f64 {
    percentile_sorted(&sorted(values), p)
}

pub fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by `n`).
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Sample standard deviation (divides by `n - 1`); 0.0 for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Close-to-close simple returns. Pairs with a non-positive previous close are skipped.
pub fn close_returns(bars: &[Bar]) -> Vec<f64> {
    bars.windows(2)
        .filter(|w| w[0].close > 0.0)
        .map(|w| (w[1].close - w[0].close) / w[0].close)
        .collect()
}

/// Standard deviation of the last `window` close-to-close returns.
pub fn trailing_volatility(bars: &[Bar], window: usize) -> f64 {
    let returns = close_returns(bars);
    let start = returns.len().saturating_sub(window);
    let vol = sample_std(&returns[start..]);
    if vol.is_finite() {
        vol
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_odd_set() {
        assert_eq!(median(&[7.05, 7.12, 7.01, 6.95, 6.22]), 7.01);
    }

    #[test]
    fn median_of_even_set_interpolates() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
    }

    #[test]
    fn quartiles_interpolate_linearly() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 25.0), 2.0);
        assert_eq!(percentile(&values, 75.0), 4.0);
        // rank 0.75 of [10, 20]
        assert!((percentile(&[10.0, 20.0], 75.0) - 17.5).abs() < 1e-12);
    }

    #[test]
    fn single_value_is_every_percentile() {
        assert_eq!(percentile(&[3.3], 25.0), 3.3);
        assert_eq!(percentile(&[3.3], 75.0), 3.3);
        assert_eq!(mean(&[3.3]), 3.3);
        assert_eq!(population_std(&[3.3]), 0.0);
    }

    #[test]
    fn empty_inputs_are_nan() {
        assert!(median(&[]).is_nan());
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn trailing_volatility_uses_window() {
        let bars: Vec<Bar> = [100.0, 110.0, 99.0, 99.0, 99.0, 99.0]
            .iter()
            .map(|&c| Bar::flat(c, 0.0))
            .collect();
        assert_eq!(trailing_volatility(&bars, 3), 0.0);
        assert!(trailing_volatility(&bars, 5) > 0.0);
    }

    #[test]
    fn trailing_volatility_short_history_is_zero() {
        assert_eq!(trailing_volatility(&[Bar::flat(1.0, 0.0)], 20), 0.0);
    }
}
