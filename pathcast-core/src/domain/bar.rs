//! Bar — the fundamental price unit for both history and forecasts.

use serde::{Deserialize, Serialize};

/// OHLCV bar for one step of a price series.
///
/// History bars arrive already cleaned from the data layer. Forecast bars are
/// produced by the OHLC reconstructor and must satisfy [`Bar::is_ordered`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// A flat bar where every price equals `price`.
    pub fn flat(price: f64, volume: f64) -> Self {
        Self::new(price, price, price, price, volume)
    }

    /// Returns true if any field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite())
    }

    /// `low <= min(open, close) <= max(open, close) <= high`.
    pub fn is_ordered(&self) -> bool {
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        self.low <= body_low && body_low <= body_high && body_high <= self.high
    }

    /// Ordered, finite and non-negative.
    pub fn is_sane(&self) -> bool {
        !self.is_void()
            && self.is_ordered()
            && self.low >= 0.0
            && self.volume >= 0.0
    }

    /// Intraday range as a fraction of the open.
    pub fn range_pct(&self) -> f64 {
        if self.open > 0.0 {
            (self.high - self.low) / self.open
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> Bar {
        Bar::new(100.0, 105.0, 98.0, 103.0, 50_000.0)
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.open = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_broken_ordering() {
        let mut bar = sample_bar();
        bar.high = 102.0; // below close
        assert!(!bar.is_ordered());
        assert!(!bar.is_sane());
    }

    #[test]
    fn negative_low_is_not_sane() {
        let bar = Bar::new(0.5, 1.0, -0.1, 0.6, 10.0);
        assert!(bar.is_ordered());
        assert!(!bar.is_sane());
    }

    #[test]
    fn flat_bar_is_ordered() {
        assert!(Bar::flat(7.08, 0.0).is_sane());
    }

    #[test]
    fn range_pct_uses_open() {
        let bar = Bar::new(100.0, 104.0, 99.0, 101.0, 0.0);
        assert!((bar.range_pct() - 0.05).abs() < 1e-12);
    }
}
