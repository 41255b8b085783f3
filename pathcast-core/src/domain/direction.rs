//! Direction records and their rolling summary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sign of a return: -1, 0 or +1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Sign {
    Down,
    Flat,
    Up,
}

impl Sign {
    /// Sign of `value`; zero and NaN are flat.
    pub fn of(value: f64) -> Self {
        if value > 0.0 {
            Sign::Up
        } else if value < 0.0 {
            Sign::Down
        } else {
            Sign::Flat
        }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            Sign::Down => -1,
            Sign::Flat => 0,
            Sign::Up => 1,
        }
    }
}

impl From<Sign> for i8 {
    fn from(sign: Sign) -> Self {
        sign.as_i8()
    }
}

impl TryFrom<i8> for Sign {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Sign::Down),
            0 => Ok(Sign::Flat),
            1 => Ok(Sign::Up),
            other => Err(format!("invalid sign {other}")),
        }
    }
}

/// Outcome of one (origin, horizon) evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionRecord {
    /// Index of the origin bar in the historical series.
    pub origin: usize,
    pub horizon: usize,
    pub origin_close: f64,
    /// Calibrated forecast close at step `horizon - 1`.
    pub predicted_close: f64,
    pub predicted_return: f64,
    pub realized_close: f64,
    pub realized_return: f64,
    pub predicted_sign: Sign,
    pub realized_sign: Sign,
}

impl DirectionRecord {
    pub fn new(
        origin: usize,
        horizon: usize,
        origin_close: f64,
        predicted_close: f64,
        realized_close: f64,
    ) -> Self {
        let predicted_return = (predicted_close - origin_close) / origin_close;
        let realized_return = (realized_close - origin_close) / origin_close;
        Self {
            origin,
            horizon,
            origin_close,
            predicted_close,
            predicted_return,
            realized_close,
            realized_return,
            predicted_sign: Sign::of(predicted_close - origin_close),
            realized_sign: Sign::of(realized_return),
        }
    }

    pub fn is_hit(&self) -> bool {
        self.predicted_sign == self.realized_sign
    }

    /// Whether the realized move is large enough for the filtered statistics.
    pub fn passes_eps(&self, eps: f64) -> bool {
        self.realized_return.abs() >= eps
    }
}

/// Raw and eps-filtered hit counts for one horizon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorizonStats {
    pub horizon: usize,
    pub total: usize,
    pub hits: usize,
    pub total_filtered: usize,
    pub hits_filtered: usize,
}

impl HorizonStats {
    pub fn new(horizon: usize) -> Self {
        Self {
            horizon,
            ..Self::default()
        }
    }

    pub fn record(&mut self, record: &DirectionRecord, eps: f64) {
        let hit = record.is_hit();
        self.total += 1;
        self.hits += usize::from(hit);
        if record.passes_eps(eps) {
            self.total_filtered += 1;
            self.hits_filtered += usize::from(hit);
        }
    }

    /// `hits / total`, or `None` with no records.
    pub fn accuracy(&self) -> Option<f64> {
        ratio(self.hits, self.total)
    }

    /// `hits_filtered / total_filtered`, or `None` with no filtered records.
    pub fn accuracy_filtered(&self) -> Option<f64> {
        ratio(self.hits_filtered, self.total_filtered)
    }
}

fn ratio(num: usize, den: usize) -> Option<f64> {
    (den > 0).then(|| num as f64 / den as f64)
}

/// Per-horizon aggregate of a direction record log.
///
/// Derived data: [`RollingSummary::from_records`] rebuilds it from the log at
/// any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingSummary {
    pub eps: f64,
    horizons: BTreeMap<usize, HorizonStats>,
}

impl RollingSummary {
    /// Empty summary with a row for every configured horizon.
    pub fn new(horizons: &[usize], eps: f64) -> Self {
        Self {
            eps,
            horizons: horizons.iter().map(|&h| (h, HorizonStats::new(h))).collect(),
        }
    }

    pub fn from_records(horizons: &[usize], eps: f64, records: &[DirectionRecord]) -> Self {
        let mut summary = Self::new(horizons, eps);
        for record in records {
            summary.push(record);
        }
        summary
    }

    pub fn push(&mut self, record: &DirectionRecord) {
        let eps = self.eps;
        self.horizons
            .entry(record.horizon)
            .or_insert_with(|| HorizonStats::new(record.horizon))
            .record(record, eps);
    }

    pub fn get(&self, horizon: usize) -> Option<&HorizonStats> {
        self.horizons.get(&horizon)
    }

    /// Rows in ascending horizon order.
    pub fn rows(&self) -> impl Iterator<Item = &HorizonStats> {
        self.horizons.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_of_values() {
        assert_eq!(Sign::of(0.2), Sign::Up);
        assert_eq!(Sign::of(-0.2), Sign::Down);
        assert_eq!(Sign::of(0.0), Sign::Flat);
        assert_eq!(Sign::of(f64::NAN), Sign::Flat);
    }

    #[test]
    fn sign_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Sign::Down).unwrap(), "-1");
        let back: Sign = serde_json::from_str("1").unwrap();
        assert_eq!(back, Sign::Up);
        assert!(serde_json::from_str::<Sign>("2").is_err());
    }

    #[test]
    fn record_computes_returns_and_signs() {
        let r = DirectionRecord::new(10, 5, 100.0, 102.0, 97.0);
        assert!((r.predicted_return - 0.02).abs() < 1e-12);
        assert!((r.realized_return + 0.03).abs() < 1e-12);
        assert_eq!(r.predicted_sign, Sign::Up);
        assert_eq!(r.realized_sign, Sign::Down);
        assert!(!r.is_hit());
    }

    #[test]
    fn micro_move_counts_raw_only() {
        let mut stats = HorizonStats::new(5);
        let r = DirectionRecord::new(0, 5, 100.0, 101.0, 100.3);
        stats.record(&r, 0.005);
        assert_eq!(stats.total, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.total_filtered, 0);
        assert_eq!(stats.hits_filtered, 0);
        assert_eq!(stats.accuracy(), Some(1.0));
        assert_eq!(stats.accuracy_filtered(), None);
    }

    #[test]
    fn summary_keeps_empty_horizons() {
        let summary = RollingSummary::from_records(&[1, 5, 10], 0.005, &[]);
        let horizons: Vec<usize> = summary.rows().map(|s| s.horizon).collect();
        assert_eq!(horizons, vec![1, 5, 10]);
        assert!(summary.rows().all(|s| s.total == 0));
    }
}
