//! Bar loading for the runner.
//!
//! Reads already-cleaned daily OHLCV from CSV (`date, open, high, low, close,
//! volume`) and windows it by [`Period`]. Fallback policy:
//! 1. If `{symbol}.csv` exists under the data source → use it
//! 2. If not and `synthetic` is set → generate a seeded random walk (tagged)
//! 3. Otherwise → fail with a clear error
//!
//! Synthetic data is a developer-only mode; reports built on it say so.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pathcast_core::Bar;

use crate::config::Period;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no bar data for '{symbol}' at {path} (use --synthetic for synthetic data)")]
    NotFound { symbol: String, path: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },

    #[error("no bars for '{symbol}' inside period {period}")]
    Empty { symbol: String, period: String },
}

/// Where a series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Csv,
    Synthetic,
}

/// Options controlling how bars are loaded.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// A CSV file, or a directory holding `{symbol}.csv`.
    pub data_path: Option<PathBuf>,
    pub period: Period,
    /// Generate synthetic bars when no file is found.
    pub synthetic: bool,
    /// Last date for synthetic series; defaults to today.
    pub end: Option<NaiveDate>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            data_path: None,
            period: Period::default(),
            synthetic: false,
            end: None,
        }
    }
}

/// Daily bars of one instrument, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct BarSeries {
    pub symbol: String,
    pub dates: Vec<NaiveDate>,
    pub bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(symbol: impl Into<String>, dates: Vec<NaiveDate>, bars: Vec<Bar>) -> Self {
        debug_assert_eq!(dates.len(), bars.len());
        Self {
            symbol: symbol.into(),
            dates,
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        self.dates.get(index).copied()
    }

    /// Keep only bars inside `period`, counted back from the last date.
    pub fn windowed(mut self, period: Period) -> Self {
        let start = match (self.dates.last(), period) {
            (Some(&end), p) => p.start_from(end),
            (None, _) => None,
        };
        if let Some(start) = start {
            let first = self.dates.partition_point(|d| *d < start);
            self.dates.drain(..first);
            self.bars.drain(..first);
        }
        self
    }
}

/// Result of loading bars, including provenance.
#[derive(Debug, Clone)]
pub struct LoadedSeries {
    pub series: BarSeries,
    pub source: DataSource,
    /// Dataset hash for fingerprinting (BLAKE3 over all bar data).
    pub dataset_hash: String,
}

impl LoadedSeries {
    pub fn has_synthetic(&self) -> bool {
        self.source == DataSource::Synthetic
    }

    /// Wrap in-memory bars (tests, embedding callers).
    pub fn from_series(series: BarSeries, source: DataSource) -> Self {
        let dataset_hash = compute_dataset_hash(&series);
        Self {
            series,
            source,
            dataset_hash,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Load bars for `symbol`, falling back to synthetic data if allowed.
pub fn load_series(symbol: &str, opts: &LoadOptions) -> Result<LoadedSeries, LoadError> {
    let path = resolve_path(symbol, opts.data_path.as_deref());

    let (series, source) = match path.as_deref().filter(|p| p.is_file()) {
        Some(file) => {
            let handle = std::fs::File::open(file).map_err(|source| LoadError::Io {
                path: file.display().to_string(),
                source,
            })?;
            let (dates, bars) = read_csv_bars(handle)?;
            tracing::debug!(symbol, path = %file.display(), bars = bars.len(), "loaded CSV bars");
            (BarSeries::new(symbol, dates, bars), DataSource::Csv)
        }
        None if opts.synthetic => {
            tracing::warn!(symbol, "generating synthetic data; results will be tagged as synthetic");
            let end = opts
                .end
                .unwrap_or_else(|| chrono::Local::now().date_naive());
            let start = opts
                .period
                .start_from(end)
                .or_else(|| Period::FiveYears.start_from(end))
                .unwrap_or(end);
            let (dates, bars) = generate_synthetic_bars(symbol, start, end);
            (BarSeries::new(symbol, dates, bars), DataSource::Synthetic)
        }
        None => {
            return Err(LoadError::NotFound {
                symbol: symbol.to_string(),
                path: path
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<no data path>".into()),
            })
        }
    };

    let series = series.windowed(opts.period);
    if series.is_empty() {
        return Err(LoadError::Empty {
            symbol: symbol.to_string(),
            period: opts.period.label().to_string(),
        });
    }
    Ok(LoadedSeries::from_series(series, source))
}

fn resolve_path(symbol: &str, data_path: Option<&Path>) -> Option<PathBuf> {
    let base = data_path?;
    if base.is_dir() {
        Some(base.join(format!("{symbol}.csv")))
    } else {
        Some(base.to_path_buf())
    }
}

/// Parse `date, open, high, low, close, volume` rows, sorted by date.
///
/// Rows with non-finite or non-positive prices are rejected; duplicate dates
/// keep the first row.
pub fn read_csv_bars<R: Read>(reader: R) -> Result<(Vec<NaiveDate>, Vec<Bar>), LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows: Vec<(NaiveDate, Bar)> = Vec::new();

    for (i, record) in rdr.deserialize::<CsvRow>().enumerate() {
        let row = record?;
        let bar = Bar::new(row.open, row.high, row.low, row.close, row.volume);
        if bar.is_void() || bar.close <= 0.0 || bar.low < 0.0 || bar.volume < 0.0 {
            return Err(LoadError::InvalidRow {
                row: i + 1,
                reason: format!("unusable values {bar:?}"),
            });
        }
        rows.push((row.date, bar));
    }

    rows.sort_by_key(|(date, _)| *date);
    rows.dedup_by_key(|(date, _)| *date);
    Ok(rows.into_iter().unzip())
}

/// Compute a deterministic BLAKE3 hash over the series.
fn compute_dataset_hash(series: &BarSeries) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(series.symbol.as_bytes());
    for (date, bar) in series.dates.iter().zip(&series.bars) {
        hasher.update(date.to_string().as_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Weekday random walk from 100.0, seeded by the symbol name.
fn generate_synthetic_bars(
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> (Vec<NaiveDate>, Vec<Bar>) {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut dates = Vec::new();
    let mut bars = Vec::new();
    let mut price = 100.0_f64;
    let mut current = start;

    while current <= end {
        let weekday = current.weekday();
        if weekday == chrono::Weekday::Sat || weekday == chrono::Weekday::Sun {
            current += chrono::Duration::days(1);
            continue;
        }

        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000.0..5_000_000.0_f64).round();

        dates.push(current);
        bars.push(Bar::new(open, high, low, close, volume));

        price = close;
        current += chrono::Duration::days(1);
    }

    (dates, bars)
}
