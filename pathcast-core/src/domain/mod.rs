//! Domain types shared by the pipeline and the backtest harness.

pub mod bar;
pub mod direction;
pub mod forecast;
pub mod path;

pub use bar::Bar;
pub use direction::{DirectionRecord, HorizonStats, RollingSummary, Sign};
pub use forecast::{
    CalibratedForecast, CalibrationReport, DispersionBands, FilterReport, ForecastSummary, Trend,
};
pub use path::{PricePath, SampleSet};
