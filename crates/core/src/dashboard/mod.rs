//! Indicator aggregation: run the fetchers, score what came back, produce one record.

pub mod collector;
pub mod scoring;

pub use collector::compute_dashboard;
pub use scoring::{build_record, RawReadings};
