//! Trend Aggregator
//!
//! Fuses noisy, house-biased polls into a smoothed daily TPP trend plus
//! per-pollster daily house-effect series via iterative joint optimization:
//! 1. Seed trend and house effects by linear interpolation
//! 2. Alternate house-effect re-estimation (with zero-sum calibration) and
//!    a damped per-day offset search against a poll-likelihood +
//!    cubic-smoothness score
//! 3. Derive a time-decayed final standard deviation for the endpoint
//!
//! The aggregator is deterministic: identical inputs produce byte-identical
//! output. It is strictly sequential across iterations; each sweep depends
//! on the previous one.

pub mod aggregator;
pub mod timepoint;

pub use aggregator::{TrendAggregator, TrendInputs, TrendRun};
pub use timepoint::{DayGrid, TimePoint};
