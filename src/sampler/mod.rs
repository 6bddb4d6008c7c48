//! Support Sampler
//!
//! Draws single-sample national vote-share vectors from per-party
//! percentile-spread series (independent uniform percentile draws,
//! renormalized to 100) and derives a TPP percentile series via repeated
//! sampling with randomized per-party preference flows.
//!
//! TPP-series generation is embarrassingly parallel across days: the day
//! range is statically partitioned over a fixed worker pool, each worker
//! owns an independent RNG stream and writes only to its own output slice,
//! and the join after all workers finish is the only synchronization.

pub mod support;
pub mod tpp;

pub use support::sample_shares;
pub use tpp::{tpp_percentile_series, TppSeriesInputs};
