//! Poll Store
//!
//! Ordered, dated poll observations per pollster with per-party primary
//! shares and a derived two-party-preferred figure. Records are immutable
//! after ingestion; the Trend Aggregator references them, never owns them.

pub mod store;

pub use store::{PollRecord, PollStore, Pollster, PollsterList};
