//! Multi-seat two-party-preferred election forecaster
//!
//! Pipeline stages, in order:
//! - Poll store: validated, date-ordered poll observations
//! - Trend Aggregator: joint trend / house-effect estimation
//! - Forward Projector: stochastic extension to the election date
//! - Support Sampler: per-party shares into a TPP percentile series
//! - Simulation Engine: seat-by-seat Monte Carlo over the projection
//!
//! Every stochastic stage takes an explicit seed and derives a private
//! RNG stream per parallel task; a whole run is reproducible from one
//! scenario plus one seed. Long-running stages take a cancellation token
//! and abort with an error rather than partial output.

pub mod cancel;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod polls;
pub mod projection;
pub mod sampler;
pub mod sim;
pub mod stats;
pub mod testing;
pub mod trend;
pub mod types;

pub use cancel::CancelToken;
pub use config::ForecastConfig;
pub use error::{ForecastError, Result};
pub use pipeline::{run_forecast, Scenario};
pub use sim::AggregateReport;
