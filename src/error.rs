//! Error types for the forecasting pipeline
//!
//! Configuration errors are fatal and reported before any Monte Carlo work
//! starts. Data sparsity (zero-poll pollsters, seats without live data) is
//! not an error; each case has a documented fallback in its own module.

use chrono::NaiveDate;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ForecastError>;

#[derive(Debug, Error)]
pub enum ForecastError {
    /// Day range is empty or inverted
    #[error("empty day range: {start} to {end}")]
    EmptyDayRange { start: NaiveDate, end: NaiveDate },

    /// Forward projection produced no days; downstream stages must not run
    #[error("projection is empty: target date {target} is not after trend horizon {horizon}")]
    EmptyProjection { horizon: NaiveDate, target: NaiveDate },

    /// Poll references a pollster id outside the supplied list
    #[error("unknown pollster id {0}")]
    UnknownPollster(usize),

    /// Reference to a party id outside the supplied list
    #[error("unknown party id {0}")]
    UnknownParty(usize),

    /// Seat references a region id outside the supplied list
    #[error("unknown region id {0}")]
    UnknownRegion(usize),

    /// A vote share outside [0, 100]
    #[error("invalid vote share {share} for {context}")]
    InvalidShare { share: f64, context: String },

    /// Seat definition with incumbent == challenger
    #[error("degenerate seat {0:?}: incumbent and challenger are the same party")]
    DegenerateSeat(String),

    /// Betting odds must be strictly greater than 1.0
    #[error("invalid betting odds {odds} for seat {seat}")]
    InvalidOdds { odds: String, seat: String },

    /// A percentile series required by a stage is missing or empty
    #[error("missing percentile series: {0}")]
    MissingSeries(String),

    /// A numeric precondition failed (zero-variance division, empty sample)
    #[error("numeric degeneracy: {0}")]
    Numeric(String),

    /// The run was cancelled via its CancelToken
    #[error("run cancelled")]
    Cancelled,
}
