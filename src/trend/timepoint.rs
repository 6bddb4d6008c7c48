//! Day grid and per-day working state

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;

/// Inclusive calendar-day grid `[start, end]`.
///
/// The grid length is fixed at construction and never changes; every
/// per-day array in the aggregator is sized to `len()` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayGrid {
    start: NaiveDate,
    end: NaiveDate,
    len: usize,
}

impl DayGrid {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let days = (end - start).num_days();
        if days < 0 {
            return Err(ForecastError::EmptyDayRange { start, end });
        }
        Ok(Self {
            start,
            end,
            len: days as usize + 1,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Always `(end - start).days + 1`; a 1-day range has length 1.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        if date < self.start || date > self.end {
            return None;
        }
        Some((date - self.start).num_days() as usize)
    }

    pub fn date_of(&self, index: usize) -> Option<NaiveDate> {
        if index >= self.len {
            return None;
        }
        Some(self.start + chrono::Duration::days(index as i64))
    }
}

/// Working state for one calendar day of the aggregation run.
#[derive(Debug, Clone, Default)]
pub struct TimePoint {
    /// Indices into the run's poll list for polls published this day
    pub polls: Vec<usize>,
    /// Current smoothed trend value
    pub trend: f64,
    /// Known election result; pinned, never perturbed by the sweep
    pub anchor: Option<f64>,
    /// Trend may break between this day and the previous one
    pub discontinuity: bool,
    /// Last computed local error score (diagnostic)
    pub error_score: f64,
}
