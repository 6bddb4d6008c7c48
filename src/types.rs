//! Core shared types
//!
//! Collections own their elements; cross-references are opaque index ids
//! resolved through the owning list (arena + index). Nothing here holds a
//! reference that can outlive a collection mutation.

use crate::error::{ForecastError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

macro_rules! index_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

index_id!(
    /// Index into a [`PartyList`]
    PartyId
);
index_id!(
    /// Index into a `PollsterList`
    PollsterId
);
index_id!(
    /// Index into a `RegionList`
    RegionId
);
index_id!(
    /// Index into a `SeatList`
    SeatId
);

/// How a minor party's preferences flow to the first major party.
///
/// `rate` is the mean percentage of this party's primary vote that reaches
/// the first major after distribution; `deviation` and `samples` parameterize
/// a location-scale Student-t draw per simulation sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PreferenceFlow {
    pub rate: f64,
    pub deviation: f64,
    /// Historical elections backing the estimate; df = max(1, samples - 1).
    pub samples: u32,
}

impl Default for PreferenceFlow {
    fn default() -> Self {
        Self {
            rate: 50.0,
            deviation: 3.0,
            samples: 5,
        }
    }
}

/// A contesting party.
///
/// By convention party 0 and party 1 are the two majors and every TPP figure
/// in the pipeline is expressed for party 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub code: String,
    pub name: String,
    /// Minor party whose seat wins are folded into a major's tally.
    pub counts_as: Option<PartyId>,
    pub preference_flow: PreferenceFlow,
}

impl Party {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            counts_as: None,
            preference_flow: PreferenceFlow::default(),
        }
    }

    pub fn counts_as(mut self, major: PartyId) -> Self {
        self.counts_as = Some(major);
        self
    }

    pub fn with_flow(mut self, rate: f64, deviation: f64, samples: u32) -> Self {
        self.preference_flow = PreferenceFlow {
            rate,
            deviation,
            samples,
        };
        self
    }
}

/// Owning list of parties; ids are indices into this list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartyList {
    parties: Vec<Party>,
}

impl PartyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, party: Party) -> PartyId {
        self.parties.push(party);
        PartyId(self.parties.len() - 1)
    }

    pub fn get(&self, id: PartyId) -> Result<&Party> {
        self.parties
            .get(id.index())
            .ok_or(ForecastError::UnknownParty(id.index()))
    }

    pub fn len(&self) -> usize {
        self.parties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PartyId, &Party)> {
        self.parties.iter().enumerate().map(|(i, p)| (PartyId(i), p))
    }

    /// Resolve a party to the major it counts as (itself if already major).
    pub fn fold_to_major(&self, id: PartyId) -> PartyId {
        self.parties
            .get(id.index())
            .and_then(|p| p.counts_as)
            .unwrap_or(id)
    }

    /// First major party; TPP figures are expressed for this party.
    pub fn major_one(&self) -> PartyId {
        PartyId(0)
    }

    pub fn major_two(&self) -> PartyId {
        PartyId(1)
    }
}

/// Bookmaker decimal odds for the seat's contestants.
///
/// Quotes are ingested exactly as `Decimal` and converted to `f64` only
/// inside probability math. All quotes must be strictly above 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsTriple {
    pub incumbent: Decimal,
    pub challenger: Decimal,
    pub challenger2: Option<Decimal>,
}

impl OddsTriple {
    pub fn new(incumbent: Decimal, challenger: Decimal, challenger2: Option<Decimal>) -> Self {
        Self {
            incumbent,
            challenger,
            challenger2,
        }
    }

    pub fn validate(&self, seat_name: &str) -> Result<()> {
        for odds in [Some(self.incumbent), Some(self.challenger), self.challenger2]
            .into_iter()
            .flatten()
        {
            if odds <= Decimal::ONE {
                return Err(ForecastError::InvalidOdds {
                    odds: odds.to_string(),
                    seat: seat_name.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn incumbent_f64(&self) -> f64 {
        decimal_odds_to_f64(self.incumbent)
    }

    pub fn challenger_f64(&self) -> f64 {
        decimal_odds_to_f64(self.challenger)
    }

    pub fn challenger2_f64(&self) -> Option<f64> {
        self.challenger2.map(decimal_odds_to_f64)
    }
}

fn decimal_odds_to_f64(odds: Decimal) -> f64 {
    // Validation guarantees odds > 1; the fallback never fires on valid data.
    odds.to_f64().unwrap_or(f64::MAX)
}

/// A day-indexed series of values at fixed percentile levels.
///
/// `levels` are ascending percentiles in (0, 100); each day holds one value
/// per level. Sampling a day draws a uniform percentile and linearly
/// interpolates between the bracketing level curves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentileSeries {
    levels: Vec<f64>,
    rows: Vec<Vec<f64>>,
}

impl PercentileSeries {
    pub fn new(levels: Vec<f64>) -> Result<Self> {
        if levels.is_empty() {
            return Err(ForecastError::MissingSeries("no percentile levels".into()));
        }
        if levels.iter().any(|&l| l <= 0.0 || l >= 100.0)
            || levels.windows(2).any(|w| w[0] >= w[1])
        {
            return Err(ForecastError::Numeric(
                "percentile levels must be strictly ascending within (0, 100)".into(),
            ));
        }
        Ok(Self {
            levels,
            rows: Vec::new(),
        })
    }

    /// Standard percentile grid used across the pipeline.
    pub fn default_levels() -> Vec<f64> {
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 75.0, 90.0, 95.0, 99.0]
    }

    pub fn push_row(&mut self, row: Vec<f64>) -> Result<()> {
        if row.len() != self.levels.len() {
            return Err(ForecastError::Numeric(format!(
                "percentile row has {} values, expected {}",
                row.len(),
                self.levels.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Build a series from per-day normal mean/sd via the normal quantile.
    pub fn from_normal(means: &[f64], sds: &[f64], levels: Vec<f64>) -> Result<Self> {
        let mut series = Self::new(levels)?;
        for (mean, sd) in means.iter().zip(sds.iter()) {
            let row = series
                .levels
                .iter()
                .map(|&pct| mean + sd * crate::stats::normal_quantile(pct / 100.0))
                .collect();
            series.push_row(row)?;
        }
        Ok(series)
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, day: usize) -> Option<&[f64]> {
        self.rows.get(day).map(|r| r.as_slice())
    }

    /// Value at an arbitrary percentile on `day`, linearly interpolated
    /// between bracketing level curves and clamped flat beyond the grid.
    pub fn value_at(&self, day: usize, pct: f64) -> Result<f64> {
        let row = self.rows.get(day).ok_or_else(|| {
            ForecastError::MissingSeries(format!("day {day} beyond series of {}", self.rows.len()))
        })?;
        if pct <= self.levels[0] {
            return Ok(row[0]);
        }
        if pct >= *self.levels.last().unwrap_or(&100.0) {
            return Ok(*row.last().unwrap_or(&0.0));
        }
        let hi = self.levels.partition_point(|&l| l < pct);
        let lo = hi - 1;
        let span = self.levels[hi] - self.levels[lo];
        let frac = (pct - self.levels[lo]) / span;
        Ok(row[lo] + frac * (row[hi] - row[lo]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fold_to_major() {
        let mut parties = PartyList::new();
        let a = parties.add(Party::new("ALP", "Labor"));
        let b = parties.add(Party::new("LNP", "Coalition"));
        let n = parties.add(Party::new("NAT", "Nationals").counts_as(b));

        assert_eq!(parties.fold_to_major(a), a);
        assert_eq!(parties.fold_to_major(n), b);
        assert_eq!(parties.major_one(), a);
    }

    #[test]
    fn test_odds_validation() {
        let odds = OddsTriple::new(dec!(1.50), dec!(2.60), Some(dec!(9.0)));
        assert!(odds.validate("Example").is_ok());

        let bad = OddsTriple::new(dec!(1.00), dec!(2.60), None);
        assert!(bad.validate("Example").is_err());
    }

    #[test]
    fn test_percentile_series_interpolation() {
        let mut series = PercentileSeries::new(vec![10.0, 50.0, 90.0]).unwrap();
        series.push_row(vec![40.0, 50.0, 60.0]).unwrap();

        assert_eq!(series.value_at(0, 50.0).unwrap(), 50.0);
        assert!((series.value_at(0, 30.0).unwrap() - 45.0).abs() < 1e-12);
        // Clamped flat outside the level grid.
        assert_eq!(series.value_at(0, 1.0).unwrap(), 40.0);
        assert_eq!(series.value_at(0, 99.0).unwrap(), 60.0);
        assert!(series.value_at(1, 50.0).is_err());
    }

    #[test]
    fn test_percentile_series_from_normal() {
        let series =
            PercentileSeries::from_normal(&[50.0], &[2.0], PercentileSeries::default_levels())
                .unwrap();
        let median = series.value_at(0, 50.0).unwrap();
        assert!((median - 50.0).abs() < 1e-6);
        let p95 = series.value_at(0, 95.0).unwrap();
        assert!((p95 - (50.0 + 2.0 * 1.6449)).abs() < 0.01);
    }

    #[test]
    fn test_percentile_levels_validation() {
        assert!(PercentileSeries::new(vec![]).is_err());
        assert!(PercentileSeries::new(vec![10.0, 10.0]).is_err());
        assert!(PercentileSeries::new(vec![0.0, 50.0]).is_err());
        assert!(PercentileSeries::new(vec![50.0, 100.0]).is_err());
        // A single level still has to sit inside (0, 100).
        assert!(PercentileSeries::new(vec![0.0]).is_err());
        assert!(PercentileSeries::new(vec![150.0]).is_err());
        assert!(PercentileSeries::new(vec![50.0]).is_ok());
    }
}
