//! Poll and pollster storage

use crate::error::{ForecastError, Result};
use crate::types::{PartyId, PartyList, PollsterId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A polling house.
///
/// `weight`, `use_for_calibration` and `ignore_initially` are supplied
/// before a run. Accuracy and house effects are run-scoped working state
/// owned by the Trend Aggregator, reset at the start of each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pollster {
    pub name: String,
    /// Relative evidence weight of this house's polls
    pub weight: f64,
    /// Anchors the zero-sum house-effect calibration
    pub use_for_calibration: bool,
    /// Excluded from trend seeding (known large house bias)
    pub ignore_initially: bool,
}

impl Pollster {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: 1.0,
            use_for_calibration: true,
            ignore_initially: false,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn calibration(mut self, flag: bool) -> Self {
        self.use_for_calibration = flag;
        self
    }

    pub fn ignore_initially(mut self, flag: bool) -> Self {
        self.ignore_initially = flag;
        self
    }
}

/// Owning list of pollsters; ids are indices into this list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollsterList {
    pollsters: Vec<Pollster>,
}

impl PollsterList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pollster: Pollster) -> PollsterId {
        self.pollsters.push(pollster);
        PollsterId(self.pollsters.len() - 1)
    }

    pub fn get(&self, id: PollsterId) -> Result<&Pollster> {
        self.pollsters
            .get(id.index())
            .ok_or(ForecastError::UnknownPollster(id.index()))
    }

    pub fn len(&self) -> usize {
        self.pollsters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pollsters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PollsterId, &Pollster)> {
        self.pollsters
            .iter()
            .enumerate()
            .map(|(i, p)| (PollsterId(i), p))
    }
}

/// One published poll. Immutable after ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRecord {
    pub date: NaiveDate,
    pub pollster: PollsterId,
    /// Primary vote share per party, in percent
    pub primary: BTreeMap<PartyId, f64>,
    /// Two-party-preferred share for the first major party
    pub tpp: f64,
}

impl PollRecord {
    /// Derive a TPP figure from primary shares and mean preference flows:
    /// first-major primary plus each minor's primary scaled by its flow rate.
    pub fn derive_tpp(primary: &BTreeMap<PartyId, f64>, parties: &PartyList) -> Result<f64> {
        let major_one = parties.major_one();
        let major_two = parties.major_two();
        let mut tpp = 0.0;
        for (&party, &share) in primary {
            let def = parties.get(party)?;
            if party == major_one {
                tpp += share;
            } else if party != major_two {
                tpp += share * def.preference_flow.rate / 100.0;
            }
        }
        Ok(tpp.clamp(0.0, 100.0))
    }
}

/// Date-ordered store of poll records.
///
/// Insertion order is not meaningful; iteration is always by date, with
/// ties kept in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollStore {
    polls: Vec<PollRecord>,
}

impl PollStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert one record, keeping date order.
    ///
    /// Shares must lie in [0, 100] and every referenced pollster and party
    /// must resolve; violations are configuration errors.
    pub fn insert(
        &mut self,
        record: PollRecord,
        pollsters: &PollsterList,
        parties: &PartyList,
    ) -> Result<()> {
        pollsters.get(record.pollster)?;
        for (&party, &share) in &record.primary {
            parties.get(party)?;
            if !(0.0..=100.0).contains(&share) || !share.is_finite() {
                return Err(ForecastError::InvalidShare {
                    share,
                    context: format!("{} primary on {}", parties.get(party)?.code, record.date),
                });
            }
        }
        if !(0.0..=100.0).contains(&record.tpp) || !record.tpp.is_finite() {
            return Err(ForecastError::InvalidShare {
                share: record.tpp,
                context: format!("TPP on {}", record.date),
            });
        }
        let at = self.polls.partition_point(|p| p.date <= record.date);
        self.polls.insert(at, record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PollRecord> {
        self.polls.iter()
    }

    /// Polls with `start <= date <= end`, in date order.
    pub fn in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Iterator<Item = &PollRecord> {
        self.polls
            .iter()
            .filter(move |p| p.date >= start && p.date <= end)
    }

    pub fn for_pollster(&self, id: PollsterId) -> impl Iterator<Item = &PollRecord> {
        self.polls.iter().filter(move |p| p.pollster == id)
    }
}
