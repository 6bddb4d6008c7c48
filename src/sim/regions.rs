//! Regional static data

use crate::error::{ForecastError, Result};
use crate::types::RegionId;
use serde::{Deserialize, Serialize};

/// One region of correlated seats.
///
/// `last_election_tpp` and `sample_tpp` are both expressed for the first
/// major party; the derived swing deviation (computed once per run during
/// Preparation) is their population-weighted national-vs-regional
/// difference and stays constant for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub population: f64,
    pub last_election_tpp: f64,
    /// Regional TPP implied by polling breakdowns this cycle
    pub sample_tpp: f64,
    /// Extra swing SD on top of the configured regional SD
    pub additional_uncertainty: f64,
}

impl Region {
    pub fn new(name: impl Into<String>, population: f64, last_tpp: f64, sample_tpp: f64) -> Self {
        Self {
            name: name.into(),
            population,
            last_election_tpp: last_tpp,
            sample_tpp,
            additional_uncertainty: 0.0,
        }
    }

    pub fn with_uncertainty(mut self, sd: f64) -> Self {
        self.additional_uncertainty = sd;
        self
    }
}

/// Owning list of regions; ids are indices into this list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionList {
    regions: Vec<Region>,
}

impl RegionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, region: Region) -> RegionId {
        self.regions.push(region);
        RegionId(self.regions.len() - 1)
    }

    pub fn get(&self, id: RegionId) -> Result<&Region> {
        self.regions
            .get(id.index())
            .ok_or(ForecastError::UnknownRegion(id.index()))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &Region)> {
        self.regions
            .iter()
            .enumerate()
            .map(|(i, r)| (RegionId(i), r))
    }

    /// Population-weighted mean of a per-region value.
    pub fn population_weighted<F: Fn(&Region) -> f64>(&self, f: F) -> Result<f64> {
        crate::stats::weighted_mean(self.regions.iter().map(|r| (f(r), r.population)))
            .ok_or_else(|| ForecastError::Numeric("total region population is zero".into()))
    }

    pub fn total_population(&self) -> f64 {
        self.regions.iter().map(|r| r.population).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_weighted_mean() {
        let mut regions = RegionList::new();
        regions.add(Region::new("North", 300.0, 52.0, 51.0));
        regions.add(Region::new("South", 100.0, 48.0, 49.0));

        let national = regions.population_weighted(|r| r.last_election_tpp).unwrap();
        assert!((national - 51.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_population_is_guarded() {
        let mut regions = RegionList::new();
        regions.add(Region::new("Ghost", 0.0, 50.0, 50.0));
        assert!(regions.population_weighted(|r| r.sample_tpp).is_err());
    }
}
