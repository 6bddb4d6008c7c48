//! End-to-end forecast pipeline
//!
//! Wires the stages together in their fixed order: poll ingestion, trend
//! aggregation, forward projection, TPP sampling, seat simulation. Each
//! stage consumes the previous stage's output by value or reference and
//! fails fast; there is no retry or partial-output path.

use crate::cancel::CancelToken;
use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::polls::{PollRecord, PollStore, PollsterList};
use crate::projection::{ForwardProjector, ProjectionInputs};
use crate::sampler::{tpp_percentile_series, TppSeriesInputs};
use crate::sim::{AggregateReport, RegionList, Seat, SeatList, SimulationEngine, SimulationInputs};
use crate::trend::{TrendAggregator, TrendInputs};
use crate::types::{PartyId, PartyList, PercentileSeries};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Stride between stage seeds so stage RNG streams never overlap.
const STAGE_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Baseline primary-vote distribution for one party, used to spread the
/// projected national TPP back into per-party share series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryBaseline {
    pub party: PartyId,
    /// Mean primary share at the trend horizon, in points
    pub share: f64,
    /// Primary-share SD across recent polling
    pub spread: f64,
}

/// Complete declarative input for one forecast run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub parties: PartyList,
    pub pollsters: PollsterList,
    pub polls: Vec<PollRecord>,
    /// Known election results pinned into the trend
    #[serde(default)]
    pub anchors: Vec<(NaiveDate, f64)>,
    /// Dates across which the trend may break
    #[serde(default)]
    pub discontinuities: Vec<NaiveDate>,
    /// Aggregation window
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub election_date: NaiveDate,
    pub primaries: Vec<PrimaryBaseline>,
    pub regions: RegionList,
    pub seats: Vec<Seat>,
    #[serde(default)]
    pub config: ForecastConfig,
}

impl Scenario {
    /// Ingest the scenario's polls into a validated, date-ordered store.
    pub fn poll_store(&self) -> Result<PollStore> {
        let mut store = PollStore::new();
        for record in &self.polls {
            store.insert(record.clone(), &self.pollsters, &self.parties)?;
        }
        Ok(store)
    }

    /// Validate and index the scenario's seats.
    pub fn seat_list(&self) -> Result<SeatList> {
        let mut list = SeatList::new();
        for seat in &self.seats {
            list.add(seat.clone(), &self.regions, &self.parties)?;
        }
        Ok(list)
    }
}

fn stage_seed(base: u64, stage: u64) -> u64 {
    base.wrapping_add(stage.wrapping_mul(STAGE_SEED_STRIDE))
}

/// Run the whole pipeline for one scenario.
pub fn run_forecast(scenario: &Scenario, cancel: &CancelToken) -> Result<AggregateReport> {
    let cfg = &scenario.config;
    let store = scenario.poll_store()?;
    let seats = scenario.seat_list()?;
    info!(
        "[Pipeline] scenario '{}': {} polls, {} seats, election {}",
        scenario.name,
        store.len(),
        seats.len(),
        scenario.election_date,
    );

    let trend_inputs = TrendInputs {
        polls: &store,
        pollsters: &scenario.pollsters,
        eff_start: scenario.start,
        eff_end: scenario.end,
        anchors: &scenario.anchors,
        discontinuities: &scenario.discontinuities,
    };
    let trend = TrendAggregator::run(&trend_inputs, &cfg.trend, cancel)?;
    info!(
        "[Pipeline] trend endpoint {:.2} (sd {:.2})",
        trend.endpoint(),
        trend.final_std_dev,
    );

    if cancel.is_cancelled() {
        return Err(ForecastError::Cancelled);
    }

    let projection_inputs = ProjectionInputs {
        endpoint: trend.endpoint(),
        final_std_dev: trend.final_std_dev,
        horizon: scenario.end,
        target: scenario.election_date,
    };
    let projection = ForwardProjector::run(
        &projection_inputs,
        &cfg.projection,
        stage_seed(cfg.seed, 1),
    )?;
    if projection.is_empty() {
        return Err(ForecastError::EmptyProjection {
            horizon: scenario.end,
            target: scenario.election_date,
        });
    }

    let series_by_party = party_series(scenario, &projection.mean)?;
    let levels = PercentileSeries::default_levels();
    let sampler_inputs = TppSeriesInputs {
        series_by_party: &series_by_party,
        parties: &scenario.parties,
        levels: &levels,
    };
    let tpp_series = tpp_percentile_series(
        &sampler_inputs,
        &cfg.sampler,
        stage_seed(cfg.seed, 2),
        cancel,
    )?;

    let sim_inputs = SimulationInputs {
        parties: &scenario.parties,
        regions: &scenario.regions,
        seats: &seats,
        tpp_series: &tpp_series,
        tpp_day: tpp_series.len() - 1,
        trend_series: &trend.trend,
        projection_mean: &projection.mean,
        projection_sd: &projection.sd,
    };
    SimulationEngine::run(&sim_inputs, &cfg.simulation, stage_seed(cfg.seed, 3), cancel)
}

/// Spread the projected national TPP path into per-party primary series.
///
/// The two majors move with the projection drift in opposite directions;
/// minors stay at their baseline with their own polling spread. Every
/// configured primary baseline must resolve to a known party.
fn party_series(
    scenario: &Scenario,
    projection_mean: &[f64],
) -> Result<BTreeMap<PartyId, PercentileSeries>> {
    if scenario.primaries.is_empty() {
        return Err(ForecastError::MissingSeries(
            "scenario defines no primary baselines".into(),
        ));
    }
    let major_one = scenario.parties.major_one();
    let major_two = scenario.parties.major_two();
    let base = projection_mean.first().copied().unwrap_or(50.0);

    let mut by_party = BTreeMap::new();
    for baseline in &scenario.primaries {
        scenario.parties.get(baseline.party)?;
        if !(0.0..=100.0).contains(&baseline.share) || baseline.spread < 0.0 {
            return Err(ForecastError::InvalidShare {
                share: baseline.share,
                context: format!("primary baseline for party {}", baseline.party.index()),
            });
        }
        let means: Vec<f64> = projection_mean
            .iter()
            .map(|&tpp| {
                let drift = tpp - base;
                if baseline.party == major_one {
                    (baseline.share + drift).clamp(0.0, 100.0)
                } else if baseline.party == major_two {
                    (baseline.share - drift).clamp(0.0, 100.0)
                } else {
                    baseline.share
                }
            })
            .collect();
        let sds = vec![baseline.spread.max(0.05); means.len()];
        let series =
            PercentileSeries::from_normal(&means, &sds, PercentileSeries::default_levels())?;
        by_party.insert(baseline.party, series);
    }

    if !by_party.contains_key(&major_one) {
        return Err(ForecastError::MissingSeries(
            "no primary baseline for the first major party".into(),
        ));
    }
    Ok(by_party)
}
