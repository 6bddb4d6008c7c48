//! Deterministic scenario generation
//!
//! Builds complete scenarios with a known underlying TPP path so tests can
//! compare recovered trends and simulated outcomes against ground truth.
//! Everything is seeded; the same generator settings always produce the
//! same scenario.

use crate::config::ForecastConfig;
use crate::pipeline::{PrimaryBaseline, Scenario};
use crate::polls::{PollRecord, Pollster, PollsterList};
use crate::sim::{Region, RegionList, Seat};
use crate::types::{OddsTriple, Party, PartyId, PartyList};
use chrono::{Duration, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Builds synthetic scenarios around a linear underlying TPP path.
#[derive(Debug, Clone)]
pub struct ScenarioGenerator {
    pub seed: u64,
    pub start: NaiveDate,
    /// Days of polling between start and the trend horizon
    pub poll_days: i64,
    /// Days between the trend horizon and the election
    pub lead_days: i64,
    /// TPP for the first major on the start date
    pub initial_tpp: f64,
    /// Underlying drift per day, in points
    pub daily_drift: f64,
    /// Sampling noise SD applied to every synthetic poll
    pub poll_noise_sd: f64,
    /// (name, weight, house bias) per synthetic pollster
    pub pollsters: Vec<(String, f64, f64)>,
    /// Polls arrive every this many days, round-robin across pollsters
    pub poll_interval: i64,
    pub n_regions: usize,
    pub seats_per_region: usize,
}

impl Default for ScenarioGenerator {
    fn default() -> Self {
        Self {
            seed: 42,
            start: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap_or_default(),
            poll_days: 120,
            lead_days: 35,
            initial_tpp: 51.0,
            daily_drift: 0.01,
            poll_noise_sd: 1.2,
            pollsters: vec![
                ("Newsline".into(), 1.0, 0.0),
                ("Insight".into(), 0.8, 0.8),
                ("FieldWork".into(), 0.6, -0.5),
            ],
            poll_interval: 4,
            n_regions: 3,
            seats_per_region: 5,
        }
    }
}

impl ScenarioGenerator {
    /// Underlying ground-truth TPP on a given day offset from the start.
    pub fn true_tpp(&self, day: i64) -> f64 {
        (self.initial_tpp + self.daily_drift * day as f64).clamp(0.0, 100.0)
    }

    /// Generate the full scenario.
    pub fn build(&self) -> Scenario {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let mut parties = PartyList::new();
        let alp = parties.add(Party::new("ALP", "Labor"));
        let lnp = parties.add(Party::new("LNP", "Coalition"));
        let grn = parties.add(Party::new("GRN", "Greens").with_flow(80.0, 3.0, 6));
        let ind = parties.add(Party::new("IND", "Independents").with_flow(45.0, 6.0, 4));

        let mut pollsters = PollsterList::new();
        let mut houses = Vec::new();
        for (i, (name, weight, bias)) in self.pollsters.iter().enumerate() {
            let id = pollsters.add(
                Pollster::new(name.clone())
                    .with_weight(*weight)
                    .calibration(i == 0),
            );
            houses.push((id, *bias));
        }

        // True minor primaries held flat; majors split the rest by TPP.
        let grn_share = 12.0;
        let ind_share = 8.0;
        let polls = self.synthetic_polls(&mut rng, &houses, grn, ind, grn_share, ind_share);

        let horizon_tpp = self.true_tpp(self.poll_days);
        let major_pool = 100.0 - grn_share - ind_share;
        // Primary consistent with the horizon TPP after preference flows.
        let alp_primary = horizon_tpp - grn_share * 0.80 - ind_share * 0.45;
        let primaries = vec![
            PrimaryBaseline {
                party: alp,
                share: alp_primary.clamp(0.0, 100.0),
                spread: 1.5,
            },
            PrimaryBaseline {
                party: lnp,
                share: (major_pool - alp_primary).clamp(0.0, 100.0),
                spread: 1.5,
            },
            PrimaryBaseline {
                party: grn,
                share: grn_share,
                spread: 1.0,
            },
            PrimaryBaseline {
                party: ind,
                share: ind_share,
                spread: 1.0,
            },
        ];

        let (regions, seats) = self.regions_and_seats(&mut rng, alp, lnp, ind, horizon_tpp);

        let end = self.start + Duration::days(self.poll_days);
        Scenario {
            name: format!("synthetic-{}", self.seed),
            parties,
            pollsters,
            polls,
            anchors: vec![(self.start, self.true_tpp(0))],
            discontinuities: vec![],
            start: self.start,
            end,
            election_date: end + Duration::days(self.lead_days),
            primaries,
            regions,
            seats,
            config: ForecastConfig {
                seed: self.seed,
                ..ForecastConfig::default()
            },
        }
    }

    fn synthetic_polls(
        &self,
        rng: &mut ChaCha8Rng,
        houses: &[(crate::types::PollsterId, f64)],
        grn: PartyId,
        ind: PartyId,
        grn_share: f64,
        ind_share: f64,
    ) -> Vec<PollRecord> {
        let noise = Normal::new(0.0, self.poll_noise_sd.max(1e-9)).expect("positive sd");
        let mut polls = Vec::new();
        let mut house_cycle = houses.iter().cycle();

        let mut day = 0;
        while day <= self.poll_days {
            let (pollster, bias) = match house_cycle.next() {
                Some(&(id, bias)) => (id, bias),
                None => break,
            };
            let observed = (self.true_tpp(day) + bias + noise.sample(rng)).clamp(0.0, 100.0);

            let major_pool = 100.0 - grn_share - ind_share;
            let alp_primary = (observed - grn_share * 0.80 - ind_share * 0.45).clamp(0.0, 100.0);
            let mut primary = BTreeMap::new();
            primary.insert(PartyId(0), alp_primary);
            primary.insert(PartyId(1), (major_pool - alp_primary).clamp(0.0, 100.0));
            primary.insert(grn, grn_share);
            primary.insert(ind, ind_share);

            polls.push(PollRecord {
                date: self.start + Duration::days(day),
                pollster,
                primary,
                tpp: observed,
            });
            day += self.poll_interval.max(1);
        }
        polls
    }

    fn regions_and_seats(
        &self,
        rng: &mut ChaCha8Rng,
        alp: PartyId,
        lnp: PartyId,
        ind: PartyId,
        horizon_tpp: f64,
    ) -> (RegionList, Vec<Seat>) {
        let mut regions = RegionList::new();
        let mut seats = Vec::new();
        for r in 0..self.n_regions {
            let lean = (r as f64 - (self.n_regions as f64 - 1.0) / 2.0) * 1.5;
            let region_id = regions.add(Region::new(
                format!("Region {}", r + 1),
                1000.0 + 200.0 * r as f64,
                (50.0 + lean).clamp(0.0, 100.0),
                (horizon_tpp + lean).clamp(0.0, 100.0),
            ));

            for s in 0..self.seats_per_region {
                let margin = 1.0 + 2.5 * s as f64 + rng.gen::<f64>();
                let (incumbent, challenger) = if (r + s) % 2 == 0 {
                    (alp, lnp)
                } else {
                    (lnp, alp)
                };
                let mut seat = Seat::new(
                    format!("Seat {}-{}", r + 1, s + 1),
                    incumbent,
                    challenger,
                    region_id,
                    margin,
                )
                .with_modifier(rng.gen::<f64>() - 0.5);
                // One teal-style contest per region, priced by the bookies.
                if s == self.seats_per_region - 1 {
                    seat = seat
                        .with_challenger2(ind)
                        .with_odds(odds_from_margin(margin));
                }
                seats.push(seat);
            }
        }
        (regions, seats)
    }
}

/// Plausible decimal odds for an incumbent defending the given margin.
fn odds_from_margin(margin: f64) -> OddsTriple {
    let favourite = 1.2 + margin * 0.05;
    let outsider = 1.0 + 2.0 + margin * 0.6;
    OddsTriple::new(
        decimal_from(favourite),
        decimal_from(outsider),
        Some(decimal_from(outsider * 2.5)),
    )
}

fn decimal_from(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or(Decimal::TWO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_is_deterministic() {
        let a = ScenarioGenerator::default().build();
        let b = ScenarioGenerator::default().build();
        assert_eq!(a.polls.len(), b.polls.len());
        for (x, y) in a.polls.iter().zip(&b.polls) {
            assert_eq!(x.date, y.date);
            assert_eq!(x.tpp.to_bits(), y.tpp.to_bits());
        }
        assert_eq!(a.seats.len(), b.seats.len());
    }

    #[test]
    fn test_generated_scenario_is_internally_valid() {
        let scenario = ScenarioGenerator::default().build();
        // Every poll and seat passes ingestion validation.
        let store = scenario.poll_store().unwrap();
        assert!(!store.is_empty());
        let seats = scenario.seat_list().unwrap();
        assert_eq!(seats.len(), 15);
        assert!(scenario.election_date > scenario.end);

        // Primaries cover all four parties and sum near 100.
        let total: f64 = scenario.primaries.iter().map(|b| b.share).sum();
        assert!((total - 100.0).abs() < 1.0, "primaries sum to {total}");
    }

    #[test]
    fn test_polls_track_the_true_path() {
        let generator = ScenarioGenerator {
            poll_noise_sd: 1e-9,
            pollsters: vec![("Exact".into(), 1.0, 0.0)],
            ..ScenarioGenerator::default()
        };
        let scenario = generator.build();
        for poll in &scenario.polls {
            let day = (poll.date - generator.start).num_days();
            assert!((poll.tpp - generator.true_tpp(day)).abs() < 1e-6);
        }
    }
}
