//! Preparation, iteration, and the fork-join simulation run

use crate::cancel::CancelToken;
use crate::config::SimulationConfig;
use crate::error::{ForecastError, Result};
use crate::sim::live::{live_margin_variance, live_seat_margin};
use crate::sim::regions::RegionList;
use crate::sim::report::{
    Accumulator, AggregateReport, IterationOutcome, ReportContext, ResultClass,
};
use crate::sim::seats::SeatList;
use crate::stats::precision_blend;
use crate::types::{PartyList, PercentileSeries};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use tracing::info;

/// Stride between per-iteration seeds; each draw gets a private stream.
const ITERATION_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Shared read-only inputs for one simulation run. All of it is
/// materialized before the run starts and stays immutable throughout.
#[derive(Debug, Clone, Copy)]
pub struct SimulationInputs<'a> {
    pub parties: &'a PartyList,
    pub regions: &'a RegionList,
    pub seats: &'a SeatList,
    /// Projected national TPP distribution
    pub tpp_series: &'a PercentileSeries,
    /// Day of the series to draw national samples from (usually the last)
    pub tpp_day: usize,
    /// Upstream series embedded into the report
    pub trend_series: &'a [f64],
    pub projection_mean: &'a [f64],
    pub projection_sd: &'a [f64],
}

/// Per-seat state derived once during Preparation.
#[derive(Debug, Clone)]
struct PreparedSeat {
    region: usize,
    margin: f64,
    local_modifier: f64,
    /// +1 when the incumbent folds to the first major, else -1
    direction: f64,
    incumbent: usize,
    challenger: usize,
    /// Decide by margin arithmetic (classic contest, or no odds to draw from)
    margin_path: bool,
    /// Live incumbent margin and its variance, when significant
    live: Option<(f64, f64)>,
    /// Longshot-corrected win probabilities for the odds path
    odds_probabilities: Vec<(usize, f64)>,
    /// Third-place upset: (party, probability), classic seats only
    upset: Option<(usize, f64)>,
}

/// Everything an iteration reads. Built once, shared immutably.
#[derive(Debug, Clone)]
struct Prepared {
    national_last: f64,
    region_deviation: Vec<f64>,
    region_sd: Vec<f64>,
    region_avg_modifier: Vec<f64>,
    region_live: Vec<Option<(f64, f64)>>,
    region_population: Vec<f64>,
    total_population: f64,
    seats: Vec<PreparedSeat>,
    majority_threshold: u64,
    n_parties: usize,
    /// Major index each party folds to, precomputed
    fold: Vec<usize>,
    tpp_day: usize,
}

pub struct SimulationEngine;

impl SimulationEngine {
    /// Full run: Preparation, N parallel iterations, Completion.
    pub fn run(
        inputs: &SimulationInputs<'_>,
        cfg: &SimulationConfig,
        seed: u64,
        cancel: &CancelToken,
    ) -> Result<AggregateReport> {
        let prepared = Self::prepare(inputs, cfg)?;
        let n_seats = prepared.seats.len();
        let n_parties = prepared.n_parties;
        info!(
            "[Simulation] {} iterations over {} seats in {} regions",
            cfg.iterations,
            n_seats,
            prepared.region_population.len(),
        );

        let tpp_series = inputs.tpp_series;
        let accumulated = (0..cfg.iterations)
            .into_par_iter()
            .try_fold(
                || Accumulator::sized(n_seats, n_parties),
                |mut acc, i| {
                    if cancel.is_cancelled() {
                        return Err(ForecastError::Cancelled);
                    }
                    let mut rng = ChaCha8Rng::seed_from_u64(
                        seed.wrapping_add((i + 1).wrapping_mul(ITERATION_SEED_STRIDE)),
                    );
                    let outcome = Self::iterate(&prepared, tpp_series, cfg, &mut rng)?;
                    acc.record(&outcome);
                    Ok(acc)
                },
            )
            .try_reduce(
                || Accumulator::sized(n_seats, n_parties),
                |mut a, b| {
                    a.merge(b);
                    Ok(a)
                },
            )?;

        Ok(accumulated.finish(ReportContext {
            seat_names: inputs.seats.iter().map(|(_, s)| s.name.clone()).collect(),
            party_codes: inputs.parties.iter().map(|(_, p)| p.code.clone()).collect(),
            trend_series: inputs.trend_series.to_vec(),
            projection_mean: inputs.projection_mean.to_vec(),
            projection_sd: inputs.projection_sd.to_vec(),
        }))
    }

    /// Validate preconditions and derive all run-constant state. Fatal on
    /// missing upstream data; nothing downstream retries.
    fn prepare(inputs: &SimulationInputs<'_>, cfg: &SimulationConfig) -> Result<Prepared> {
        if inputs.tpp_series.is_empty() || inputs.tpp_day >= inputs.tpp_series.len() {
            return Err(ForecastError::MissingSeries(
                "projected national TPP distribution is empty; run the projector first".into(),
            ));
        }
        if inputs.seats.is_empty() {
            return Err(ForecastError::MissingSeries("no seats defined".into()));
        }
        if inputs.parties.len() < 2 {
            return Err(ForecastError::MissingSeries(
                "need at least the two major parties".into(),
            ));
        }

        let national_last = inputs
            .regions
            .population_weighted(|r| r.last_election_tpp)?;
        let national_sample = inputs.regions.population_weighted(|r| r.sample_tpp)?;
        let decay = cfg
            .regional_decay
            .clamp(0.0, 1.0)
            .powi(cfg.elapsed_cycles as i32);

        let n_regions = inputs.regions.len();
        let mut region_deviation = vec![0.0; n_regions];
        let mut region_sd = vec![0.0; n_regions];
        let mut region_population = vec![0.0; n_regions];
        for (id, region) in inputs.regions.iter() {
            let historical = (region.sample_tpp - region.last_election_tpp)
                - (national_sample - national_last);
            region_deviation[id.index()] = historical * decay;
            region_sd[id.index()] = cfg.regional_sd + region.additional_uncertainty;
            region_population[id.index()] = region.population;
        }

        // Regional mean local modifier, so seat modifiers stay zero-sum
        // within their region.
        let mut modifier_sum = vec![0.0; n_regions];
        let mut seat_count = vec![0usize; n_regions];
        for (_, seat) in inputs.seats.iter() {
            modifier_sum[seat.region.index()] += seat.local_modifier;
            seat_count[seat.region.index()] += 1;
        }
        let region_avg_modifier: Vec<f64> = modifier_sum
            .iter()
            .zip(&seat_count)
            .map(|(&sum, &count)| if count == 0 { 0.0 } else { sum / count as f64 })
            .collect();

        let major_one = inputs.parties.major_one();
        let fold: Vec<usize> = inputs
            .parties
            .iter()
            .map(|(id, _)| inputs.parties.fold_to_major(id).index())
            .collect();

        // Observed live swing per region: counted-vote-weighted mean of the
        // seat-level live swings, with variance shrinking in the aggregate
        // counted fraction.
        let mut live_swing_num = vec![0.0; n_regions];
        let mut live_swing_den = vec![0.0; n_regions];
        let mut live_counted = vec![0.0; n_regions];
        let mut live_enrolment = vec![0.0; n_regions];

        let mut seats = Vec::with_capacity(inputs.seats.len());
        for (_, seat) in inputs.seats.iter() {
            let direction = if inputs.parties.fold_to_major(seat.incumbent) == major_one {
                1.0
            } else {
                -1.0
            };
            let classic = seat.is_classic(inputs.parties);
            let margin_path = classic || seat.odds.is_none();

            let live = seat.live.as_ref().and_then(|live| {
                let fraction = live.counted_fraction();
                if fraction < cfg.live_significance_floor {
                    return None;
                }
                let margin = live_seat_margin(seat, live)?;
                let variance = live_margin_variance(fraction, cfg.live_margin_base_sd);
                let (first, second) = live.totals();
                let r = seat.region.index();
                // Seat live swing oriented to the first major party.
                live_swing_num[r] += direction * (margin - seat.margin) * (first + second);
                live_swing_den[r] += first + second;
                live_counted[r] += first + second;
                live_enrolment[r] += live.enrolment;
                Some((margin, variance))
            });

            let odds_probabilities = match (&seat.odds, margin_path) {
                (Some(odds), false) => {
                    let mut candidates =
                        vec![seat.incumbent.index(), seat.challenger.index()];
                    let mut quotes = vec![odds.incumbent_f64(), odds.challenger_f64()];
                    if let (Some(third), Some(quote)) =
                        (seat.challenger2, odds.challenger2_f64())
                    {
                        candidates.push(third.index());
                        quotes.push(quote);
                    }
                    let probs = longshot_probabilities(&quotes, cfg.longshot_odds_threshold);
                    candidates.into_iter().zip(probs).collect()
                }
                _ => Vec::new(),
            };

            // Even an otherwise-classic seat can fall to a third-place
            // independent when the odds support it.
            let upset = match (margin_path, seat.challenger2, &seat.odds) {
                (true, Some(third), Some(odds)) => odds.challenger2_f64().and_then(|quote| {
                    if quote < cfg.independent_odds_threshold {
                        let quotes =
                            vec![odds.incumbent_f64(), odds.challenger_f64(), quote];
                        let probs =
                            longshot_probabilities(&quotes, cfg.longshot_odds_threshold);
                        Some((third.index(), probs[2]))
                    } else {
                        None
                    }
                }),
                _ => None,
            };

            seats.push(PreparedSeat {
                region: seat.region.index(),
                margin: seat.margin,
                local_modifier: seat.local_modifier,
                direction,
                incumbent: seat.incumbent.index(),
                challenger: seat.challenger.index(),
                margin_path,
                live,
                odds_probabilities,
                upset,
            });
        }

        let region_live: Vec<Option<(f64, f64)>> = (0..n_regions)
            .map(|r| {
                if live_swing_den[r] <= 0.0 || live_enrolment[r] <= 0.0 {
                    return None;
                }
                let swing = live_swing_num[r] / live_swing_den[r];
                let fraction = (live_counted[r] / live_enrolment[r]).clamp(0.0, 1.0);
                if fraction < cfg.live_significance_floor {
                    return None;
                }
                Some((swing, live_margin_variance(fraction, cfg.live_margin_base_sd)))
            })
            .collect();

        let total_population = inputs.regions.total_population();
        if total_population <= 0.0 {
            return Err(ForecastError::Numeric(
                "total region population is zero".into(),
            ));
        }

        Ok(Prepared {
            national_last,
            region_deviation,
            region_sd,
            region_avg_modifier,
            region_live,
            region_population,
            total_population,
            seats,
            majority_threshold: inputs.seats.len() as u64 / 2 + 1,
            n_parties: inputs.parties.len(),
            fold,
            tpp_day: inputs.tpp_day,
        })
    }

    /// One Monte Carlo draw: a pure function of the RNG stream and the
    /// shared read-only state. Writes only to its own outcome.
    fn iterate(
        prepared: &Prepared,
        tpp_series: &PercentileSeries,
        cfg: &SimulationConfig,
        rng: &mut ChaCha8Rng,
    ) -> Result<IterationOutcome> {
        // 1. National TPP sample.
        let pct = rng.gen::<f64>() * 100.0;
        let national_tpp = tpp_series.value_at(prepared.tpp_day, pct)?;
        debug_assert!(national_tpp.is_finite());
        let national_swing = national_tpp - prepared.national_last;

        // 2. Regional swings, live-blended and reconciled.
        let region_swings = draw_region_swings(prepared, national_swing, rng);

        // 4. Seats, independently.
        let n_seats = prepared.seats.len();
        let mut winners = vec![0usize; n_seats];
        let mut margins = vec![None; n_seats];
        let mut folded_seats = vec![0u64; prepared.n_parties];

        for (s, seat) in prepared.seats.iter().enumerate() {
            let winner = if seat.margin_path {
                let z: f64 = rng.sample(StandardNormal);
                let effective = region_swings[seat.region]
                    - prepared.region_avg_modifier[seat.region]
                    + seat.local_modifier
                    + cfg.seat_noise_sd * z;
                let mut margin = seat.margin + seat.direction * effective;
                if let Some((live_margin, live_variance)) = seat.live {
                    let prior_variance = cfg.seat_noise_sd * cfg.seat_noise_sd
                        + prepared.region_sd[seat.region] * prepared.region_sd[seat.region];
                    margin =
                        precision_blend(margin, prior_variance, live_margin, live_variance);
                }
                debug_assert!(margin.is_finite());
                margins[s] = Some(margin);
                let mut winner = if margin >= 0.0 {
                    seat.incumbent
                } else {
                    seat.challenger
                };
                if let Some((third, probability)) = seat.upset {
                    if rng.gen::<f64>() < probability {
                        winner = third;
                    }
                }
                winner
            } else {
                draw_categorical(&seat.odds_probabilities, rng)
            };
            winners[s] = winner;
            folded_seats[prepared.fold[winner]] += 1;
        }
        debug_assert_eq!(folded_seats.iter().sum::<u64>(), n_seats as u64);

        // 5. Classify against seats/2 + 1.
        let p0 = folded_seats[0];
        let p1 = folded_seats[1];
        let classification = if p0 >= prepared.majority_threshold {
            ResultClass::Majority(0)
        } else if p1 >= prepared.majority_threshold {
            ResultClass::Majority(1)
        } else if p0 > p1 {
            ResultClass::Lead(0)
        } else if p1 > p0 {
            ResultClass::Lead(1)
        } else {
            ResultClass::Tie
        };

        Ok(IterationOutcome {
            winners,
            margins,
            folded_seats,
            classification,
        })
    }
}

/// One set of regional swing draws: Gaussian around the national swing plus
/// each region's decayed historical deviation, precision-blended with any
/// live observation, then shifted by a single constant so the
/// population-weighted mean equals the national swing exactly.
fn draw_region_swings(
    prepared: &Prepared,
    national_swing: f64,
    rng: &mut ChaCha8Rng,
) -> Vec<f64> {
    let n_regions = prepared.region_population.len();
    let mut region_swings = vec![0.0; n_regions];
    for r in 0..n_regions {
        let z: f64 = rng.sample(StandardNormal);
        let mut swing =
            national_swing + prepared.region_deviation[r] + prepared.region_sd[r] * z;
        if let Some((observed, variance)) = prepared.region_live[r] {
            let prior_variance = prepared.region_sd[r] * prepared.region_sd[r];
            swing = precision_blend(swing, prior_variance, observed, variance);
        }
        region_swings[r] = swing;
    }

    // The national draw is authoritative.
    let weighted: f64 = region_swings
        .iter()
        .zip(&prepared.region_population)
        .map(|(&s, &p)| s * p)
        .sum::<f64>()
        / prepared.total_population;
    let correction = national_swing - weighted;
    for swing in &mut region_swings {
        *swing += correction;
    }
    region_swings
}

/// Odds-derived win probabilities with the longshot correction: quotes
/// above the threshold are cubed and rescaled (continuous at the
/// threshold) before inverse-odds normalization, compressing implausible
/// long odds.
fn longshot_probabilities(quotes: &[f64], threshold: f64) -> Vec<f64> {
    let corrected: Vec<f64> = quotes
        .iter()
        .map(|&q| {
            if q > threshold {
                q.powi(3) / (threshold * threshold)
            } else {
                q
            }
        })
        .collect();
    let inverses: Vec<f64> = corrected.iter().map(|&q| 1.0 / q.max(1e-9)).collect();
    let total: f64 = inverses.iter().sum();
    inverses.into_iter().map(|i| i / total.max(1e-12)).collect()
}

/// Draw one party index from `(party, probability)` pairs.
fn draw_categorical(probabilities: &[(usize, f64)], rng: &mut ChaCha8Rng) -> usize {
    let u = rng.gen::<f64>();
    let mut cumulative = 0.0;
    for &(party, p) in probabilities {
        cumulative += p;
        if u < cumulative {
            return party;
        }
    }
    probabilities.last().map(|&(party, _)| party).unwrap_or(0)
}
