//! Iterative joint trend / house-effect estimator

use crate::cancel::CancelToken;
use crate::config::TrendConfig;
use crate::error::{ForecastError, Result};
use crate::polls::{PollStore, PollsterList};
use crate::stats::{two_sided_survival, weighted_mean};
use crate::trend::timepoint::{DayGrid, TimePoint};
use crate::types::PercentileSeries;
use chrono::NaiveDate;
use tracing::debug;

/// Sweeps during which house effects are held at the overall (not yet
/// time-varying) value before switching to the day-local estimator.
const WARMUP_SWEEPS: u32 = 50;

/// Damping on trend adjustments, guarding against oscillation from
/// simultaneous neighbor updates. House-effect adjustments are deliberately
/// undamped; the asymmetry is preserved pending empirical re-validation.
const TREND_DAMPING: f64 = 0.5;

/// Smallest offset tried by the per-day search; doubles up to (but below) 1.
const OFFSET_BASE: f64 = 0.001;

/// Upper clamp on the derived final standard deviation.
const MAX_FINAL_SD: f64 = 3.0;

/// Evidence level past which the backward scan stops at a discontinuity.
const EVIDENCE_STOP: f64 = 1.0;

/// Inputs referenced (never owned) by one aggregation run.
#[derive(Debug, Clone, Copy)]
pub struct TrendInputs<'a> {
    pub polls: &'a PollStore,
    pub pollsters: &'a PollsterList,
    pub eff_start: NaiveDate,
    pub eff_end: NaiveDate,
    /// Known election results; their days are pinned, never perturbed
    pub anchors: &'a [(NaiveDate, f64)],
    /// Days at which the trend may break (no smoothness penalty across)
    pub discontinuities: &'a [NaiveDate],
}

/// Output of one aggregation run.
#[derive(Debug, Clone)]
pub struct TrendRun {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Smoothed TPP trend, one value per grid day
    pub trend: Vec<f64>,
    /// Daily house effect per pollster, `[pollster][day]`
    pub house_effects: Vec<Vec<f64>>,
    /// Calibrated overall house effect per pollster
    pub overall_house_effects: Vec<f64>,
    /// Final RMSE-derived accuracy per pollster
    pub accuracy: Vec<f64>,
    /// Final local error score per day (diagnostic)
    pub error_scores: Vec<f64>,
    /// Endpoint uncertainty from the time-decayed evidence scan
    pub final_std_dev: f64,
}

impl TrendRun {
    /// Trend value on the last grid day.
    pub fn endpoint(&self) -> f64 {
        *self.trend.last().unwrap_or(&50.0)
    }

    /// Symmetric percentile band around the trend at `final_std_dev`.
    pub fn percentile_series(&self, levels: Vec<f64>) -> Result<PercentileSeries> {
        let sds = vec![self.final_std_dev; self.trend.len()];
        PercentileSeries::from_normal(&self.trend, &sds, levels)
    }
}

/// One poll resolved against the run's day grid.
struct RunPoll {
    day: usize,
    pollster: usize,
    tpp: f64,
    weight: f64,
    seed_eligible: bool,
}

pub struct TrendAggregator;

impl TrendAggregator {
    /// Run the full joint estimation. Deterministic: no RNG is involved and
    /// identical inputs produce byte-identical output.
    pub fn run(
        inputs: &TrendInputs<'_>,
        cfg: &TrendConfig,
        cancel: &CancelToken,
    ) -> Result<TrendRun> {
        let grid = DayGrid::new(inputs.eff_start, inputs.eff_end)?;
        let n_days = grid.len();
        let n_pollsters = inputs.pollsters.len();

        let mut days: Vec<TimePoint> = vec![TimePoint::default(); n_days];
        let mut run_polls: Vec<RunPoll> = Vec::new();
        for rec in inputs.polls.in_range(inputs.eff_start, inputs.eff_end) {
            let day = match grid.index_of(rec.date) {
                Some(d) => d,
                None => continue,
            };
            let pollster = inputs.pollsters.get(rec.pollster)?;
            days[day].polls.push(run_polls.len());
            run_polls.push(RunPoll {
                day,
                pollster: rec.pollster.index(),
                tpp: rec.tpp,
                weight: pollster.weight,
                seed_eligible: !pollster.ignore_initially,
            });
        }
        for &(date, value) in inputs.anchors {
            if let Some(d) = grid.index_of(date) {
                days[d].anchor = Some(value);
            }
        }
        for &date in inputs.discontinuities {
            if let Some(d) = grid.index_of(date) {
                days[d].discontinuity = true;
            }
        }

        Self::seed_trend(&mut days, &run_polls);
        let trend_seed: Vec<f64> = days.iter().map(|t| t.trend).collect();
        let mut house = Self::seed_house_effects(n_pollsters, &trend_seed, &run_polls);

        let mut overall = vec![0.0; n_pollsters];
        let mut accuracy = vec![1.0; n_pollsters];
        let offsets = offset_ladder();

        for sweep in 0..cfg.iterations {
            if cancel.is_cancelled() {
                return Err(ForecastError::Cancelled);
            }

            Self::recompute_overall(&days, &run_polls, n_pollsters, &mut overall);
            let shift = calibration_shift(&overall, inputs.pollsters, cfg.calibration_bias);
            for value in &mut overall {
                *value += shift;
            }

            if sweep < WARMUP_SWEEPS {
                for (p, series) in house.iter_mut().enumerate() {
                    series.fill(overall[p]);
                }
            } else {
                Self::day_local_house_effects(
                    &days,
                    &run_polls,
                    &overall,
                    cfg,
                    inputs.pollsters,
                    &mut house,
                );
            }

            Self::recompute_accuracy(&days, &run_polls, &house, n_pollsters, &mut accuracy);
            Self::sweep_trend(&mut days, &run_polls, &house, &accuracy, cfg, &offsets);

            if sweep % 50 == 0 {
                debug!(
                    "[Trend] sweep {sweep}: endpoint {:.3}, mean score {:.3}",
                    days.last().map(|t| t.trend).unwrap_or(50.0),
                    days.iter().map(|t| t.error_score).sum::<f64>() / n_days as f64,
                );
            }
        }

        let final_std_dev = Self::final_std_dev(&days, &run_polls, &accuracy, cfg);

        Ok(TrendRun {
            start: grid.start(),
            end: grid.end(),
            trend: days.iter().map(|t| t.trend).collect(),
            house_effects: house,
            overall_house_effects: overall,
            accuracy,
            error_scores: days.iter().map(|t| t.error_score).collect(),
            final_std_dev,
        })
    }

    /// Seed the trend by linear interpolation between days carrying an
    /// anchor or at least one seed-eligible poll; edges hold flat; with no
    /// data at all the trend sits flat at 50.
    fn seed_trend(days: &mut [TimePoint], run_polls: &[RunPoll]) {
        let mut known: Vec<(usize, f64)> = Vec::new();
        for (d, tp) in days.iter().enumerate() {
            if let Some(anchor) = tp.anchor {
                known.push((d, anchor));
                continue;
            }
            let tpps: Vec<f64> = tp
                .polls
                .iter()
                .map(|&i| &run_polls[i])
                .filter(|p| p.seed_eligible)
                .map(|p| p.tpp)
                .collect();
            if !tpps.is_empty() {
                known.push((d, crate::stats::mean(&tpps)));
            }
        }
        let seeded = interpolate_known(days.len(), &known, 50.0);
        for (tp, value) in days.iter_mut().zip(seeded) {
            tp.trend = tp.anchor.unwrap_or(value);
        }
    }

    /// Seed each pollster's house-effect series from poll-minus-seed-trend
    /// residuals, interpolated the same way; zero with no polls.
    fn seed_house_effects(
        n_pollsters: usize,
        trend_seed: &[f64],
        run_polls: &[RunPoll],
    ) -> Vec<Vec<f64>> {
        let n_days = trend_seed.len();
        let mut house = vec![vec![0.0; n_days]; n_pollsters];
        for (p, series) in house.iter_mut().enumerate() {
            let mut known: Vec<(usize, f64)> = Vec::new();
            for d in 0..n_days {
                let resids: Vec<f64> = run_polls
                    .iter()
                    .filter(|rp| rp.pollster == p && rp.day == d)
                    .map(|rp| rp.tpp - trend_seed[d])
                    .collect();
                if !resids.is_empty() {
                    known.push((d, crate::stats::mean(&resids)));
                }
            }
            if !known.is_empty() {
                *series = interpolate_known(n_days, &known, 0.0);
            }
        }
        house
    }

    /// Overall house effect = mean poll residual against the current trend;
    /// zero for a pollster with no polls this run.
    fn recompute_overall(
        days: &[TimePoint],
        run_polls: &[RunPoll],
        n_pollsters: usize,
        overall: &mut [f64],
    ) {
        let mut sums = vec![0.0; n_pollsters];
        let mut counts = vec![0usize; n_pollsters];
        for rp in run_polls {
            sums[rp.pollster] += rp.tpp - days[rp.day].trend;
            counts[rp.pollster] += 1;
        }
        for p in 0..n_pollsters {
            overall[p] = if counts[p] == 0 {
                0.0
            } else {
                sums[p] / counts[p] as f64
            };
        }
    }

    /// Day-local debiasing estimator: kernel-weighted residual mean with a
    /// `house_effect_smoothing`-day half-life, recalibrated daily so the
    /// weighted mean over calibration pollsters equals the bias every day.
    fn day_local_house_effects(
        days: &[TimePoint],
        run_polls: &[RunPoll],
        overall: &[f64],
        cfg: &TrendConfig,
        pollsters: &PollsterList,
        house: &mut [Vec<f64>],
    ) {
        let n_days = days.len();
        let half_life = cfg.house_effect_smoothing.max(1e-9);
        for (p, series) in house.iter_mut().enumerate() {
            let own: Vec<(usize, f64)> = run_polls
                .iter()
                .filter(|rp| rp.pollster == p)
                .map(|rp| (rp.day, rp.tpp - days[rp.day].trend))
                .collect();
            if own.is_empty() {
                series.fill(overall[p]);
                continue;
            }
            for (d, slot) in series.iter_mut().enumerate() {
                let kernel = own.iter().map(|&(day, resid)| {
                    let distance = (d as f64 - day as f64).abs();
                    (resid, 0.5f64.powf(distance / half_life))
                });
                *slot = weighted_mean(kernel).unwrap_or(overall[p]);
            }
        }
        // Re-apply calibration day by day.
        for d in 0..n_days {
            let daily = pollsters
                .iter()
                .filter(|(_, def)| def.use_for_calibration)
                .map(|(id, def)| (house[id.index()][d], def.weight));
            if let Some(mean) = weighted_mean(daily) {
                let shift = cfg.calibration_bias - mean;
                for series in house.iter_mut() {
                    series[d] += shift;
                }
            }
        }
    }

    /// Accuracy = RMSE of (raw - house effect - trend) over the pollster's
    /// own polls, floored at `max(0.4, 1.0 - 0.05 * n)` so a pollster with
    /// few agreeing polls cannot claim zero variance.
    fn recompute_accuracy(
        days: &[TimePoint],
        run_polls: &[RunPoll],
        house: &[Vec<f64>],
        n_pollsters: usize,
        accuracy: &mut [f64],
    ) {
        for p in 0..n_pollsters {
            let resids: Vec<f64> = run_polls
                .iter()
                .filter(|rp| rp.pollster == p)
                .map(|rp| rp.tpp - house[p][rp.day] - days[rp.day].trend)
                .collect();
            let floor = (1.0 - 0.05 * resids.len() as f64).max(0.4);
            accuracy[p] = crate::stats::rmse(&resids).max(floor);
        }
    }

    /// One damped, simultaneous offset-search sweep over every day.
    fn sweep_trend(
        days: &mut [TimePoint],
        run_polls: &[RunPoll],
        house: &[Vec<f64>],
        accuracy: &[f64],
        cfg: &TrendConfig,
        offsets: &[f64],
    ) {
        let current: Vec<f64> = days.iter().map(|t| t.trend).collect();
        let mut pending = current.clone();

        for d in 0..days.len() {
            if days[d].anchor.is_some() {
                days[d].error_score =
                    local_score(d, current[d], days, &current, run_polls, house, accuracy, cfg);
                continue;
            }
            let base = local_score(d, current[d], days, &current, run_polls, house, accuracy, cfg);
            days[d].error_score = base;

            let mut best_value = current[d];
            let mut best_score = base;
            for &offset in offsets {
                for sign in [-1.0, 1.0] {
                    let candidate = (current[d] + sign * offset).clamp(0.0, 100.0);
                    let score = local_score(
                        d, candidate, days, &current, run_polls, house, accuracy, cfg,
                    );
                    if score < best_score {
                        best_score = score;
                        best_value = candidate;
                    }
                }
            }
            pending[d] = current[d] + TREND_DAMPING * (best_value - current[d]);
        }

        // Apply all day updates at once; no sweep ever reads a post-update
        // neighbor value.
        for (tp, value) in days.iter_mut().zip(pending) {
            tp.trend = value;
        }
    }

    /// Endpoint uncertainty: inverse of a time-decayed, evidence-weighted
    /// backward sum of poll precision (half-life 2 * trend_smoothing days),
    /// stopping at a discontinuity once enough evidence has accumulated.
    fn final_std_dev(
        days: &[TimePoint],
        run_polls: &[RunPoll],
        accuracy: &[f64],
        cfg: &TrendConfig,
    ) -> f64 {
        let n_days = days.len();
        let half_life = (2.0 * cfg.trend_smoothing).max(1e-9);
        let mut evidence = 0.0;
        for d in (0..n_days).rev() {
            let age = (n_days - 1 - d) as f64;
            let decay = 0.5f64.powf(age / half_life);
            for &i in &days[d].polls {
                let rp = &run_polls[i];
                let sd = accuracy[rp.pollster];
                evidence += rp.weight * decay / (sd * sd).max(1e-9);
            }
            if days[d].discontinuity && evidence > EVIDENCE_STOP {
                break;
            }
        }
        if evidence <= 1.0 / MAX_FINAL_SD {
            MAX_FINAL_SD
        } else {
            1.0 / evidence
        }
    }
}

/// Local 3-point error score for day `d` holding candidate value `v`:
/// inverse-likelihood poll terms on the day plus cubic smoothness penalties
/// to both neighbors (skipped across a discontinuity).
#[allow(clippy::too_many_arguments)]
fn local_score(
    d: usize,
    v: f64,
    days: &[TimePoint],
    current: &[f64],
    run_polls: &[RunPoll],
    house: &[Vec<f64>],
    accuracy: &[f64],
    cfg: &TrendConfig,
) -> f64 {
    let mut score = 0.0;
    for &i in &days[d].polls {
        let rp = &run_polls[i];
        let adjusted = rp.tpp - house[rp.pollster][d];
        let z = (adjusted - v) / accuracy[rp.pollster];
        score += rp.weight / two_sided_survival(z);
    }
    if d > 0 && !days[d].discontinuity {
        score += smoothness_penalty(v - current[d - 1], cfg.trend_smoothing);
    }
    if d + 1 < days.len() && !days[d + 1].discontinuity {
        score += smoothness_penalty(v - current[d + 1], cfg.trend_smoothing);
    }
    score
}

/// Cubic penalty: large day-to-day jumps are punished disproportionately.
fn smoothness_penalty(delta: f64, multiplier: f64) -> f64 {
    (multiplier * delta).abs().powi(3)
}

/// Symmetric offset ladder 0.001, 0.002, 0.004, ... below 1.0.
fn offset_ladder() -> Vec<f64> {
    let mut offsets = Vec::new();
    let mut offset = OFFSET_BASE;
    while offset < 1.0 {
        offsets.push(offset);
        offset *= 2.0;
    }
    offsets
}

/// Linear interpolation through `known` (day, value) points, sorted by day;
/// flat extension on both edges; flat `default` when there are no points.
fn interpolate_known(n_days: usize, known: &[(usize, f64)], default: f64) -> Vec<f64> {
    if known.is_empty() {
        return vec![default; n_days];
    }
    let mut out = vec![0.0; n_days];
    let (first_day, first_value) = known[0];
    let (last_day, last_value) = known[known.len() - 1];
    for slot in out.iter_mut().take(first_day) {
        *slot = first_value;
    }
    for slot in out.iter_mut().skip(last_day) {
        *slot = last_value;
    }
    for w in known.windows(2) {
        let (d0, v0) = w[0];
        let (d1, v1) = w[1];
        let span = (d1 - d0) as f64;
        for d in d0..=d1 {
            let frac = if span == 0.0 {
                0.0
            } else {
                (d - d0) as f64 / span
            };
            out[d] = v0 + frac * (v1 - v0);
        }
    }
    out
}

/// Shift that brings the weighted mean house effect of calibration
/// pollsters to `bias`; zero when no calibration pollster carries weight.
fn calibration_shift(overall: &[f64], pollsters: &PollsterList, bias: f64) -> f64 {
    let calibrated = pollsters
        .iter()
        .filter(|(_, def)| def.use_for_calibration)
        .map(|(id, def)| (overall[id.index()], def.weight));
    match weighted_mean(calibrated) {
        Some(mean) => bias - mean,
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polls::{PollRecord, PollStore, Pollster, PollsterList};
    use crate::types::{Party, PartyList, PollsterId};
    use std::collections::BTreeMap;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn two_party_fixtures() -> (PollsterList, PartyList) {
        let mut pollsters = PollsterList::new();
        pollsters.add(Pollster::new("Newspoll"));
        let mut parties = PartyList::new();
        parties.add(Party::new("ALP", "Labor"));
        parties.add(Party::new("LNP", "Coalition"));
        (pollsters, parties)
    }

    fn store_with(
        polls: &[(NaiveDate, f64)],
        pollsters: &PollsterList,
        parties: &PartyList,
    ) -> PollStore {
        let mut store = PollStore::new();
        for &(date, tpp) in polls {
            store
                .insert(
                    PollRecord {
                        date,
                        pollster: PollsterId(0),
                        primary: BTreeMap::new(),
                        tpp,
                    },
                    pollsters,
                    parties,
                )
                .unwrap();
        }
        store
    }

    fn run(store: &PollStore, pollsters: &PollsterList, cfg: &TrendConfig) -> TrendRun {
        let inputs = TrendInputs {
            polls: store,
            pollsters,
            eff_start: day(1),
            eff_end: day(11),
            anchors: &[],
            discontinuities: &[],
        };
        TrendAggregator::run(&inputs, cfg, &CancelToken::new()).unwrap()
    }

    #[test]
    fn test_zero_polls_stays_flat_at_fifty() {
        let (pollsters, _) = two_party_fixtures();
        let store = PollStore::new();
        let result = run(&store, &pollsters, &TrendConfig::default());

        assert_eq!(result.trend.len(), 11);
        for &value in &result.trend {
            assert!((value - 50.0).abs() < 1e-9, "trend drifted to {value}");
        }
        assert_eq!(result.final_std_dev, 3.0);
    }

    #[test]
    fn test_declining_polls_scenario() {
        // Polls 52 / 50 / 48 on days 0, 5, 10 of an 11-day range: trend
        // converges smoothly from about 52 to about 48 through 50 near the
        // middle, and the single calibration pollster's house effect
        // converges to zero.
        let (pollsters, parties) = two_party_fixtures();
        let store = store_with(
            &[(day(1), 52.0), (day(6), 50.0), (day(11), 48.0)],
            &pollsters,
            &parties,
        );
        let cfg = TrendConfig {
            iterations: 120,
            ..TrendConfig::default()
        };
        let result = run(&store, &pollsters, &cfg);

        assert!((result.trend[0] - 52.0).abs() < 1.0);
        assert!((result.trend[5] - 50.0).abs() < 1.0);
        assert!((result.trend[10] - 48.0).abs() < 1.0);
        // Smooth decline: every step is downward or tiny.
        for w in result.trend.windows(2) {
            assert!(w[1] <= w[0] + 0.25, "trend jumped upward: {w:?}");
        }
        for &he in &result.house_effects[0] {
            assert!(he.abs() < 1e-6, "house effect did not converge: {he}");
        }
    }

    #[test]
    fn test_deterministic_output() {
        let (pollsters, parties) = two_party_fixtures();
        let store = store_with(
            &[(day(2), 51.5), (day(5), 50.5), (day(9), 49.0)],
            &pollsters,
            &parties,
        );
        let cfg = TrendConfig {
            iterations: 80,
            ..TrendConfig::default()
        };
        let a = run(&store, &pollsters, &cfg);
        let b = run(&store, &pollsters, &cfg);

        assert_eq!(a.trend, b.trend);
        assert_eq!(a.house_effects, b.house_effects);
        assert_eq!(a.final_std_dev.to_bits(), b.final_std_dev.to_bits());
    }

    #[test]
    fn test_calibration_invariant_with_two_pollsters() {
        // After every run, the weighted mean house effect of calibration
        // pollsters must equal the configured bias.
        let mut pollsters = PollsterList::new();
        pollsters.add(Pollster::new("A").with_weight(2.0));
        pollsters.add(Pollster::new("B").with_weight(1.0));
        let mut parties = PartyList::new();
        parties.add(Party::new("ALP", "Labor"));
        parties.add(Party::new("LNP", "Coalition"));

        let mut store = PollStore::new();
        for (i, &(d, tpp)) in [(1u32, 53.0), (4, 52.5), (8, 53.5)].iter().enumerate() {
            store
                .insert(
                    PollRecord {
                        date: day(d),
                        pollster: PollsterId(i % 2),
                        primary: BTreeMap::new(),
                        tpp,
                    },
                    &pollsters,
                    &parties,
                )
                .unwrap();
        }

        let cfg = TrendConfig {
            iterations: 90,
            calibration_bias: 0.5,
            ..TrendConfig::default()
        };
        let result = run(&store, &pollsters, &cfg);

        for d in 0..11 {
            let mean = (2.0 * result.house_effects[0][d] + result.house_effects[1][d]) / 3.0;
            assert!(
                (mean - 0.5).abs() < 1e-9,
                "daily calibration broken on day {d}: {mean}"
            );
        }
        let overall_mean =
            (2.0 * result.overall_house_effects[0] + result.overall_house_effects[1]) / 3.0;
        assert!((overall_mean - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_anchor_days_are_pinned() {
        let (pollsters, parties) = two_party_fixtures();
        let store = store_with(&[(day(3), 55.0), (day(9), 55.0)], &pollsters, &parties);
        let anchors = [(day(1), 48.0)];
        let inputs = TrendInputs {
            polls: &store,
            pollsters: &pollsters,
            eff_start: day(1),
            eff_end: day(11),
            anchors: &anchors,
            discontinuities: &[],
        };
        let cfg = TrendConfig {
            iterations: 80,
            ..TrendConfig::default()
        };
        let result = TrendAggregator::run(&inputs, &cfg, &CancelToken::new()).unwrap();

        assert_eq!(result.trend[0], 48.0);
        assert!(result.trend[5] > 49.0, "trend ignored the polls entirely");
    }

    #[test]
    fn test_cancel_aborts_run() {
        let (pollsters, parties) = two_party_fixtures();
        let store = store_with(&[(day(2), 51.0)], &pollsters, &parties);
        let token = CancelToken::new();
        token.cancel();
        let inputs = TrendInputs {
            polls: &store,
            pollsters: &pollsters,
            eff_start: day(1),
            eff_end: day(11),
            anchors: &[],
            discontinuities: &[],
        };
        let err = TrendAggregator::run(&inputs, &TrendConfig::default(), &token).unwrap_err();
        assert!(matches!(err, ForecastError::Cancelled));
    }

    #[test]
    fn test_interpolate_known_edges() {
        let out = interpolate_known(7, &[(2, 10.0), (4, 20.0)], 0.0);
        assert_eq!(out[0], 10.0);
        assert_eq!(out[1], 10.0);
        assert_eq!(out[2], 10.0);
        assert_eq!(out[3], 15.0);
        assert_eq!(out[4], 20.0);
        assert_eq!(out[6], 20.0);

        assert_eq!(interpolate_known(3, &[], 50.0), vec![50.0; 3]);
    }

    #[test]
    fn test_offset_ladder_bounds() {
        let ladder = offset_ladder();
        assert_eq!(ladder[0], 0.001);
        assert!(ladder.iter().all(|&o| o < 1.0));
        assert!(ladder.last().unwrap() > &0.4);
    }
}
