//! Iteration results, reduction accumulator, and the aggregate report

use serde::Serialize;

/// Cumulative-probability thresholds for the probability-bound seat counts.
pub const PROBABILITY_BOUND_THRESHOLDS: [f64; 8] =
    [0.01, 0.05, 0.10, 0.25, 0.75, 0.90, 0.95, 0.99];

/// National outcome of one draw, classified against seats/2 + 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResultClass {
    Majority(usize),
    Lead(usize),
    Tie,
}

/// Result of one Monte Carlo draw. Owned exclusively by its iteration and
/// handed to the reduction; never shared while in flight.
#[derive(Debug, Clone)]
pub(crate) struct IterationOutcome {
    /// Winning party index per seat (actual party, not folded)
    pub winners: Vec<usize>,
    /// Incumbent-oriented simulated margin, classic path only
    pub margins: Vec<Option<f64>>,
    /// Seats per party with counts-as-major minors folded in
    pub folded_seats: Vec<u64>,
    pub classification: ResultClass,
}

/// Additive per-run accumulator. One lives per rayon fold branch; merge is
/// the only cross-branch operation and runs strictly after the branches
/// finish.
#[derive(Debug, Clone)]
pub(crate) struct Accumulator {
    pub iterations: u64,
    pub seat_party_wins: Vec<Vec<u64>>,
    pub seat_margin_sum: Vec<f64>,
    pub seat_margin_count: Vec<u64>,
    pub seat_count_freq: Vec<Vec<u64>>,
    pub majority: Vec<u64>,
    pub lead: Vec<u64>,
    pub tie: u64,
}

impl Accumulator {
    /// Sized exactly once; nothing resizes during Iteration.
    pub fn sized(n_seats: usize, n_parties: usize) -> Self {
        Self {
            iterations: 0,
            seat_party_wins: vec![vec![0; n_parties]; n_seats],
            seat_margin_sum: vec![0.0; n_seats],
            seat_margin_count: vec![0; n_seats],
            seat_count_freq: vec![vec![0; n_seats + 1]; n_parties],
            majority: vec![0; n_parties],
            lead: vec![0; n_parties],
            tie: 0,
        }
    }

    pub fn record(&mut self, outcome: &IterationOutcome) {
        self.iterations += 1;
        for (seat, &winner) in outcome.winners.iter().enumerate() {
            self.seat_party_wins[seat][winner] += 1;
            if let Some(margin) = outcome.margins[seat] {
                self.seat_margin_sum[seat] += margin;
                self.seat_margin_count[seat] += 1;
            }
        }
        for (party, &count) in outcome.folded_seats.iter().enumerate() {
            self.seat_count_freq[party][count as usize] += 1;
        }
        match outcome.classification {
            ResultClass::Majority(p) => self.majority[p] += 1,
            ResultClass::Lead(p) => self.lead[p] += 1,
            ResultClass::Tie => self.tie += 1,
        }
    }

    pub fn merge(&mut self, other: Self) {
        self.iterations += other.iterations;
        for (a, b) in self.seat_party_wins.iter_mut().zip(other.seat_party_wins) {
            for (x, y) in a.iter_mut().zip(b) {
                *x += y;
            }
        }
        for (a, b) in self.seat_margin_sum.iter_mut().zip(other.seat_margin_sum) {
            *a += b;
        }
        for (a, b) in self.seat_margin_count.iter_mut().zip(other.seat_margin_count) {
            *a += b;
        }
        for (a, b) in self.seat_count_freq.iter_mut().zip(other.seat_count_freq) {
            for (x, y) in a.iter_mut().zip(b) {
                *x += y;
            }
        }
        for (a, b) in self.majority.iter_mut().zip(other.majority) {
            *a += b;
        }
        for (a, b) in self.lead.iter_mut().zip(other.lead) {
            *a += b;
        }
        self.tie += other.tie;
    }

    /// Completion: reduce the accumulated counts into the report.
    pub fn finish(self, ctx: ReportContext) -> AggregateReport {
        let n = self.iterations.max(1) as f64;
        let seat_win_pct = self
            .seat_party_wins
            .iter()
            .map(|wins| wins.iter().map(|&w| 100.0 * w as f64 / n).collect())
            .collect();
        let seat_mean_margin = self
            .seat_margin_sum
            .iter()
            .zip(&self.seat_margin_count)
            .map(|(&sum, &count)| if count == 0 { 0.0 } else { sum / count as f64 })
            .collect();
        let seat_expectation = self
            .seat_count_freq
            .iter()
            .map(|freq| {
                freq.iter()
                    .enumerate()
                    .map(|(count, &f)| count as f64 * f as f64)
                    .sum::<f64>()
                    / n
            })
            .collect();
        let probability_bounds = self
            .seat_count_freq
            .iter()
            .map(|freq| first_crossings(freq, self.iterations))
            .collect();

        AggregateReport {
            iterations: self.iterations,
            seat_names: ctx.seat_names,
            party_codes: ctx.party_codes,
            seat_win_pct,
            seat_mean_margin,
            seat_count_freq: self.seat_count_freq,
            seat_expectation,
            majority_pct: self.majority.iter().map(|&c| 100.0 * c as f64 / n).collect(),
            lead_pct: self.lead.iter().map(|&c| 100.0 * c as f64 / n).collect(),
            tie_pct: 100.0 * self.tie as f64 / n,
            probability_bounds,
            bound_thresholds: PROBABILITY_BOUND_THRESHOLDS.to_vec(),
            trend_series: ctx.trend_series,
            projection_mean: ctx.projection_mean,
            projection_sd: ctx.projection_sd,
        }
    }
}

/// Labels and upstream series embedded into the report at Completion.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReportContext {
    pub seat_names: Vec<String>,
    pub party_codes: Vec<String>,
    pub trend_series: Vec<f64>,
    pub projection_mean: Vec<f64>,
    pub projection_sd: Vec<f64>,
}

/// First seat count at which the cumulative win frequency reaches each
/// threshold: a monotonic first-crossing scan, no interpolation.
fn first_crossings(freq: &[u64], iterations: u64) -> Vec<u32> {
    PROBABILITY_BOUND_THRESHOLDS
        .iter()
        .map(|&threshold| {
            let needed = threshold * iterations as f64;
            let mut cumulative = 0u64;
            for (count, &f) in freq.iter().enumerate() {
                cumulative += f;
                if cumulative as f64 + 1e-9 >= needed {
                    return count as u32;
                }
            }
            freq.len().saturating_sub(1) as u32
        })
        .collect()
}

/// The sole externally consumed output of a simulation run. Built
/// additively across iterations; read-only once the run completes.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub iterations: u64,
    pub seat_names: Vec<String>,
    pub party_codes: Vec<String>,
    /// Win percentage per seat per (actual) party
    pub seat_win_pct: Vec<Vec<f64>>,
    /// Running average of the simulated incumbent margin per seat
    pub seat_mean_margin: Vec<f64>,
    /// `[party][seat count] ->` draws in which the party won exactly that many
    pub seat_count_freq: Vec<Vec<u64>>,
    pub seat_expectation: Vec<f64>,
    pub majority_pct: Vec<f64>,
    /// Led on seats without reaching seats/2 + 1
    pub lead_pct: Vec<f64>,
    pub tie_pct: f64,
    /// `[party][threshold] ->` first-crossing seat count
    pub probability_bounds: Vec<Vec<u32>>,
    pub bound_thresholds: Vec<f64>,
    pub trend_series: Vec<f64>,
    pub projection_mean: Vec<f64>,
    pub projection_sd: Vec<f64>,
}

impl AggregateReport {
    /// Win percentage for one seat and party.
    pub fn seat_win(&self, seat: usize, party: usize) -> f64 {
        self.seat_win_pct
            .get(seat)
            .and_then(|row| row.get(party))
            .copied()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(winners: Vec<usize>, folded: Vec<u64>, class: ResultClass) -> IterationOutcome {
        let margins = vec![None; winners.len()];
        IterationOutcome {
            winners,
            margins,
            folded_seats: folded,
            classification: class,
        }
    }

    #[test]
    fn test_record_and_merge_agree() {
        let mut single = Accumulator::sized(2, 2);
        let mut left = Accumulator::sized(2, 2);
        let mut right = Accumulator::sized(2, 2);

        let a = outcome(vec![0, 0], vec![2, 0], ResultClass::Majority(0));
        let b = outcome(vec![0, 1], vec![1, 1], ResultClass::Tie);

        single.record(&a);
        single.record(&b);
        left.record(&a);
        right.record(&b);
        left.merge(right);

        assert_eq!(single.iterations, left.iterations);
        assert_eq!(single.seat_party_wins, left.seat_party_wins);
        assert_eq!(single.seat_count_freq, left.seat_count_freq);
        assert_eq!(single.majority, left.majority);
        assert_eq!(single.tie, left.tie);
    }

    #[test]
    fn test_probability_bounds_are_monotonic() {
        // Skewed frequency histogram over 0..=10 seats.
        let freq = [1u64, 4, 10, 25, 30, 15, 8, 4, 2, 1, 0];
        let total: u64 = freq.iter().sum();
        let bounds = first_crossings(&freq, total);

        for w in bounds.windows(2) {
            assert!(w[0] <= w[1], "bounds regressed: {bounds:?}");
        }
        assert!(bounds[0] <= 1);
        assert!(*bounds.last().unwrap() <= 10);
    }

    #[test]
    fn test_first_crossing_exact_boundaries() {
        // 50/50 split across counts 3 and 7 over 100 draws.
        let mut freq = vec![0u64; 11];
        freq[3] = 50;
        freq[7] = 50;
        let bounds = first_crossings(&freq, 100);
        // Thresholds up to 0.25 are satisfied at count 3.
        assert_eq!(bounds[0], 3);
        assert_eq!(bounds[3], 3);
        // 0.75 and beyond need count 7.
        assert_eq!(bounds[4], 7);
        assert_eq!(bounds[7], 7);
    }

    #[test]
    fn test_finish_percentages_and_expectation() {
        let mut acc = Accumulator::sized(2, 2);
        for _ in 0..3 {
            acc.record(&outcome(vec![0, 0], vec![2, 0], ResultClass::Majority(0)));
        }
        acc.record(&outcome(vec![1, 1], vec![0, 2], ResultClass::Majority(1)));

        let report = acc.finish(ReportContext::default());
        assert_eq!(report.iterations, 4);
        assert!((report.seat_win(0, 0) - 75.0).abs() < 1e-9);
        assert!((report.seat_expectation[0] - 1.5).abs() < 1e-9);
        assert!((report.majority_pct[0] - 75.0).abs() < 1e-9);
        assert!((report.majority_pct[1] - 25.0).abs() < 1e-9);
        assert_eq!(report.tie_pct, 0.0);
    }
}
