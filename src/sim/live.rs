//! Live-count derivations and precision-weighted blending inputs

use crate::sim::seats::{LiveCount, Seat};

/// Incumbent-oriented margin implied by the live two-candidate count:
/// incumbent share of the counted two-candidate vote minus 50.
/// `None` when no votes are in or the incumbent is not in the count.
pub fn live_seat_margin(seat: &Seat, live: &LiveCount) -> Option<f64> {
    let (first, second) = live.totals();
    let total = first + second;
    if total <= 0.0 {
        return None;
    }
    let incumbent_votes = if live.first == seat.incumbent {
        first
    } else if live.second == seat.incumbent {
        second
    } else {
        return None;
    };
    Some(100.0 * incumbent_votes / total - 50.0)
}

/// Variance attributed to a live-derived margin. `base_sd` is the margin SD
/// with half the enrolment counted; the variance shrinks toward zero as the
/// counted fraction approaches one and blows up as it approaches zero.
pub fn live_margin_variance(counted_fraction: f64, base_sd: f64) -> f64 {
    let f = counted_fraction.clamp(1e-6, 1.0);
    base_sd * base_sd * (1.0 - f).max(0.0) / f
}
