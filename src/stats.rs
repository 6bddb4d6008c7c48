//! Shared statistical helpers
//!
//! Small, dependency-free numerics used across the pipeline:
//! - Standard normal CDF / quantile (Abramowitz-Stegun erf, Acklam inverse)
//! - Percentile extraction from sorted samples
//! - Weighted means and RMSE with explicit zero-variance guards
//!
//! Every division that can feed a probability is floored; a NaN reaching a
//! probability computation is a bug, not a runtime condition.

/// Floor applied to likelihoods and variances before division.
pub const LIKELIHOOD_FLOOR: f64 = 1e-12;

/// Error function, Abramowitz & Stegun 7.1.26 (max abs error ~1.5e-7).
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.3275911 * x);
    let y = 1.0
        - (((((1.061405429 * t - 1.453152027) * t) + 1.421413741) * t - 0.284496736) * t
            + 0.254829592)
            * t
            * (-x * x).exp();
    sign * y
}

/// Standard normal cumulative distribution function.
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Two-sided survival probability of |z| under the standard normal,
/// floored so callers can safely take its inverse.
pub fn two_sided_survival(z: f64) -> f64 {
    let p = 2.0 * (1.0 - normal_cdf(z.abs()));
    p.max(LIKELIHOOD_FLOOR)
}

/// Inverse of the standard normal CDF (Acklam's rational approximation,
/// relative error below 1.15e-9 over (0, 1)).
pub fn normal_quantile(p: f64) -> f64 {
    debug_assert!(p.is_finite());
    let p = p.clamp(LIKELIHOOD_FLOOR, 1.0 - LIKELIHOOD_FLOOR);

    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

/// Percentile of an ascending-sorted slice, `pct` in [0, 100], linear
/// interpolation between bracketing ranks.
pub fn percentile_of_sorted(sorted: &[f64], pct: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] + frac * (sorted[hi] - sorted[lo])
    }
}

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Weight-weighted mean over `(value, weight)` pairs.
/// Returns `None` when the total weight is below the likelihood floor.
pub fn weighted_mean(pairs: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let mut num = 0.0;
    let mut den = 0.0;
    for (value, weight) in pairs {
        num += value * weight;
        den += weight;
    }
    if den <= LIKELIHOOD_FLOOR {
        None
    } else {
        Some(num / den)
    }
}

/// Root-mean-square of residuals; 0.0 for an empty slice.
pub fn rmse(residuals: &[f64]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64).sqrt()
}

/// Precision-weighted blend of two estimates with variances `v1`, `v2`.
/// Variances are floored; the blend never overwrites either input.
pub fn precision_blend(m1: f64, v1: f64, m2: f64, v2: f64) -> f64 {
    let p1 = 1.0 / v1.max(LIKELIHOOD_FLOOR);
    let p2 = 1.0 / v2.max(LIKELIHOOD_FLOOR);
    (m1 * p1 + m2 * p2) / (p1 + p2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_cdf_known_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((normal_cdf(-1.96) - 0.025).abs() < 1e-3);
        assert!(normal_cdf(6.0) > 0.999999);
    }

    #[test]
    fn test_normal_quantile_round_trip() {
        for p in [0.01, 0.05, 0.25, 0.5, 0.75, 0.95, 0.99] {
            let z = normal_quantile(p);
            assert!(
                (normal_cdf(z) - p).abs() < 1e-5,
                "round trip failed at p={p}: z={z}"
            );
        }
    }

    #[test]
    fn test_normal_quantile_symmetry() {
        assert!((normal_quantile(0.5)).abs() < 1e-8);
        assert!((normal_quantile(0.1) + normal_quantile(0.9)).abs() < 1e-6);
    }

    #[test]
    fn test_two_sided_survival_floor() {
        assert!(two_sided_survival(50.0) >= LIKELIHOOD_FLOOR);
        // Tolerance matches the erf approximation error, not machine eps.
        assert!((two_sided_survival(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_percentile_of_sorted() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_of_sorted(&v, 0.0), 1.0);
        assert_eq!(percentile_of_sorted(&v, 100.0), 5.0);
        assert_eq!(percentile_of_sorted(&v, 50.0), 3.0);
        assert!((percentile_of_sorted(&v, 25.0) - 2.0).abs() < 1e-12);
        assert_eq!(percentile_of_sorted(&[7.0], 30.0), 7.0);
    }

    #[test]
    fn test_weighted_mean_guards_zero_weight() {
        assert_eq!(weighted_mean(std::iter::empty()), None);
        assert_eq!(weighted_mean([(5.0, 0.0)].into_iter()), None);
        let m = weighted_mean([(2.0, 1.0), (4.0, 3.0)].into_iter()).unwrap();
        assert!((m - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_precision_blend_limits() {
        // Huge live variance: blend stays at the prior.
        let b = precision_blend(3.0, 1.0, 10.0, 1e12);
        assert!((b - 3.0).abs() < 1e-6);
        // Tiny live variance: blend collapses onto the observation.
        let b = precision_blend(3.0, 1.0, 10.0, 1e-9);
        assert!((b - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_rmse() {
        assert_eq!(rmse(&[]), 0.0);
        assert!((rmse(&[3.0, -4.0]) - (12.5f64).sqrt()).abs() < 1e-12);
    }
}
