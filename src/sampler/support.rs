//! Single-sample vote-share draws

use crate::error::{ForecastError, Result};
use crate::types::{PartyId, PercentileSeries};
use rand::Rng;
use std::collections::BTreeMap;

/// Draw one national vote-share vector for `day`.
///
/// One uniform percentile per party, independently, linearly interpolated
/// between bracketing percentile curves; no cross-party correlation beyond
/// the final renormalization to a 100-point total.
pub fn sample_shares(
    series_by_party: &BTreeMap<PartyId, PercentileSeries>,
    day: usize,
    rng: &mut impl Rng,
) -> Result<BTreeMap<PartyId, f64>> {
    if series_by_party.is_empty() {
        return Err(ForecastError::MissingSeries("no party series".into()));
    }
    let mut shares = BTreeMap::new();
    let mut total = 0.0;
    for (&party, series) in series_by_party {
        let pct = rng.gen::<f64>() * 100.0;
        let value = series.value_at(day, pct)?.max(0.0);
        total += value;
        shares.insert(party, value);
    }
    if total <= f64::EPSILON {
        return Err(ForecastError::Numeric(format!(
            "all sampled shares zero on day {day}"
        )));
    }
    let scale = 100.0 / total;
    for value in shares.values_mut() {
        *value *= scale;
    }
    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn flat_series(value: f64, days: usize) -> PercentileSeries {
        let mut series = PercentileSeries::new(vec![10.0, 50.0, 90.0]).unwrap();
        for _ in 0..days {
            series.push_row(vec![value, value, value]).unwrap();
        }
        series
    }

    #[test]
    fn test_shares_renormalize_to_one_hundred() {
        let mut by_party = BTreeMap::new();
        by_party.insert(PartyId(0), flat_series(38.0, 1));
        by_party.insert(PartyId(1), flat_series(36.0, 1));
        by_party.insert(PartyId(2), flat_series(16.0, 1));

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let shares = sample_shares(&by_party, 0, &mut rng).unwrap();
        let total: f64 = shares.values().sum();
        assert!((total - 100.0).abs() < 1e-9);
        // Flat curves: ratios survive renormalization exactly.
        assert!((shares[&PartyId(0)] / shares[&PartyId(1)] - 38.0 / 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_zero_shares_is_a_guarded_degeneracy() {
        let mut by_party = BTreeMap::new();
        by_party.insert(PartyId(0), flat_series(0.0, 1));
        by_party.insert(PartyId(1), flat_series(0.0, 1));

        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let err = sample_shares(&by_party, 0, &mut rng).unwrap_err();
        assert!(matches!(err, ForecastError::Numeric(_)));
    }

    #[test]
    fn test_missing_day_propagates() {
        let mut by_party = BTreeMap::new();
        by_party.insert(PartyId(0), flat_series(50.0, 1));
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(sample_shares(&by_party, 5, &mut rng).is_err());
    }

    #[test]
    fn test_same_stream_same_sample() {
        let mut by_party = BTreeMap::new();
        let mut spread = PercentileSeries::new(vec![10.0, 50.0, 90.0]).unwrap();
        spread.push_row(vec![30.0, 35.0, 40.0]).unwrap();
        by_party.insert(PartyId(0), spread);
        by_party.insert(PartyId(1), flat_series(60.0, 1));

        let a = sample_shares(&by_party, 0, &mut ChaCha8Rng::seed_from_u64(9)).unwrap();
        let b = sample_shares(&by_party, 0, &mut ChaCha8Rng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }
}
