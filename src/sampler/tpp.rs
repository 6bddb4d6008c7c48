//! Parallel TPP percentile-series generation

use crate::cancel::CancelToken;
use crate::config::SamplerConfig;
use crate::error::{ForecastError, Result};
use crate::sampler::support::sample_shares;
use crate::stats::percentile_of_sorted;
use crate::types::{PartyId, PartyList, PercentileSeries};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StudentT};
use std::collections::BTreeMap;
use tracing::info;

/// Stride between worker seeds; each worker gets an independent stream.
const WORKER_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Inputs shared read-only by every worker.
#[derive(Debug, Clone, Copy)]
pub struct TppSeriesInputs<'a> {
    pub series_by_party: &'a BTreeMap<PartyId, PercentileSeries>,
    pub parties: &'a PartyList,
    /// Output percentile levels
    pub levels: &'a [f64],
}

/// Location-scale Student-t preference flow for one minor party.
struct FlowDraw {
    party: PartyId,
    rate: f64,
    deviation: f64,
    dist: StudentT<f64>,
}

/// Build the daily TPP percentile series by repeated share sampling plus
/// randomized preference flows, split across a fixed worker pool with
/// static day-range partitioning.
pub fn tpp_percentile_series(
    inputs: &TppSeriesInputs<'_>,
    cfg: &SamplerConfig,
    seed: u64,
    cancel: &CancelToken,
) -> Result<PercentileSeries> {
    let n_days = inputs
        .series_by_party
        .values()
        .map(|s| s.len())
        .min()
        .unwrap_or(0);
    if n_days == 0 {
        return Err(ForecastError::MissingSeries(
            "party series are empty".into(),
        ));
    }

    let major_one = inputs.parties.major_one();
    let major_two = inputs.parties.major_two();
    if !inputs.series_by_party.contains_key(&major_one) {
        return Err(ForecastError::MissingSeries(
            "no series for the first major party".into(),
        ));
    }

    let mut rows: Vec<Vec<f64>> = vec![Vec::new(); n_days];
    let workers = cfg.workers.max(1);
    let chunk = n_days.div_ceil(workers);
    let samples = cfg.samples_per_day.max(1) as usize;

    std::thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::new();
        for (w, slice) in rows.chunks_mut(chunk).enumerate() {
            let base_day = w * chunk;
            let worker_seed = seed.wrapping_add((w as u64 + 1).wrapping_mul(WORKER_SEED_STRIDE));
            handles.push(scope.spawn(move || -> Result<()> {
                let mut rng = ChaCha8Rng::seed_from_u64(worker_seed);
                let flows = build_flows(inputs, major_one, major_two)?;
                let mut bucket = Vec::with_capacity(samples);

                for (local, row) in slice.iter_mut().enumerate() {
                    if cancel.is_cancelled() {
                        return Err(ForecastError::Cancelled);
                    }
                    let day = base_day + local;
                    bucket.clear();
                    for _ in 0..samples {
                        let shares = sample_shares(inputs.series_by_party, day, &mut rng)?;
                        let mut tpp = *shares.get(&major_one).unwrap_or(&0.0);
                        for flow in &flows {
                            let share = *shares.get(&flow.party).unwrap_or(&0.0);
                            let rate = (flow.rate
                                + flow.deviation * flow.dist.sample(&mut rng))
                            .clamp(0.0, 100.0);
                            tpp += share * rate / 100.0;
                        }
                        bucket.push(tpp.clamp(0.0, 100.0));
                    }
                    bucket.sort_unstable_by(|a, b| a.total_cmp(b));
                    *row = inputs
                        .levels
                        .iter()
                        .map(|&pct| percentile_of_sorted(&bucket, pct))
                        .collect();
                }
                Ok(())
            }));
        }
        for handle in handles {
            handle
                .join()
                .map_err(|_| ForecastError::Numeric("sampler worker panicked".into()))??;
        }
        Ok(())
    })?;

    info!(
        "[Sampler] TPP series over {n_days} days ({workers} workers, {samples} samples/day)"
    );

    let mut series = PercentileSeries::new(inputs.levels.to_vec())?;
    for row in rows {
        series.push_row(row)?;
    }
    Ok(series)
}

/// One Student-t flow per minor party carrying a series;
/// df = max(1, historical samples - 1).
fn build_flows(
    inputs: &TppSeriesInputs<'_>,
    major_one: PartyId,
    major_two: PartyId,
) -> Result<Vec<FlowDraw>> {
    let mut flows = Vec::new();
    for &party in inputs.series_by_party.keys() {
        if party == major_one || party == major_two {
            continue;
        }
        let def = inputs.parties.get(party)?;
        let df = def.preference_flow.samples.saturating_sub(1).max(1) as f64;
        let dist = StudentT::new(df)
            .map_err(|e| ForecastError::Numeric(format!("flow student-t df {df}: {e}")))?;
        flows.push(FlowDraw {
            party,
            rate: def.preference_flow.rate,
            deviation: def.preference_flow.deviation,
            dist,
        });
    }
    Ok(flows)
}
