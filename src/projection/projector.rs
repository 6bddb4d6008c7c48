//! Mean-reverting stochastic projection

use crate::config::ProjectionConfig;
use crate::error::{ForecastError, Result};
use crate::types::PercentileSeries;
use chrono::NaiveDate;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, StudentT};
use tracing::info;

/// Inputs taken from the Trend Aggregator's output.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionInputs {
    /// Trend value on the last aggregated day
    pub endpoint: f64,
    /// Endpoint uncertainty from the aggregator
    pub final_std_dev: f64,
    /// Last aggregated day; projection covers `horizon..=target`
    pub horizon: NaiveDate,
    pub target: NaiveDate,
}

/// Per-day sample mean and SD of the projected TPP.
///
/// Day 0 is the horizon itself (the initial draw); the last day is the
/// target. Empty when the target is not after the horizon; callers must
/// not run downstream stages on an empty projection.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    pub horizon: NaiveDate,
    pub mean: Vec<f64>,
    pub sd: Vec<f64>,
}

impl Projection {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub fn final_mean(&self) -> Option<f64> {
        self.mean.last().copied()
    }

    pub fn final_sd(&self) -> Option<f64> {
        self.sd.last().copied()
    }

    /// Normal-quantile percentile series over the projected days.
    pub fn percentile_series(&self, levels: Vec<f64>) -> Result<PercentileSeries> {
        if self.is_empty() {
            return Err(ForecastError::MissingSeries("empty projection".into()));
        }
        PercentileSeries::from_normal(&self.mean, &self.sd, levels)
    }
}

pub struct ForwardProjector;

impl ForwardProjector {
    /// Project the trend endpoint forward to the target date.
    ///
    /// A degenerate target (not after the horizon) yields an empty
    /// projection rather than an error; Preparation treats it as fatal.
    pub fn run(
        inputs: &ProjectionInputs,
        cfg: &ProjectionConfig,
        seed: u64,
    ) -> Result<Projection> {
        let extra_days = (inputs.target - inputs.horizon).num_days();
        if extra_days <= 0 {
            return Ok(Projection {
                horizon: inputs.horizon,
                ..Projection::default()
            });
        }
        let n_days = extra_days as usize + 1;

        let df = cfg.past_elections.saturating_sub(1).max(1) as f64;
        let initial_t = StudentT::new(df)
            .map_err(|e| ForecastError::Numeric(format!("student-t df {df}: {e}")))?;
        let initial_noise = Normal::new(0.0, 2.0 * inputs.final_std_dev.max(0.0))
            .map_err(|e| ForecastError::Numeric(format!("initial noise: {e}")))?;
        let daily = Normal::new(0.0, cfg.daily_change_sd.max(0.0))
            .map_err(|e| ForecastError::Numeric(format!("daily noise: {e}")))?;
        // Campaign volatility: the daily step doubles close to the target.
        let campaign = Normal::new(0.0, 2.0 * cfg.daily_change_sd.max(0.0))
            .map_err(|e| ForecastError::Numeric(format!("campaign noise: {e}")))?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut sums = vec![0.0; n_days];
        let mut sq_sums = vec![0.0; n_days];

        for _ in 0..cfg.iterations {
            let offset =
                initial_t.sample(&mut rng) * cfg.initial_sd + initial_noise.sample(&mut rng);
            let mut value = (inputs.endpoint + offset).clamp(0.0, 100.0);
            sums[0] += value;
            sq_sums[0] += value * value;

            for day in 1..n_days {
                value -= cfg.leader_vote_loss * (value - 50.0);
                let remaining = (n_days - 1 - day) as i64;
                let step = if remaining <= cfg.campaign_window_days {
                    campaign.sample(&mut rng)
                } else {
                    daily.sample(&mut rng)
                };
                value = (value + step).clamp(0.0, 100.0);
                sums[day] += value;
                sq_sums[day] += value * value;
            }
        }

        let n = cfg.iterations.max(1) as f64;
        let mean: Vec<f64> = sums.iter().map(|s| s / n).collect();
        let sd: Vec<f64> = sq_sums
            .iter()
            .zip(&mean)
            .map(|(sq, m)| (sq / n - m * m).max(0.0).sqrt())
            .collect();

        info!(
            "[Projection] {} days, endpoint {:.2} -> mean {:.2} sd {:.2}",
            n_days,
            inputs.endpoint,
            mean.last().copied().unwrap_or(0.0),
            sd.last().copied().unwrap_or(0.0),
        );

        Ok(Projection {
            horizon: inputs.horizon,
            mean,
            sd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, d).unwrap()
    }

    fn inputs(horizon: u32, target: u32) -> ProjectionInputs {
        ProjectionInputs {
            endpoint: 51.0,
            final_std_dev: 1.0,
            horizon: day(horizon),
            target: day(target),
        }
    }

    #[test]
    fn test_degenerate_target_yields_empty_result() {
        let cfg = ProjectionConfig::default();
        let same = ForwardProjector::run(&inputs(10, 10), &cfg, 1).unwrap();
        assert!(same.is_empty());
        let before = ForwardProjector::run(&inputs(10, 5), &cfg, 1).unwrap();
        assert!(before.is_empty());
        assert!(before.percentile_series(vec![50.0]).is_err());
    }

    #[test]
    fn test_zero_drift_zero_daily_noise_holds_mean() {
        // With no mean reversion and no daily noise every path is constant
        // at its initial draw: the mean series is identical on every day and
        // all spread stems from the initial draw.
        let cfg = ProjectionConfig {
            iterations: 1000,
            leader_vote_loss: 0.0,
            daily_change_sd: 0.0,
            ..ProjectionConfig::default()
        };
        let projection = ForwardProjector::run(&inputs(1, 11), &cfg, 42).unwrap();

        assert_eq!(projection.len(), 11);
        assert!((projection.mean[0] - 51.0).abs() < 0.5);
        for d in 1..11 {
            assert_eq!(projection.mean[d].to_bits(), projection.mean[0].to_bits());
            assert_eq!(projection.sd[d].to_bits(), projection.sd[0].to_bits());
        }
        assert!(projection.sd[0] > 0.0);
    }

    #[test]
    fn test_projection_clamped_to_valid_shares() {
        let cfg = ProjectionConfig {
            iterations: 500,
            daily_change_sd: 10.0,
            initial_sd: 20.0,
            ..ProjectionConfig::default()
        };
        let extreme = ProjectionInputs {
            endpoint: 97.0,
            final_std_dev: 5.0,
            horizon: day(1),
            target: day(21),
        };
        let projection = ForwardProjector::run(&extreme, &cfg, 7).unwrap();
        for (&m, &s) in projection.mean.iter().zip(&projection.sd) {
            assert!((0.0..=100.0).contains(&m));
            assert!(s.is_finite());
        }
    }

    #[test]
    fn test_mean_reversion_pulls_toward_fifty() {
        let cfg = ProjectionConfig {
            iterations: 2000,
            leader_vote_loss: 0.05,
            daily_change_sd: 0.0,
            initial_sd: 0.0,
            ..ProjectionConfig::default()
        };
        let mut start = inputs(1, 28);
        start.endpoint = 60.0;
        start.final_std_dev = 0.0;
        let projection = ForwardProjector::run(&start, &cfg, 3).unwrap();

        assert!((projection.mean[0] - 60.0).abs() < 1e-9);
        let last = projection.final_mean().unwrap();
        assert!(last < 58.0 && last > 50.0, "reversion off: {last}");
        // Monotone decline toward 50.
        for w in projection.mean.windows(2) {
            assert!(w[1] <= w[0] + 1e-9);
        }
    }

    #[test]
    fn test_same_seed_same_projection() {
        let cfg = ProjectionConfig {
            iterations: 200,
            ..ProjectionConfig::default()
        };
        let a = ForwardProjector::run(&inputs(1, 15), &cfg, 99).unwrap();
        let b = ForwardProjector::run(&inputs(1, 15), &cfg, 99).unwrap();
        assert_eq!(a.mean, b.mean);
        assert_eq!(a.sd, b.sd);
    }
}
