//! Pipeline configuration
//!
//! One config struct per stage, composed into [`ForecastConfig`]. Defaults
//! follow the calibrated values used in production forecasts; everything is
//! plain data so scenarios can override any scalar.

use serde::{Deserialize, Serialize};

/// Trend Aggregator parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Full optimization sweeps over the day grid
    pub iterations: u32,
    /// Multiplier inside the cubic day-to-day smoothness penalty
    pub trend_smoothing: f64,
    /// Half-life (days) of the day-local house-effect kernel
    pub house_effect_smoothing: f64,
    /// Target mean house effect of calibration pollsters
    pub calibration_bias: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            iterations: 300,
            trend_smoothing: 2.5,
            house_effect_smoothing: 60.0,
            calibration_bias: 0.0,
        }
    }
}

/// Forward Projector parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Random-walk paths to aggregate
    pub iterations: u32,
    /// Per-day mean reversion toward 50 (fraction of the lead shed daily)
    pub leader_vote_loss: f64,
    /// Standard deviation of the daily Gaussian step
    pub daily_change_sd: f64,
    /// Scale of the Student-t initial offset
    pub initial_sd: f64,
    /// Past elections backing the initial offset; df = max(1, n - 1)
    pub past_elections: u32,
    /// Days before the target in which daily volatility doubles
    pub campaign_window_days: i64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            iterations: 5000,
            leader_vote_loss: 0.002,
            daily_change_sd: 0.08,
            initial_sd: 2.0,
            past_elections: 10,
            campaign_window_days: 30,
        }
    }
}

/// Support Sampler parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Fixed worker pool size for TPP-series generation
    pub workers: usize,
    /// Monte Carlo draws per day when building the TPP percentile series
    pub samples_per_day: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            samples_per_day: 2000,
        }
    }
}

/// Simulation Engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Monte Carlo iterations
    pub iterations: u64,
    /// Base standard deviation of the regional swing draw
    pub regional_sd: f64,
    /// Per-cycle decay applied to a region's historical swing deviation
    pub regional_decay: f64,
    /// Election cycles elapsed since the deviations were measured
    pub elapsed_cycles: u32,
    /// Gaussian noise on each classic seat margin
    pub seat_noise_sd: f64,
    /// Odds above this are cubed and rescaled before inverse-odds
    /// normalization (longshot correction)
    pub longshot_odds_threshold: f64,
    /// Challenger2 odds below this enable the third-place upset check.
    /// Tunable rather than universal; 8.0 matches historical practice.
    pub independent_odds_threshold: f64,
    /// Base margin SD attributed to a live count with half the vote in
    pub live_margin_base_sd: f64,
    /// Counted fraction below which live data is too thin to use
    pub live_significance_floor: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            iterations: 10_000,
            regional_sd: 1.2,
            regional_decay: 0.6,
            elapsed_cycles: 1,
            seat_noise_sd: 2.0,
            longshot_odds_threshold: 2.5,
            independent_odds_threshold: 8.0,
            live_margin_base_sd: 5.0,
            live_significance_floor: 0.005,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForecastConfig {
    pub trend: TrendConfig,
    pub projection: ProjectionConfig,
    pub sampler: SamplerConfig,
    pub simulation: SimulationConfig,
    /// Base seed; every parallel task derives its own independent stream
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = ForecastConfig::default();
        assert!(cfg.trend.iterations > 50);
        assert_eq!(cfg.sampler.workers, 8);
        assert!(cfg.simulation.longshot_odds_threshold > 1.0);
        assert!(cfg.simulation.live_significance_floor < 1.0);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let cfg = ForecastConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ForecastConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.simulation.iterations, cfg.simulation.iterations);
        assert_eq!(back.trend.trend_smoothing, cfg.trend.trend_smoothing);
    }
}
