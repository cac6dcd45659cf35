use shared::error::Result;

use crate::calculators::{clamp_to_limits, workers_to_drain};
use crate::entities::metrics::QueueMetrics;
use crate::entities::queue::QueueConfiguration;
use crate::strategies::{check_metrics, effective_job_duration, ScalingStrategy};

/// Backlog-drain sizing: clear what is queued within half the SLA while
/// absorbing the arrival rate. An explicitly configured drain horizon
/// overrides the SLA-derived one.
#[derive(Debug, Default)]
pub struct AggressiveDrainStrategy {
    reason: String,
}

impl AggressiveDrainStrategy {
    pub const NAME: &'static str = "aggressive_drain";

    pub fn new() -> Self {
        Self::default()
    }
}

impl ScalingStrategy for AggressiveDrainStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn target_workers(
        &mut self,
        metrics: &QueueMetrics,
        config: &QueueConfiguration,
        _now_seconds: f64,
    ) -> Result<usize> {
        check_metrics(metrics, config)?;

        let horizon = if config.drain_horizon_seconds > 0.0 {
            config.drain_horizon_seconds
        } else {
            config.sla_seconds / 2.0
        };
        let duration = effective_job_duration(metrics, config);
        let raw = workers_to_drain(
            metrics.pending,
            metrics.arrival_rate_per_minute,
            duration,
            horizon,
            config.max_workers,
        );
        let target = clamp_to_limits(raw, config.min_workers, config.max_workers);

        self.reason = if raw == 0 && target == config.min_workers {
            "minimum workers".to_string()
        } else if raw >= config.max_workers {
            format!(
                "drain demand {} at or above max {}; arrivals {:.1}/min",
                raw, config.max_workers, metrics.arrival_rate_per_minute
            )
        } else {
            format!(
                "drain {} pending within {:.0}s absorbing {:.1}/min",
                metrics.pending, horizon, metrics.arrival_rate_per_minute
            )
        };
        Ok(target)
    }

    fn last_reason(&self) -> &str {
        &self.reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn drains_within_configured_horizon() {
        let mut config = test_support::config();
        config.drain_horizon_seconds = 30.0;
        config.max_workers = 20;
        // 60 pending / 30s + 0 arrivals at 1s each -> 2 workers.
        let mut strategy = AggressiveDrainStrategy::new();
        let target = strategy
            .target_workers(&test_support::metrics(60, 10.0), &config, 0.0)
            .unwrap();
        assert_eq!(target, 2);
    }

    #[test]
    fn horizon_defaults_to_half_sla() {
        let mut config = test_support::config();
        config.drain_horizon_seconds = 0.0;
        config.max_workers = 20;
        // 60 pending / 15s -> 4 workers.
        let mut strategy = AggressiveDrainStrategy::new();
        let target = strategy
            .target_workers(&test_support::metrics(60, 10.0), &config, 0.0)
            .unwrap();
        assert_eq!(target, 4);
    }

    #[test]
    fn saturating_arrivals_pin_to_max() {
        let mut config = test_support::config();
        config.max_workers = 5;
        let mut metrics = test_support::metrics(0, 0.0);
        metrics.arrival_rate_per_minute = 600.0;
        let mut strategy = AggressiveDrainStrategy::new();
        let target = strategy.target_workers(&metrics, &config, 0.0).unwrap();
        assert_eq!(target, 5);
        assert!(strategy.last_reason().contains("at or above max"));
    }

    #[test]
    fn idle_queue_rests_at_minimum() {
        let config = test_support::config();
        let mut strategy = AggressiveDrainStrategy::new();
        let target = strategy
            .target_workers(&test_support::metrics(0, 0.0), &config, 0.0)
            .unwrap();
        assert_eq!(target, config.min_workers);
        assert_eq!(strategy.last_reason(), "minimum workers");
    }
}
