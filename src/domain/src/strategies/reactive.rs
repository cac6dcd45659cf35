use shared::error::Result;

use crate::calculators::{clamp_to_limits, required_workers};
use crate::entities::metrics::QueueMetrics;
use crate::entities::queue::QueueConfiguration;
use crate::strategies::{check_metrics, effective_job_duration, ScalingStrategy};

/// Little's Law sizing against half the SLA, driven purely by the current
/// backlog. The default strategy.
///
/// Targeting half the SLA leaves headroom for the control-loop delay: a job
/// admitted just after a tick still waits most of a tick before the next
/// decision can react to it.
#[derive(Debug, Default)]
pub struct ReactiveStrategy {
    reason: String,
}

impl ReactiveStrategy {
    pub const NAME: &'static str = "reactive";

    pub fn new() -> Self {
        Self::default()
    }
}

impl ScalingStrategy for ReactiveStrategy {
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

        let duration = effective_job_duration(metrics, config);
        let pickup_target = config.sla_seconds / 2.0;
        let raw = required_workers(metrics.pending, duration, pickup_target, config.min_workers);
        let target = clamp_to_limits(raw, config.min_workers, config.max_workers);

        self.reason = if raw == 0 && target == config.min_workers {
            "minimum workers".to_string()
        } else if raw > config.max_workers {
            format!(
                "pending={} wants {} workers, capped at max {}",
                metrics.pending, raw, config.max_workers
            )
        } else {
            format!(
                "pending={} avg_duration={:.1}s sized for pickup within {:.0}s",
                metrics.pending, duration, pickup_target
            )
        };
        Ok(target)
    }

    fn last_reason(&self) -> &str {
        &self.reason
    }
}
