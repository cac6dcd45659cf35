use shared::error::Result;

use crate::calculators::{clamp_to_limits, required_workers};
use crate::entities::metrics::QueueMetrics;
use crate::entities::queue::QueueConfiguration;
use crate::strategies::{check_metrics, effective_job_duration, ScalingStrategy};

/// Stability-first sizing: Little's Law against the full SLA rather than a
/// fraction of it, and no growth at all until the backlog clears the
/// configured pending threshold.
#[derive(Debug, Default)]
pub struct ConservativeStrategy {
    reason: String,
}

impl ConservativeStrategy {
    pub const NAME: &'static str = "conservative";

    pub fn new() -> Self {
        Self::default()
    }
}

impl ScalingStrategy for ConservativeStrategy {
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

        if metrics.pending <= config.pending_threshold {
            self.reason = format!(
                "pending {} at or below threshold {}; holding at minimum",
                metrics.pending, config.pending_threshold
            );
            return Ok(config.min_workers);
        }

        let duration = effective_job_duration(metrics, config);
        let raw = required_workers(
            metrics.pending,
            duration,
            config.sla_seconds,
            config.min_workers,
        );
        let target = clamp_to_limits(raw, config.min_workers, config.max_workers);
        self.reason = format!(
            "pending={} above threshold {}; sized for pickup within SLA {:.0}s",
            metrics.pending, config.pending_threshold, config.sla_seconds
        );
        Ok(target)
    }

    fn last_reason(&self) -> &str {
        &self.reason
    }
}
