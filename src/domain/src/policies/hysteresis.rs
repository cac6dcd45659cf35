use std::time::Instant;

use crate::entities::decision::{ScaleAction, ScalingDecision};
use crate::entities::queue::QueueConfiguration;
use crate::policies::ScalingPolicy;

/// Dead-band against scale-down flapping.
///
/// A reduction must shed at least `hysteresis_delta` workers or
/// `hysteresis_fraction` of the current pool, whichever is larger, or it is
/// rewritten to hold. Scale-up is never gated: over-provisioning briefly is
/// cheaper than missing the SLA.
#[derive(Debug, Default)]
pub struct HysteresisPolicy;

impl HysteresisPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl ScalingPolicy for HysteresisPolicy {
    fn name(&self) -> &'static str {
        "hysteresis"
    }

    fn before_scaling(
        &mut self,
        decision: &ScalingDecision,
        config: &QueueConfiguration,
        _now: Instant,
    ) -> ScalingDecision {
        if decision.action != ScaleAction::ScaleDown {
            return decision.clone();
        }

        let reduction = decision.from_workers.saturating_sub(decision.to_workers);
        let fractional =
            (decision.from_workers as f64 * config.hysteresis_fraction).ceil() as usize;
        let required = config.hysteresis_delta.max(fractional).max(1);

        if reduction < required {
            return decision.held(format!(
                "hysteresis: reduction of {} below dead-band {}",
                reduction, required
            ));
        }
        decision.clone()
    }
}
