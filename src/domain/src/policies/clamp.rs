use std::time::Instant;

use crate::calculators::clamp_to_limits;
use crate::entities::decision::ScalingDecision;
use crate::entities::queue::QueueConfiguration;
use crate::policies::ScalingPolicy;

/// Final `[min, max]` enforcement. Strategies already clamp; this stage
/// catches anything an upstream policy or a future strategy lets through.
#[derive(Debug, Default)]
pub struct ClampPolicy;

impl ClampPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl ScalingPolicy for ClampPolicy {
    fn name(&self) -> &'static str {
        "clamp"
    }

    fn before_scaling(
        &mut self,
        decision: &ScalingDecision,
        config: &QueueConfiguration,
        _now: Instant,
    ) -> ScalingDecision {
        let clamped = clamp_to_limits(decision.to_workers, config.min_workers, config.max_workers);
        if clamped == decision.to_workers {
            return decision.clone();
        }
        decision.with_target(
            clamped,
            format!(
                "{} (clamped to [{}, {}])",
                decision.reason, config.min_workers, config.max_workers
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::decision::ScaleAction;
    use crate::test_support;

    #[test]
    fn overshoot_is_pulled_back_to_max() {
        let config = test_support::config();
        let mut policy = ClampPolicy::new();
        let decision = ScalingDecision::new(config.key(), 1, 50, "grow", None, "reactive");
        let result = policy.before_scaling(&decision, &config, Instant::now());
        assert_eq!(result.to_workers, config.max_workers);
        assert!(result.reason.contains("clamped"));
    }

    #[test]
    fn undershoot_is_raised_to_min() {
        let config = test_support::config();
        let mut policy = ClampPolicy::new();
        let decision = ScalingDecision::new(config.key(), 3, 0, "shrink", None, "reactive");
        let result = policy.before_scaling(&decision, &config, Instant::now());
        assert_eq!(result.to_workers, config.min_workers);
    }

    #[test]
    fn clamp_to_current_becomes_hold() {
        let mut config = test_support::config();
        config.max_workers = 3;
        let mut policy = ClampPolicy::new();
        let decision = ScalingDecision::new(config.key(), 3, 9, "grow", None, "reactive");
        let result = policy.before_scaling(&decision, &config, Instant::now());
        assert_eq!(result.action, ScaleAction::Hold);
    }

    #[test]
    fn in_band_decision_is_untouched() {
        let config = test_support::config();
        let mut policy = ClampPolicy::new();
        let decision = ScalingDecision::new(config.key(), 1, 4, "grow", None, "reactive");
        assert_eq!(
            policy.before_scaling(&decision, &config, Instant::now()),
            decision
        );
    }
}
