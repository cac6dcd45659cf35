use std::time::Instant;

use crate::entities::decision::{ScaleAction, ScalingDecision};
use crate::entities::queue::QueueConfiguration;
use crate::policies::ScalingPolicy;

/// Caps how far a single tick may move the worker count.
///
/// `max_step_up` / `max_step_down` of zero leave that direction uncapped.
#[derive(Debug, Default)]
pub struct RateLimitPolicy;

impl RateLimitPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl ScalingPolicy for RateLimitPolicy {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn before_scaling(
        &mut self,
        decision: &ScalingDecision,
        config: &QueueConfiguration,
        _now: Instant,
    ) -> ScalingDecision {
        match decision.action {
            ScaleAction::ScaleUp if config.max_step_up > 0 => {
                let step = decision.to_workers - decision.from_workers;
                if step > config.max_step_up {
                    let capped = decision.from_workers + config.max_step_up;
                    return decision.with_target(
                        capped,
                        format!(
                            "rate limit: step of {} capped at {} per tick",
                            step, config.max_step_up
                        ),
                    );
                }
                decision.clone()
            }
            ScaleAction::ScaleDown if config.max_step_down > 0 => {
                let step = decision.from_workers - decision.to_workers;
                if step > config.max_step_down {
                    let capped = decision.from_workers - config.max_step_down;
                    return decision.with_target(
                        capped,
                        format!(
                            "rate limit: step of {} capped at {} per tick",
                            step, config.max_step_down
                        ),
                    );
                }
                decision.clone()
            }
            _ => decision.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn wide_step_up_is_capped() {
        let mut config = test_support::config();
        config.max_step_up = 2;
        let mut policy = RateLimitPolicy::new();
        let decision = ScalingDecision::new(config.key(), 1, 10, "grow", None, "reactive");
        let result = policy.before_scaling(&decision, &config, Instant::now());
        assert_eq!(result.to_workers, 3);
        assert_eq!(result.action, ScaleAction::ScaleUp);
        assert!(result.reason.contains("rate limit"));
    }

    #[test]
    fn wide_step_down_is_capped() {
        let mut config = test_support::config();
        config.max_step_down = 1;
        let mut policy = RateLimitPolicy::new();
        let decision = ScalingDecision::new(config.key(), 8, 2, "shrink", None, "reactive");
        let result = policy.before_scaling(&decision, &config, Instant::now());
        assert_eq!(result.to_workers, 7);
    }

    #[test]
    fn zero_cap_means_unlimited() {
        let config = test_support::config();
        let mut policy = RateLimitPolicy::new();
        let decision = ScalingDecision::new(config.key(), 1, 100, "grow", None, "reactive");
        let result = policy.before_scaling(&decision, &config, Instant::now());
        assert_eq!(result.to_workers, 100);
    }

    #[test]
    fn in_step_changes_pass() {
        let mut config = test_support::config();
        config.max_step_up = 5;
        let mut policy = RateLimitPolicy::new();
        let decision = ScalingDecision::new(config.key(), 1, 4, "grow", None, "reactive");
        assert_eq!(
            policy.before_scaling(&decision, &config, Instant::now()),
            decision
        );
    }
}
