//! Decision-rewriting policies.
//!
//! Policies run in registration order; every policy sees every decision and
//! may return a replacement. There is no short-circuit, so a veto is simply
//! a rewrite to `hold` that downstream policies observe unchanged. Policy
//! state is in-memory only and resets with the supervisor.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use crate::entities::decision::ScalingDecision;
use crate::entities::queue::QueueConfiguration;

pub mod clamp;
pub mod cooldown;
pub mod hysteresis;
pub mod rate_limit;

pub use clamp::ClampPolicy;
pub use cooldown::CooldownPolicy;
pub use hysteresis::HysteresisPolicy;
pub use rate_limit::RateLimitPolicy;

/// A single policy stage.
///
/// `before_scaling` may return a replacement decision; `after_scaling` sees
/// the final decision once reconciliation ran, which is where time-based
/// policies record state.
pub trait ScalingPolicy: Send {
    fn name(&self) -> &'static str;

    fn before_scaling(
        &mut self,
        decision: &ScalingDecision,
        config: &QueueConfiguration,
        now: Instant,
    ) -> ScalingDecision;

    fn after_scaling(&mut self, _decision: &ScalingDecision, _now: Instant) {}
}

/// Ordered pipeline of policies.
pub struct PolicyPipeline {
    policies: Vec<Box<dyn ScalingPolicy>>,
}

impl PolicyPipeline {
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    /// The standard pipeline: cooldown, hysteresis, rate limit, clamp.
    pub fn with_defaults() -> Self {
        let mut pipeline = Self::new();
        pipeline.push(Box::new(CooldownPolicy::new()));
        pipeline.push(Box::new(HysteresisPolicy::new()));
        pipeline.push(Box::new(RateLimitPolicy::new()));
        pipeline.push(Box::new(ClampPolicy::new()));
        pipeline
    }

    pub fn push(&mut self, policy: Box<dyn ScalingPolicy>) {
        self.policies.push(policy);
    }

    /// Fold the decision through every policy in order. A panicking policy
    /// forfeits its say: the decision is rewritten to `hold` and the
    /// remaining policies still run.
    pub fn before_scaling(
        &mut self,
        decision: ScalingDecision,
        config: &QueueConfiguration,
        now: Instant,
    ) -> ScalingDecision {
        let mut current = decision;
        for policy in &mut self.policies {
            let name = policy.name();
            let outcome =
                catch_unwind(AssertUnwindSafe(|| policy.before_scaling(&current, config, now)));
            current = match outcome {
                Ok(next) => next,
                Err(_) => {
                    tracing::error!(policy = name, queue = %current.key, "policy panicked; holding");
                    current.held(format!("policy error: {}", name))
                }
            };
        }
        current
    }

    pub fn after_scaling(&mut self, decision: &ScalingDecision, now: Instant) {
        for policy in &mut self.policies {
            policy.after_scaling(decision, now);
        }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl Default for PolicyPipeline {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::decision::ScaleAction;
    use crate::test_support;

    struct PanickingPolicy;

    impl ScalingPolicy for PanickingPolicy {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn before_scaling(
            &mut self,
            _decision: &ScalingDecision,
            _config: &QueueConfiguration,
            _now: Instant,
        ) -> ScalingDecision {
            panic!("boom");
        }
    }

    #[test]
    fn default_pipeline_has_four_stages() {
        assert_eq!(PolicyPipeline::with_defaults().len(), 4);
    }

    #[test]
    fn panicking_policy_degrades_to_hold() {
        let config = test_support::config();
        let mut pipeline = PolicyPipeline::new();
        pipeline.push(Box::new(PanickingPolicy));

        let decision =
            ScalingDecision::new(config.key(), 1, 4, "grow", None, "reactive");
        let result = pipeline.before_scaling(decision, &config, Instant::now());
        assert_eq!(result.action, ScaleAction::Hold);
        assert!(result.reason.contains("policy error"));
    }

    #[test]
    fn in_band_decision_passes_default_pipeline_untouched() {
        let config = test_support::config();
        let mut pipeline = PolicyPipeline::with_defaults();
        let decision =
            ScalingDecision::new(config.key(), 1, 4, "grow", None, "reactive");
        let result = pipeline.before_scaling(decision.clone(), &config, Instant::now());
        assert_eq!(result, decision);
    }
}
