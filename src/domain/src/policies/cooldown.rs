use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::entities::decision::{ScaleAction, ScalingDecision};
use crate::entities::queue::{QueueConfiguration, QueueKey};
use crate::policies::ScalingPolicy;

/// Suppresses repeat scaling while a queue's cooldown window is open.
///
/// Up and down cooldowns are tracked independently: a scale-up does not
/// block a later scale-down and vice versa. Windows open in `after_scaling`,
/// so a decision vetoed further down the pipeline does not start one.
#[derive(Debug, Default)]
pub struct CooldownPolicy {
    last_up: HashMap<QueueKey, Instant>,
    last_down: HashMap<QueueKey, Instant>,
}

impl CooldownPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScalingPolicy for CooldownPolicy {
    fn name(&self) -> &'static str {
        "cooldown"
    }

    fn before_scaling(
        &mut self,
        decision: &ScalingDecision,
        config: &QueueConfiguration,
        now: Instant,
    ) -> ScalingDecision {
        let (last, window) = match decision.action {
            ScaleAction::ScaleUp => (
                self.last_up.get(&decision.key),
                Duration::from_secs(config.cooldown_up_seconds),
            ),
            ScaleAction::ScaleDown => (
                self.last_down.get(&decision.key),
                Duration::from_secs(config.cooldown_down_seconds),
            ),
            ScaleAction::Hold => return decision.clone(),
        };

        if let Some(&at) = last {
            let elapsed = now.saturating_duration_since(at);
            if elapsed < window {
                let remaining = window - elapsed;
                return decision.held(format!(
                    "cooldown: {} {}s ago, {}s remaining",
                    decision.action,
                    elapsed.as_secs(),
                    remaining.as_secs()
                ));
            }
        }
        decision.clone()
    }

    fn after_scaling(&mut self, decision: &ScalingDecision, now: Instant) {
        match decision.action {
            ScaleAction::ScaleUp => {
                self.last_up.insert(decision.key.clone(), now);
            }
            ScaleAction::ScaleDown => {
                self.last_down.insert(decision.key.clone(), now);
            }
            ScaleAction::Hold => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn scale_up(config: &QueueConfiguration) -> ScalingDecision {
        ScalingDecision::new(config.key(), 1, 4, "grow", None, "reactive")
    }

    #[test]
    fn first_action_passes() {
        let config = test_support::config();
        let mut policy = CooldownPolicy::new();
        let decision = scale_up(&config);
        let result = policy.before_scaling(&decision, &config, Instant::now());
        assert_eq!(result.action, ScaleAction::ScaleUp);
    }

    #[test]
    fn action_inside_window_is_held() {
        let config = test_support::config();
        let mut policy = CooldownPolicy::new();
        let start = Instant::now();

        let decision = scale_up(&config);
        policy.after_scaling(&decision, start);

        let again = policy.before_scaling(&decision, &config, start + Duration::from_secs(10));
        assert_eq!(again.action, ScaleAction::Hold);
        assert!(again.reason.contains("cooldown"));
    }

    #[test]
    fn action_after_window_passes() {
        let config = test_support::config();
        let mut policy = CooldownPolicy::new();
        let start = Instant::now();

        let decision = scale_up(&config);
        policy.after_scaling(&decision, start);

        let later = policy.before_scaling(
            &decision,
            &config,
            start + Duration::from_secs(config.cooldown_up_seconds + 1),
        );
        assert_eq!(later.action, ScaleAction::ScaleUp);
    }

    #[test]
    fn up_and_down_windows_are_independent() {
        let config = test_support::config();
        let mut policy = CooldownPolicy::new();
        let start = Instant::now();

        policy.after_scaling(&scale_up(&config), start);

        let down = ScalingDecision::new(config.key(), 4, 1, "shrink", None, "reactive");
        let result = policy.before_scaling(&down, &config, start + Duration::from_secs(5));
        assert_eq!(result.action, ScaleAction::ScaleDown);
    }

    #[test]
    fn vetoed_decisions_do_not_open_a_window() {
        let config = test_support::config();
        let mut policy = CooldownPolicy::new();
        let start = Instant::now();

        let held = scale_up(&config).held("vetoed elsewhere");
        policy.after_scaling(&held, start);

        let decision = scale_up(&config);
        let result = policy.before_scaling(&decision, &config, start + Duration::from_secs(1));
        assert_eq!(result.action, ScaleAction::ScaleUp);
    }
}
