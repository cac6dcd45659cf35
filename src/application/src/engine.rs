use std::collections::HashMap;
use std::time::Instant;

use shared::error::Result;

use domain::entities::decision::ScalingDecision;
use domain::entities::metrics::QueueMetrics;
use domain::entities::queue::{QueueConfiguration, QueueKey};
use domain::strategies::{strategy_for, ScalingStrategy};

/// Turns queue metrics into scaling decisions.
///
/// Holds one strategy instance per configured queue, resolved once at
/// startup; queues may run different strategies. The engine does not clamp
/// beyond what strategies already do and never fails a tick: a strategy
/// error becomes a `hold` decision carrying the error as its reason.
pub struct ScalingEngine {
    strategies: HashMap<QueueKey, Box<dyn ScalingStrategy>>,
    started: Instant,
}

impl ScalingEngine {
    /// Resolve a strategy for every queue. Unknown strategy names fail here,
    /// before the supervisor ever runs a tick.
    pub fn from_configs(configs: &[QueueConfiguration]) -> Result<Self> {
        let mut strategies = HashMap::new();
        for config in configs {
            strategies.insert(config.key(), strategy_for(config)?);
        }
        Ok(Self {
            strategies,
            started: Instant::now(),
        })
    }

    /// Decide this tick's target for one queue.
    pub fn decide(
        &mut self,
        config: &QueueConfiguration,
        metrics: &QueueMetrics,
        current_workers: usize,
    ) -> ScalingDecision {
        let key = config.key();
        let Some(strategy) = self.strategies.get_mut(&key) else {
            // A queue added by reload without a registered strategy; the
            // supervisor re-registers on reload, so this is belt-and-braces.
            return ScalingDecision::hold(key, current_workers, "no strategy registered", "none");
        };

        let now_seconds = self.started.elapsed().as_secs_f64();
        match strategy.target_workers(metrics, config, now_seconds) {
            Ok(target) => ScalingDecision::new(
                key,
                current_workers,
                target,
                strategy.last_reason(),
                strategy.last_prediction(),
                strategy.name(),
            ),
            Err(e) => {
                tracing::warn!(queue = %key, error = %e, "strategy failed; holding");
                ScalingDecision::hold(
                    key,
                    current_workers,
                    format!("calculator error: {}", e),
                    strategy.name(),
                )
            }
        }
    }

    /// Swap in strategies for an updated queue set (configuration reload).
    /// Existing instances are kept so per-queue state like trend samples
    /// survives a reload that does not touch the queue.
    pub fn update_configs(&mut self, configs: &[QueueConfiguration]) -> Result<()> {
        let mut next: HashMap<QueueKey, Box<dyn ScalingStrategy>> = HashMap::new();
        for config in configs {
            let key = config.key();
            match self.strategies.remove(&key) {
                Some(existing) if existing.name() == config.strategy => {
                    next.insert(key, existing);
                }
                _ => {
                    next.insert(key, strategy_for(config)?);
                }
            }
        }
        self.strategies = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::entities::decision::ScaleAction;

    fn config(strategy: &str) -> QueueConfiguration {
        QueueConfiguration {
            connection: "redis".to_string(),
            queue: "default".to_string(),
            sla_seconds: 30.0,
            min_workers: 1,
            max_workers: 5,
            strategy: strategy.to_string(),
            cooldown_up_seconds: 60,
            cooldown_down_seconds: 120,
            hysteresis_delta: 2,
            hysteresis_fraction: 0.2,
            max_step_up: 0,
            max_step_down: 0,
            drain_horizon_seconds: 0.0,
            predict_lookahead_seconds: 30.0,
            trend_samples: 10,
            pending_threshold: 10,
            warn_fraction: 0.8,
            recovery_factor: 0.8,
            default_job_duration_seconds: 1.0,
        }
    }

    fn metrics(pending: u64) -> QueueMetrics {
        QueueMetrics {
            pending,
            ..QueueMetrics::idle()
        }
    }

    #[test]
    fn decision_carries_strategy_provenance() {
        let config = config("reactive");
        let mut engine = ScalingEngine::from_configs(std::slice::from_ref(&config)).unwrap();

        let decision = engine.decide(&config, &metrics(100), 1);
        assert_eq!(decision.action, ScaleAction::ScaleUp);
        assert_eq!(decision.to_workers, 5);
        assert_eq!(decision.source_strategy, "reactive");
        assert!(!decision.reason.is_empty());
    }

    #[test]
    fn strategy_failure_becomes_a_hold() {
        let config = config("reactive");
        let mut engine = ScalingEngine::from_configs(std::slice::from_ref(&config)).unwrap();

        let mut bad = metrics(10);
        bad.oldest_job_age_seconds = f64::NAN;
        let decision = engine.decide(&config, &bad, 3);
        assert_eq!(decision.action, ScaleAction::Hold);
        assert_eq!(decision.to_workers, 3);
        assert!(decision.reason.starts_with("calculator error"));
    }

    #[test]
    fn unknown_strategy_fails_at_construction() {
        let config = config("psychic");
        assert!(ScalingEngine::from_configs(std::slice::from_ref(&config)).is_err());
    }

    #[test]
    fn reload_keeps_matching_strategies_and_replaces_changed_ones() {
        let reactive = config("reactive");
        let mut engine = ScalingEngine::from_configs(std::slice::from_ref(&reactive)).unwrap();

        let conservative = config("conservative");
        engine
            .update_configs(std::slice::from_ref(&conservative))
            .unwrap();
        let decision = engine.decide(&conservative, &metrics(5), 1);
        assert_eq!(decision.source_strategy, "conservative");
    }
}
