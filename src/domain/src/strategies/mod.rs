//! Scaling strategies: pluggable sizing logic composed from the calculators.
//!
//! One strategy instance exists per configured queue, so per-queue state
//! (trend samples, last reason) needs no keying. Strategy names are resolved
//! through [`strategy_for`] at startup; an unknown name is a configuration
//! error, not a runtime fallback.

use shared::error::{Error, Result};

use crate::entities::metrics::QueueMetrics;
use crate::entities::queue::QueueConfiguration;

pub mod conservative;
pub mod drain;
pub mod predictive;
pub mod reactive;

pub use conservative::ConservativeStrategy;
pub use drain::AggressiveDrainStrategy;
pub use predictive::PredictiveStrategy;
pub use reactive::ReactiveStrategy;

/// Sizing logic for a single queue.
///
/// `target_workers` returns an already-clamped worker count;
/// `last_reason` and `last_prediction` expose what the engine records on the
/// decision for observability.
pub trait ScalingStrategy: Send {
    fn name(&self) -> &'static str;

    /// Compute the desired worker count for this tick. `now_seconds` is a
    /// monotonic clock the predictive strategy uses to timestamp samples.
    fn target_workers(
        &mut self,
        metrics: &QueueMetrics,
        config: &QueueConfiguration,
        now_seconds: f64,
    ) -> Result<usize>;

    fn last_reason(&self) -> &str;

    fn last_prediction(&self) -> Option<f64> {
        None
    }
}

pub const KNOWN_STRATEGIES: &[&str] = &[
    ReactiveStrategy::NAME,
    PredictiveStrategy::NAME,
    AggressiveDrainStrategy::NAME,
    ConservativeStrategy::NAME,
];

/// Resolve the strategy named in the queue configuration.
pub fn strategy_for(config: &QueueConfiguration) -> Result<Box<dyn ScalingStrategy>> {
    match config.strategy.as_str() {
        ReactiveStrategy::NAME => Ok(Box::new(ReactiveStrategy::new())),
        PredictiveStrategy::NAME => Ok(Box::new(PredictiveStrategy::new(config))),
        AggressiveDrainStrategy::NAME => Ok(Box::new(AggressiveDrainStrategy::new())),
        ConservativeStrategy::NAME => Ok(Box::new(ConservativeStrategy::new())),
        other => Err(Error::Configuration(format!(
            "unknown scaling strategy '{}' for {} (expected one of {})",
            other,
            config.key(),
            KNOWN_STRATEGIES.join(", ")
        ))),
    }
}

/// Service time to assume this tick: broker samples when present, otherwise
/// the configured default.
pub(crate) fn effective_job_duration(metrics: &QueueMetrics, config: &QueueConfiguration) -> f64 {
    if metrics.avg_job_duration_seconds > 0.0 {
        metrics.avg_job_duration_seconds
    } else {
        config.default_job_duration_seconds
    }
}

/// Reject snapshots the math cannot safely consume.
pub(crate) fn check_metrics(metrics: &QueueMetrics, config: &QueueConfiguration) -> Result<()> {
    if !metrics.is_sane() {
        return Err(Error::Calculator(format!(
            "non-finite metrics for {}",
            config.key()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn registry_resolves_all_known_names() {
        for name in KNOWN_STRATEGIES {
            let mut config = test_support::config();
            config.strategy = name.to_string();
            let strategy = strategy_for(&config).unwrap();
            assert_eq!(strategy.name(), *name);
        }
    }

    #[test]
    fn unknown_name_is_a_configuration_error() {
        let mut config = test_support::config();
        config.strategy = "psychic".to_string();
        match strategy_for(&config) {
            Err(Error::Configuration(message)) => assert!(message.contains("psychic")),
            other => panic!("expected configuration error, got {:?}", other.map(|s| s.name())),
        }
    }

    #[test]
    fn non_finite_metrics_are_rejected() {
        let config = test_support::config();
        let mut metrics = test_support::metrics(5, 1.0);
        metrics.throughput_per_minute = f64::NAN;
        assert!(check_metrics(&metrics, &config).is_err());
    }
}
