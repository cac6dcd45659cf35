use serde::{Deserialize, Serialize};
use shared::error::{Error, Result};
use std::fmt;

/// Identity of a queue: broker connection plus queue name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueKey {
    pub connection: String,
    pub queue: String,
}

impl QueueKey {
    pub fn new(connection: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            queue: queue.into(),
        }
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.connection, self.queue)
    }
}

/// Resolved, immutable per-queue configuration.
///
/// Produced by the configuration layer after merging strategy defaults into
/// per-queue overrides; every knob the scaling core consults lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfiguration {
    pub connection: String,
    pub queue: String,
    /// Maximum acceptable pickup latency in seconds.
    pub sla_seconds: f64,
    pub min_workers: usize,
    pub max_workers: usize,
    /// Registered strategy name, e.g. "reactive".
    pub strategy: String,
    pub cooldown_up_seconds: u64,
    pub cooldown_down_seconds: u64,
    /// Minimum absolute reduction before a scale-down is allowed.
    pub hysteresis_delta: usize,
    /// Minimum reduction as a fraction of current workers.
    pub hysteresis_fraction: f64,
    /// Per-tick step caps; 0 disables the cap.
    pub max_step_up: usize,
    pub max_step_down: usize,
    /// Backlog drain horizon for drain-based sizing.
    pub drain_horizon_seconds: f64,
    /// How far ahead the trend predictor looks.
    pub predict_lookahead_seconds: f64,
    /// Ring-buffer size for trend samples.
    pub trend_samples: usize,
    /// Conservative strategy refuses to grow until pending exceeds this.
    pub pending_threshold: u64,
    /// Fraction of the SLA at which the queue enters the warning band.
    pub warn_fraction: f64,
    /// Fraction of the SLA below which a breached queue recovers.
    pub recovery_factor: f64,
    /// Service-time assumption when the broker has no samples.
    pub default_job_duration_seconds: f64,
}

impl QueueConfiguration {
    pub fn key(&self) -> QueueKey {
        QueueKey::new(self.connection.clone(), self.queue.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection.trim().is_empty() || self.queue.trim().is_empty() {
            return Err(Error::Configuration(
                "queue connection and name cannot be empty".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(Error::Configuration(format!(
                "{}: max_workers must be at least 1",
                self.key()
            )));
        }
        if self.min_workers > self.max_workers {
            return Err(Error::Configuration(format!(
                "{}: min_workers ({}) exceeds max_workers ({})",
                self.key(),
                self.min_workers,
                self.max_workers
            )));
        }
        if !(self.sla_seconds.is_finite() && self.sla_seconds > 0.0) {
            return Err(Error::Configuration(format!(
                "{}: sla_seconds must be a positive number",
                self.key()
            )));
        }
        if !(0.0..1.0).contains(&self.warn_fraction) {
            return Err(Error::Configuration(format!(
                "{}: warn_fraction must be in [0, 1)",
                self.key()
            )));
        }
        if !(0.0..=1.0).contains(&self.recovery_factor) {
            return Err(Error::Configuration(format!(
                "{}: recovery_factor must be in [0, 1]",
                self.key()
            )));
        }
        if self.trend_samples < 3 {
            return Err(Error::Configuration(format!(
                "{}: trend_samples must be at least 3",
                self.key()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::config as sample;

    #[test]
    fn valid_configuration_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn min_above_max_is_rejected() {
        let mut config = sample();
        config.min_workers = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_sla_is_rejected() {
        let mut config = sample();
        config.sla_seconds = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn key_formats_as_connection_and_queue() {
        assert_eq!(sample().key().to_string(), "redis:default");
    }
}
