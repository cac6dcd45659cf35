use serde::{Deserialize, Serialize};
use shared::error::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use domain::entities::queue::QueueConfiguration;
use domain::strategies;

/// Top-level supervisor configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
    #[serde(default = "default_shutdown_deadline_seconds")]
    pub shutdown_deadline_seconds: u64,
    #[serde(default = "default_grace_period_seconds")]
    pub grace_period_seconds: u64,
    /// System-wide worker ceiling across all queues; absent means unbounded.
    #[serde(default)]
    pub global_max_workers: Option<usize>,
    #[serde(default = "default_metrics_url")]
    pub metrics_url: String,
    #[serde(default)]
    pub worker: WorkerCommandConfig,
    #[serde(default)]
    pub strategy_defaults: StrategyDefaults,
    #[serde(default)]
    pub queues: Vec<QueueEntry>,
}

/// How worker child processes are invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerCommandConfig {
    #[serde(default = "default_worker_command")]
    pub command: String,
    #[serde(default = "default_worker_tries")]
    pub tries: u32,
    #[serde(default = "default_worker_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_worker_sleep_seconds")]
    pub sleep_seconds: u64,
}

impl Default for WorkerCommandConfig {
    fn default() -> Self {
        Self {
            command: default_worker_command(),
            tries: default_worker_tries(),
            timeout_seconds: default_worker_timeout_seconds(),
            sleep_seconds: default_worker_sleep_seconds(),
        }
    }
}

/// Strategy parameters applied wherever a queue does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDefaults {
    /// 0 derives the horizon from the queue SLA.
    #[serde(default)]
    pub drain_horizon_seconds: f64,
    #[serde(default = "default_predict_lookahead_seconds")]
    pub predict_lookahead_seconds: f64,
    #[serde(default = "default_trend_samples")]
    pub trend_samples: usize,
}

impl Default for StrategyDefaults {
    fn default() -> Self {
        Self {
            drain_horizon_seconds: 0.0,
            predict_lookahead_seconds: default_predict_lookahead_seconds(),
            trend_samples: default_trend_samples(),
        }
    }
}

/// One `[[queues]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub connection: String,
    pub queue: String,
    pub sla_seconds: f64,
    #[serde(default)]
    pub min_workers: usize,
    pub max_workers: usize,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_cooldown_up_seconds")]
    pub cooldown_up_seconds: u64,
    #[serde(default = "default_cooldown_down_seconds")]
    pub cooldown_down_seconds: u64,
    #[serde(default = "default_hysteresis_delta")]
    pub hysteresis_delta: usize,
    #[serde(default = "default_hysteresis_fraction")]
    pub hysteresis_fraction: f64,
    #[serde(default)]
    pub max_step_up: usize,
    #[serde(default)]
    pub max_step_down: usize,
    #[serde(default)]
    pub pending_threshold: u64,
    #[serde(default = "default_warn_fraction")]
    pub warn_fraction: f64,
    #[serde(default = "default_recovery_factor")]
    pub recovery_factor: f64,
    #[serde(default = "default_job_duration_seconds")]
    pub default_job_duration_seconds: f64,
    #[serde(default)]
    pub drain_horizon_seconds: Option<f64>,
    #[serde(default)]
    pub predict_lookahead_seconds: Option<f64>,
    #[serde(default)]
    pub trend_samples: Option<usize>,
}

fn default_tick_seconds() -> u64 {
    5
}
fn default_shutdown_deadline_seconds() -> u64 {
    60
}
fn default_grace_period_seconds() -> u64 {
    30
}
fn default_metrics_url() -> String {
    "http://127.0.0.1:6001".to_string()
}
fn default_worker_command() -> String {
    "worker".to_string()
}
fn default_worker_tries() -> u32 {
    1
}
fn default_worker_timeout_seconds() -> u64 {
    60
}
fn default_worker_sleep_seconds() -> u64 {
    3
}
fn default_predict_lookahead_seconds() -> f64 {
    30.0
}
fn default_trend_samples() -> usize {
    10
}
fn default_strategy() -> String {
    "reactive".to_string()
}
fn default_cooldown_up_seconds() -> u64 {
    60
}
fn default_cooldown_down_seconds() -> u64 {
    120
}
fn default_hysteresis_delta() -> usize {
    2
}
fn default_hysteresis_fraction() -> f64 {
    0.2
}
fn default_warn_fraction() -> f64 {
    0.8
}
fn default_recovery_factor() -> f64 {
    0.8
}
fn default_job_duration_seconds() -> f64 {
    1.0
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&raw)
    }

    /// Parse and validate configuration text.
    pub fn parse(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_seconds == 0 {
            return Err(Error::Configuration(
                "tick_seconds must be at least 1".to_string(),
            ));
        }
        if self.queues.is_empty() {
            return Err(Error::Configuration(
                "at least one [[queues]] entry is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for resolved in self.queue_configurations() {
            resolved.validate()?;
            // Building the strategy validates the name against the registry.
            strategies::strategy_for(&resolved)?;
            if !seen.insert(resolved.key()) {
                return Err(Error::Configuration(format!(
                    "duplicate queue entry {}",
                    resolved.key()
                )));
            }
        }
        Ok(())
    }

    /// Per-queue configurations with strategy defaults folded in.
    pub fn queue_configurations(&self) -> Vec<QueueConfiguration> {
        self.queues
            .iter()
            .map(|entry| QueueConfiguration {
                connection: entry.connection.clone(),
                queue: entry.queue.clone(),
                sla_seconds: entry.sla_seconds,
                min_workers: entry.min_workers,
                max_workers: entry.max_workers,
                strategy: entry.strategy.clone(),
                cooldown_up_seconds: entry.cooldown_up_seconds,
                cooldown_down_seconds: entry.cooldown_down_seconds,
                hysteresis_delta: entry.hysteresis_delta,
                hysteresis_fraction: entry.hysteresis_fraction,
                max_step_up: entry.max_step_up,
                max_step_down: entry.max_step_down,
                drain_horizon_seconds: entry
                    .drain_horizon_seconds
                    .unwrap_or(self.strategy_defaults.drain_horizon_seconds),
                predict_lookahead_seconds: entry
                    .predict_lookahead_seconds
                    .unwrap_or(self.strategy_defaults.predict_lookahead_seconds),
                trend_samples: entry
                    .trend_samples
                    .unwrap_or(self.strategy_defaults.trend_samples),
                pending_threshold: entry.pending_threshold,
                warn_fraction: entry.warn_fraction,
                recovery_factor: entry.recovery_factor,
                default_job_duration_seconds: entry.default_job_duration_seconds,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[queues]]
        connection = "redis"
        queue = "default"
        sla_seconds = 30.0
        max_workers = 5
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.tick_seconds, 5);
        assert_eq!(config.shutdown_deadline_seconds, 60);
        assert_eq!(config.grace_period_seconds, 30);
        assert_eq!(config.global_max_workers, None);
        assert_eq!(config.worker.tries, 1);

        let queues = config.queue_configurations();
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].strategy, "reactive");
        assert_eq!(queues[0].trend_samples, 10);
        assert_eq!(queues[0].cooldown_up_seconds, 60);
    }

    #[test]
    fn queue_overrides_beat_strategy_defaults() {
        let raw = r#"
            [strategy_defaults]
            predict_lookahead_seconds = 45.0
            trend_samples = 20

            [[queues]]
            connection = "redis"
            queue = "mail"
            sla_seconds = 60.0
            max_workers = 3
            strategy = "predictive"
            trend_samples = 5
        "#;
        let config = Config::parse(raw).unwrap();
        let queues = config.queue_configurations();
        assert_eq!(queues[0].predict_lookahead_seconds, 45.0);
        assert_eq!(queues[0].trend_samples, 5);
    }

    #[test]
    fn missing_queues_are_rejected() {
        assert!(Config::parse("tick_seconds = 5").is_err());
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let raw = r#"
            [[queues]]
            connection = "redis"
            queue = "default"
            sla_seconds = 30.0
            max_workers = 5
            strategy = "psychic"
        "#;
        let err = Config::parse(raw).unwrap_err();
        assert!(err.to_string().contains("psychic"));
    }

    #[test]
    fn duplicate_queues_are_rejected() {
        let raw = r#"
            [[queues]]
            connection = "redis"
            queue = "default"
            sla_seconds = 30.0
            max_workers = 5

            [[queues]]
            connection = "redis"
            queue = "default"
            sla_seconds = 10.0
            max_workers = 2
        "#;
        let err = Config::parse(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn min_above_max_is_rejected() {
        let raw = r#"
            [[queues]]
            connection = "redis"
            queue = "default"
            sla_seconds = 30.0
            min_workers = 9
            max_workers = 5
        "#;
        assert!(Config::parse(raw).is_err());
    }

    #[test]
    fn malformed_toml_is_a_configuration_error() {
        match Config::parse("not [valid toml") {
            Err(Error::Configuration(_)) => {}
            other => panic!("expected configuration error, got {:?}", other.err()),
        }
    }
}
