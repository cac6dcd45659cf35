use crate::entities::metrics::QueueMetrics;
use crate::entities::queue::QueueConfiguration;

pub(crate) fn config() -> QueueConfiguration {
    QueueConfiguration {
        connection: "redis".to_string(),
        queue: "default".to_string(),
        sla_seconds: 30.0,
        min_workers: 1,
        max_workers: 5,
        strategy: "reactive".to_string(),
        cooldown_up_seconds: 60,
        cooldown_down_seconds: 120,
        hysteresis_delta: 2,
        hysteresis_fraction: 0.2,
        max_step_up: 0,
        max_step_down: 0,
        drain_horizon_seconds: 15.0,
        predict_lookahead_seconds: 30.0,
        trend_samples: 10,
        pending_threshold: 10,
        warn_fraction: 0.8,
        recovery_factor: 0.8,
        default_job_duration_seconds: 1.0,
    }
}

pub(crate) fn metrics(pending: u64, oldest_age: f64) -> QueueMetrics {
    QueueMetrics {
        pending,
        reserved: 0,
        throughput_per_minute: 0.0,
        oldest_job_age_seconds: oldest_age,
        arrival_rate_per_minute: 0.0,
        avg_job_duration_seconds: 1.0,
    }
}
