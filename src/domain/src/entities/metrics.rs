use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of a single queue as reported by the job broker.
///
/// `avg_job_duration_seconds` is the broker's trailing average when samples
/// exist, otherwise the configured default for the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMetrics {
    /// Jobs waiting to be picked up.
    pub pending: u64,
    /// Jobs currently held by a worker.
    pub reserved: u64,
    /// Successful completions over the trailing window.
    pub throughput_per_minute: f64,
    /// Seconds the head-of-line job has been waiting.
    pub oldest_job_age_seconds: f64,
    /// Jobs enqueued over the trailing window.
    pub arrival_rate_per_minute: f64,
    /// Trailing average service time per job.
    pub avg_job_duration_seconds: f64,
}

impl QueueMetrics {
    /// Snapshot of a queue with nothing in it.
    pub fn idle() -> Self {
        Self {
            pending: 0,
            reserved: 0,
            throughput_per_minute: 0.0,
            oldest_job_age_seconds: 0.0,
            arrival_rate_per_minute: 0.0,
            avg_job_duration_seconds: 1.0,
        }
    }

    /// True when every numeric field is finite and non-negative.
    pub fn is_sane(&self) -> bool {
        let finite = [
            self.throughput_per_minute,
            self.oldest_job_age_seconds,
            self.arrival_rate_per_minute,
            self.avg_job_duration_seconds,
        ];
        finite.iter().all(|v| v.is_finite() && *v >= 0.0)
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_metrics_are_sane() {
        assert!(QueueMetrics::idle().is_sane());
    }

    #[test]
    fn non_finite_metrics_are_flagged() {
        let mut metrics = QueueMetrics::idle();
        metrics.oldest_job_age_seconds = f64::NAN;
        assert!(!metrics.is_sane());

        let mut metrics = QueueMetrics::idle();
        metrics.arrival_rate_per_minute = f64::INFINITY;
        assert!(!metrics.is_sane());
    }
}
