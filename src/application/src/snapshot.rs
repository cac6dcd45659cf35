use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use domain::entities::queue::QueueKey;
use domain::sla::SlaStatus;
use infrastructure::stdout::JobActivity;

/// Per-queue figures as of the latest tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub key: QueueKey,
    pub pending: u64,
    pub reserved: u64,
    pub throughput_per_minute: f64,
    pub oldest_job_age_seconds: f64,
    pub sla_status: SlaStatus,
    pub active_workers: usize,
    pub target_workers: usize,
    pub strategy: String,
    pub last_reason: String,
}

/// One row per tracked worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub pid: u32,
    pub key: QueueKey,
    pub uptime_seconds: u64,
    pub running: bool,
}

/// Immutable per-tick view of the whole system, published for renderers.
///
/// Rebuilt from scratch each tick; consumers on other threads only ever see
/// completed snapshots, never the live pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputData {
    pub at: DateTime<Utc>,
    pub queues: Vec<QueueSnapshot>,
    pub workers: Vec<WorkerSnapshot>,
    /// Most recent worker stdout activity, oldest first.
    pub activity: Vec<JobActivity>,
    /// Human-readable scaling decisions, oldest first.
    pub scaling_log: Vec<String>,
}

impl OutputData {
    pub fn total_active_workers(&self) -> usize {
        self.queues.iter().map(|q| q.active_workers).sum()
    }

    pub fn breached_queues(&self) -> usize {
        self.queues
            .iter()
            .filter(|q| q.sla_status == SlaStatus::Breached)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(status: SlaStatus, active: usize) -> QueueSnapshot {
        QueueSnapshot {
            key: QueueKey::new("redis", "default"),
            pending: 0,
            reserved: 0,
            throughput_per_minute: 0.0,
            oldest_job_age_seconds: 0.0,
            sla_status: status,
            active_workers: active,
            target_workers: active,
            strategy: "reactive".to_string(),
            last_reason: String::new(),
        }
    }

    #[test]
    fn aggregates_count_across_queues() {
        let data = OutputData {
            at: Utc::now(),
            queues: vec![queue(SlaStatus::Ok, 2), queue(SlaStatus::Breached, 3)],
            workers: Vec::new(),
            activity: Vec::new(),
            scaling_log: Vec::new(),
        };
        assert_eq!(data.total_active_workers(), 5);
        assert_eq!(data.breached_queues(), 1);
    }
}
