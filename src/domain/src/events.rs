use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::decision::ScaleAction;
use crate::entities::queue::QueueKey;

/// Lifecycle events emitted by the supervisor.
///
/// Value records only: every sink receives the same immutable event, in the
/// order decisions were made within a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AutoscaleEvent {
    WorkersScaled {
        key: QueueKey,
        from_workers: usize,
        to_workers: usize,
        action: ScaleAction,
        reason: String,
        at: DateTime<Utc>,
    },
    SlaBreached {
        key: QueueKey,
        oldest_job_age_seconds: f64,
        sla_seconds: f64,
        pending: u64,
        active_workers: usize,
        at: DateTime<Utc>,
    },
    SlaRecovered {
        key: QueueKey,
        oldest_job_age_seconds: f64,
        sla_seconds: f64,
        pending: u64,
        active_workers: usize,
        at: DateTime<Utc>,
    },
    DegradedModeEntered {
        key: QueueKey,
        consecutive_failures: u32,
        at: DateTime<Utc>,
    },
    DegradedModeRecovered {
        key: QueueKey,
        at: DateTime<Utc>,
    },
}

impl AutoscaleEvent {
    pub fn key(&self) -> &QueueKey {
        match self {
            AutoscaleEvent::WorkersScaled { key, .. }
            | AutoscaleEvent::SlaBreached { key, .. }
            | AutoscaleEvent::SlaRecovered { key, .. }
            | AutoscaleEvent::DegradedModeEntered { key, .. }
            | AutoscaleEvent::DegradedModeRecovered { key, .. } => key,
        }
    }
}

/// Consumer of supervisor events. Implementations must not block: they run
/// on the control thread between reconciliation steps.
pub trait EventSink: Send {
    fn emit(&self, event: &AutoscaleEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_expose_their_queue() {
        let event = AutoscaleEvent::SlaBreached {
            key: QueueKey::new("redis", "default"),
            oldest_job_age_seconds: 35.0,
            sla_seconds: 30.0,
            pending: 12,
            active_workers: 2,
            at: Utc::now(),
        };
        assert_eq!(event.key().to_string(), "redis:default");
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let event = AutoscaleEvent::DegradedModeRecovered {
            key: QueueKey::new("redis", "default"),
            at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"degraded_mode_recovered\""));
    }
}
