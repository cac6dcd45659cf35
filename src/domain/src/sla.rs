use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable SLA state of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaStatus {
    Ok,
    Warning,
    Breached,
}

impl fmt::Display for SlaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SlaStatus::Ok => "ok",
            SlaStatus::Warning => "warning",
            SlaStatus::Breached => "breached",
        };
        f.write_str(label)
    }
}

/// What a single observation did to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaTransition {
    None,
    Breached,
    Recovered,
}

/// Per-queue SLA state machine.
///
/// `ok → breached` when the head-of-line age reaches the SLA; a breached
/// queue only returns to `ok` once the age drops below
/// `sla · recovery_factor`, which keeps the pair of events from flapping
/// around the threshold. `warning` covers the band
/// `[sla · warn_fraction, sla)` and is observable but emits nothing.
#[derive(Debug, Clone)]
pub struct SlaTracker {
    status: SlaStatus,
    last_transition: Option<DateTime<Utc>>,
}

impl SlaTracker {
    pub fn new() -> Self {
        Self {
            status: SlaStatus::Ok,
            last_transition: None,
        }
    }

    pub fn status(&self) -> SlaStatus {
        self.status
    }

    pub fn last_transition(&self) -> Option<DateTime<Utc>> {
        self.last_transition
    }

    /// Feed one observation through the machine.
    pub fn observe(
        &mut self,
        oldest_job_age_seconds: f64,
        sla_seconds: f64,
        warn_fraction: f64,
        recovery_factor: f64,
    ) -> SlaTransition {
        let next = match self.status {
            SlaStatus::Breached => {
                if oldest_job_age_seconds < sla_seconds * recovery_factor {
                    SlaStatus::Ok
                } else {
                    SlaStatus::Breached
                }
            }
            SlaStatus::Ok | SlaStatus::Warning => {
                if oldest_job_age_seconds >= sla_seconds {
                    SlaStatus::Breached
                } else if oldest_job_age_seconds >= sla_seconds * warn_fraction {
                    SlaStatus::Warning
                } else {
                    SlaStatus::Ok
                }
            }
        };

        let transition = match (self.status, next) {
            (SlaStatus::Breached, SlaStatus::Ok) => SlaTransition::Recovered,
            (previous, SlaStatus::Breached) if previous != SlaStatus::Breached => {
                SlaTransition::Breached
            }
            _ => SlaTransition::None,
        };

        if self.status != next {
            self.last_transition = Some(Utc::now());
        }
        self.status = next;
        transition
    }
}

impl Default for SlaTracker {
    fn default() -> Self {
        Self::new()
    }
}
