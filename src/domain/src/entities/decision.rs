use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entities::queue::QueueKey;

/// Direction of a scaling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleAction {
    ScaleUp,
    ScaleDown,
    Hold,
}

impl fmt::Display for ScaleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ScaleAction::ScaleUp => "scale_up",
            ScaleAction::ScaleDown => "scale_down",
            ScaleAction::Hold => "hold",
        };
        f.write_str(label)
    }
}

/// One per-queue, per-tick scaling verdict.
///
/// Immutable once built; policies that want to amend a decision construct a
/// replacement via [`ScalingDecision::held`] or [`ScalingDecision::with_target`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub key: QueueKey,
    pub from_workers: usize,
    pub to_workers: usize,
    pub action: ScaleAction,
    pub reason: String,
    /// Advisory predicted head-of-line age, when the strategy produced one.
    pub prediction_seconds: Option<f64>,
    pub source_strategy: String,
}

impl ScalingDecision {
    /// Build a decision; the action is derived from the worker delta.
    pub fn new(
        key: QueueKey,
        from_workers: usize,
        to_workers: usize,
        reason: impl Into<String>,
        prediction_seconds: Option<f64>,
        source_strategy: impl Into<String>,
    ) -> Self {
        Self {
            key,
            from_workers,
            to_workers,
            action: Self::action_for(from_workers, to_workers),
            reason: reason.into(),
            prediction_seconds,
            source_strategy: source_strategy.into(),
        }
    }

    /// A decision that leaves the queue untouched.
    pub fn hold(
        key: QueueKey,
        current_workers: usize,
        reason: impl Into<String>,
        source_strategy: impl Into<String>,
    ) -> Self {
        Self::new(key, current_workers, current_workers, reason, None, source_strategy)
    }

    /// Replacement decision vetoing this one: same provenance, no change.
    pub fn held(&self, reason: impl Into<String>) -> Self {
        Self {
            key: self.key.clone(),
            from_workers: self.from_workers,
            to_workers: self.from_workers,
            action: ScaleAction::Hold,
            reason: reason.into(),
            prediction_seconds: self.prediction_seconds,
            source_strategy: self.source_strategy.clone(),
        }
    }

    /// Replacement decision with an adjusted target.
    pub fn with_target(&self, to_workers: usize, reason: impl Into<String>) -> Self {
        Self {
            key: self.key.clone(),
            from_workers: self.from_workers,
            to_workers,
            action: Self::action_for(self.from_workers, to_workers),
            reason: reason.into(),
            prediction_seconds: self.prediction_seconds,
            source_strategy: self.source_strategy.clone(),
        }
    }

    /// Signed worker delta this decision requests.
    pub fn delta(&self) -> i64 {
        self.to_workers as i64 - self.from_workers as i64
    }

    fn action_for(from: usize, to: usize) -> ScaleAction {
        match to.cmp(&from) {
            std::cmp::Ordering::Greater => ScaleAction::ScaleUp,
            std::cmp::Ordering::Less => ScaleAction::ScaleDown,
            std::cmp::Ordering::Equal => ScaleAction::Hold,
        }
    }
}

impl fmt::Display for ScalingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} -> {} ({})",
            self.key, self.action, self.from_workers, self.to_workers, self.reason
        )
    }
}
