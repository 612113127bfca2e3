use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ItemId, PhaseId, RecruitId};

/// Emitted exactly once when an item first reaches `completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub recruit_id: RecruitId,
    pub item_id: ItemId,
    pub phase_id: PhaseId,
    pub completed_at: DateTime<Utc>,
}

/// Pipeline changes automations can react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    PhaseEntered {
        recruit_id: RecruitId,
        phase_id: PhaseId,
        at: DateTime<Utc>,
    },
    PhaseCompleted {
        recruit_id: RecruitId,
        phase_id: PhaseId,
        at: DateTime<Utc>,
    },
    ItemCompleted(CompletionEvent),
    ItemApprovalNeeded {
        recruit_id: RecruitId,
        item_id: ItemId,
        phase_id: PhaseId,
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn recruit_id(&self) -> &RecruitId {
        match self {
            Self::PhaseEntered { recruit_id, .. }
            | Self::PhaseCompleted { recruit_id, .. }
            | Self::ItemApprovalNeeded { recruit_id, .. } => recruit_id,
            Self::ItemCompleted(event) => &event.recruit_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::PhaseEntered { at, .. }
            | Self::PhaseCompleted { at, .. }
            | Self::ItemApprovalNeeded { at, .. } => *at,
            Self::ItemCompleted(event) => event.completed_at,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::PhaseEntered { .. } => "phase_entered",
            Self::PhaseCompleted { .. } => "phase_completed",
            Self::ItemCompleted(_) => "item_completed",
            Self::ItemApprovalNeeded { .. } => "item_approval_needed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("lifecycle event delivery failed: {0}")]
pub struct SinkError(pub String);

/// Receives lifecycle events after the progress write they describe has been committed.
pub trait LifecycleSink: Send + Sync {
    fn publish(&self, event: &LifecycleEvent) -> Result<(), SinkError>;
}

/// Sink that drops everything, for callers that do not run automations.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl LifecycleSink for NoopSink {
    fn publish(&self, _event: &LifecycleEvent) -> Result<(), SinkError> {
        Ok(())
    }
}
