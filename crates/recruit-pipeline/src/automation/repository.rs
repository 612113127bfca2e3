use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{AutomationId, AutomationScope, Channel, PipelineAutomation, TriggerType};
use super::triggers::DispatchKey;
use crate::checklist::{RecruitId, RepositoryError};
use crate::contacts::{ConcreteContact, SenderIdentity};

pub trait AutomationRepository: Send + Sync {
    fn insert(&self, automation: PipelineAutomation) -> Result<PipelineAutomation, RepositoryError>;
    fn update(&self, automation: PipelineAutomation) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &AutomationId) -> Result<Option<PipelineAutomation>, RepositoryError>;
    fn delete(&self, id: &AutomationId) -> Result<(), RepositoryError>;
    fn list(&self) -> Result<Vec<PipelineAutomation>, RepositoryError>;
    /// Active automations for the trigger attached to exactly this scope.
    fn active_for(
        &self,
        trigger: TriggerType,
        scope: &AutomationScope,
    ) -> Result<Vec<PipelineAutomation>, RepositoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationLogStatus {
    Pending,
    Sent,
    Skipped,
    Failed,
}

impl AutomationLogStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationLogEntry {
    pub dedupe_key: DispatchKey,
    pub automation_id: AutomationId,
    pub recruit_id: RecruitId,
    pub trigger: TriggerType,
    pub status: AutomationLogStatus,
    pub triggered_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub note: Option<String>,
}

impl AutomationLogEntry {
    pub fn pending(
        dedupe_key: DispatchKey,
        automation: &PipelineAutomation,
        recruit_id: &RecruitId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            dedupe_key,
            automation_id: automation.id.clone(),
            recruit_id: recruit_id.clone(),
            trigger: automation.trigger,
            status: AutomationLogStatus::Pending,
            triggered_at: now,
            finished_at: None,
            delivered: 0,
            failed: 0,
            note: None,
        }
    }
}

/// Final state written back onto a claimed log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCompletion {
    pub status: AutomationLogStatus,
    pub delivered: u32,
    pub failed: u32,
    pub note: Option<String>,
    pub finished_at: DateTime<Utc>,
}

pub trait AutomationLogRepository: Send + Sync {
    /// Record a pending entry. Returns `false` when the key was already claimed.
    fn claim(&self, entry: AutomationLogEntry) -> Result<bool, RepositoryError>;
    fn complete(&self, key: &DispatchKey, completion: LogCompletion) -> Result<(), RepositoryError>;
    fn for_automation(&self, id: &AutomationId) -> Result<Vec<AutomationLogEntry>, RepositoryError>;
    fn for_recruit(&self, recruit_id: &RecruitId) -> Result<Vec<AutomationLogEntry>, RepositoryError>;
}

/// One message on one channel to one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub automation_id: AutomationId,
    pub dedupe_key: DispatchKey,
    pub trigger: TriggerType,
    pub recruit_id: RecruitId,
    pub channel: Channel,
    pub recipient: ConcreteContact,
    pub sender: SenderIdentity,
    /// Email subject or notification title.
    #[serde(default)]
    pub subject: Option<String>,
    pub body: String,
    #[serde(default)]
    pub template_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("dispatch failed: {0}")]
pub struct DispatchError(pub String);

/// Delivers rendered messages. Delivery mechanics live entirely on the other side.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, request: &DispatchRequest) -> Result<(), DispatchError>;
}
