use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::template::TriggerCategory;
use crate::checklist::domain::string_id;
use crate::checklist::{ItemId, PhaseId};
use crate::contacts::is_valid_email;

string_id!(AutomationId);

/// Lifecycle moments an automation can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    PhaseEnter,
    PhaseComplete,
    PhaseStall,
    ItemComplete,
    ItemApprovalNeeded,
    ItemDeadlineApproaching,
    #[serde(rename = "password_not_set_24h")]
    PasswordNotSet24h,
    #[serde(rename = "password_not_set_12h")]
    PasswordNotSet12h,
}

impl TriggerType {
    pub const ALL: [TriggerType; 8] = [
        Self::PhaseEnter,
        Self::PhaseComplete,
        Self::PhaseStall,
        Self::ItemComplete,
        Self::ItemApprovalNeeded,
        Self::ItemDeadlineApproaching,
        Self::PasswordNotSet24h,
        Self::PasswordNotSet12h,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PhaseEnter => "phase_enter",
            Self::PhaseComplete => "phase_complete",
            Self::PhaseStall => "phase_stall",
            Self::ItemComplete => "item_complete",
            Self::ItemApprovalNeeded => "item_approval_needed",
            Self::ItemDeadlineApproaching => "item_deadline_approaching",
            Self::PasswordNotSet24h => "password_not_set_24h",
            Self::PasswordNotSet12h => "password_not_set_12h",
        }
    }

    pub const fn category(self) -> TriggerCategory {
        match self {
            Self::PhaseEnter | Self::PhaseComplete | Self::PhaseStall => TriggerCategory::Phase,
            Self::ItemComplete | Self::ItemApprovalNeeded | Self::ItemDeadlineApproaching => {
                TriggerCategory::Item
            }
            Self::PasswordNotSet24h | Self::PasswordNotSet12h => TriggerCategory::System,
        }
    }

    /// Triggers whose firing point is `delay_days` away from a phase or item clock.
    pub const fn requires_delay(self) -> bool {
        matches!(self, Self::PhaseStall | Self::ItemDeadlineApproaching)
    }

    /// Triggers evaluated by the recurring reminder sweep rather than by lifecycle events.
    pub const fn is_scheduled(self) -> bool {
        matches!(
            self,
            Self::PhaseStall
                | Self::ItemDeadlineApproaching
                | Self::PasswordNotSet24h
                | Self::PasswordNotSet12h
        )
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an automation is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum AutomationScope {
    Phase { phase_id: PhaseId },
    Item { item_id: ItemId },
    System,
}

impl AutomationScope {
    pub const fn category(&self) -> TriggerCategory {
        match self {
            Self::Phase { .. } => TriggerCategory::Phase,
            Self::Item { .. } => TriggerCategory::Item,
            Self::System => TriggerCategory::System,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Notification,
    Sms,
}

impl Channel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Notification => "notification",
            Self::Sms => "sms",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationType {
    Email,
    Notification,
    Sms,
    /// Email plus in-app notification.
    #[default]
    Both,
    All,
}

impl CommunicationType {
    pub const fn channels(self) -> &'static [Channel] {
        match self {
            Self::Email => &[Channel::Email],
            Self::Notification => &[Channel::Notification],
            Self::Sms => &[Channel::Sms],
            Self::Both => &[Channel::Email, Channel::Notification],
            Self::All => &[Channel::Email, Channel::Notification, Channel::Sms],
        }
    }
}

/// Abstract recipient of an automation, resolved per recruit at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecipientConfig {
    Recruit,
    Upline,
    Trainer,
    ContractingManager,
    CustomEmail { emails: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SenderConfig {
    #[default]
    System,
    Upline,
    Trainer,
    ContractingManager,
    Custom {
        email: String,
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailContent {
    pub subject: String,
    #[serde(default)]
    pub body_html: String,
    /// Reference to a stored email template rendered by the delivery side.
    #[serde(default)]
    pub template_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutomationContent {
    #[serde(default)]
    pub email: Option<EmailContent>,
    #[serde(default)]
    pub notification: Option<NotificationContent>,
    #[serde(default)]
    pub sms_message: Option<String>,
}

impl AutomationContent {
    pub fn supports(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self
                .email
                .as_ref()
                .is_some_and(|email| !email.subject.trim().is_empty()),
            Channel::Notification => self
                .notification
                .as_ref()
                .is_some_and(|notification| !notification.title.trim().is_empty()),
            Channel::Sms => self
                .sms_message
                .as_ref()
                .is_some_and(|message| !message.trim().is_empty()),
        }
    }
}

/// Stored rule mapping a trigger on a phase, item or the system to a communication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineAutomation {
    pub id: AutomationId,
    pub scope: AutomationScope,
    pub trigger: TriggerType,
    #[serde(default)]
    pub delay_days: Option<u32>,
    pub recipients: Vec<RecipientConfig>,
    pub communication: CommunicationType,
    pub sender: SenderConfig,
    pub content: AutomationContent,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineAutomation {
    pub fn draft(&self) -> AutomationDraft {
        AutomationDraft {
            scope: self.scope.clone(),
            trigger: self.trigger,
            delay_days: self.delay_days,
            recipients: self.recipients.clone(),
            communication: self.communication,
            sender: self.sender.clone(),
            content: self.content.clone(),
            is_active: self.is_active,
        }
    }

    pub fn matches(&self, trigger: TriggerType, scope: &AutomationScope) -> bool {
        self.is_active && self.trigger == trigger && &self.scope == scope
    }
}

fn default_active() -> bool {
    true
}

/// Authoring input for a new automation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationDraft {
    pub scope: AutomationScope,
    pub trigger: TriggerType,
    #[serde(default)]
    pub delay_days: Option<u32>,
    pub recipients: Vec<RecipientConfig>,
    #[serde(default)]
    pub communication: CommunicationType,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub content: AutomationContent,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl AutomationDraft {
    pub fn validate(&self) -> Result<(), AutomationValidationError> {
        if self.scope.category() != self.trigger.category() {
            return Err(AutomationValidationError::ScopeMismatch {
                trigger: self.trigger,
                scope: self.scope.category().label(),
            });
        }
        match (self.trigger.requires_delay(), self.delay_days) {
            (true, None) => return Err(AutomationValidationError::MissingDelay(self.trigger)),
            (false, Some(_)) => {
                return Err(AutomationValidationError::UnexpectedDelay(self.trigger))
            }
            _ => {}
        }

        if self.recipients.is_empty() {
            return Err(AutomationValidationError::NoRecipients);
        }
        for recipient in &self.recipients {
            if let RecipientConfig::CustomEmail { emails } = recipient {
                if emails.is_empty() {
                    return Err(AutomationValidationError::EmptyCustomRecipients);
                }
                if let Some(bad) = emails.iter().find(|email| !is_valid_email(email)) {
                    return Err(AutomationValidationError::InvalidRecipientEmail(bad.clone()));
                }
            }
        }

        if let SenderConfig::Custom { email, .. } = &self.sender {
            if !is_valid_email(email) {
                return Err(AutomationValidationError::InvalidSenderEmail(email.clone()));
            }
        }

        if let Some(channel) = self
            .communication
            .channels()
            .iter()
            .find(|channel| !self.content.supports(**channel))
        {
            return Err(AutomationValidationError::MissingContent(*channel));
        }
        Ok(())
    }

    pub fn into_automation(
        self,
        id: AutomationId,
        now: DateTime<Utc>,
    ) -> Result<PipelineAutomation, AutomationValidationError> {
        self.validate()?;
        Ok(PipelineAutomation {
            id,
            scope: self.scope,
            trigger: self.trigger,
            delay_days: self.delay_days,
            recipients: self.recipients,
            communication: self.communication,
            sender: self.sender,
            content: self.content,
            is_active: self.is_active,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial edit. Scope and trigger are fixed once an automation exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationUpdate {
    #[serde(default)]
    pub delay_days: Option<u32>,
    #[serde(default)]
    pub recipients: Option<Vec<RecipientConfig>>,
    #[serde(default)]
    pub communication: Option<CommunicationType>,
    #[serde(default)]
    pub sender: Option<SenderConfig>,
    #[serde(default)]
    pub content: Option<AutomationContent>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl AutomationUpdate {
    /// Apply the edit, re-validating the whole rule before it replaces the stored one.
    pub fn apply(
        self,
        current: &PipelineAutomation,
        now: DateTime<Utc>,
    ) -> Result<PipelineAutomation, AutomationValidationError> {
        let mut draft = current.draft();
        if self.delay_days.is_some() {
            draft.delay_days = self.delay_days;
        }
        if let Some(recipients) = self.recipients {
            draft.recipients = recipients;
        }
        if let Some(communication) = self.communication {
            draft.communication = communication;
        }
        if let Some(sender) = self.sender {
            draft.sender = sender;
        }
        if let Some(content) = self.content {
            draft.content = content;
        }
        if let Some(is_active) = self.is_active {
            draft.is_active = is_active;
        }

        let mut updated = draft.into_automation(current.id.clone(), current.created_at)?;
        updated.updated_at = now;
        Ok(updated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AutomationValidationError {
    #[error("{trigger} automations cannot be attached at {scope} level")]
    ScopeMismatch {
        trigger: TriggerType,
        scope: &'static str,
    },
    #[error("{0} automations need delay_days")]
    MissingDelay(TriggerType),
    #[error("{0} automations do not take delay_days")]
    UnexpectedDelay(TriggerType),
    #[error("at least one recipient is required")]
    NoRecipients,
    #[error("custom email recipients need at least one address")]
    EmptyCustomRecipients,
    #[error("'{0}' is not a valid recipient email address")]
    InvalidRecipientEmail(String),
    #[error("'{0}' is not a valid sender email address")]
    InvalidSenderEmail(String),
    #[error("{0} delivery is selected but has no content")]
    MissingContent(Channel),
}
