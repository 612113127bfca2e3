use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{AutomationId, TriggerType};
use crate::checklist::{ItemId, PhaseId, PhaseProgress, PhaseStatus, RecruitId, RepositoryError};
use crate::contacts::RecruitRecord;

/// A recruit's open phase as the reminder sweep sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseActivity {
    pub recruit_id: RecruitId,
    pub phase_id: PhaseId,
    pub entered_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl PhaseActivity {
    /// `None` for phases the recruit is not currently working through.
    pub fn from_progress(progress: &PhaseProgress) -> Option<Self> {
        if progress.status != PhaseStatus::InProgress {
            return None;
        }
        let entered_at = progress.started_at?;
        Some(Self {
            recruit_id: progress.recruit_id.clone(),
            phase_id: progress.phase_id.clone(),
            entered_at,
            last_activity_at: progress.last_activity_at.unwrap_or(entered_at),
        })
    }

    pub fn idle_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_activity_at).num_days()
    }

    pub fn days_in_phase(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entered_at).num_days().max(0)
    }

    /// Stalled once the recruit has been idle for at least `delay_days` whole days.
    pub fn is_stalled(&self, delay_days: u32, now: DateTime<Utc>) -> bool {
        self.idle_days(now) >= i64::from(delay_days)
    }
}

/// An item with a due date for one recruit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineCandidate {
    pub recruit_id: RecruitId,
    pub item_id: ItemId,
    pub deadline: NaiveDate,
}

impl DeadlineCandidate {
    pub fn days_until(&self, now: DateTime<Utc>) -> i64 {
        (self.deadline - now.date_naive()).num_days()
    }

    /// Due from `delay_days` before the deadline through the deadline day itself.
    pub fn is_approaching(&self, delay_days: u32, now: DateTime<Utc>) -> bool {
        let days = self.days_until(now);
        (0..=i64::from(delay_days)).contains(&days)
    }
}

/// Hours before the account-setup link expires at which a system trigger fires.
pub const fn hours_before_expiry(trigger: TriggerType) -> Option<u32> {
    match trigger {
        TriggerType::PasswordNotSet24h => Some(24),
        TriggerType::PasswordNotSet12h => Some(12),
        _ => None,
    }
}

/// Whether a password reminder is due: inside `[expiry - hours_before, expiry)` and the
/// password still unset. Links shorter than the offset never trigger.
pub fn account_reminder_due(
    trigger: TriggerType,
    account: &RecruitRecord,
    link_hours: u32,
    now: DateTime<Utc>,
) -> bool {
    let Some(hours_before) = hours_before_expiry(trigger) else {
        return false;
    };
    if account.password_set || link_hours <= hours_before {
        return false;
    }
    let expires_at = account.created_at + Duration::hours(i64::from(link_hours));
    let opens_at = expires_at - Duration::hours(i64::from(hours_before));
    opens_at <= now && now < expires_at
}

/// Period within which an automation fires at most once per recruit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchWindow {
    /// Event-driven triggers: the calendar day of the event.
    EventDay { day: NaiveDate },
    /// Stalls: one reminder per idle period, keyed by when the recruit last acted.
    IdleSince { since: DateTime<Utc> },
    Deadline { due: NaiveDate },
    Account {
        trigger: TriggerType,
        created_at: DateTime<Utc>,
    },
}

impl fmt::Display for DispatchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventDay { day } => write!(f, "day:{day}"),
            Self::IdleSince { since } => write!(f, "idle:{}", since.to_rfc3339()),
            Self::Deadline { due } => write!(f, "deadline:{due}"),
            Self::Account {
                trigger,
                created_at,
            } => write!(f, "account:{trigger}:{}", created_at.to_rfc3339()),
        }
    }
}

/// Stable dedupe key a dispatch log entry is claimed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchKey(pub String);

impl DispatchKey {
    pub fn new(automation_id: &AutomationId, recruit_id: &RecruitId, window: &DispatchWindow) -> Self {
        Self(format!("{automation_id}:{recruit_id}:{window}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Feeds the reminder sweep. Implemented by whatever store knows about open phases,
/// due dates, and pending accounts.
pub trait ReminderSource: Send + Sync {
    fn phases_in_progress(&self) -> Result<Vec<PhaseActivity>, RepositoryError>;
    fn deadlines(&self) -> Result<Vec<DeadlineCandidate>, RepositoryError>;
    fn pending_accounts(&self) -> Result<Vec<RecruitRecord>, RepositoryError>;
}
