use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metadata::ItemMetadata;
use super::response::ItemResponse;

/// Declares a string-backed identifier with the conversions every record id needs.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

pub(crate) use string_id;

string_id!(
    /// A recruit moving through the onboarding pipeline. Recruits are users, so the same
    /// value doubles as their user id for in-app notifications.
    RecruitId
);
string_id!(PhaseId);
string_id!(ItemId);
string_id!(TemplateId);
string_id!(UserId);
string_id!(AgencyId);

impl RecruitId {
    pub fn as_user(&self) -> UserId {
        UserId(self.0.clone())
    }
}

/// Fixed set of checklist item variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    DocumentUpload,
    BooleanQuestion,
    MultipleChoice,
    TextResponse,
    Acknowledgment,
    Quiz,
    FileDownload,
    ExternalLink,
    VideoEmbed,
    SignatureRequired,
    CarrierContracting,
    SchedulingBooking,
}

impl ItemType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DocumentUpload => "document_upload",
            Self::BooleanQuestion => "boolean_question",
            Self::MultipleChoice => "multiple_choice",
            Self::TextResponse => "text_response",
            Self::Acknowledgment => "acknowledgment",
            Self::Quiz => "quiz",
            Self::FileDownload => "file_download",
            Self::ExternalLink => "external_link",
            Self::VideoEmbed => "video_embed",
            Self::SignatureRequired => "signature_required",
            Self::CarrierContracting => "carrier_contracting",
            Self::SchedulingBooking => "scheduling_booking",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::DocumentUpload => "Document Upload",
            Self::BooleanQuestion => "Yes/No Question",
            Self::MultipleChoice => "Multiple Choice",
            Self::TextResponse => "Text Response",
            Self::Acknowledgment => "Acknowledgment",
            Self::Quiz => "Quiz",
            Self::FileDownload => "File Download",
            Self::ExternalLink => "External Link",
            Self::VideoEmbed => "Video",
            Self::SignatureRequired => "Signature Required",
            Self::CarrierContracting => "Carrier Contracting",
            Self::SchedulingBooking => "Schedule Booking",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered stage of the onboarding pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub id: PhaseId,
    pub template_id: TemplateId,
    pub phase_name: String,
    pub phase_order: u32,
    #[serde(default)]
    pub estimated_days: Option<u32>,
    pub is_active: bool,
    pub visible_to_recruit: bool,
}

/// Who is allowed to move an item to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletedBy {
    #[default]
    Recruit,
    Upline,
    System,
}

/// Single onboarding task owned by a pipeline template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: ItemId,
    pub phase_id: PhaseId,
    pub item_name: String,
    #[serde(default)]
    pub item_description: Option<String>,
    pub item_order: u32,
    pub is_required: bool,
    pub is_active: bool,
    pub visible_to_recruit: bool,
    #[serde(default)]
    pub can_be_completed_by: CompletedBy,
    pub metadata: ItemMetadata,
}

impl ChecklistItem {
    pub fn item_type(&self) -> ItemType {
        self.metadata.item_type()
    }
}

/// Role of whoever is acting on a recruit's checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Recruit,
    Upline,
    Admin,
    System,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Recruit => "recruit",
            Self::Upline => "upline",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }

    /// Uplines and admins may act on anything a recruit may; the system acts on derived
    /// completions (signatures, contracting) regardless of who normally completes the item.
    pub fn may_complete(self, completed_by: CompletedBy) -> bool {
        match self {
            Self::Admin | Self::System => true,
            Self::Upline => matches!(completed_by, CompletedBy::Recruit | CompletedBy::Upline),
            Self::Recruit => completed_by == CompletedBy::Recruit,
        }
    }

    pub fn is_privileged(self) -> bool {
        matches!(self, Self::Upline | Self::Admin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: ActorRole,
}

impl Actor {
    pub fn recruit(recruit_id: &RecruitId) -> Self {
        Self {
            user_id: recruit_id.as_user(),
            role: ActorRole::Recruit,
        }
    }

    pub fn system() -> Self {
        Self {
            user_id: UserId::new("system"),
            role: ActorRole::System,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    NotStarted,
    InProgress,
    PendingApproval,
    Completed,
    Rejected,
    Blocked,
}

impl ItemStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::PendingApproval => "pending_approval",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Blocked => "blocked",
        }
    }
}

/// Per-recruit record of an item's status and most recent response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItemProgress {
    pub recruit_id: RecruitId,
    pub item_id: ItemId,
    pub phase_id: PhaseId,
    pub status: ItemStatus,
    #[serde(default)]
    pub response: Option<ItemResponse>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_by: Option<UserId>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

impl ChecklistItemProgress {
    pub fn new(recruit_id: RecruitId, item: &ChecklistItem, now: DateTime<Utc>) -> Self {
        Self {
            recruit_id,
            item_id: item.id.clone(),
            phase_id: item.phase_id.clone(),
            status: ItemStatus::NotStarted,
            response: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
            completed_by: None,
            rejection_reason: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ItemStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    NotStarted,
    InProgress,
    Completed,
    Blocked,
    Skipped,
}

/// Per-recruit record of a phase, including the activity clock stall reminders read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub recruit_id: RecruitId,
    pub phase_id: PhaseId,
    pub status: PhaseStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl PhaseProgress {
    pub fn not_started(recruit_id: RecruitId, phase_id: PhaseId) -> Self {
        Self {
            recruit_id,
            phase_id,
            status: PhaseStatus::NotStarted,
            started_at: None,
            completed_at: None,
            last_activity_at: None,
        }
    }

    /// Move into the phase if it has not been entered yet. Returns `true` on entry.
    pub fn enter(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != PhaseStatus::NotStarted {
            return false;
        }
        self.status = PhaseStatus::InProgress;
        self.started_at = Some(now);
        self.last_activity_at = Some(now);
        true
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = Some(now);
    }
}
