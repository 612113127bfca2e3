use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checklist::{AgencyId, RecruitId, UserId};

/// Profile fields needed to address a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub user_id: UserId,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ContactRecord {
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        full.trim().to_string()
    }
}

/// A recruit's own profile plus the team assignments used to route messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecruitRecord {
    pub recruit_id: RecruitId,
    pub contact: ContactRecord,
    #[serde(default)]
    pub agency_id: Option<AgencyId>,
    #[serde(default)]
    pub upline_id: Option<UserId>,
    #[serde(default)]
    pub trainer_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub password_set: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyRecord {
    pub agency_id: AgencyId,
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<UserId>,
    #[serde(default)]
    pub contracting_manager_id: Option<UserId>,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("contact directory unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to people and agencies. Lookups return `Ok(None)` for unknown ids.
pub trait ContactDirectory: Send + Sync {
    fn recruit(&self, recruit_id: &RecruitId) -> Result<Option<RecruitRecord>, DirectoryError>;

    fn user(&self, user_id: &UserId) -> Result<Option<ContactRecord>, DirectoryError>;

    fn agency(&self, agency_id: &AgencyId) -> Result<Option<AgencyRecord>, DirectoryError>;
}
