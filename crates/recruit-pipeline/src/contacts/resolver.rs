use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::directory::{ContactDirectory, ContactRecord, DirectoryError, RecruitRecord};
use super::is_valid_email;
use crate::automation::{RecipientConfig, SenderConfig};
use crate::checklist::{RecruitId, UserId};
use crate::config::AutomationSettings;

/// Relationship between a resolved contact and the recruit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactRole {
    Recruit,
    Upline,
    Trainer,
    ContractingManager,
    AgencyOwner,
    Custom,
}

impl ContactRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Recruit => "recruit",
            Self::Upline => "upline",
            Self::Trainer => "trainer",
            Self::ContractingManager => "contracting_manager",
            Self::AgencyOwner => "agency_owner",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ContactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether an unassigned role is an error or simply skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Optional,
    Mandatory,
}

/// A person a message or signature request can actually be addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcreteContact {
    pub role: ContactRole,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ConcreteContact {
    pub fn from_record(role: ContactRole, record: &ContactRecord) -> Self {
        let name = record.full_name();
        Self {
            role,
            user_id: Some(record.user_id.clone()),
            name: (!name.is_empty()).then_some(name),
            email: record.email.clone().filter(|email| is_valid_email(email)),
            phone: record
                .phone
                .clone()
                .filter(|phone| !phone.trim().is_empty()),
        }
    }

    pub fn custom(email: &str, name: Option<String>) -> Self {
        Self {
            role: ContactRole::Custom,
            user_id: None,
            name,
            email: Some(email.trim().to_string()),
            phone: None,
        }
    }

    fn email_key(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(|email| email.trim().to_ascii_lowercase())
    }
}

/// Identity an outbound message is sent as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

impl SenderIdentity {
    pub fn system(settings: &AutomationSettings) -> Self {
        Self {
            email: settings.sender_email.clone(),
            name: settings.sender_name.clone(),
            user_id: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("recruit {0} was not found")]
    RecruitNotFound(RecruitId),
    #[error("recruit {recruit_id} has no {role} assigned")]
    MissingRole {
        role: ContactRole,
        recruit_id: RecruitId,
    },
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Turns role references into concrete contacts for one recruit.
#[derive(Clone)]
pub struct RecipientResolver {
    directory: Arc<dyn ContactDirectory>,
}

impl RecipientResolver {
    pub fn new(directory: Arc<dyn ContactDirectory>) -> Self {
        Self { directory }
    }

    pub fn recruit(&self, recruit_id: &RecruitId) -> Result<RecruitRecord, ResolutionError> {
        self.directory
            .recruit(recruit_id)?
            .ok_or_else(|| ResolutionError::RecruitNotFound(recruit_id.clone()))
    }

    pub fn resolve_role(
        &self,
        recruit_id: &RecruitId,
        role: ContactRole,
        requirement: Requirement,
    ) -> Result<Option<ConcreteContact>, ResolutionError> {
        let record = self.recruit(recruit_id)?;
        let contact = self.contact_for(&record, role)?;
        match (contact, requirement) {
            (Some(contact), _) => Ok(Some(contact)),
            (None, Requirement::Optional) => Ok(None),
            (None, Requirement::Mandatory) => Err(ResolutionError::MissingRole {
                role,
                recruit_id: recruit_id.clone(),
            }),
        }
    }

    /// Resolve every configured recipient, skipping unassigned roles and collapsing
    /// duplicates so nobody is messaged twice for one dispatch.
    pub fn resolve_recipients(
        &self,
        recruit_id: &RecruitId,
        configs: &[RecipientConfig],
    ) -> Result<Vec<ConcreteContact>, ResolutionError> {
        let record = self.recruit(recruit_id)?;
        let mut resolved = Vec::new();

        for config in configs {
            match config {
                RecipientConfig::Recruit => {
                    resolved.extend(self.contact_for(&record, ContactRole::Recruit)?)
                }
                RecipientConfig::Upline => {
                    resolved.extend(self.contact_for(&record, ContactRole::Upline)?)
                }
                RecipientConfig::Trainer => {
                    resolved.extend(self.contact_for(&record, ContactRole::Trainer)?)
                }
                RecipientConfig::ContractingManager => {
                    resolved.extend(self.contact_for(&record, ContactRole::ContractingManager)?)
                }
                RecipientConfig::CustomEmail { emails } => {
                    for email in emails {
                        if is_valid_email(email) {
                            resolved.push(ConcreteContact::custom(email, None));
                        } else {
                            tracing::warn!(email = %email, "skipping malformed custom recipient");
                        }
                    }
                }
            }
        }

        // A user resolves once; an address-only entry is dropped when a user
        // already owns its address.
        let owned: HashSet<String> = resolved
            .iter()
            .filter(|contact| contact.user_id.is_some())
            .filter_map(ConcreteContact::email_key)
            .collect();
        let mut users = HashSet::new();
        let mut addresses = HashSet::new();
        resolved.retain(|contact| match (&contact.user_id, contact.email_key()) {
            (Some(user_id), _) => users.insert(user_id.clone()),
            (None, Some(email)) => !owned.contains(&email) && addresses.insert(email),
            (None, None) => false,
        });
        Ok(resolved)
    }

    /// Resolve the sender identity. Anything that cannot be resolved to a deliverable
    /// address falls back to the system sender.
    pub fn resolve_sender(
        &self,
        recruit_id: &RecruitId,
        sender: &SenderConfig,
        settings: &AutomationSettings,
    ) -> SenderIdentity {
        let role = match sender {
            SenderConfig::System => return SenderIdentity::system(settings),
            SenderConfig::Custom { email, name } => {
                if is_valid_email(email) {
                    return SenderIdentity {
                        email: email.trim().to_string(),
                        name: name.clone().unwrap_or_else(|| settings.sender_name.clone()),
                        user_id: None,
                    };
                }
                tracing::warn!(email = %email, "custom sender address is malformed, using system sender");
                return SenderIdentity::system(settings);
            }
            SenderConfig::Upline => ContactRole::Upline,
            SenderConfig::Trainer => ContactRole::Trainer,
            SenderConfig::ContractingManager => ContactRole::ContractingManager,
        };

        match self.resolve_role(recruit_id, role, Requirement::Optional) {
            Ok(Some(ConcreteContact {
                email: Some(email),
                name,
                user_id,
                ..
            })) => SenderIdentity {
                email,
                name: name.unwrap_or_else(|| settings.sender_name.clone()),
                user_id,
            },
            Ok(_) => {
                tracing::warn!(
                    recruit_id = %recruit_id,
                    role = role.label(),
                    "sender role has no deliverable address, using system sender"
                );
                SenderIdentity::system(settings)
            }
            Err(err) => {
                tracing::warn!(
                    recruit_id = %recruit_id,
                    role = role.label(),
                    error = %err,
                    "sender lookup failed, using system sender"
                );
                SenderIdentity::system(settings)
            }
        }
    }

    fn contact_for(
        &self,
        record: &RecruitRecord,
        role: ContactRole,
    ) -> Result<Option<ConcreteContact>, DirectoryError> {
        let user_id = match role {
            ContactRole::Recruit => {
                return Ok(Some(ConcreteContact::from_record(role, &record.contact)))
            }
            ContactRole::Upline => record.upline_id.clone(),
            ContactRole::Trainer => record.trainer_id.clone(),
            ContactRole::ContractingManager | ContactRole::AgencyOwner => {
                let agency = match &record.agency_id {
                    Some(agency_id) => self.directory.agency(agency_id)?,
                    None => None,
                };
                agency.and_then(|agency| {
                    if role == ContactRole::AgencyOwner {
                        agency.owner_id
                    } else {
                        agency.contracting_manager_id
                    }
                })
            }
            ContactRole::Custom => None,
        };

        let Some(user_id) = user_id else {
            return Ok(None);
        };
        Ok(self
            .directory
            .user(&user_id)?
            .map(|contact| ConcreteContact::from_record(role, &contact)))
    }
}
