use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{string_id, ItemId, RecruitId};
use super::metadata::ConfigurationError;
use crate::contacts::{
    is_valid_email, ConcreteContact, ContactRole, RecipientResolver, Requirement,
    ResolutionError,
};

string_id!(SubmissionId);

/// Who has to sign. Witness and custom signers are addressed by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum SignerRole {
    Recruit,
    Recruiter,
    AgencyOwner,
    Witness {
        email: String,
        #[serde(default)]
        name: Option<String>,
    },
    Custom {
        email: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl SignerRole {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Recruit => "recruit",
            Self::Recruiter => "recruiter",
            Self::AgencyOwner => "agency_owner",
            Self::Witness { .. } => "witness",
            Self::Custom { .. } => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SigningOrder {
    #[default]
    Any,
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SignatureRequiredMetadata {
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub required_signer_roles: Vec<SignerRole>,
    #[serde(default)]
    pub signing_order: SigningOrder,
    #[serde(default)]
    pub expires_in_days: Option<u32>,
}

impl SignatureRequiredMetadata {
    pub fn check(&self) -> Result<(), ConfigurationError> {
        if self.required_signer_roles.is_empty() {
            return Err(ConfigurationError::NoSignerRoles);
        }
        for role in &self.required_signer_roles {
            if let SignerRole::Witness { email, .. } | SignerRole::Custom { email, .. } = role {
                if !is_valid_email(email) {
                    return Err(ConfigurationError::InvalidSignerEmail(email.clone()));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    NotStarted,
    Pending,
    InProgress,
    Completed,
    Declined,
    Expired,
    Voided,
}

impl SubmissionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Declined => "declined",
            Self::Expired => "expired",
            Self::Voided => "voided",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Declined | Self::Expired | Self::Voided
        )
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerStatus {
    Pending,
    Opened,
    Completed,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub role: SignerRole,
    pub contact: ConcreteContact,
    /// One-based position used when signing is sequential.
    pub signing_order: u32,
    pub status: SignerStatus,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub declined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub decline_reason: Option<String>,
}

/// Summary mirrored onto the item's progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureResponse {
    pub submission_id: SubmissionId,
    pub submission_status: SubmissionStatus,
    pub initiated_at: DateTime<Utc>,
    pub signers_completed: u32,
    pub signers_total: u32,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("{0} signer has no email address")]
    SignerWithoutEmail(&'static str),
    #[error("submission has no signer at position {0}")]
    UnknownSigner(usize),
    #[error("signer {0} has already signed")]
    AlreadySigned(usize),
    #[error("signer in position {found} must wait for position {expected}")]
    NotYourTurn { expected: u32, found: u32 },
    #[error("submission is {0}")]
    Closed(SubmissionStatus),
}

/// A multi-party signature request for one recruit and item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSubmission {
    pub id: SubmissionId,
    pub recruit_id: RecruitId,
    pub item_id: ItemId,
    #[serde(default)]
    pub template_id: Option<String>,
    pub status: SubmissionStatus,
    pub signing_order: SigningOrder,
    pub signers: Vec<Signer>,
    pub initiated_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub void_reason: Option<String>,
}

impl SignatureSubmission {
    /// Resolve every required signer and open a submission. Nothing is created when any
    /// role cannot be resolved to an addressable contact.
    pub fn initiate(
        metadata: &SignatureRequiredMetadata,
        recruit_id: &RecruitId,
        item_id: &ItemId,
        resolver: &RecipientResolver,
        now: DateTime<Utc>,
    ) -> Result<Self, SignatureError> {
        metadata.check()?;

        let mut signers = Vec::with_capacity(metadata.required_signer_roles.len());
        for (position, role) in metadata.required_signer_roles.iter().enumerate() {
            let contact = match role {
                SignerRole::Recruit => mandatory(resolver, recruit_id, ContactRole::Recruit)?,
                SignerRole::Recruiter => mandatory(resolver, recruit_id, ContactRole::Upline)?,
                SignerRole::AgencyOwner => {
                    mandatory(resolver, recruit_id, ContactRole::AgencyOwner)?
                }
                SignerRole::Witness { email, name } | SignerRole::Custom { email, name } => {
                    ConcreteContact::custom(email, name.clone())
                }
            };
            if contact.email.is_none() {
                return Err(SignatureError::SignerWithoutEmail(role.label()));
            }
            signers.push(Signer {
                role: role.clone(),
                contact,
                signing_order: u32::try_from(position + 1).unwrap_or(u32::MAX),
                status: SignerStatus::Pending,
                opened_at: None,
                signed_at: None,
                declined_at: None,
                decline_reason: None,
            });
        }

        Ok(Self {
            id: SubmissionId::generate(),
            recruit_id: recruit_id.clone(),
            item_id: item_id.clone(),
            template_id: metadata.template_id.clone(),
            status: SubmissionStatus::Pending,
            signing_order: metadata.signing_order,
            signers,
            initiated_at: now,
            expires_at: metadata
                .expires_in_days
                .map(|days| now + Duration::days(i64::from(days))),
            completed_at: None,
            closed_at: None,
            void_reason: None,
        })
    }

    fn ensure_open(&self) -> Result<(), SignatureError> {
        if self.status.is_terminal() {
            Err(SignatureError::Closed(self.status))
        } else {
            Ok(())
        }
    }

    fn signer_mut(&mut self, index: usize) -> Result<&mut Signer, SignatureError> {
        self.signers
            .get_mut(index)
            .ok_or(SignatureError::UnknownSigner(index))
    }

    pub fn signers_completed(&self) -> u32 {
        let count = self
            .signers
            .iter()
            .filter(|signer| signer.status == SignerStatus::Completed)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    pub fn signers_total(&self) -> u32 {
        u32::try_from(self.signers.len()).unwrap_or(u32::MAX)
    }

    fn next_in_order(&self) -> Option<u32> {
        self.signers
            .iter()
            .filter(|signer| signer.status != SignerStatus::Completed)
            .map(|signer| signer.signing_order)
            .min()
    }

    pub fn mark_opened(&mut self, index: usize, now: DateTime<Utc>) -> Result<(), SignatureError> {
        self.ensure_open()?;
        let signer = self.signer_mut(index)?;
        signer.opened_at.get_or_insert(now);
        if signer.status == SignerStatus::Pending {
            signer.status = SignerStatus::Opened;
        }
        Ok(())
    }

    pub fn record_signature(
        &mut self,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        self.ensure_open()?;
        let expected = self.next_in_order();
        let sequential = self.signing_order == SigningOrder::Sequential;
        let signer = self.signer_mut(index)?;
        if signer.status == SignerStatus::Completed {
            return Err(SignatureError::AlreadySigned(index));
        }
        if sequential {
            if let Some(expected) = expected {
                if signer.signing_order != expected {
                    return Err(SignatureError::NotYourTurn {
                        expected,
                        found: signer.signing_order,
                    });
                }
            }
        }
        signer.status = SignerStatus::Completed;
        signer.signed_at = Some(now);

        if self.signers_completed() == self.signers_total() {
            self.status = SubmissionStatus::Completed;
            self.completed_at = Some(now);
            self.closed_at = Some(now);
        } else {
            self.status = SubmissionStatus::InProgress;
        }
        Ok(())
    }

    pub fn decline(
        &mut self,
        index: usize,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        self.ensure_open()?;
        let signer = self.signer_mut(index)?;
        if signer.status == SignerStatus::Completed {
            return Err(SignatureError::AlreadySigned(index));
        }
        signer.status = SignerStatus::Declined;
        signer.declined_at = Some(now);
        signer.decline_reason = reason;
        self.status = SubmissionStatus::Declined;
        self.closed_at = Some(now);
        Ok(())
    }

    /// Close an open submission whose deadline has passed. Returns `true` when it expired.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) if !self.status.is_terminal() && expires_at <= now => {
                self.status = SubmissionStatus::Expired;
                self.closed_at = Some(now);
                true
            }
            _ => false,
        }
    }

    pub fn void(&mut self, reason: Option<String>, now: DateTime<Utc>) -> Result<(), SignatureError> {
        self.ensure_open()?;
        self.status = SubmissionStatus::Voided;
        self.void_reason = reason;
        self.closed_at = Some(now);
        Ok(())
    }

    pub fn response(&self) -> SignatureResponse {
        SignatureResponse {
            submission_id: self.id.clone(),
            submission_status: self.status,
            initiated_at: self.initiated_at,
            signers_completed: self.signers_completed(),
            signers_total: self.signers_total(),
            completed_at: self.completed_at,
            expires_at: self.expires_at,
        }
    }
}

fn mandatory(
    resolver: &RecipientResolver,
    recruit_id: &RecruitId,
    role: ContactRole,
) -> Result<ConcreteContact, ResolutionError> {
    resolver
        .resolve_role(recruit_id, role, Requirement::Mandatory)?
        .ok_or_else(|| ResolutionError::MissingRole {
            role,
            recruit_id: recruit_id.clone(),
        })
}
