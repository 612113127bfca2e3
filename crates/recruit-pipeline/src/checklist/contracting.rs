use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{string_id, ActorRole, RecruitId};
use super::metadata::ConfigurationError;
use super::quiz::percent_half_up;

string_id!(ContractRequestId);
string_id!(CarrierId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Requested,
    InProgress,
    WritingReceived,
    Completed,
    Rejected,
    Cancelled,
}

impl ContractStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::InProgress => "in_progress",
            Self::WritingReceived => "writing_received",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    /// Rejected and cancelled requests no longer count toward contracting progress.
    pub const fn is_withdrawn(self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Requested => 0,
            Self::InProgress => 1,
            Self::WritingReceived => 2,
            Self::Completed => 3,
            Self::Rejected | Self::Cancelled => 4,
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContractingError {
    #[error("{0} may not edit writing numbers on this item")]
    NotPermitted(&'static str),
    #[error("contract request is {0} and can no longer change")]
    Closed(ContractStatus),
    #[error("cannot move a contract request from {from} back to {to}")]
    InvalidTransition {
        from: ContractStatus,
        to: ContractStatus,
    },
}

/// One carrier appointment requested for a recruit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRequest {
    pub id: ContractRequestId,
    pub recruit_id: RecruitId,
    pub carrier_id: CarrierId,
    pub carrier_name: String,
    pub status: ContractStatus,
    #[serde(default)]
    pub writing_number: Option<String>,
    pub requested_date: NaiveDate,
    #[serde(default)]
    pub in_progress_date: Option<NaiveDate>,
    #[serde(default)]
    pub writing_received_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ContractRequest {
    pub fn new(
        recruit_id: RecruitId,
        carrier_id: CarrierId,
        carrier_name: impl Into<String>,
        today: NaiveDate,
    ) -> Self {
        Self {
            id: ContractRequestId::generate(),
            recruit_id,
            carrier_id,
            carrier_name: carrier_name.into(),
            status: ContractStatus::Requested,
            writing_number: None,
            requested_date: today,
            in_progress_date: None,
            writing_received_date: None,
            completed_date: None,
            notes: None,
        }
    }

    pub fn has_writing_number(&self) -> bool {
        self.writing_number
            .as_deref()
            .is_some_and(|value| !value.trim().is_empty())
    }

    /// Move forward through the contracting lifecycle, stamping the date of each stage the
    /// first time it is reached.
    pub fn transition(&mut self, to: ContractStatus, today: NaiveDate) -> Result<(), ContractingError> {
        if self.status.is_withdrawn() || self.status == ContractStatus::Completed {
            return Err(ContractingError::Closed(self.status));
        }
        if !to.is_withdrawn() && to.rank() < self.status.rank() {
            return Err(ContractingError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        match to {
            ContractStatus::InProgress => {
                self.in_progress_date.get_or_insert(today);
            }
            ContractStatus::WritingReceived => {
                self.writing_received_date.get_or_insert(today);
            }
            ContractStatus::Completed => {
                self.completed_date.get_or_insert(today);
            }
            ContractStatus::Requested | ContractStatus::Rejected | ContractStatus::Cancelled => {}
        }
        Ok(())
    }

    /// Record or clear the carrier-issued writing number. Recording one advances an early
    /// request to `writing_received`.
    pub fn set_writing_number(
        &mut self,
        value: Option<String>,
        actor: ActorRole,
        metadata: &CarrierContractingMetadata,
        today: NaiveDate,
    ) -> Result<(), ContractingError> {
        let permitted = match actor {
            ActorRole::Upline | ActorRole::Admin | ActorRole::System => true,
            ActorRole::Recruit => metadata.allow_recruit_edit_writing_number,
        };
        if !permitted {
            return Err(ContractingError::NotPermitted(actor.label()));
        }
        if self.status.is_withdrawn() {
            return Err(ContractingError::Closed(self.status));
        }

        self.writing_number = value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        if self.has_writing_number()
            && matches!(
                self.status,
                ContractStatus::Requested | ContractStatus::InProgress
            )
        {
            self.transition(ContractStatus::WritingReceived, today)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletionCriteria {
    #[default]
    All,
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CarrierContractingMetadata {
    #[serde(default)]
    pub completion_criteria: CompletionCriteria,
    #[serde(default)]
    pub required_count: Option<u32>,
    #[serde(default)]
    pub allow_recruit_edit_writing_number: bool,
}

impl CarrierContractingMetadata {
    pub fn check(&self) -> Result<(), ConfigurationError> {
        match self.completion_criteria {
            CompletionCriteria::All => Ok(()),
            CompletionCriteria::Count => match self.required_count {
                Some(count) if count > 0 => Ok(()),
                _ => Err(ConfigurationError::MissingRequiredCount),
            },
        }
    }
}

/// Aggregate contracting progress mirrored onto the item's progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierContractingResponse {
    pub carriers_with_writing_number: u32,
    pub carriers_total: u32,
    pub percent_complete: u8,
}

impl CarrierContractingResponse {
    pub fn summarize(requests: &[ContractRequest]) -> Self {
        let counted: Vec<&ContractRequest> = requests
            .iter()
            .filter(|request| !request.status.is_withdrawn())
            .collect();
        let with_number = counted
            .iter()
            .filter(|request| request.has_writing_number())
            .count();
        let total = counted.len();
        Self {
            carriers_with_writing_number: u32::try_from(with_number).unwrap_or(u32::MAX),
            carriers_total: u32::try_from(total).unwrap_or(u32::MAX),
            percent_complete: percent_half_up(with_number as u64, total as u64),
        }
    }

    pub fn criteria_met(&self, metadata: &CarrierContractingMetadata) -> Result<bool, ConfigurationError> {
        metadata.check()?;
        Ok(match metadata.completion_criteria {
            CompletionCriteria::All => {
                self.carriers_total > 0 && self.carriers_with_writing_number == self.carriers_total
            }
            CompletionCriteria::Count => {
                self.carriers_with_writing_number >= metadata.required_count.unwrap_or(u32::MAX)
            }
        })
    }
}
