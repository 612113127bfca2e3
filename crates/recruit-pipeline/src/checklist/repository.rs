use serde::Serialize;

use super::contracting::{ContractRequest, ContractRequestId};
use super::domain::{
    ChecklistItem, ChecklistItemProgress, ItemId, Phase, PhaseId, PhaseProgress, RecruitId,
};
use super::signature::{SignatureSubmission, SubmissionId};

/// Read access to pipeline templates: phases and their items.
pub trait ChecklistCatalog: Send + Sync {
    fn item(&self, id: &ItemId) -> Result<Option<ChecklistItem>, RepositoryError>;
    fn phase(&self, id: &PhaseId) -> Result<Option<Phase>, RepositoryError>;
    fn items_for_phase(&self, id: &PhaseId) -> Result<Vec<ChecklistItem>, RepositoryError>;
    /// Next active phase in the same template, by `phase_order`.
    fn next_phase(&self, id: &PhaseId) -> Result<Option<Phase>, RepositoryError>;
}

/// Everything one accepted response changes, written together or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressChangeSet {
    pub item: ChecklistItemProgress,
    pub phase: PhaseProgress,
    pub entered_phase: Option<PhaseProgress>,
}

pub trait ProgressRepository: Send + Sync {
    fn item_progress(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
    ) -> Result<Option<ChecklistItemProgress>, RepositoryError>;
    fn phase_item_progress(
        &self,
        recruit_id: &RecruitId,
        phase_id: &PhaseId,
    ) -> Result<Vec<ChecklistItemProgress>, RepositoryError>;
    fn phase_progress(
        &self,
        recruit_id: &RecruitId,
        phase_id: &PhaseId,
    ) -> Result<Option<PhaseProgress>, RepositoryError>;
    fn save_phase(&self, progress: PhaseProgress) -> Result<(), RepositoryError>;
    fn commit(&self, changes: ProgressChangeSet) -> Result<(), RepositoryError>;
}

pub trait SignatureRepository: Send + Sync {
    fn insert(&self, submission: SignatureSubmission) -> Result<SignatureSubmission, RepositoryError>;
    fn update(&self, submission: SignatureSubmission) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &SubmissionId) -> Result<Option<SignatureSubmission>, RepositoryError>;
    /// Open (non-terminal) submission for the pair, if any.
    fn open_for_item(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
    ) -> Result<Option<SignatureSubmission>, RepositoryError>;
    fn open_submissions(&self) -> Result<Vec<SignatureSubmission>, RepositoryError>;
}

pub trait ContractRequestRepository: Send + Sync {
    fn insert(&self, request: ContractRequest) -> Result<ContractRequest, RepositoryError>;
    fn update(&self, request: ContractRequest) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ContractRequestId) -> Result<Option<ContractRequest>, RepositoryError>;
    fn for_recruit(&self, recruit_id: &RecruitId) -> Result<Vec<ContractRequest>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Sanitized progress view returned over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct ItemProgressView {
    pub recruit_id: RecruitId,
    pub item_id: ItemId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<super::response::ItemResponse>,
}

impl From<&ChecklistItemProgress> for ItemProgressView {
    fn from(progress: &ChecklistItemProgress) -> Self {
        Self {
            recruit_id: progress.recruit_id.clone(),
            item_id: progress.item_id.clone(),
            status: progress.status.label(),
            completed_at: progress.completed_at,
            response: progress.response.clone(),
        }
    }
}
