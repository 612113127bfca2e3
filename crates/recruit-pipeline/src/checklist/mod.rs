//! Recruit onboarding checklists: item evaluation, quizzes, signatures, carrier
//! contracting, and the phase progress they drive.

pub mod contracting;
pub mod domain;
pub mod evaluation;
pub mod events;
pub(crate) mod guard;
pub mod metadata;
pub mod quiz;
pub mod repository;
pub mod response;
pub mod router;
pub mod service;
pub mod signature;

#[cfg(test)]
mod tests;

pub use contracting::{
    CarrierContractingMetadata, CarrierContractingResponse, CarrierId, CompletionCriteria,
    ContractRequest, ContractRequestId, ContractStatus, ContractingError,
};
pub use domain::{
    Actor, ActorRole, AgencyId, ChecklistItem, ChecklistItemProgress, CompletedBy, ItemId,
    ItemStatus, ItemType, Phase, PhaseId, PhaseProgress, PhaseStatus, RecruitId, TemplateId,
    UserId,
};
pub use evaluation::{
    evaluate, Completion, Evaluation, EvaluationDetails, EvaluationError, ValidationError,
};
pub use events::{CompletionEvent, LifecycleEvent, LifecycleSink, NoopSink, SinkError};
pub use metadata::{ConfigurationError, ItemMetadata};
pub use quiz::{QuizEngine, QuizError, QuizMetadata, QuizOutcome, QuizResponse, QuizState};
pub use repository::{
    ChecklistCatalog, ContractRequestRepository, ItemProgressView, ProgressChangeSet,
    ProgressRepository, RepositoryError, SignatureRepository,
};
pub use response::{CandidateResponse, ItemResponse};
pub use router::checklist_router;
pub use service::{
    ChecklistService, ChecklistServiceError, ChecklistStores, ContractingOutcome,
    QuizAttemptView, SignatureProgress, SubmissionOutcome,
};
pub use signature::{
    SignatureError, SignatureRequiredMetadata, SignatureResponse, SignatureSubmission,
    SignerRole, SigningOrder, SubmissionId, SubmissionStatus,
};
