use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::contracting::{
    CarrierContractingMetadata, CarrierContractingResponse, CarrierId, ContractRequest,
    ContractRequestId, ContractStatus, ContractingError,
};
use super::domain::{
    Actor, ActorRole, ChecklistItem, ChecklistItemProgress, ItemId, ItemStatus, ItemType,
    PhaseId, PhaseProgress, PhaseStatus, RecruitId,
};
use super::evaluation::{evaluate, Completion, EvaluationDetails, EvaluationError};
use super::events::{CompletionEvent, LifecycleEvent, LifecycleSink};
use super::guard::{CompletionGuard, InFlight};
use super::metadata::ItemMetadata;
use super::quiz::{AttemptPlan, PresentedQuestion, QuizEngine};
use super::repository::{
    ChecklistCatalog, ContractRequestRepository, ProgressChangeSet, ProgressRepository,
    RepositoryError, SignatureRepository,
};
use super::response::{CandidateResponse, ItemResponse};
use super::signature::{SignatureError, SignatureSubmission, SubmissionId};
use crate::contacts::RecipientResolver;

/// Storage collaborators the checklist service reads and writes.
#[derive(Clone)]
pub struct ChecklistStores {
    pub catalog: Arc<dyn ChecklistCatalog>,
    pub progress: Arc<dyn ProgressRepository>,
    pub signatures: Arc<dyn SignatureRepository>,
    pub contracts: Arc<dyn ContractRequestRepository>,
}

/// Result of an accepted response.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub progress: ChecklistItemProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<EvaluationDetails>,
    pub events: Vec<LifecycleEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizAttemptView {
    pub plan: AttemptPlan,
    pub questions: Vec<PresentedQuestion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignatureProgress {
    pub submission: SignatureSubmission,
    pub outcome: SubmissionOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractingOutcome {
    pub request: ContractRequest,
    pub summary: CarrierContractingResponse,
    pub outcome: Option<SubmissionOutcome>,
}

/// Applies responses to recruit checklists and keeps phase progress in step.
pub struct ChecklistService {
    stores: ChecklistStores,
    resolver: RecipientResolver,
    sink: Arc<dyn LifecycleSink>,
    guard: CompletionGuard,
}

impl ChecklistService {
    pub fn new(
        stores: ChecklistStores,
        resolver: RecipientResolver,
        sink: Arc<dyn LifecycleSink>,
    ) -> Self {
        Self {
            stores,
            resolver,
            sink,
            guard: CompletionGuard::new(),
        }
    }

    pub fn item(&self, item_id: &ItemId) -> Result<ChecklistItem, ChecklistServiceError> {
        self.stores
            .catalog
            .item(item_id)?
            .ok_or_else(|| ChecklistServiceError::ItemNotFound(item_id.clone()))
    }

    fn active_item(&self, item_id: &ItemId) -> Result<ChecklistItem, ChecklistServiceError> {
        let item = self.item(item_id)?;
        if !item.is_active {
            return Err(ChecklistServiceError::ItemInactive(item_id.clone()));
        }
        Ok(item)
    }

    pub fn item_progress(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
    ) -> Result<Option<ChecklistItemProgress>, ChecklistServiceError> {
        Ok(self.stores.progress.item_progress(recruit_id, item_id)?)
    }

    pub fn phase_progress(
        &self,
        recruit_id: &RecruitId,
        phase_id: &PhaseId,
    ) -> Result<Option<PhaseProgress>, ChecklistServiceError> {
        Ok(self.stores.progress.phase_progress(recruit_id, phase_id)?)
    }

    /// Start a recruit on a phase. Entering an already-entered phase is a no-op.
    pub fn enter_phase(
        &self,
        recruit_id: &RecruitId,
        phase_id: &PhaseId,
        now: DateTime<Utc>,
    ) -> Result<Option<LifecycleEvent>, ChecklistServiceError> {
        let phase = self
            .stores
            .catalog
            .phase(phase_id)?
            .ok_or_else(|| ChecklistServiceError::PhaseNotFound(phase_id.clone()))?;
        let mut progress = self
            .stores
            .progress
            .phase_progress(recruit_id, &phase.id)?
            .unwrap_or_else(|| PhaseProgress::not_started(recruit_id.clone(), phase.id.clone()));
        if !progress.enter(now) {
            return Ok(None);
        }
        self.stores.progress.save_phase(progress)?;

        let event = LifecycleEvent::PhaseEntered {
            recruit_id: recruit_id.clone(),
            phase_id: phase.id,
            at: now,
        };
        self.publish(std::slice::from_ref(&event));
        Ok(Some(event))
    }

    /// Evaluate and record a response typed in by a recruit or team member.
    pub fn submit(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
        candidate: CandidateResponse,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, ChecklistServiceError> {
        let item = self.active_item(item_id)?;
        authorize(&item, recruit_id, actor)?;
        if candidate.is_system_derived() {
            return Err(ChecklistServiceError::SystemDerivedResponse(
                candidate.item_type(),
            ));
        }

        let _token = self.claim(recruit_id, item_id)?;
        let prior = self.stores.progress.item_progress(recruit_id, item_id)?;
        self.apply(&item, recruit_id, &candidate, actor, prior, now)
    }

    /// Open the next quiz attempt and return its presentation order.
    pub fn start_quiz_attempt(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<QuizAttemptView, ChecklistServiceError> {
        let item = self.active_item(item_id)?;
        authorize(&item, recruit_id, actor)?;
        let ItemMetadata::Quiz(metadata) = &item.metadata else {
            return Err(ChecklistServiceError::WrongItemType {
                expected: ItemType::Quiz,
                found: item.item_type(),
            });
        };
        let engine = QuizEngine::new(metadata).map_err(EvaluationError::from)?;

        let _token = self.claim(recruit_id, item_id)?;
        let prior = self.stores.progress.item_progress(recruit_id, item_id)?;
        if prior
            .as_ref()
            .is_some_and(|progress| progress.status == ItemStatus::Blocked)
        {
            return Err(ChecklistServiceError::ItemBlocked(item_id.clone()));
        }
        let prior_quiz = match prior.as_ref().and_then(|p| p.response.as_ref()) {
            Some(ItemResponse::Quiz(response)) => Some(response),
            _ => None,
        };
        let (response, plan) = engine
            .start_attempt(prior_quiz, &mut rand::thread_rng(), now)
            .map_err(EvaluationError::from)?;

        let mut progress =
            prior.unwrap_or_else(|| ChecklistItemProgress::new(recruit_id.clone(), &item, now));
        let previous = progress.status;
        progress.response = Some(ItemResponse::Quiz(response));
        progress.status = ItemStatus::InProgress;
        progress.updated_at = now;
        self.finish(&item, progress, previous, None, now)?;

        Ok(QuizAttemptView {
            questions: engine.present(&plan),
            plan,
        })
    }

    pub fn approve_item(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, ChecklistServiceError> {
        let _token = self.claim(recruit_id, item_id)?;
        let (item, mut progress) = self.pending_approval(recruit_id, item_id, actor, "approve")?;
        progress.status = ItemStatus::Completed;
        progress.completed_at = Some(now);
        progress.completed_by = Some(actor.user_id.clone());
        progress.updated_at = now;
        self.finish(&item, progress, ItemStatus::PendingApproval, None, now)
    }

    pub fn reject_item(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
        actor: &Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, ChecklistServiceError> {
        let _token = self.claim(recruit_id, item_id)?;
        let (item, mut progress) = self.pending_approval(recruit_id, item_id, actor, "reject")?;
        progress.status = ItemStatus::Rejected;
        progress.rejection_reason = reason;
        progress.updated_at = now;
        self.finish(&item, progress, ItemStatus::PendingApproval, None, now)
    }

    /// Block or unblock an item. Blocked items refuse responses until unblocked.
    pub fn set_blocked(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
        blocked: bool,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ChecklistItemProgress, ChecklistServiceError> {
        if !actor.role.is_privileged() {
            return Err(ChecklistServiceError::NotPermitted {
                role: actor.role.label(),
                action: "block items",
            });
        }
        let item = self.item(item_id)?;
        let _token = self.claim(recruit_id, item_id)?;
        let mut progress = self
            .stores
            .progress
            .item_progress(recruit_id, item_id)?
            .unwrap_or_else(|| ChecklistItemProgress::new(recruit_id.clone(), &item, now));
        if progress.is_completed() {
            return Err(ChecklistServiceError::AlreadyCompleted(item_id.clone()));
        }
        let previous = progress.status;
        progress.status = match (blocked, progress.response.is_some()) {
            (true, _) => ItemStatus::Blocked,
            (false, true) => ItemStatus::InProgress,
            (false, false) => ItemStatus::NotStarted,
        };
        progress.updated_at = now;
        Ok(self.finish(&item, progress, previous, None, now)?.progress)
    }

    pub fn initiate_signature(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<SignatureProgress, ChecklistServiceError> {
        let item = self.active_item(item_id)?;
        authorize(&item, recruit_id, actor)?;
        let ItemMetadata::SignatureRequired(metadata) = &item.metadata else {
            return Err(ChecklistServiceError::WrongItemType {
                expected: ItemType::SignatureRequired,
                found: item.item_type(),
            });
        };

        let _token = self.claim(recruit_id, item_id)?;
        let prior = self.stores.progress.item_progress(recruit_id, item_id)?;
        if prior.as_ref().is_some_and(ChecklistItemProgress::is_completed) {
            return Err(ChecklistServiceError::AlreadyCompleted(item_id.clone()));
        }
        if let Some(mut open) = self.stores.signatures.open_for_item(recruit_id, item_id)? {
            if !open.expire_if_due(now) {
                return Err(ChecklistServiceError::SubmissionOpen(open.id));
            }
            self.stores.signatures.update(open)?;
        }

        let submission =
            SignatureSubmission::initiate(metadata, recruit_id, item_id, &self.resolver, now)?;
        let submission = self.stores.signatures.insert(submission)?;
        tracing::info!(
            recruit_id = %recruit_id,
            item_id = %item_id,
            submission_id = %submission.id,
            signers = submission.signers.len(),
            "signature submission initiated"
        );

        let candidate = CandidateResponse::SignatureRequired(submission.response());
        let outcome = self.apply(&item, recruit_id, &candidate, &Actor::system(), prior, now)?;
        Ok(SignatureProgress {
            submission,
            outcome,
        })
    }

    pub fn mark_signature_opened(
        &self,
        submission_id: &SubmissionId,
        signer_index: usize,
        now: DateTime<Utc>,
    ) -> Result<SignatureSubmission, ChecklistServiceError> {
        let pending = self.submission(submission_id)?;
        let _token = self.claim(&pending.recruit_id, &pending.item_id)?;
        let mut submission = self.submission(submission_id)?;
        submission.mark_opened(signer_index, now)?;
        self.stores.signatures.update(submission.clone())?;

        // Opening the envelope counts as activity for stall reminders.
        let item = self.item(&submission.item_id)?;
        if let Some(mut phase) = self
            .stores
            .progress
            .phase_progress(&submission.recruit_id, &item.phase_id)?
        {
            phase.touch(now);
            self.stores.progress.save_phase(phase)?;
        }
        Ok(submission)
    }

    pub fn record_signature(
        &self,
        submission_id: &SubmissionId,
        signer_index: usize,
        now: DateTime<Utc>,
    ) -> Result<SignatureProgress, ChecklistServiceError> {
        self.signer_action(submission_id, now, |submission| {
            submission.record_signature(signer_index, now)
        })
    }

    pub fn decline_signature(
        &self,
        submission_id: &SubmissionId,
        signer_index: usize,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<SignatureProgress, ChecklistServiceError> {
        self.signer_action(submission_id, now, |submission| {
            submission.decline(signer_index, reason, now)
        })
    }

    pub fn void_signature(
        &self,
        submission_id: &SubmissionId,
        actor: &Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<SignatureProgress, ChecklistServiceError> {
        if !actor.role.is_privileged() {
            return Err(ChecklistServiceError::NotPermitted {
                role: actor.role.label(),
                action: "void signature requests",
            });
        }
        self.signer_action(submission_id, now, |submission| submission.void(reason, now))
    }

    /// Close every open submission past its deadline and mirror the result onto progress.
    pub fn expire_signatures(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SubmissionId>, ChecklistServiceError> {
        let mut expired = Vec::new();
        for mut submission in self.stores.signatures.open_submissions()? {
            if !submission.expire_if_due(now) {
                continue;
            }
            let Some(_token) = self
                .guard
                .try_acquire(&submission.recruit_id, &submission.item_id)
            else {
                tracing::debug!(
                    submission_id = %submission.id,
                    "submission busy; leaving expiry for the next sweep"
                );
                continue;
            };
            self.stores.signatures.update(submission.clone())?;
            if let Err(err) = self.mirror_signature(&submission, now) {
                tracing::warn!(
                    submission_id = %submission.id,
                    error = %err,
                    "failed to mirror expired signature onto progress"
                );
            }
            expired.push(submission.id);
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired signature submissions");
        }
        Ok(expired)
    }

    pub fn add_contract_request(
        &self,
        recruit_id: &RecruitId,
        carrier_id: CarrierId,
        carrier_name: String,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ContractRequest, ChecklistServiceError> {
        if !matches!(actor.role, ActorRole::Upline | ActorRole::Admin | ActorRole::System) {
            return Err(ChecklistServiceError::NotPermitted {
                role: actor.role.label(),
                action: "request carrier contracts",
            });
        }
        let request = ContractRequest::new(
            recruit_id.clone(),
            carrier_id,
            carrier_name,
            now.date_naive(),
        );
        Ok(self.stores.contracts.insert(request)?)
    }

    pub fn contract_requests(
        &self,
        recruit_id: &RecruitId,
    ) -> Result<Vec<ContractRequest>, ChecklistServiceError> {
        Ok(self.stores.contracts.for_recruit(recruit_id)?)
    }

    /// Record or clear a writing number and re-check the recruit's contracting item.
    pub fn record_writing_number(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
        request_id: &ContractRequestId,
        writing_number: Option<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ContractingOutcome, ChecklistServiceError> {
        ensure_own_checklist(recruit_id, actor)?;
        let (item, metadata) = self.contracting_item(item_id)?;
        let _token = self.claim(recruit_id, item_id)?;
        let mut request = self.contract_request(recruit_id, request_id)?;
        request.set_writing_number(writing_number, actor.role, &metadata, now.date_naive())?;
        self.stores.contracts.update(request.clone())?;
        self.reevaluate_contracting(&item, recruit_id, request, now)
    }

    pub fn update_contract_status(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
        request_id: &ContractRequestId,
        status: ContractStatus,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ContractingOutcome, ChecklistServiceError> {
        ensure_own_checklist(recruit_id, actor)?;
        if !matches!(actor.role, ActorRole::Upline | ActorRole::Admin | ActorRole::System) {
            return Err(ContractingError::NotPermitted(actor.role.label()).into());
        }
        let (item, _) = self.contracting_item(item_id)?;
        let _token = self.claim(recruit_id, item_id)?;
        let mut request = self.contract_request(recruit_id, request_id)?;
        request.transition(status, now.date_naive())?;
        self.stores.contracts.update(request.clone())?;
        self.reevaluate_contracting(&item, recruit_id, request, now)
    }

    fn contracting_item(
        &self,
        item_id: &ItemId,
    ) -> Result<(ChecklistItem, CarrierContractingMetadata), ChecklistServiceError> {
        let item = self.active_item(item_id)?;
        match &item.metadata {
            ItemMetadata::CarrierContracting(metadata) => {
                let metadata = metadata.clone();
                Ok((item, metadata))
            }
            _ => Err(ChecklistServiceError::WrongItemType {
                expected: ItemType::CarrierContracting,
                found: item.item_type(),
            }),
        }
    }

    fn contract_request(
        &self,
        recruit_id: &RecruitId,
        request_id: &ContractRequestId,
    ) -> Result<ContractRequest, ChecklistServiceError> {
        self.stores
            .contracts
            .fetch(request_id)?
            .filter(|request| &request.recruit_id == recruit_id)
            .ok_or_else(|| ChecklistServiceError::ContractRequestNotFound(request_id.clone()))
    }

    /// Callers hold the completion guard for the contracting item.
    fn reevaluate_contracting(
        &self,
        item: &ChecklistItem,
        recruit_id: &RecruitId,
        request: ContractRequest,
        now: DateTime<Utc>,
    ) -> Result<ContractingOutcome, ChecklistServiceError> {
        let requests = self.stores.contracts.for_recruit(recruit_id)?;
        let summary = CarrierContractingResponse::summarize(&requests);

        let prior = self.stores.progress.item_progress(recruit_id, &item.id)?;
        if prior.as_ref().is_some_and(ChecklistItemProgress::is_completed) {
            tracing::debug!(
                recruit_id = %recruit_id,
                item_id = %item.id,
                "contracting item already complete"
            );
            return Ok(ContractingOutcome {
                request,
                summary,
                outcome: None,
            });
        }

        let candidate = CandidateResponse::CarrierContracting(summary.clone());
        let outcome = self.apply(item, recruit_id, &candidate, &Actor::system(), prior, now)?;
        Ok(ContractingOutcome {
            request,
            summary,
            outcome: Some(outcome),
        })
    }

    /// Claim the (recruit, item) pair without waiting; a concurrent holder is reported
    /// as `EvaluationInFlight`.
    fn claim(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
    ) -> Result<InFlight<'_>, ChecklistServiceError> {
        self.guard
            .try_acquire(recruit_id, item_id)
            .ok_or_else(|| ChecklistServiceError::EvaluationInFlight(item_id.clone()))
    }

    #[cfg(test)]
    pub(crate) fn completion_guard(&self) -> &CompletionGuard {
        &self.guard
    }

    fn submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<SignatureSubmission, ChecklistServiceError> {
        self.stores
            .signatures
            .fetch(submission_id)?
            .ok_or_else(|| ChecklistServiceError::SubmissionNotFound(submission_id.clone()))
    }

    fn signer_action<F>(
        &self,
        submission_id: &SubmissionId,
        now: DateTime<Utc>,
        action: F,
    ) -> Result<SignatureProgress, ChecklistServiceError>
    where
        F: FnOnce(&mut SignatureSubmission) -> Result<(), SignatureError>,
    {
        let pending = self.submission(submission_id)?;
        let _token = self.claim(&pending.recruit_id, &pending.item_id)?;
        let mut submission = self.submission(submission_id)?;
        if submission.expire_if_due(now) {
            self.stores.signatures.update(submission.clone())?;
            self.mirror_signature(&submission, now)?;
            return Err(SignatureError::Closed(submission.status).into());
        }
        action(&mut submission)?;
        self.stores.signatures.update(submission.clone())?;
        let outcome = self.mirror_signature(&submission, now)?;
        Ok(SignatureProgress {
            submission,
            outcome,
        })
    }

    /// Callers hold the completion guard for the submission's item.
    fn mirror_signature(
        &self,
        submission: &SignatureSubmission,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, ChecklistServiceError> {
        let item = self.item(&submission.item_id)?;
        let prior = self
            .stores
            .progress
            .item_progress(&submission.recruit_id, &item.id)?;
        let candidate = CandidateResponse::SignatureRequired(submission.response());
        self.apply(
            &item,
            &submission.recruit_id,
            &candidate,
            &Actor::system(),
            prior,
            now,
        )
    }

    fn pending_approval(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
        actor: &Actor,
        action: &'static str,
    ) -> Result<(ChecklistItem, ChecklistItemProgress), ChecklistServiceError> {
        if !actor.role.is_privileged() {
            return Err(ChecklistServiceError::NotPermitted {
                role: actor.role.label(),
                action,
            });
        }
        let item = self.item(item_id)?;
        let progress = self
            .stores
            .progress
            .item_progress(recruit_id, item_id)?
            .filter(|progress| progress.status == ItemStatus::PendingApproval)
            .ok_or_else(|| ChecklistServiceError::NotAwaitingApproval(item_id.clone()))?;
        Ok((item, progress))
    }

    /// Evaluate a candidate against the prior record. Callers hold the completion guard.
    fn apply(
        &self,
        item: &ChecklistItem,
        recruit_id: &RecruitId,
        candidate: &CandidateResponse,
        actor: &Actor,
        prior: Option<ChecklistItemProgress>,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, ChecklistServiceError> {
        if let Some(prior) = &prior {
            match prior.status {
                ItemStatus::Completed => {
                    return Err(ChecklistServiceError::AlreadyCompleted(item.id.clone()))
                }
                ItemStatus::Blocked => {
                    return Err(ChecklistServiceError::ItemBlocked(item.id.clone()))
                }
                ItemStatus::NotStarted
                | ItemStatus::InProgress
                | ItemStatus::PendingApproval
                | ItemStatus::Rejected => {}
            }
        }

        let evaluation = evaluate(
            item,
            candidate,
            prior.as_ref().and_then(|progress| progress.response.as_ref()),
            now,
        )?;

        let mut progress =
            prior.unwrap_or_else(|| ChecklistItemProgress::new(recruit_id.clone(), item, now));
        let previous = progress.status;
        progress.response = Some(evaluation.response);
        progress.updated_at = now;
        progress.rejection_reason = None;
        progress.status = match evaluation.completion {
            Completion::Complete => {
                progress.completed_at = Some(now);
                progress.completed_by = Some(actor.user_id.clone());
                ItemStatus::Completed
            }
            Completion::AwaitingApproval => ItemStatus::PendingApproval,
            Completion::Incomplete => ItemStatus::InProgress,
        };

        self.finish(item, progress, previous, evaluation.details, now)
    }

    /// Commit an item change together with its phase bookkeeping, then publish events.
    fn finish(
        &self,
        item: &ChecklistItem,
        progress: ChecklistItemProgress,
        previous: ItemStatus,
        details: Option<EvaluationDetails>,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, ChecklistServiceError> {
        let recruit_id = progress.recruit_id.clone();
        let mut events = Vec::new();

        let mut phase = self
            .stores
            .progress
            .phase_progress(&recruit_id, &item.phase_id)?
            .unwrap_or_else(|| PhaseProgress::not_started(recruit_id.clone(), item.phase_id.clone()));
        if phase.enter(now) {
            events.push(LifecycleEvent::PhaseEntered {
                recruit_id: recruit_id.clone(),
                phase_id: item.phase_id.clone(),
                at: now,
            });
        }
        phase.touch(now);

        if progress.status == ItemStatus::PendingApproval && previous != ItemStatus::PendingApproval
        {
            events.push(LifecycleEvent::ItemApprovalNeeded {
                recruit_id: recruit_id.clone(),
                item_id: item.id.clone(),
                phase_id: item.phase_id.clone(),
                at: now,
            });
        }

        let mut entered_phase = None;
        let newly_completed =
            progress.status == ItemStatus::Completed && previous != ItemStatus::Completed;
        if newly_completed {
            events.push(LifecycleEvent::ItemCompleted(CompletionEvent {
                recruit_id: recruit_id.clone(),
                item_id: item.id.clone(),
                phase_id: item.phase_id.clone(),
                completed_at: now,
            }));

            if phase.status != PhaseStatus::Completed && self.phase_done(&progress)? {
                phase.status = PhaseStatus::Completed;
                phase.completed_at = Some(now);
                events.push(LifecycleEvent::PhaseCompleted {
                    recruit_id: recruit_id.clone(),
                    phase_id: item.phase_id.clone(),
                    at: now,
                });

                if let Some(next) = self.stores.catalog.next_phase(&item.phase_id)? {
                    let mut next_progress = self
                        .stores
                        .progress
                        .phase_progress(&recruit_id, &next.id)?
                        .unwrap_or_else(|| {
                            PhaseProgress::not_started(recruit_id.clone(), next.id.clone())
                        });
                    if next_progress.enter(now) {
                        events.push(LifecycleEvent::PhaseEntered {
                            recruit_id: recruit_id.clone(),
                            phase_id: next.id.clone(),
                            at: now,
                        });
                        entered_phase = Some(next_progress);
                    }
                }
            }
        }

        self.stores.progress.commit(ProgressChangeSet {
            item: progress.clone(),
            phase,
            entered_phase,
        })?;

        if newly_completed {
            tracing::info!(
                recruit_id = %recruit_id,
                item_id = %item.id,
                item_type = item.item_type().as_str(),
                "checklist item completed"
            );
        }
        self.publish(&events);

        Ok(SubmissionOutcome {
            progress,
            details,
            events,
        })
    }

    /// Whether every active required item in the phase is complete once `current` is saved.
    fn phase_done(&self, current: &ChecklistItemProgress) -> Result<bool, ChecklistServiceError> {
        let items = self.stores.catalog.items_for_phase(&current.phase_id)?;
        let recorded = self
            .stores
            .progress
            .phase_item_progress(&current.recruit_id, &current.phase_id)?;

        Ok(items
            .iter()
            .filter(|item| item.is_active && item.is_required)
            .all(|item| {
                if item.id == current.item_id {
                    return current.is_completed();
                }
                recorded
                    .iter()
                    .any(|progress| progress.item_id == item.id && progress.is_completed())
            }))
    }

    fn publish(&self, events: &[LifecycleEvent]) {
        for event in events {
            if let Err(err) = self.sink.publish(event) {
                tracing::warn!(
                    recruit_id = %event.recruit_id(),
                    event = event.label(),
                    error = %err,
                    "lifecycle event delivery failed"
                );
            }
        }
    }
}

/// Recruits may only touch their own records.
fn ensure_own_checklist(
    recruit_id: &RecruitId,
    actor: &Actor,
) -> Result<(), ChecklistServiceError> {
    if actor.role == ActorRole::Recruit && actor.user_id != recruit_id.as_user() {
        return Err(ChecklistServiceError::NotPermitted {
            role: actor.role.label(),
            action: "act on another recruit's checklist",
        });
    }
    Ok(())
}

fn authorize(
    item: &ChecklistItem,
    recruit_id: &RecruitId,
    actor: &Actor,
) -> Result<(), ChecklistServiceError> {
    ensure_own_checklist(recruit_id, actor)?;
    if actor.role == ActorRole::Recruit {
        if !item.visible_to_recruit {
            return Err(ChecklistServiceError::NotPermitted {
                role: actor.role.label(),
                action: "complete hidden items",
            });
        }
    }
    if !actor.role.may_complete(item.can_be_completed_by) {
        return Err(ChecklistServiceError::NotPermitted {
            role: actor.role.label(),
            action: "complete this item",
        });
    }
    Ok(())
}

/// Error raised by the checklist service.
#[derive(Debug, thiserror::Error)]
pub enum ChecklistServiceError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Contracting(#[from] ContractingError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("checklist item {0} was not found")]
    ItemNotFound(ItemId),
    #[error("phase {0} was not found")]
    PhaseNotFound(PhaseId),
    #[error("signature submission {0} was not found")]
    SubmissionNotFound(SubmissionId),
    #[error("contract request {0} was not found")]
    ContractRequestNotFound(ContractRequestId),
    #[error("checklist item {0} is inactive")]
    ItemInactive(ItemId),
    #[error("checklist item {0} is blocked")]
    ItemBlocked(ItemId),
    #[error("checklist item {0} is already completed")]
    AlreadyCompleted(ItemId),
    #[error("{role} may not {action}")]
    NotPermitted {
        role: &'static str,
        action: &'static str,
    },
    #[error("expected a {expected} item, found {found}")]
    WrongItemType { expected: ItemType, found: ItemType },
    #[error("{0} responses are recorded by their workflow, not submitted directly")]
    SystemDerivedResponse(ItemType),
    #[error("signature submission {0} is still open")]
    SubmissionOpen(SubmissionId),
    #[error("checklist item {0} is not awaiting approval")]
    NotAwaitingApproval(ItemId),
    #[error("another response for item {0} is being evaluated")]
    EvaluationInFlight(ItemId),
}
