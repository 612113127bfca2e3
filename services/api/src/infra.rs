use chrono::{DateTime, Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use recruit_pipeline::automation::{
    AutomationApi, AutomationEngine, AutomationId, AutomationLogEntry, AutomationLogRepository,
    AutomationRepository, AutomationScope, AutomationService, AutomationStores,
    DeadlineCandidate, DispatchError, DispatchKey, DispatchRequest, LogCompletion,
    NotificationDispatcher, PhaseActivity, PipelineAutomation, PlaceholderFormatter,
    ReminderSource, TriggerType,
};
use recruit_pipeline::checklist::metadata::{
    AcknowledgmentMetadata, BooleanQuestionMetadata, DocumentUploadMetadata,
    TextResponseMetadata,
};
use recruit_pipeline::checklist::{
    AgencyId, CarrierContractingMetadata, ChecklistCatalog, ChecklistItem,
    ChecklistItemProgress, ChecklistService, ChecklistStores, CompletedBy, ContractRequest,
    ContractRequestId, ContractRequestRepository, ItemId, ItemMetadata, ItemStatus, Phase,
    PhaseId, PhaseProgress, PhaseStatus, ProgressChangeSet, ProgressRepository, RecruitId,
    RepositoryError, SignatureRepository, SignatureRequiredMetadata, SignatureSubmission,
    SignerRole, SigningOrder, SubmissionId, TemplateId, UserId,
};
use recruit_pipeline::config::AutomationSettings;
use recruit_pipeline::contacts::{
    AgencyRecord, ContactDirectory, ContactRecord, DirectoryError, RecipientResolver,
    RecruitRecord,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

pub(crate) const DEMO_RECRUIT: &str = "rec-demo";
pub(crate) const DEMO_UPLINE: &str = "upl-demo";
pub(crate) const DEMO_MANAGER: &str = "mgr-demo";
pub(crate) const DEMO_AGENCY: &str = "agency-demo";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
}

/// Every in-memory collaborator plus the services built on top of them.
pub(crate) struct Pipeline {
    pub(crate) checklist: Arc<ChecklistService>,
    pub(crate) automation: AutomationApi,
    pub(crate) dispatcher: Arc<TracingDispatcher>,
    pub(crate) logs: Arc<InMemoryAutomationLogs>,
}

impl Pipeline {
    /// Wire the checklist service to the automation engine over the standard
    /// template and the demo agency directory.
    pub(crate) fn in_memory(settings: AutomationSettings) -> Self {
        let catalog = Arc::new(InMemoryCatalog::standard());
        let progress = Arc::new(InMemoryProgress::default());
        let directory = Arc::new(InMemoryDirectory::demo(Utc::now()));
        let automations = Arc::new(InMemoryAutomations::default());
        let logs = Arc::new(InMemoryAutomationLogs::default());
        let dispatcher = Arc::new(TracingDispatcher::default());

        let engine = Arc::new(AutomationEngine::new(
            AutomationStores {
                automations: automations.clone(),
                logs: logs.clone(),
                catalog: catalog.clone(),
                progress: progress.clone(),
            },
            RecipientResolver::new(directory.clone()),
            dispatcher.clone(),
            Arc::new(PlaceholderFormatter),
            settings,
        ));

        let checklist = Arc::new(ChecklistService::new(
            ChecklistStores {
                catalog: catalog.clone(),
                progress: progress.clone(),
                signatures: Arc::new(InMemorySignatures::default()),
                contracts: Arc::new(InMemoryContracts::default()),
            },
            RecipientResolver::new(directory.clone()),
            engine.clone(),
        ));

        let automation = AutomationApi {
            service: Arc::new(AutomationService::new(automations, logs.clone())),
            engine,
            reminders: Arc::new(StoreReminders {
                catalog,
                progress,
                directory,
            }),
        };

        Self {
            checklist,
            automation,
            dispatcher,
            logs,
        }
    }
}

fn phase(id: &str, name: &str, order: u32, estimated_days: u32) -> Phase {
    Phase {
        id: PhaseId::new(id),
        template_id: TemplateId::new("template-agent"),
        phase_name: name.to_string(),
        phase_order: order,
        estimated_days: Some(estimated_days),
        is_active: true,
        visible_to_recruit: true,
    }
}

fn item(
    id: &str,
    phase_id: &str,
    name: &str,
    order: u32,
    completed_by: CompletedBy,
    metadata: ItemMetadata,
) -> ChecklistItem {
    ChecklistItem {
        id: ItemId::new(id),
        phase_id: PhaseId::new(phase_id),
        item_name: name.to_string(),
        item_description: None,
        item_order: order,
        is_required: true,
        is_active: true,
        visible_to_recruit: true,
        can_be_completed_by: completed_by,
        metadata,
    }
}

pub(crate) struct InMemoryCatalog {
    phases: Vec<Phase>,
    items: Vec<ChecklistItem>,
}

impl InMemoryCatalog {
    /// Three-phase agent onboarding template.
    pub(crate) fn standard() -> Self {
        let phases = vec![
            phase("phase-orientation", "Orientation", 1, 7),
            phase("phase-licensing", "Licensing", 2, 21),
            phase("phase-contracting", "Contracting", 3, 30),
        ];
        let items = vec![
            item(
                "item-handbook",
                "phase-orientation",
                "Agent Handbook",
                1,
                CompletedBy::Recruit,
                ItemMetadata::Acknowledgment(AcknowledgmentMetadata {
                    document_text: Some("I have read the agent handbook.".to_string()),
                    require_scroll: true,
                }),
            ),
            item(
                "item-licensed",
                "phase-orientation",
                "Existing License",
                2,
                CompletedBy::Recruit,
                ItemMetadata::BooleanQuestion(BooleanQuestionMetadata {
                    question: "Do you already hold a state insurance license?".to_string(),
                    ..BooleanQuestionMetadata::default()
                }),
            ),
            item(
                "item-why",
                "phase-licensing",
                "Why Insurance",
                1,
                CompletedBy::Recruit,
                ItemMetadata::TextResponse(TextResponseMetadata {
                    prompt: Some("Why do you want to become an agent?".to_string()),
                    min_length: Some(20),
                    ..TextResponseMetadata::default()
                }),
            ),
            item(
                "item-license-upload",
                "phase-licensing",
                "License Upload",
                2,
                CompletedBy::Recruit,
                ItemMetadata::DocumentUpload(DocumentUploadMetadata {
                    document_type: Some("state_license".to_string()),
                    requires_verification: true,
                }),
            ),
            item(
                "item-agreement",
                "phase-contracting",
                "Independent Contractor Agreement",
                1,
                CompletedBy::Recruit,
                ItemMetadata::SignatureRequired(SignatureRequiredMetadata {
                    template_id: Some("ica-2025".to_string()),
                    required_signer_roles: vec![SignerRole::Recruit, SignerRole::Recruiter],
                    signing_order: SigningOrder::Sequential,
                    expires_in_days: Some(14),
                }),
            ),
            item(
                "item-carriers",
                "phase-contracting",
                "Carrier Appointments",
                2,
                CompletedBy::Upline,
                ItemMetadata::CarrierContracting(CarrierContractingMetadata::default()),
            ),
        ];
        Self { phases, items }
    }

    fn phases(&self) -> &[Phase] {
        &self.phases
    }
}

impl ChecklistCatalog for InMemoryCatalog {
    fn item(&self, id: &ItemId) -> Result<Option<ChecklistItem>, RepositoryError> {
        Ok(self.items.iter().find(|item| &item.id == id).cloned())
    }

    fn phase(&self, id: &PhaseId) -> Result<Option<Phase>, RepositoryError> {
        Ok(self.phases.iter().find(|phase| &phase.id == id).cloned())
    }

    fn items_for_phase(&self, id: &PhaseId) -> Result<Vec<ChecklistItem>, RepositoryError> {
        Ok(self
            .items
            .iter()
            .filter(|item| &item.phase_id == id)
            .cloned()
            .collect())
    }

    fn next_phase(&self, id: &PhaseId) -> Result<Option<Phase>, RepositoryError> {
        let Some(current) = self.phases.iter().find(|phase| &phase.id == id) else {
            return Ok(None);
        };
        Ok(self
            .phases
            .iter()
            .filter(|phase| {
                phase.is_active
                    && phase.template_id == current.template_id
                    && phase.phase_order > current.phase_order
            })
            .min_by_key(|phase| phase.phase_order)
            .cloned())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryProgress {
    items: Mutex<HashMap<(RecruitId, ItemId), ChecklistItemProgress>>,
    phases: Mutex<HashMap<(RecruitId, PhaseId), PhaseProgress>>,
}

impl InMemoryProgress {
    fn open_phases(&self) -> Result<Vec<PhaseProgress>, RepositoryError> {
        Ok(lock(&self.phases)?
            .values()
            .filter(|progress| progress.status == PhaseStatus::InProgress)
            .cloned()
            .collect())
    }
}

impl ProgressRepository for InMemoryProgress {
    fn item_progress(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
    ) -> Result<Option<ChecklistItemProgress>, RepositoryError> {
        Ok(lock(&self.items)?
            .get(&(recruit_id.clone(), item_id.clone()))
            .cloned())
    }

    fn phase_item_progress(
        &self,
        recruit_id: &RecruitId,
        phase_id: &PhaseId,
    ) -> Result<Vec<ChecklistItemProgress>, RepositoryError> {
        Ok(lock(&self.items)?
            .values()
            .filter(|progress| &progress.recruit_id == recruit_id && &progress.phase_id == phase_id)
            .cloned()
            .collect())
    }

    fn phase_progress(
        &self,
        recruit_id: &RecruitId,
        phase_id: &PhaseId,
    ) -> Result<Option<PhaseProgress>, RepositoryError> {
        Ok(lock(&self.phases)?
            .get(&(recruit_id.clone(), phase_id.clone()))
            .cloned())
    }

    fn save_phase(&self, progress: PhaseProgress) -> Result<(), RepositoryError> {
        lock(&self.phases)?.insert(
            (progress.recruit_id.clone(), progress.phase_id.clone()),
            progress,
        );
        Ok(())
    }

    fn commit(&self, changes: ProgressChangeSet) -> Result<(), RepositoryError> {
        // Both maps stay locked so readers never see half a change set.
        let mut items = lock(&self.items)?;
        let mut phases = lock(&self.phases)?;
        items.insert(
            (changes.item.recruit_id.clone(), changes.item.item_id.clone()),
            changes.item,
        );
        phases.insert(
            (changes.phase.recruit_id.clone(), changes.phase.phase_id.clone()),
            changes.phase,
        );
        if let Some(entered) = changes.entered_phase {
            phases.insert(
                (entered.recruit_id.clone(), entered.phase_id.clone()),
                entered,
            );
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct InMemorySignatures {
    records: Mutex<HashMap<SubmissionId, SignatureSubmission>>,
}

impl SignatureRepository for InMemorySignatures {
    fn insert(
        &self,
        submission: SignatureSubmission,
    ) -> Result<SignatureSubmission, RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard.contains_key(&submission.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(submission.id.clone(), submission.clone());
        Ok(submission)
    }

    fn update(&self, submission: SignatureSubmission) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        match guard.get_mut(&submission.id) {
            Some(slot) => {
                *slot = submission;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &SubmissionId) -> Result<Option<SignatureSubmission>, RepositoryError> {
        Ok(lock(&self.records)?.get(id).cloned())
    }

    fn open_for_item(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
    ) -> Result<Option<SignatureSubmission>, RepositoryError> {
        Ok(lock(&self.records)?
            .values()
            .find(|submission| {
                &submission.recruit_id == recruit_id
                    && &submission.item_id == item_id
                    && !submission.status.is_terminal()
            })
            .cloned())
    }

    fn open_submissions(&self) -> Result<Vec<SignatureSubmission>, RepositoryError> {
        Ok(lock(&self.records)?
            .values()
            .filter(|submission| !submission.status.is_terminal())
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryContracts {
    records: Mutex<HashMap<ContractRequestId, ContractRequest>>,
}

impl ContractRequestRepository for InMemoryContracts {
    fn insert(&self, request: ContractRequest) -> Result<ContractRequest, RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn update(&self, request: ContractRequest) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        match guard.get_mut(&request.id) {
            Some(slot) => {
                *slot = request;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &ContractRequestId) -> Result<Option<ContractRequest>, RepositoryError> {
        Ok(lock(&self.records)?.get(id).cloned())
    }

    fn for_recruit(&self, recruit_id: &RecruitId) -> Result<Vec<ContractRequest>, RepositoryError> {
        let mut requests: Vec<_> = lock(&self.records)?
            .values()
            .filter(|request| &request.recruit_id == recruit_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| a.requested_date.cmp(&b.requested_date).then(a.id.cmp(&b.id)));
        Ok(requests)
    }
}

fn person(user_id: &str, first: &str, last: &str, email: &str) -> ContactRecord {
    ContactRecord {
        user_id: UserId::new(user_id),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: Some(email.to_string()),
        phone: None,
    }
}

#[derive(Default)]
pub(crate) struct InMemoryDirectory {
    recruits: Mutex<HashMap<RecruitId, RecruitRecord>>,
    users: Mutex<HashMap<UserId, ContactRecord>>,
    agencies: Mutex<HashMap<AgencyId, AgencyRecord>>,
}

impl InMemoryDirectory {
    /// One agency with an owner acting as upline, a contracting manager, and
    /// a freshly invited recruit.
    pub(crate) fn demo(invited_at: DateTime<Utc>) -> Self {
        let recruit = RecruitRecord {
            recruit_id: RecruitId::new(DEMO_RECRUIT),
            contact: person(DEMO_RECRUIT, "Jordan", "Lee", "jordan.lee@example.com"),
            agency_id: Some(AgencyId::new(DEMO_AGENCY)),
            upline_id: Some(UserId::new(DEMO_UPLINE)),
            trainer_id: None,
            created_at: invited_at,
            password_set: false,
        };
        let users = [
            person(DEMO_UPLINE, "Casey", "Morgan", "casey.morgan@example.com"),
            person(DEMO_MANAGER, "Riley", "Chen", "contracting@example.com"),
        ];
        let agency = AgencyRecord {
            agency_id: AgencyId::new(DEMO_AGENCY),
            name: "Morgan Financial Group".to_string(),
            owner_id: Some(UserId::new(DEMO_UPLINE)),
            contracting_manager_id: Some(UserId::new(DEMO_MANAGER)),
        };

        Self {
            recruits: Mutex::new(HashMap::from([(recruit.recruit_id.clone(), recruit)])),
            users: Mutex::new(
                users
                    .into_iter()
                    .map(|user| (user.user_id.clone(), user))
                    .collect(),
            ),
            agencies: Mutex::new(HashMap::from([(agency.agency_id.clone(), agency)])),
        }
    }

    fn pending_accounts(&self) -> Result<Vec<RecruitRecord>, RepositoryError> {
        Ok(lock(&self.recruits)?
            .values()
            .filter(|record| !record.password_set)
            .cloned()
            .collect())
    }
}

fn directory_lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, DirectoryError> {
    mutex
        .lock()
        .map_err(|_| DirectoryError::Unavailable("directory poisoned".to_string()))
}

impl ContactDirectory for InMemoryDirectory {
    fn recruit(&self, recruit_id: &RecruitId) -> Result<Option<RecruitRecord>, DirectoryError> {
        Ok(directory_lock(&self.recruits)?.get(recruit_id).cloned())
    }

    fn user(&self, user_id: &UserId) -> Result<Option<ContactRecord>, DirectoryError> {
        Ok(directory_lock(&self.users)?.get(user_id).cloned())
    }

    fn agency(&self, agency_id: &AgencyId) -> Result<Option<AgencyRecord>, DirectoryError> {
        Ok(directory_lock(&self.agencies)?.get(agency_id).cloned())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryAutomations {
    records: Mutex<Vec<PipelineAutomation>>,
}

impl AutomationRepository for InMemoryAutomations {
    fn insert(
        &self,
        automation: PipelineAutomation,
    ) -> Result<PipelineAutomation, RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard.iter().any(|existing| existing.id == automation.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(automation.clone());
        Ok(automation)
    }

    fn update(&self, automation: PipelineAutomation) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        let slot = guard
            .iter_mut()
            .find(|existing| existing.id == automation.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = automation;
        Ok(())
    }

    fn fetch(&self, id: &AutomationId) -> Result<Option<PipelineAutomation>, RepositoryError> {
        Ok(lock(&self.records)?
            .iter()
            .find(|automation| &automation.id == id)
            .cloned())
    }

    fn delete(&self, id: &AutomationId) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        let before = guard.len();
        guard.retain(|automation| &automation.id != id);
        if guard.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<PipelineAutomation>, RepositoryError> {
        Ok(lock(&self.records)?.clone())
    }

    fn active_for(
        &self,
        trigger: TriggerType,
        scope: &AutomationScope,
    ) -> Result<Vec<PipelineAutomation>, RepositoryError> {
        Ok(lock(&self.records)?
            .iter()
            .filter(|automation| automation.matches(trigger, scope))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryAutomationLogs {
    entries: Mutex<Vec<AutomationLogEntry>>,
}

impl InMemoryAutomationLogs {
    pub(crate) fn entries(&self) -> Result<Vec<AutomationLogEntry>, RepositoryError> {
        Ok(lock(&self.entries)?.clone())
    }
}

impl AutomationLogRepository for InMemoryAutomationLogs {
    fn claim(&self, entry: AutomationLogEntry) -> Result<bool, RepositoryError> {
        let mut guard = lock(&self.entries)?;
        if guard
            .iter()
            .any(|existing| existing.dedupe_key == entry.dedupe_key)
        {
            return Ok(false);
        }
        guard.push(entry);
        Ok(true)
    }

    fn complete(&self, key: &DispatchKey, completion: LogCompletion) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.entries)?;
        let entry = guard
            .iter_mut()
            .find(|entry| &entry.dedupe_key == key)
            .ok_or(RepositoryError::NotFound)?;
        entry.status = completion.status;
        entry.delivered = completion.delivered;
        entry.failed = completion.failed;
        entry.note = completion.note;
        entry.finished_at = Some(completion.finished_at);
        Ok(())
    }

    fn for_automation(&self, id: &AutomationId) -> Result<Vec<AutomationLogEntry>, RepositoryError> {
        Ok(lock(&self.entries)?
            .iter()
            .filter(|entry| &entry.automation_id == id)
            .cloned()
            .collect())
    }

    fn for_recruit(
        &self,
        recruit_id: &RecruitId,
    ) -> Result<Vec<AutomationLogEntry>, RepositoryError> {
        Ok(lock(&self.entries)?
            .iter()
            .filter(|entry| &entry.recruit_id == recruit_id)
            .cloned()
            .collect())
    }
}

/// Delivery stand-in: every request is logged and kept for inspection.
#[derive(Default)]
pub(crate) struct TracingDispatcher {
    sent: Mutex<Vec<DispatchRequest>>,
}

impl TracingDispatcher {
    pub(crate) fn sent(&self) -> Vec<DispatchRequest> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl NotificationDispatcher for TracingDispatcher {
    fn dispatch(&self, request: &DispatchRequest) -> Result<(), DispatchError> {
        info!(
            automation_id = %request.automation_id,
            recruit_id = %request.recruit_id,
            channel = %request.channel,
            recipient = request.recipient.role.label(),
            subject = request.subject.as_deref().unwrap_or(""),
            "notification dispatched"
        );
        self.sent
            .lock()
            .map_err(|_| DispatchError("dispatch log poisoned".to_string()))?
            .push(request.clone());
        Ok(())
    }
}

/// Reminder view over the in-memory stores. Item deadlines fall
/// `estimated_days` after the phase was entered.
pub(crate) struct StoreReminders {
    catalog: Arc<InMemoryCatalog>,
    progress: Arc<InMemoryProgress>,
    directory: Arc<InMemoryDirectory>,
}

impl ReminderSource for StoreReminders {
    fn phases_in_progress(&self) -> Result<Vec<PhaseActivity>, RepositoryError> {
        Ok(self
            .progress
            .open_phases()?
            .iter()
            .filter_map(PhaseActivity::from_progress)
            .collect())
    }

    fn deadlines(&self) -> Result<Vec<DeadlineCandidate>, RepositoryError> {
        let mut deadlines = Vec::new();
        for open in self.progress.open_phases()? {
            let Some(started_at) = open.started_at else {
                continue;
            };
            let Some(estimated_days) = self
                .catalog
                .phases()
                .iter()
                .find(|phase| phase.id == open.phase_id)
                .and_then(|phase| phase.estimated_days)
            else {
                continue;
            };
            let deadline = started_at.date_naive() + Duration::days(i64::from(estimated_days));

            for item in self.catalog.items_for_phase(&open.phase_id)? {
                if !item.is_required || !item.is_active {
                    continue;
                }
                let done = self
                    .progress
                    .item_progress(&open.recruit_id, &item.id)?
                    .is_some_and(|progress| progress.status == ItemStatus::Completed);
                if !done {
                    deadlines.push(DeadlineCandidate {
                        recruit_id: open.recruit_id.clone(),
                        item_id: item.id,
                        deadline,
                    });
                }
            }
        }
        Ok(deadlines)
    }

    fn pending_accounts(&self) -> Result<Vec<RecruitRecord>, RepositoryError> {
        self.directory.pending_accounts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recruit_pipeline::checklist::{Actor, CandidateResponse};

    fn handbook() -> CandidateResponse {
        CandidateResponse::Acknowledgment {
            acknowledged: true,
            scroll_completed: true,
        }
    }

    #[test]
    fn standard_template_advances_in_order() {
        let catalog = InMemoryCatalog::standard();

        let next = catalog
            .next_phase(&PhaseId::new("phase-orientation"))
            .expect("catalog readable")
            .expect("licensing follows");
        assert_eq!(next.phase_name, "Licensing");
        assert!(catalog
            .next_phase(&PhaseId::new("phase-contracting"))
            .expect("catalog readable")
            .is_none());
    }

    #[test]
    fn deadlines_cover_unfinished_required_items_of_open_phases() {
        let pipeline = Pipeline::in_memory(AutomationSettings::default());
        let recruit = RecruitId::new(DEMO_RECRUIT);
        let now = Utc::now();
        pipeline
            .checklist
            .submit(
                &recruit,
                &ItemId::new("item-handbook"),
                handbook(),
                &Actor::recruit(&recruit),
                now,
            )
            .expect("handbook acknowledged");

        let deadlines = pipeline
            .automation
            .reminders
            .deadlines()
            .expect("deadlines computed");

        assert_eq!(deadlines.len(), 1);
        assert_eq!(deadlines[0].item_id, ItemId::new("item-licensed"));
        assert_eq!(
            deadlines[0].deadline,
            now.date_naive() + Duration::days(7)
        );
    }

    #[test]
    fn demo_recruit_awaits_account_setup() {
        let pipeline = Pipeline::in_memory(AutomationSettings::default());

        let pending = pipeline
            .automation
            .reminders
            .pending_accounts()
            .expect("directory readable");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].recruit_id, RecruitId::new(DEMO_RECRUIT));
        assert!(pipeline
            .automation
            .reminders
            .phases_in_progress()
            .expect("progress readable")
            .is_empty());
    }
}
