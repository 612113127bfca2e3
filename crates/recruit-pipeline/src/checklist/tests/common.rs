use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::checklist::contracting::{
    CarrierContractingMetadata, CompletionCriteria, ContractRequest, ContractRequestId,
};
use crate::checklist::domain::{
    Actor, ActorRole, AgencyId, ChecklistItem, ChecklistItemProgress, CompletedBy, ItemId,
    Phase, PhaseId, PhaseProgress, RecruitId, TemplateId, UserId,
};
use crate::checklist::events::{LifecycleEvent, LifecycleSink, SinkError};
use crate::checklist::metadata::{
    AcknowledgmentMetadata, ChoiceOption, ItemMetadata, MultipleChoiceMetadata,
    TextResponseMetadata, VideoEmbedMetadata,
};
use crate::checklist::quiz::{QuizMetadata, QuizOption, QuizQuestion};
use crate::checklist::repository::{
    ChecklistCatalog, ContractRequestRepository, ProgressChangeSet, ProgressRepository,
    RepositoryError, SignatureRepository,
};
use crate::checklist::service::{ChecklistService, ChecklistStores};
use crate::checklist::signature::{
    SignatureRequiredMetadata, SignatureSubmission, SignerRole, SigningOrder, SubmissionId,
};
use crate::contacts::{
    AgencyRecord, ContactDirectory, ContactRecord, DirectoryError, RecipientResolver,
    RecruitRecord,
};

pub(super) const RECRUIT: &str = "rec-1";
pub(super) const UPLINE: &str = "upl-1";
pub(super) const ORIENTATION: &str = "phase-orientation";
pub(super) const LICENSING: &str = "phase-licensing";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn recruit_id() -> RecruitId {
    RecruitId::new(RECRUIT)
}

pub(super) fn phase(id: &str, order: u32) -> Phase {
    Phase {
        id: PhaseId::new(id),
        template_id: TemplateId::new("template-agent"),
        phase_name: format!("Phase {order}"),
        phase_order: order,
        estimated_days: Some(7),
        is_active: true,
        visible_to_recruit: true,
    }
}

pub(super) fn item(id: &str, phase_id: &str, metadata: ItemMetadata) -> ChecklistItem {
    ChecklistItem {
        id: ItemId::new(id),
        phase_id: PhaseId::new(phase_id),
        item_name: format!("Item {id}"),
        item_description: None,
        item_order: 1,
        is_required: true,
        is_active: true,
        visible_to_recruit: true,
        can_be_completed_by: CompletedBy::Recruit,
        metadata,
    }
}

pub(super) fn acknowledgment_item(id: &str, phase_id: &str) -> ChecklistItem {
    item(
        id,
        phase_id,
        ItemMetadata::Acknowledgment(AcknowledgmentMetadata::default()),
    )
}

pub(super) fn choice_item(id: &str) -> ChecklistItem {
    item(
        id,
        ORIENTATION,
        ItemMetadata::MultipleChoice(MultipleChoiceMetadata {
            options: vec![
                choice("licensed", true, false),
                choice("studying", false, false),
                choice("felony", false, true),
            ],
            min_selections: None,
            max_selections: Some(2),
            require_correct: false,
        }),
    )
}

pub(super) fn choice(id: &str, is_correct: bool, is_disqualifying: bool) -> ChoiceOption {
    ChoiceOption {
        id: id.to_string(),
        label: id.to_uppercase(),
        is_correct,
        is_disqualifying,
    }
}

pub(super) fn text_item(id: &str) -> ChecklistItem {
    item(
        id,
        ORIENTATION,
        ItemMetadata::TextResponse(TextResponseMetadata {
            prompt: Some("Why do you want to join?".to_string()),
            min_length: Some(10),
            max_length: Some(200),
            required_keywords: vec!["license".to_string()],
            validation_pattern: None,
        }),
    )
}

pub(super) fn video_item(id: &str, auto_complete: bool) -> ChecklistItem {
    item(
        id,
        ORIENTATION,
        ItemMetadata::VideoEmbed(VideoEmbedMetadata {
            video_url: Some("https://videos.example.com/welcome".to_string()),
            auto_complete,
            require_full_watch: false,
        }),
    )
}

pub(super) fn quiz_metadata() -> QuizMetadata {
    QuizMetadata {
        questions: vec![
            quiz_question("q1", "a"),
            quiz_question("q2", "b"),
            quiz_question("q3", "c"),
        ],
        pass_threshold: 70,
        allow_retries: true,
        max_attempts: Some(2),
        randomize_questions: false,
        randomize_options: false,
        show_correct_answers: true,
    }
}

pub(super) fn quiz_question(id: &str, correct: &str) -> QuizQuestion {
    QuizQuestion {
        id: id.to_string(),
        prompt: format!("Question {id}"),
        options: ["a", "b", "c"]
            .into_iter()
            .map(|option| QuizOption {
                id: option.to_string(),
                label: option.to_uppercase(),
                is_correct: option == correct,
            })
            .collect(),
        points: 1,
        explanation: None,
    }
}

pub(super) fn quiz_item(id: &str) -> ChecklistItem {
    item(id, ORIENTATION, ItemMetadata::Quiz(quiz_metadata()))
}

pub(super) fn signature_metadata() -> SignatureRequiredMetadata {
    SignatureRequiredMetadata {
        template_id: Some("tpl-agreement".to_string()),
        required_signer_roles: vec![SignerRole::Recruit, SignerRole::Recruiter],
        signing_order: SigningOrder::Sequential,
        expires_in_days: Some(7),
    }
}

pub(super) fn signature_item(id: &str) -> ChecklistItem {
    item(
        id,
        LICENSING,
        ItemMetadata::SignatureRequired(signature_metadata()),
    )
}

pub(super) fn contracting_item(id: &str, required_count: u32) -> ChecklistItem {
    item(
        id,
        LICENSING,
        ItemMetadata::CarrierContracting(CarrierContractingMetadata {
            completion_criteria: CompletionCriteria::Count,
            required_count: Some(required_count),
            allow_recruit_edit_writing_number: false,
        }),
    )
}

pub(super) fn upline() -> Actor {
    Actor {
        user_id: UserId::new(UPLINE),
        role: ActorRole::Upline,
    }
}

pub(super) fn contact(user_id: &str, first: &str, email: Option<&str>) -> ContactRecord {
    ContactRecord {
        user_id: UserId::new(user_id),
        first_name: first.to_string(),
        last_name: "Rivera".to_string(),
        email: email.map(str::to_string),
        phone: Some("+15155550100".to_string()),
    }
}

pub(super) fn directory() -> MemoryDirectory {
    let directory = MemoryDirectory::default();
    directory.add_recruit(RecruitRecord {
        recruit_id: recruit_id(),
        contact: contact(RECRUIT, "Jordan", Some("jordan@recruits.example.com")),
        agency_id: Some(AgencyId::new("agency-1")),
        upline_id: Some(UserId::new(UPLINE)),
        trainer_id: None,
        created_at: now(),
        password_set: true,
    });
    directory.add_user(contact(UPLINE, "Casey", Some("casey@agency.example.com")));
    directory.add_user(contact("own-1", "Morgan", Some("morgan@agency.example.com")));
    directory.add_agency(AgencyRecord {
        agency_id: AgencyId::new("agency-1"),
        name: "Rivera Agency".to_string(),
        owner_id: Some(UserId::new("own-1")),
        contracting_manager_id: None,
    });
    directory
}

/// Service wired to in-memory stores, plus handles on the stores for assertions.
pub(super) struct Harness {
    pub(super) service: Arc<ChecklistService>,
    pub(super) progress: Arc<MemoryProgress>,
    pub(super) signatures: Arc<MemorySignatures>,
    pub(super) contracts: Arc<MemoryContracts>,
    pub(super) sink: Arc<RecordingSink>,
}

pub(super) fn build_service(phases: Vec<Phase>, items: Vec<ChecklistItem>) -> Harness {
    build_service_with(phases, items, Arc::new(directory()))
}

pub(super) fn build_service_with(
    phases: Vec<Phase>,
    items: Vec<ChecklistItem>,
    directory: Arc<dyn ContactDirectory>,
) -> Harness {
    let progress = Arc::new(MemoryProgress::default());
    let signatures = Arc::new(MemorySignatures::default());
    let contracts = Arc::new(MemoryContracts::default());
    let sink = Arc::new(RecordingSink::default());
    let stores = ChecklistStores {
        catalog: Arc::new(MemoryCatalog::new(phases, items)),
        progress: progress.clone(),
        signatures: signatures.clone(),
        contracts: contracts.clone(),
    };
    let service = ChecklistService::new(stores, RecipientResolver::new(directory), sink.clone());
    Harness {
        service: Arc::new(service),
        progress,
        signatures,
        contracts,
        sink,
    }
}

/// Two phases: orientation with the given items, then licensing with one acknowledgment.
pub(super) fn two_phase_service(items: Vec<ChecklistItem>) -> Harness {
    let mut all = items;
    all.push(acknowledgment_item("lic-ack", LICENSING));
    build_service(vec![phase(ORIENTATION, 1), phase(LICENSING, 2)], all)
}

pub(super) struct MemoryCatalog {
    phases: Vec<Phase>,
    items: Vec<ChecklistItem>,
}

impl MemoryCatalog {
    pub(super) fn new(phases: Vec<Phase>, items: Vec<ChecklistItem>) -> Self {
        Self { phases, items }
    }
}

impl ChecklistCatalog for MemoryCatalog {
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
pub(super) struct MemoryProgress {
    items: Mutex<HashMap<(RecruitId, ItemId), ChecklistItemProgress>>,
    phases: Mutex<HashMap<(RecruitId, PhaseId), PhaseProgress>>,
}

impl MemoryProgress {
    pub(super) fn phase(&self, recruit_id: &RecruitId, phase_id: &str) -> Option<PhaseProgress> {
        self.phases
            .lock()
            .expect("progress mutex poisoned")
            .get(&(recruit_id.clone(), PhaseId::new(phase_id)))
            .cloned()
    }

    pub(super) fn insert_item(&self, progress: ChecklistItemProgress) {
        self.items.lock().expect("progress mutex poisoned").insert(
            (progress.recruit_id.clone(), progress.item_id.clone()),
            progress,
        );
    }
}

impl ProgressRepository for MemoryProgress {
    fn item_progress(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
    ) -> Result<Option<ChecklistItemProgress>, RepositoryError> {
        let guard = self.items.lock().expect("progress mutex poisoned");
        Ok(guard.get(&(recruit_id.clone(), item_id.clone())).cloned())
    }

    fn phase_item_progress(
        &self,
        recruit_id: &RecruitId,
        phase_id: &PhaseId,
    ) -> Result<Vec<ChecklistItemProgress>, RepositoryError> {
        let guard = self.items.lock().expect("progress mutex poisoned");
        Ok(guard
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
        let guard = self.phases.lock().expect("progress mutex poisoned");
        Ok(guard.get(&(recruit_id.clone(), phase_id.clone())).cloned())
    }

    fn save_phase(&self, progress: PhaseProgress) -> Result<(), RepositoryError> {
        let mut guard = self.phases.lock().expect("progress mutex poisoned");
        guard.insert(
            (progress.recruit_id.clone(), progress.phase_id.clone()),
            progress,
        );
        Ok(())
    }

    fn commit(&self, changes: ProgressChangeSet) -> Result<(), RepositoryError> {
        self.insert_item(changes.item);
        self.save_phase(changes.phase)?;
        if let Some(entered) = changes.entered_phase {
            self.save_phase(entered)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemorySignatures {
    records: Mutex<HashMap<SubmissionId, SignatureSubmission>>,
}

impl MemorySignatures {
    pub(super) fn all(&self) -> Vec<SignatureSubmission> {
        self.records
            .lock()
            .expect("signature mutex poisoned")
            .values()
            .cloned()
            .collect()
    }
}

impl SignatureRepository for MemorySignatures {
    fn insert(
        &self,
        submission: SignatureSubmission,
    ) -> Result<SignatureSubmission, RepositoryError> {
        let mut guard = self.records.lock().expect("signature mutex poisoned");
        if guard.contains_key(&submission.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(submission.id.clone(), submission.clone());
        Ok(submission)
    }

    fn update(&self, submission: SignatureSubmission) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("signature mutex poisoned");
        guard.insert(submission.id.clone(), submission);
        Ok(())
    }

    fn fetch(&self, id: &SubmissionId) -> Result<Option<SignatureSubmission>, RepositoryError> {
        let guard = self.records.lock().expect("signature mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn open_for_item(
        &self,
        recruit_id: &RecruitId,
        item_id: &ItemId,
    ) -> Result<Option<SignatureSubmission>, RepositoryError> {
        let guard = self.records.lock().expect("signature mutex poisoned");
        Ok(guard
            .values()
            .find(|submission| {
                &submission.recruit_id == recruit_id
                    && &submission.item_id == item_id
                    && !submission.status.is_terminal()
            })
            .cloned())
    }

    fn open_submissions(&self) -> Result<Vec<SignatureSubmission>, RepositoryError> {
        let guard = self.records.lock().expect("signature mutex poisoned");
        Ok(guard
            .values()
            .filter(|submission| !submission.status.is_terminal())
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct MemoryContracts {
    records: Mutex<Vec<ContractRequest>>,
}

impl ContractRequestRepository for MemoryContracts {
    fn insert(&self, request: ContractRequest) -> Result<ContractRequest, RepositoryError> {
        let mut guard = self.records.lock().expect("contract mutex poisoned");
        if guard.iter().any(|existing| existing.id == request.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(request.clone());
        Ok(request)
    }

    fn update(&self, request: ContractRequest) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("contract mutex poisoned");
        match guard.iter_mut().find(|existing| existing.id == request.id) {
            Some(existing) => {
                *existing = request;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &ContractRequestId) -> Result<Option<ContractRequest>, RepositoryError> {
        let guard = self.records.lock().expect("contract mutex poisoned");
        Ok(guard.iter().find(|request| &request.id == id).cloned())
    }

    fn for_recruit(&self, recruit_id: &RecruitId) -> Result<Vec<ContractRequest>, RepositoryError> {
        let guard = self.records.lock().expect("contract mutex poisoned");
        Ok(guard
            .iter()
            .filter(|request| &request.recruit_id == recruit_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct MemoryDirectory {
    recruits: Mutex<HashMap<RecruitId, RecruitRecord>>,
    users: Mutex<HashMap<UserId, ContactRecord>>,
    agencies: Mutex<HashMap<AgencyId, AgencyRecord>>,
}

impl MemoryDirectory {
    pub(super) fn add_recruit(&self, record: RecruitRecord) {
        self.recruits
            .lock()
            .expect("directory mutex poisoned")
            .insert(record.recruit_id.clone(), record);
    }

    pub(super) fn add_user(&self, record: ContactRecord) {
        self.users
            .lock()
            .expect("directory mutex poisoned")
            .insert(record.user_id.clone(), record);
    }

    pub(super) fn add_agency(&self, record: AgencyRecord) {
        self.agencies
            .lock()
            .expect("directory mutex poisoned")
            .insert(record.agency_id.clone(), record);
    }
}

impl ContactDirectory for MemoryDirectory {
    fn recruit(&self, recruit_id: &RecruitId) -> Result<Option<RecruitRecord>, DirectoryError> {
        let guard = self.recruits.lock().expect("directory mutex poisoned");
        Ok(guard.get(recruit_id).cloned())
    }

    fn user(&self, user_id: &UserId) -> Result<Option<ContactRecord>, DirectoryError> {
        let guard = self.users.lock().expect("directory mutex poisoned");
        Ok(guard.get(user_id).cloned())
    }

    fn agency(&self, agency_id: &AgencyId) -> Result<Option<AgencyRecord>, DirectoryError> {
        let guard = self.agencies.lock().expect("directory mutex poisoned");
        Ok(guard.get(agency_id).cloned())
    }
}

#[derive(Default)]
pub(super) struct RecordingSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingSink {
    pub(super) fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }

    pub(super) fn labels(&self) -> Vec<&'static str> {
        self.events().iter().map(LifecycleEvent::label).collect()
    }
}

impl LifecycleSink for RecordingSink {
    fn publish(&self, event: &LifecycleEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

pub(super) struct FailingSink;

impl LifecycleSink for FailingSink {
    fn publish(&self, _event: &LifecycleEvent) -> Result<(), SinkError> {
        Err(SinkError("automation engine offline".to_string()))
    }
}

pub(super) struct UnavailableProgress;

impl ProgressRepository for UnavailableProgress {
    fn item_progress(
        &self,
        _recruit_id: &RecruitId,
        _item_id: &ItemId,
    ) -> Result<Option<ChecklistItemProgress>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn phase_item_progress(
        &self,
        _recruit_id: &RecruitId,
        _phase_id: &PhaseId,
    ) -> Result<Vec<ChecklistItemProgress>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn phase_progress(
        &self,
        _recruit_id: &RecruitId,
        _phase_id: &PhaseId,
    ) -> Result<Option<PhaseProgress>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save_phase(&self, _progress: PhaseProgress) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn commit(&self, _changes: ProgressChangeSet) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
