use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::automation::domain::{
    AutomationContent, AutomationDraft, AutomationId, AutomationScope, Channel,
    CommunicationType, EmailContent, NotificationContent, PipelineAutomation, RecipientConfig,
    SenderConfig, TriggerType,
};
use crate::automation::engine::{AutomationEngine, AutomationStores};
use crate::automation::repository::{
    AutomationLogEntry, AutomationLogRepository, AutomationRepository, DispatchError,
    DispatchRequest, LogCompletion, NotificationDispatcher,
};
use crate::automation::template::PlaceholderFormatter;
use crate::automation::triggers::{DeadlineCandidate, DispatchKey, PhaseActivity, ReminderSource};
use crate::checklist::metadata::AcknowledgmentMetadata;
use crate::checklist::{
    AgencyId, ChecklistCatalog, ChecklistItem, ChecklistItemProgress, CompletedBy, ItemId,
    ItemMetadata, Phase, PhaseId, PhaseProgress, ProgressChangeSet, ProgressRepository,
    RecruitId, RepositoryError, TemplateId, UserId,
};
use crate::config::AutomationSettings;
use crate::contacts::{
    AgencyRecord, ContactDirectory, ContactRecord, DirectoryError, RecipientResolver,
    RecruitRecord,
};

pub(super) const RECRUIT: &str = "rec-1";
pub(super) const UPLINE: &str = "upl-1";
pub(super) const TRAINER: &str = "trn-1";
pub(super) const MANAGER: &str = "mgr-1";
pub(super) const PHASE: &str = "phase-orientation";
pub(super) const ITEM: &str = "item-license";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn recruit_id() -> RecruitId {
    RecruitId::new(RECRUIT)
}

pub(super) fn settings() -> AutomationSettings {
    AutomationSettings {
        portal_base_url: "https://portal.example.com".to_string(),
        sender_email: "team@agency.example.com".to_string(),
        sender_name: "Agency Team".to_string(),
        account_link_hours: 72,
    }
}

pub(super) fn phase_scope() -> AutomationScope {
    AutomationScope::Phase {
        phase_id: PhaseId::new(PHASE),
    }
}

pub(super) fn item_scope() -> AutomationScope {
    AutomationScope::Item {
        item_id: ItemId::new(ITEM),
    }
}

pub(super) fn email_content() -> AutomationContent {
    AutomationContent {
        email: Some(EmailContent {
            subject: "Hi {{recruit_first_name}}".to_string(),
            body_html: "<p>{{phase_name}} with {{upline_name}}: {{portal_link}}</p>".to_string(),
            template_id: None,
        }),
        notification: Some(NotificationContent {
            title: "{{recruit_name}} update".to_string(),
            message: "Day {{days_in_phase}} of {{phase_name}}".to_string(),
        }),
        sms_message: Some("Check in on {{recruit_first_name}}".to_string()),
    }
}

pub(super) fn draft(scope: AutomationScope, trigger: TriggerType) -> AutomationDraft {
    AutomationDraft {
        scope,
        trigger,
        delay_days: None,
        recipients: vec![RecipientConfig::Recruit],
        communication: CommunicationType::Email,
        sender: SenderConfig::System,
        content: email_content(),
        is_active: true,
    }
}

pub(super) fn build(id: &str, draft: AutomationDraft) -> PipelineAutomation {
    draft
        .into_automation(AutomationId::new(id), now())
        .expect("valid automation")
}

pub(super) fn phase_automation(id: &str, trigger: TriggerType) -> PipelineAutomation {
    build(id, draft(phase_scope(), trigger))
}

pub(super) fn stall_automation(id: &str, delay_days: u32) -> PipelineAutomation {
    build(
        id,
        AutomationDraft {
            delay_days: Some(delay_days),
            recipients: vec![RecipientConfig::Upline],
            ..draft(phase_scope(), TriggerType::PhaseStall)
        },
    )
}

pub(super) fn deadline_automation(id: &str, delay_days: u32) -> PipelineAutomation {
    build(
        id,
        AutomationDraft {
            delay_days: Some(delay_days),
            content: AutomationContent {
                email: Some(EmailContent {
                    subject: "{{item_name}} due in {{days_until_deadline}} days".to_string(),
                    body_html: String::new(),
                    template_id: None,
                }),
                ..AutomationContent::default()
            },
            ..draft(item_scope(), TriggerType::ItemDeadlineApproaching)
        },
    )
}

pub(super) fn password_automation(id: &str, trigger: TriggerType) -> PipelineAutomation {
    build(
        id,
        AutomationDraft {
            recipients: vec![RecipientConfig::Upline],
            content: AutomationContent {
                email: Some(EmailContent {
                    subject: "{{user_first_name}}, {{hours_remaining}} hours left".to_string(),
                    body_html: "Finish setup at {{portal_link}}".to_string(),
                    template_id: Some("tpl-password".to_string()),
                }),
                ..AutomationContent::default()
            },
            ..draft(AutomationScope::System, trigger)
        },
    )
}

pub(super) fn contact(
    user_id: &str,
    first: &str,
    email: Option<&str>,
    phone: &str,
) -> ContactRecord {
    ContactRecord {
        user_id: UserId::new(user_id),
        first_name: first.to_string(),
        last_name: "Rivera".to_string(),
        email: email.map(str::to_string),
        phone: Some(phone.to_string()),
    }
}

pub(super) fn recruit_record(created_at: DateTime<Utc>) -> RecruitRecord {
    RecruitRecord {
        recruit_id: recruit_id(),
        contact: contact(
            RECRUIT,
            "Jordan",
            Some("jordan@recruits.example.com"),
            "+15155550101",
        ),
        agency_id: Some(AgencyId::new("agency-1")),
        upline_id: Some(UserId::new(UPLINE)),
        trainer_id: Some(UserId::new(TRAINER)),
        created_at,
        password_set: false,
    }
}

/// Recruit with an upline, a trainer who has no email on file, and an agency
/// contracting manager.
pub(super) fn directory() -> MemoryDirectory {
    let directory = MemoryDirectory::default();
    directory.add_recruit(recruit_record(now()));
    directory.add_user(contact(
        UPLINE,
        "Casey",
        Some("casey@agency.example.com"),
        "+15155550102",
    ));
    directory.add_user(contact(TRAINER, "Taylor", None, "+15155550103"));
    directory.add_user(contact(
        MANAGER,
        "Morgan",
        Some("morgan@agency.example.com"),
        "+15155550104",
    ));
    directory.add_agency(AgencyRecord {
        agency_id: AgencyId::new("agency-1"),
        name: "Rivera Agency".to_string(),
        owner_id: None,
        contracting_manager_id: Some(UserId::new(MANAGER)),
    });
    directory
}

pub(super) fn orientation() -> Phase {
    Phase {
        id: PhaseId::new(PHASE),
        template_id: TemplateId::new("template-agent"),
        phase_name: "Orientation".to_string(),
        phase_order: 1,
        estimated_days: Some(7),
        is_active: true,
        visible_to_recruit: true,
    }
}

pub(super) fn license_item() -> ChecklistItem {
    ChecklistItem {
        id: ItemId::new(ITEM),
        phase_id: PhaseId::new(PHASE),
        item_name: "State License Exam".to_string(),
        item_description: None,
        item_order: 1,
        is_required: true,
        is_active: true,
        visible_to_recruit: true,
        can_be_completed_by: CompletedBy::Recruit,
        metadata: ItemMetadata::Acknowledgment(AcknowledgmentMetadata::default()),
    }
}

pub(super) struct EngineHarness {
    pub(super) engine: Arc<AutomationEngine>,
    pub(super) automations: Arc<MemoryAutomations>,
    pub(super) logs: Arc<MemoryLogs>,
    pub(super) progress: Arc<MemoryProgress>,
    pub(super) dispatcher: Arc<RecordingDispatcher>,
}

pub(super) fn build_engine(automations: Vec<PipelineAutomation>) -> EngineHarness {
    build_engine_with(automations, RecordingDispatcher::default())
}

pub(super) fn build_engine_with(
    automations: Vec<PipelineAutomation>,
    dispatcher: RecordingDispatcher,
) -> EngineHarness {
    build_engine_in(automations, dispatcher, directory())
}

pub(super) fn build_engine_in(
    automations: Vec<PipelineAutomation>,
    dispatcher: RecordingDispatcher,
    directory: MemoryDirectory,
) -> EngineHarness {
    let automation_store = Arc::new(MemoryAutomations::with(automations));
    let logs = Arc::new(MemoryLogs::default());
    let progress = Arc::new(MemoryProgress::default());
    let dispatcher = Arc::new(dispatcher);
    let stores = AutomationStores {
        automations: automation_store.clone(),
        logs: logs.clone(),
        catalog: Arc::new(MemoryCatalog),
        progress: progress.clone(),
    };
    let engine = AutomationEngine::new(
        stores,
        RecipientResolver::new(Arc::new(directory)),
        dispatcher.clone(),
        Arc::new(PlaceholderFormatter),
        settings(),
    );
    EngineHarness {
        engine: Arc::new(engine),
        automations: automation_store,
        logs,
        progress,
        dispatcher,
    }
}

#[derive(Default)]
pub(super) struct MemoryAutomations {
    records: Mutex<Vec<PipelineAutomation>>,
}

impl MemoryAutomations {
    pub(super) fn with(automations: Vec<PipelineAutomation>) -> Self {
        Self {
            records: Mutex::new(automations),
        }
    }
}

impl AutomationRepository for MemoryAutomations {
    fn insert(
        &self,
        automation: PipelineAutomation,
    ) -> Result<PipelineAutomation, RepositoryError> {
        let mut guard = self.records.lock().expect("automation mutex poisoned");
        if guard.iter().any(|existing| existing.id == automation.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(automation.clone());
        Ok(automation)
    }

    fn update(&self, automation: PipelineAutomation) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("automation mutex poisoned");
        let slot = guard
            .iter_mut()
            .find(|existing| existing.id == automation.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = automation;
        Ok(())
    }

    fn fetch(&self, id: &AutomationId) -> Result<Option<PipelineAutomation>, RepositoryError> {
        let guard = self.records.lock().expect("automation mutex poisoned");
        Ok(guard.iter().find(|automation| &automation.id == id).cloned())
    }

    fn delete(&self, id: &AutomationId) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("automation mutex poisoned");
        let before = guard.len();
        guard.retain(|automation| &automation.id != id);
        if guard.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<PipelineAutomation>, RepositoryError> {
        Ok(self.records.lock().expect("automation mutex poisoned").clone())
    }

    fn active_for(
        &self,
        trigger: TriggerType,
        scope: &AutomationScope,
    ) -> Result<Vec<PipelineAutomation>, RepositoryError> {
        let guard = self.records.lock().expect("automation mutex poisoned");
        Ok(guard
            .iter()
            .filter(|automation| automation.matches(trigger, scope))
            .cloned()
            .collect())
    }
}

/// Log store; claims for automations listed via `refuse_claims_for` fail as unavailable.
#[derive(Default)]
pub(super) struct MemoryLogs {
    entries: Mutex<Vec<AutomationLogEntry>>,
    refused: Mutex<HashSet<AutomationId>>,
}

impl MemoryLogs {
    pub(super) fn entries(&self) -> Vec<AutomationLogEntry> {
        self.entries.lock().expect("log mutex poisoned").clone()
    }

    pub(super) fn refuse_claims_for(&self, id: &str) {
        self.refused
            .lock()
            .expect("log mutex poisoned")
            .insert(AutomationId::new(id));
    }
}

impl AutomationLogRepository for MemoryLogs {
    fn claim(&self, entry: AutomationLogEntry) -> Result<bool, RepositoryError> {
        if self
            .refused
            .lock()
            .expect("log mutex poisoned")
            .contains(&entry.automation_id)
        {
            return Err(RepositoryError::Unavailable("log store offline".to_string()));
        }
        let mut guard = self.entries.lock().expect("log mutex poisoned");
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
        let mut guard = self.entries.lock().expect("log mutex poisoned");
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
        Ok(self
            .entries()
            .into_iter()
            .filter(|entry| &entry.automation_id == id)
            .collect())
    }

    fn for_recruit(&self, recruit_id: &RecruitId) -> Result<Vec<AutomationLogEntry>, RepositoryError> {
        Ok(self
            .entries()
            .into_iter()
            .filter(|entry| &entry.recruit_id == recruit_id)
            .collect())
    }
}

/// Single-phase catalog holding the orientation phase and the license item.
pub(super) struct MemoryCatalog;

impl ChecklistCatalog for MemoryCatalog {
    fn item(&self, id: &ItemId) -> Result<Option<ChecklistItem>, RepositoryError> {
        Ok(Some(license_item()).filter(|item| &item.id == id))
    }

    fn phase(&self, id: &PhaseId) -> Result<Option<Phase>, RepositoryError> {
        Ok(Some(orientation()).filter(|phase| &phase.id == id))
    }

    fn items_for_phase(&self, id: &PhaseId) -> Result<Vec<ChecklistItem>, RepositoryError> {
        Ok(vec![license_item()]
            .into_iter()
            .filter(|item| &item.phase_id == id)
            .collect())
    }

    fn next_phase(&self, _id: &PhaseId) -> Result<Option<Phase>, RepositoryError> {
        Ok(None)
    }
}

#[derive(Default)]
pub(super) struct MemoryProgress {
    items: Mutex<HashMap<(RecruitId, ItemId), ChecklistItemProgress>>,
    phases: Mutex<HashMap<(RecruitId, PhaseId), PhaseProgress>>,
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
        self.phases.lock().expect("progress mutex poisoned").insert(
            (progress.recruit_id.clone(), progress.phase_id.clone()),
            progress,
        );
        Ok(())
    }

    fn commit(&self, changes: ProgressChangeSet) -> Result<(), RepositoryError> {
        self.items.lock().expect("progress mutex poisoned").insert(
            (changes.item.recruit_id.clone(), changes.item.item_id.clone()),
            changes.item,
        );
        self.save_phase(changes.phase)?;
        if let Some(entered) = changes.entered_phase {
            self.save_phase(entered)?;
        }
        Ok(())
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

/// Records every request. Channels listed in `failing` are refused.
#[derive(Default)]
pub(super) struct RecordingDispatcher {
    requests: Mutex<Vec<DispatchRequest>>,
    failing: HashSet<Channel>,
}

impl RecordingDispatcher {
    pub(super) fn failing(channels: &[Channel]) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failing: channels.iter().copied().collect(),
        }
    }

    pub(super) fn requests(&self) -> Vec<DispatchRequest> {
        self.requests.lock().expect("dispatcher mutex poisoned").clone()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(&self, request: &DispatchRequest) -> Result<(), DispatchError> {
        if self.failing.contains(&request.channel) {
            return Err(DispatchError(format!("{} gateway down", request.channel)));
        }
        self.requests
            .lock()
            .expect("dispatcher mutex poisoned")
            .push(request.clone());
        Ok(())
    }
}

/// Fixed view for the reminder sweep. `None` sections fail as unavailable.
#[derive(Default)]
pub(super) struct StaticReminders {
    pub(super) phases: Option<Vec<PhaseActivity>>,
    pub(super) deadlines: Option<Vec<DeadlineCandidate>>,
    pub(super) accounts: Option<Vec<RecruitRecord>>,
}

impl StaticReminders {
    pub(super) fn empty() -> Self {
        Self {
            phases: Some(Vec::new()),
            deadlines: Some(Vec::new()),
            accounts: Some(Vec::new()),
        }
    }
}

fn unavailable<T: Clone>(section: &Option<Vec<T>>) -> Result<Vec<T>, RepositoryError> {
    section
        .clone()
        .ok_or_else(|| RepositoryError::Unavailable("reminder store offline".to_string()))
}

impl ReminderSource for StaticReminders {
    fn phases_in_progress(&self) -> Result<Vec<PhaseActivity>, RepositoryError> {
        unavailable(&self.phases)
    }

    fn deadlines(&self) -> Result<Vec<DeadlineCandidate>, RepositoryError> {
        unavailable(&self.deadlines)
    }

    fn pending_accounts(&self) -> Result<Vec<RecruitRecord>, RepositoryError> {
        unavailable(&self.accounts)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
