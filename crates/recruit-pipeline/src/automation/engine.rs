use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    AutomationId, AutomationScope, Channel, PipelineAutomation, RecipientConfig, TriggerType,
};
use super::repository::{
    AutomationLogEntry, AutomationLogRepository, AutomationLogStatus, AutomationRepository,
    DispatchRequest, LogCompletion, NotificationDispatcher,
};
use super::template::{
    TemplateError, TemplateFormatter, TemplateKey, TemplateVariables, TriggerCategory,
};
use super::triggers::{
    account_reminder_due, hours_before_expiry, DeadlineCandidate, DispatchKey, DispatchWindow,
    PhaseActivity, ReminderSource,
};
use crate::checklist::{
    ChecklistCatalog, ItemId, LifecycleEvent, LifecycleSink, PhaseId, ProgressRepository,
    RecruitId, RepositoryError, SinkError,
};
use crate::config::AutomationSettings;
use crate::contacts::{ConcreteContact, ContactRole, RecipientResolver, RecruitRecord, Requirement};

/// Stores the engine reads while selecting and rendering automations.
#[derive(Clone)]
pub struct AutomationStores {
    pub automations: Arc<dyn AutomationRepository>,
    pub logs: Arc<dyn AutomationLogRepository>,
    pub catalog: Arc<dyn ChecklistCatalog>,
    pub progress: Arc<dyn ProgressRepository>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Sent,
    Skipped,
    Failed,
    /// The window was already claimed by an earlier run.
    Duplicate,
}

/// What happened to one automation for one recruit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Execution {
    pub automation_id: AutomationId,
    pub recruit_id: RecruitId,
    pub trigger: TriggerType,
    pub status: ExecutionStatus,
    pub delivered: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub executions: Vec<Execution>,
}

impl DispatchReport {
    pub fn count(&self, status: ExecutionStatus) -> usize {
        self.executions
            .iter()
            .filter(|execution| execution.status == status)
            .count()
    }

    pub fn delivered(&self) -> u32 {
        self.executions.iter().map(|execution| execution.delivered).sum()
    }
}

/// Totals from one reminder sweep: automations sent per trigger family plus any errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    pub phase_stall: usize,
    pub deadline_approaching: usize,
    pub system: usize,
    pub errors: Vec<String>,
}

impl ReminderReport {
    fn tally(&mut self, executions: &[Execution]) -> usize {
        let mut sent = 0;
        for execution in executions {
            match execution.status {
                ExecutionStatus::Sent => sent += 1,
                ExecutionStatus::Failed => self.errors.push(format!(
                    "automation {} failed for recruit {}",
                    execution.automation_id, execution.recruit_id
                )),
                ExecutionStatus::Skipped | ExecutionStatus::Duplicate => {}
            }
        }
        sent
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

struct RenderedMessage {
    subject: Option<String>,
    body: String,
    template_id: Option<String>,
}

/// Picks the automations a trigger fires and hands their messages to the dispatcher.
pub struct AutomationEngine {
    stores: AutomationStores,
    resolver: RecipientResolver,
    dispatcher: Arc<dyn NotificationDispatcher>,
    formatter: Arc<dyn TemplateFormatter>,
    settings: AutomationSettings,
}

impl AutomationEngine {
    pub fn new(
        stores: AutomationStores,
        resolver: RecipientResolver,
        dispatcher: Arc<dyn NotificationDispatcher>,
        formatter: Arc<dyn TemplateFormatter>,
        settings: AutomationSettings,
    ) -> Self {
        Self {
            stores,
            resolver,
            dispatcher,
            formatter,
            settings,
        }
    }

    /// Fire every active automation matching a lifecycle event.
    pub fn handle_event(
        &self,
        event: &LifecycleEvent,
        now: DateTime<Utc>,
    ) -> Result<DispatchReport, AutomationError> {
        let (trigger, scope, phase_id, item_id) = match event {
            LifecycleEvent::PhaseEntered { phase_id, .. } => (
                TriggerType::PhaseEnter,
                AutomationScope::Phase {
                    phase_id: phase_id.clone(),
                },
                phase_id,
                None,
            ),
            LifecycleEvent::PhaseCompleted { phase_id, .. } => (
                TriggerType::PhaseComplete,
                AutomationScope::Phase {
                    phase_id: phase_id.clone(),
                },
                phase_id,
                None,
            ),
            LifecycleEvent::ItemCompleted(completion) => (
                TriggerType::ItemComplete,
                AutomationScope::Item {
                    item_id: completion.item_id.clone(),
                },
                &completion.phase_id,
                Some(&completion.item_id),
            ),
            LifecycleEvent::ItemApprovalNeeded {
                item_id, phase_id, ..
            } => (
                TriggerType::ItemApprovalNeeded,
                AutomationScope::Item {
                    item_id: item_id.clone(),
                },
                phase_id,
                Some(item_id),
            ),
        };

        let automations = self.stores.automations.active_for(trigger, &scope)?;
        let mut report = DispatchReport::default();
        if automations.is_empty() {
            return Ok(report);
        }

        let recruit_id = event.recruit_id();
        let variables =
            self.pipeline_variables(recruit_id, phase_id, item_id, trigger.category(), now)?;
        let window = DispatchWindow::EventDay {
            day: event.occurred_at().date_naive(),
        };
        for automation in &automations {
            report.executions.push(self.execute_or_fail(
                automation,
                recruit_id,
                &window,
                &variables,
                &automation.recipients,
                now,
            ));
        }
        Ok(report)
    }

    /// Evaluate every time-based trigger against the scheduler's current view.
    pub fn run_reminders(&self, source: &dyn ReminderSource, now: DateTime<Utc>) -> ReminderReport {
        let mut report = ReminderReport::default();

        match source.phases_in_progress() {
            Ok(phases) => {
                for activity in &phases {
                    match self.stall_reminders(activity, now) {
                        Ok(executions) => {
                            let sent = report.tally(&executions);
                            report.phase_stall += sent;
                        }
                        Err(err) => report.errors.push(format!(
                            "phase stall check failed for recruit {}: {err}",
                            activity.recruit_id
                        )),
                    }
                }
            }
            Err(err) => report
                .errors
                .push(format!("stalled phase lookup failed: {err}")),
        }

        match source.deadlines() {
            Ok(deadlines) => {
                for candidate in &deadlines {
                    match self.deadline_reminders(candidate, now) {
                        Ok(executions) => {
                            let sent = report.tally(&executions);
                            report.deadline_approaching += sent;
                        }
                        Err(err) => report.errors.push(format!(
                            "deadline check failed for recruit {}: {err}",
                            candidate.recruit_id
                        )),
                    }
                }
            }
            Err(err) => report
                .errors
                .push(format!("deadline lookup failed: {err}")),
        }

        match source.pending_accounts() {
            Ok(accounts) => {
                for account in &accounts {
                    match self.account_reminders(account, now) {
                        Ok(executions) => {
                            let sent = report.tally(&executions);
                            report.system += sent;
                        }
                        Err(err) => report.errors.push(format!(
                            "password reminder failed for user {}: {err}",
                            account.recruit_id
                        )),
                    }
                }
            }
            Err(err) => report
                .errors
                .push(format!("pending account lookup failed: {err}")),
        }

        tracing::info!(
            phase_stall = report.phase_stall,
            deadline_approaching = report.deadline_approaching,
            system = report.system,
            errors = report.errors.len(),
            "automation reminder sweep complete"
        );
        report
    }

    fn stall_reminders(
        &self,
        activity: &PhaseActivity,
        now: DateTime<Utc>,
    ) -> Result<Vec<Execution>, AutomationError> {
        let scope = AutomationScope::Phase {
            phase_id: activity.phase_id.clone(),
        };
        let due: Vec<_> = self
            .stores
            .automations
            .active_for(TriggerType::PhaseStall, &scope)?
            .into_iter()
            .filter(|automation| activity.is_stalled(automation.delay_days.unwrap_or(0), now))
            .collect();
        if due.is_empty() {
            return Ok(Vec::new());
        }

        let mut variables = self.pipeline_variables(
            &activity.recruit_id,
            &activity.phase_id,
            None,
            TriggerCategory::Phase,
            now,
        )?;
        variables.insert(
            TemplateKey::DaysInPhase,
            activity.days_in_phase(now).to_string(),
        )?;
        let window = DispatchWindow::IdleSince {
            since: activity.last_activity_at,
        };

        Ok(due
            .iter()
            .map(|automation| {
                self.execute_or_fail(
                    automation,
                    &activity.recruit_id,
                    &window,
                    &variables,
                    &automation.recipients,
                    now,
                )
            })
            .collect())
    }

    fn deadline_reminders(
        &self,
        candidate: &DeadlineCandidate,
        now: DateTime<Utc>,
    ) -> Result<Vec<Execution>, AutomationError> {
        let Some(item) = self.stores.catalog.item(&candidate.item_id)? else {
            tracing::debug!(item_id = %candidate.item_id, "deadline for unknown item");
            return Ok(Vec::new());
        };
        let finished = self
            .stores
            .progress
            .item_progress(&candidate.recruit_id, &item.id)?
            .is_some_and(|progress| progress.is_completed());
        if finished {
            return Ok(Vec::new());
        }

        let scope = AutomationScope::Item {
            item_id: item.id.clone(),
        };
        let due: Vec<_> = self
            .stores
            .automations
            .active_for(TriggerType::ItemDeadlineApproaching, &scope)?
            .into_iter()
            .filter(|automation| {
                candidate.is_approaching(automation.delay_days.unwrap_or(0), now)
            })
            .collect();
        if due.is_empty() {
            return Ok(Vec::new());
        }

        let mut variables = self.pipeline_variables(
            &candidate.recruit_id,
            &item.phase_id,
            Some(&item.id),
            TriggerCategory::Item,
            now,
        )?;
        variables.insert(
            TemplateKey::DaysUntilDeadline,
            candidate.days_until(now).to_string(),
        )?;
        let window = DispatchWindow::Deadline {
            due: candidate.deadline,
        };

        Ok(due
            .iter()
            .map(|automation| {
                self.execute_or_fail(
                    automation,
                    &candidate.recruit_id,
                    &window,
                    &variables,
                    &automation.recipients,
                    now,
                )
            })
            .collect())
    }

    fn account_reminders(
        &self,
        account: &RecruitRecord,
        now: DateTime<Utc>,
    ) -> Result<Vec<Execution>, AutomationError> {
        // Password reminders always go to the account holder, whatever the rule lists.
        let account_holder = vec![RecipientConfig::Recruit];
        let mut executions = Vec::new();

        for trigger in [TriggerType::PasswordNotSet24h, TriggerType::PasswordNotSet12h] {
            if !account_reminder_due(trigger, account, self.settings.account_link_hours, now) {
                continue;
            }
            let automations = self
                .stores
                .automations
                .active_for(trigger, &AutomationScope::System)?;
            if automations.is_empty() {
                continue;
            }

            let variables = self.account_variables(account, trigger)?;
            let window = DispatchWindow::Account {
                trigger,
                created_at: account.created_at,
            };
            for automation in &automations {
                executions.push(self.execute_or_fail(
                    automation,
                    &account.recruit_id,
                    &window,
                    &variables,
                    &account_holder,
                    now,
                ));
            }
        }
        Ok(executions)
    }

    /// Run one automation; a storage failure fails that automation only.
    fn execute_or_fail(
        &self,
        automation: &PipelineAutomation,
        recruit_id: &RecruitId,
        window: &DispatchWindow,
        variables: &TemplateVariables,
        recipients: &[RecipientConfig],
        now: DateTime<Utc>,
    ) -> Execution {
        match self.execute(automation, recruit_id, window, variables, recipients, now) {
            Ok(execution) => execution,
            Err(err) => {
                tracing::warn!(
                    automation_id = %automation.id,
                    recruit_id = %recruit_id,
                    error = %err,
                    "automation run failed"
                );
                Execution {
                    automation_id: automation.id.clone(),
                    recruit_id: recruit_id.clone(),
                    trigger: automation.trigger,
                    status: ExecutionStatus::Failed,
                    delivered: 0,
                    failed: 0,
                }
            }
        }
    }

    /// Claim the window, resolve recipients, and dispatch on every selected channel.
    fn execute(
        &self,
        automation: &PipelineAutomation,
        recruit_id: &RecruitId,
        window: &DispatchWindow,
        variables: &TemplateVariables,
        recipients: &[RecipientConfig],
        now: DateTime<Utc>,
    ) -> Result<Execution, AutomationError> {
        let key = DispatchKey::new(&automation.id, recruit_id, window);
        let mut execution = Execution {
            automation_id: automation.id.clone(),
            recruit_id: recruit_id.clone(),
            trigger: automation.trigger,
            status: ExecutionStatus::Duplicate,
            delivered: 0,
            failed: 0,
        };

        let entry = AutomationLogEntry::pending(key.clone(), automation, recruit_id, now);
        if !self.stores.logs.claim(entry)? {
            tracing::debug!(
                automation_id = %automation.id,
                recruit_id = %recruit_id,
                window = %window,
                "automation already dispatched in this window"
            );
            return Ok(execution);
        }

        let contacts = match self.resolver.resolve_recipients(recruit_id, recipients) {
            Ok(contacts) => contacts,
            Err(err) => {
                tracing::warn!(
                    automation_id = %automation.id,
                    recruit_id = %recruit_id,
                    error = %err,
                    "automation recipients could not be resolved"
                );
                execution.status = ExecutionStatus::Failed;
                self.finish(&key, &execution, Some(err.to_string()), now)?;
                return Ok(execution);
            }
        };
        let sender = self
            .resolver
            .resolve_sender(recruit_id, &automation.sender, &self.settings);

        for channel in automation.communication.channels() {
            let Some(message) = self.render(automation, *channel, variables) else {
                tracing::debug!(
                    automation_id = %automation.id,
                    channel = channel.label(),
                    "no content for channel"
                );
                continue;
            };
            let mut reached = HashSet::new();
            for contact in &contacts {
                let Some(address) = channel_address(contact, *channel) else {
                    continue;
                };
                if !reached.insert(address) {
                    tracing::debug!(
                        automation_id = %automation.id,
                        channel = channel.label(),
                        recipient_role = contact.role.label(),
                        "recipient shares an address already reached"
                    );
                    continue;
                }
                let request = DispatchRequest {
                    automation_id: automation.id.clone(),
                    dedupe_key: key.clone(),
                    trigger: automation.trigger,
                    recruit_id: recruit_id.clone(),
                    channel: *channel,
                    recipient: contact.clone(),
                    sender: sender.clone(),
                    subject: message.subject.clone(),
                    body: message.body.clone(),
                    template_id: message.template_id.clone(),
                };
                match self.dispatcher.dispatch(&request) {
                    Ok(()) => execution.delivered += 1,
                    Err(err) => {
                        execution.failed += 1;
                        tracing::warn!(
                            automation_id = %automation.id,
                            recruit_id = %recruit_id,
                            channel = channel.label(),
                            recipient_role = contact.role.label(),
                            error = %err,
                            "automation dispatch failed"
                        );
                    }
                }
            }
        }

        execution.status = match (execution.delivered, execution.failed) {
            (0, 0) => ExecutionStatus::Skipped,
            (0, _) => ExecutionStatus::Failed,
            _ => ExecutionStatus::Sent,
        };
        let note = match execution.status {
            ExecutionStatus::Skipped if contacts.is_empty() => {
                Some("no recipients resolved".to_string())
            }
            ExecutionStatus::Skipped => Some("no deliverable recipient or content".to_string()),
            _ => None,
        };
        if execution.status == ExecutionStatus::Skipped {
            tracing::warn!(
                automation_id = %automation.id,
                recruit_id = %recruit_id,
                "automation skipped: nothing deliverable"
            );
        } else {
            tracing::info!(
                automation_id = %automation.id,
                recruit_id = %recruit_id,
                trigger = automation.trigger.as_str(),
                delivered = execution.delivered,
                failed = execution.failed,
                "automation dispatched"
            );
        }
        self.finish(&key, &execution, note, now)?;
        Ok(execution)
    }

    fn finish(
        &self,
        key: &DispatchKey,
        execution: &Execution,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AutomationError> {
        let status = match execution.status {
            ExecutionStatus::Sent => AutomationLogStatus::Sent,
            ExecutionStatus::Failed => AutomationLogStatus::Failed,
            ExecutionStatus::Skipped | ExecutionStatus::Duplicate => AutomationLogStatus::Skipped,
        };
        self.stores.logs.complete(
            key,
            LogCompletion {
                status,
                delivered: execution.delivered,
                failed: execution.failed,
                note,
                finished_at: now,
            },
        )?;
        Ok(())
    }

    fn render(
        &self,
        automation: &PipelineAutomation,
        channel: Channel,
        variables: &TemplateVariables,
    ) -> Option<RenderedMessage> {
        if !automation.content.supports(channel) {
            return None;
        }
        let content = &automation.content;
        let message = match channel {
            Channel::Email => {
                let email = content.email.as_ref()?;
                RenderedMessage {
                    subject: Some(self.formatter.render(&email.subject, variables)),
                    body: self.formatter.render(&email.body_html, variables),
                    template_id: email.template_id.clone(),
                }
            }
            Channel::Notification => {
                let notification = content.notification.as_ref()?;
                RenderedMessage {
                    subject: Some(self.formatter.render(&notification.title, variables)),
                    body: self.formatter.render(&notification.message, variables),
                    template_id: None,
                }
            }
            Channel::Sms => RenderedMessage {
                subject: None,
                body: self
                    .formatter
                    .render(content.sms_message.as_deref()?, variables),
                template_id: None,
            },
        };
        Some(message)
    }

    fn pipeline_variables(
        &self,
        recruit_id: &RecruitId,
        phase_id: &PhaseId,
        item_id: Option<&ItemId>,
        category: TriggerCategory,
        now: DateTime<Utc>,
    ) -> Result<TemplateVariables, AutomationError> {
        let mut variables = TemplateVariables::new(category);

        let recruit = match self.resolver.recruit(recruit_id) {
            Ok(record) => Some(record.contact),
            Err(err) => {
                tracing::warn!(
                    recruit_id = %recruit_id,
                    error = %err,
                    "recruit profile unavailable for template"
                );
                None
            }
        };
        let (name, first_name, email, phone) = match recruit {
            Some(contact) => (
                non_empty_or(contact.full_name(), "Recruit"),
                non_empty_or(contact.first_name.clone(), "Recruit"),
                contact.email.unwrap_or_default(),
                contact.phone.unwrap_or_default(),
            ),
            None => (
                "Recruit".to_string(),
                "Recruit".to_string(),
                String::new(),
                String::new(),
            ),
        };
        variables.insert(TemplateKey::RecruitName, name)?;
        variables.insert(TemplateKey::RecruitFirstName, first_name)?;
        variables.insert(TemplateKey::RecruitEmail, email)?;
        variables.insert(TemplateKey::RecruitPhone, phone)?;

        let upline = self
            .resolver
            .resolve_role(recruit_id, ContactRole::Upline, Requirement::Optional)
            .unwrap_or_default();
        let upline = upline.as_ref();
        variables.insert(
            TemplateKey::UplineName,
            upline.and_then(|c| c.name.clone()).unwrap_or_default(),
        )?;
        variables.insert(
            TemplateKey::UplineEmail,
            upline.and_then(|c| c.email.clone()).unwrap_or_default(),
        )?;
        variables.insert(
            TemplateKey::UplinePhone,
            upline.and_then(|c| c.phone.clone()).unwrap_or_default(),
        )?;

        let phase_name = self
            .stores
            .catalog
            .phase(phase_id)?
            .map(|phase| phase.phase_name)
            .unwrap_or_default();
        variables.insert(TemplateKey::PhaseName, phase_name)?;
        let days_in_phase = self
            .stores
            .progress
            .phase_progress(recruit_id, phase_id)?
            .and_then(|progress| progress.started_at)
            .map(|started| (now - started).num_days().max(0))
            .unwrap_or(0);
        variables.insert(TemplateKey::DaysInPhase, days_in_phase.to_string())?;
        variables.insert(
            TemplateKey::PortalLink,
            self.settings.recruit_portal_link(recruit_id.as_str()),
        )?;

        if let Some(item_id) = item_id {
            let item_name = self
                .stores
                .catalog
                .item(item_id)?
                .map(|item| item.item_name)
                .unwrap_or_default();
            variables.insert(TemplateKey::ItemName, item_name)?;
        }
        Ok(variables)
    }

    fn account_variables(
        &self,
        account: &RecruitRecord,
        trigger: TriggerType,
    ) -> Result<TemplateVariables, AutomationError> {
        let contact = &account.contact;
        let mut variables = TemplateVariables::new(TriggerCategory::System);
        variables.insert(TemplateKey::UserName, non_empty_or(contact.full_name(), "User"))?;
        variables.insert(
            TemplateKey::UserFirstName,
            non_empty_or(contact.first_name.trim().to_string(), "User"),
        )?;
        variables.insert(TemplateKey::UserLastName, contact.last_name.trim())?;
        variables.insert(
            TemplateKey::UserEmail,
            contact.email.clone().unwrap_or_default(),
        )?;
        variables.insert(
            TemplateKey::HoursRemaining,
            hours_before_expiry(trigger).unwrap_or(0).to_string(),
        )?;
        variables.insert(TemplateKey::PortalLink, self.settings.portal_base_url.clone())?;
        Ok(variables)
    }
}

impl LifecycleSink for AutomationEngine {
    fn publish(&self, event: &LifecycleEvent) -> Result<(), SinkError> {
        self.handle_event(event, event.occurred_at())
            .map(|_| ())
            .map_err(|err| SinkError(err.to_string()))
    }
}

/// The address a contact is reached at on `channel`, normalized for comparison.
fn channel_address(contact: &ConcreteContact, channel: Channel) -> Option<String> {
    match channel {
        Channel::Email => contact
            .email
            .as_deref()
            .map(|email| email.trim().to_ascii_lowercase()),
        Channel::Notification => contact.user_id.as_ref().map(ToString::to_string),
        Channel::Sms => contact
            .phone
            .as_deref()
            .map(|phone| phone.chars().filter(|c| c.is_ascii_digit() || *c == '+').collect()),
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}
