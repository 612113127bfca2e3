use crate::infra::{Pipeline, DEMO_RECRUIT};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use recruit_pipeline::automation::{
    AutomationContent, AutomationDraft, AutomationScope, CommunicationType, EmailContent,
    NotificationContent, RecipientConfig, ReminderReport, SenderConfig, TriggerType,
};
use recruit_pipeline::checklist::{
    Actor, CandidateResponse, ItemId, LifecycleEvent, PhaseId, RecruitId,
};
use recruit_pipeline::config::AutomationSettings;
use recruit_pipeline::error::AppError;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Days the recruit stays idle before the reminder sweep runs.
    #[arg(long, default_value_t = 8)]
    pub(crate) idle_days: u32,
    /// Stop after the orientation walk-through.
    #[arg(long)]
    pub(crate) skip_reminders: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        idle_days,
        skip_reminders,
    } = args;
    let now = Utc::now();
    let pipeline = Pipeline::in_memory(AutomationSettings::default());

    println!("Recruit pipeline demo");
    let rules = seed_automations(&pipeline, now)?;
    println!("- {rules} automations configured for the standard agent template");

    println!("\nOrientation walk-through for {DEMO_RECRUIT}");
    for event in walk_orientation(&pipeline, now)? {
        println!("  - {}", describe(&event));
    }
    print_dispatches(&pipeline, 0);

    if skip_reminders {
        return Ok(());
    }

    let already_sent = pipeline.dispatcher.sent().len();
    let sweep_at = now + Duration::days(i64::from(idle_days));
    println!("\nReminder sweep after {idle_days} idle days");
    let report = pipeline
        .automation
        .engine
        .run_reminders(pipeline.automation.reminders.as_ref(), sweep_at);
    print_report(&report);
    print_dispatches(&pipeline, already_sent);

    match pipeline.logs.entries() {
        Ok(entries) => {
            println!("\nDispatch log");
            for entry in entries {
                println!(
                    "  - {} [{}] {} delivered / {} failed",
                    entry.automation_id,
                    entry.trigger.as_str(),
                    entry.delivered,
                    entry.failed
                );
            }
        }
        Err(err) => println!("\nDispatch log unavailable: {err}"),
    }

    Ok(())
}

fn email(subject: &str, body_html: &str) -> AutomationContent {
    AutomationContent {
        email: Some(EmailContent {
            subject: subject.to_string(),
            body_html: body_html.to_string(),
            template_id: None,
        }),
        ..AutomationContent::default()
    }
}

fn phase_scope(phase_id: &str) -> AutomationScope {
    AutomationScope::Phase {
        phase_id: PhaseId::new(phase_id),
    }
}

fn item_scope(item_id: &str) -> AutomationScope {
    AutomationScope::Item {
        item_id: ItemId::new(item_id),
    }
}

fn rule(
    scope: AutomationScope,
    trigger: TriggerType,
    recipient: RecipientConfig,
    content: AutomationContent,
) -> AutomationDraft {
    AutomationDraft {
        scope,
        trigger,
        delay_days: None,
        recipients: vec![recipient],
        communication: CommunicationType::Email,
        sender: SenderConfig::System,
        content,
        is_active: true,
    }
}

/// Rules a typical agency configures: a welcome, an upline hand-off, a review
/// prompt, and two reminders for the licensing phase.
pub(crate) fn seed_automations(pipeline: &Pipeline, now: DateTime<Utc>) -> Result<usize, AppError> {
    let drafts = vec![
        rule(
            phase_scope("phase-orientation"),
            TriggerType::PhaseEnter,
            RecipientConfig::Recruit,
            email(
                "Welcome aboard, {{recruit_first_name}}",
                "<p>Your onboarding checklist is ready: {{portal_link}}</p>",
            ),
        ),
        AutomationDraft {
            sender: SenderConfig::Upline,
            ..rule(
                phase_scope("phase-orientation"),
                TriggerType::PhaseComplete,
                RecipientConfig::Upline,
                email(
                    "{{recruit_name}} finished {{phase_name}}",
                    "<p>Review their progress at {{portal_link}}</p>",
                ),
            )
        },
        AutomationDraft {
            communication: CommunicationType::Notification,
            ..rule(
                item_scope("item-license-upload"),
                TriggerType::ItemApprovalNeeded,
                RecipientConfig::Upline,
                AutomationContent {
                    notification: Some(NotificationContent {
                        title: "Review {{item_name}}".to_string(),
                        message: "{{recruit_name}} uploaded a document".to_string(),
                    }),
                    ..AutomationContent::default()
                },
            )
        },
        AutomationDraft {
            delay_days: Some(3),
            ..rule(
                phase_scope("phase-licensing"),
                TriggerType::PhaseStall,
                RecipientConfig::Upline,
                email(
                    "{{recruit_first_name}} has been quiet for {{days_in_phase}} days",
                    "<p>Check in on {{phase_name}}: {{portal_link}}</p>",
                ),
            )
        },
        AutomationDraft {
            delay_days: Some(14),
            ..rule(
                item_scope("item-why"),
                TriggerType::ItemDeadlineApproaching,
                RecipientConfig::Recruit,
                email(
                    "{{item_name}} is due in {{days_until_deadline}} days",
                    "<p>Finish it at {{portal_link}}</p>",
                ),
            )
        },
    ];

    let service = &pipeline.automation.service;
    let count = drafts.len();
    for draft in drafts {
        service.create(draft, now)?;
    }
    Ok(count)
}

/// Complete both orientation items as the demo recruit and collect the
/// lifecycle events they produced.
pub(crate) fn walk_orientation(
    pipeline: &Pipeline,
    now: DateTime<Utc>,
) -> Result<Vec<LifecycleEvent>, AppError> {
    let recruit = RecruitId::new(DEMO_RECRUIT);
    let actor = Actor::recruit(&recruit);
    let responses = [
        (
            "item-handbook",
            CandidateResponse::Acknowledgment {
                acknowledged: true,
                scroll_completed: true,
            },
        ),
        (
            "item-licensed",
            CandidateResponse::BooleanQuestion {
                answer: false,
                explanation: None,
            },
        ),
    ];

    let mut events = Vec::new();
    for (item_id, response) in responses {
        let outcome =
            pipeline
                .checklist
                .submit(&recruit, &ItemId::new(item_id), response, &actor, now)?;
        events.extend(outcome.events);
    }
    Ok(events)
}

fn describe(event: &LifecycleEvent) -> String {
    match event {
        LifecycleEvent::PhaseEntered { phase_id, .. } => format!("entered {phase_id}"),
        LifecycleEvent::PhaseCompleted { phase_id, .. } => format!("completed {phase_id}"),
        LifecycleEvent::ItemCompleted(completion) => {
            format!("completed item {}", completion.item_id)
        }
        LifecycleEvent::ItemApprovalNeeded { item_id, .. } => {
            format!("item {item_id} awaits approval")
        }
    }
}

fn print_dispatches(pipeline: &Pipeline, skip: usize) {
    let sent = pipeline.dispatcher.sent();
    if sent.len() <= skip {
        println!("  Automations: nothing dispatched");
        return;
    }
    println!("  Automations dispatched:");
    for request in sent.iter().skip(skip) {
        println!(
            "    - {} via {} to {} ({}): {}",
            request.automation_id,
            request.channel,
            request.recipient.role.label(),
            request
                .recipient
                .email
                .as_deref()
                .or(request.recipient.name.as_deref())
                .unwrap_or("unknown"),
            request.subject.as_deref().unwrap_or(&request.body)
        );
    }
}

fn print_report(report: &ReminderReport) {
    println!(
        "- {} stall reminders | {} deadline reminders | {} account reminders",
        report.phase_stall, report.deadline_approaching, report.system
    );
    for error in &report.errors {
        println!("  ! {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recruit_pipeline::contacts::ContactRole;

    #[test]
    fn orientation_walk_fires_the_welcome_and_the_upline_handoff() {
        let pipeline = Pipeline::in_memory(AutomationSettings::default());
        let now = Utc::now();
        assert_eq!(seed_automations(&pipeline, now).expect("rules stored"), 5);

        let events = walk_orientation(&pipeline, now).expect("orientation completes");

        assert!(events.iter().any(|event| matches!(
            event,
            LifecycleEvent::PhaseEntered { phase_id, .. } if phase_id.as_str() == "phase-licensing"
        )));
        let sent = pipeline.dispatcher.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].subject.as_deref(), Some("Welcome aboard, Jordan"));
        assert_eq!(sent[1].recipient.role, ContactRole::Upline);
        assert_eq!(sent[1].subject.as_deref(), Some("Jordan Lee finished Orientation"));
        assert_eq!(sent[1].sender.email, "casey.morgan@example.com");
    }

    #[test]
    fn idle_licensing_phase_draws_stall_and_deadline_reminders() {
        let pipeline = Pipeline::in_memory(AutomationSettings::default());
        let now = Utc::now();
        seed_automations(&pipeline, now).expect("rules stored");
        walk_orientation(&pipeline, now).expect("orientation completes");

        let report = pipeline
            .automation
            .engine
            .run_reminders(pipeline.automation.reminders.as_ref(), now + Duration::days(8));

        assert_eq!(report.phase_stall, 1);
        assert_eq!(report.deadline_approaching, 1);
        assert!(report.errors.is_empty());
        let reminder = pipeline
            .dispatcher
            .sent()
            .into_iter()
            .find(|request| request.trigger == TriggerType::ItemDeadlineApproaching)
            .expect("deadline reminder sent");
        assert_eq!(
            reminder.subject.as_deref(),
            Some("Why Insurance is due in 13 days")
        );
    }
}
