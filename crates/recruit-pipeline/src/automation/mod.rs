//! Pipeline automations: rules mapping lifecycle triggers to communications, and the
//! engine that resolves recipients and hands rendered messages to a dispatcher.

pub mod domain;
pub mod engine;
pub mod repository;
pub mod router;
pub mod service;
pub mod template;
pub mod triggers;

#[cfg(test)]
mod tests;

pub use domain::{
    AutomationContent, AutomationDraft, AutomationId, AutomationScope, AutomationUpdate,
    AutomationValidationError, Channel, CommunicationType, EmailContent, NotificationContent,
    PipelineAutomation, RecipientConfig, SenderConfig, TriggerType,
};
pub use engine::{
    AutomationEngine, AutomationError, AutomationStores, DispatchReport, Execution,
    ExecutionStatus, ReminderReport,
};
pub use repository::{
    AutomationLogEntry, AutomationLogRepository, AutomationLogStatus, AutomationRepository,
    DispatchError, DispatchRequest, LogCompletion, NotificationDispatcher,
};
pub use router::{automation_router, AutomationApi};
pub use service::{AutomationService, AutomationServiceError};
pub use template::{
    PlaceholderFormatter, TemplateError, TemplateFormatter, TemplateKey, TemplateVariables,
    TriggerCategory,
};
pub use triggers::{
    account_reminder_due, DeadlineCandidate, DispatchKey, DispatchWindow, PhaseActivity,
    ReminderSource,
};
