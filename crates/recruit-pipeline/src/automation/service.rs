use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::domain::{
    AutomationDraft, AutomationId, AutomationUpdate, AutomationValidationError, PipelineAutomation,
};
use super::repository::{AutomationLogEntry, AutomationLogRepository, AutomationRepository};
use crate::checklist::{RecruitId, RepositoryError};

/// Authoring surface for automations: validated create, edit, delete, and log reads.
pub struct AutomationService {
    automations: Arc<dyn AutomationRepository>,
    logs: Arc<dyn AutomationLogRepository>,
}

impl AutomationService {
    pub fn new(
        automations: Arc<dyn AutomationRepository>,
        logs: Arc<dyn AutomationLogRepository>,
    ) -> Self {
        Self { automations, logs }
    }

    pub fn create(
        &self,
        draft: AutomationDraft,
        now: DateTime<Utc>,
    ) -> Result<PipelineAutomation, AutomationServiceError> {
        let automation = draft.into_automation(AutomationId::generate(), now)?;
        let stored = self.automations.insert(automation)?;
        tracing::info!(
            automation_id = %stored.id,
            trigger = stored.trigger.as_str(),
            "automation created"
        );
        Ok(stored)
    }

    pub fn get(&self, id: &AutomationId) -> Result<PipelineAutomation, AutomationServiceError> {
        self.automations
            .fetch(id)?
            .ok_or_else(|| AutomationServiceError::NotFound(id.clone()))
    }

    pub fn list(&self) -> Result<Vec<PipelineAutomation>, AutomationServiceError> {
        Ok(self.automations.list()?)
    }

    pub fn update(
        &self,
        id: &AutomationId,
        update: AutomationUpdate,
        now: DateTime<Utc>,
    ) -> Result<PipelineAutomation, AutomationServiceError> {
        let current = self.get(id)?;
        let updated = update.apply(&current, now)?;
        self.automations.update(updated.clone())?;
        tracing::info!(automation_id = %id, active = updated.is_active, "automation updated");
        Ok(updated)
    }

    pub fn delete(&self, id: &AutomationId) -> Result<(), AutomationServiceError> {
        match self.automations.delete(id) {
            Ok(()) => {
                tracing::info!(automation_id = %id, "automation deleted");
                Ok(())
            }
            Err(RepositoryError::NotFound) => Err(AutomationServiceError::NotFound(id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    pub fn logs(
        &self,
        id: &AutomationId,
    ) -> Result<Vec<AutomationLogEntry>, AutomationServiceError> {
        self.get(id)?;
        Ok(self.logs.for_automation(id)?)
    }

    pub fn recruit_logs(
        &self,
        recruit_id: &RecruitId,
    ) -> Result<Vec<AutomationLogEntry>, AutomationServiceError> {
        Ok(self.logs.for_recruit(recruit_id)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AutomationServiceError {
    #[error(transparent)]
    Validation(#[from] AutomationValidationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("automation {0} was not found")]
    NotFound(AutomationId),
}
