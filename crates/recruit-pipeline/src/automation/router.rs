use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use super::domain::{AutomationDraft, AutomationId, AutomationUpdate};
use super::engine::AutomationEngine;
use super::service::{AutomationService, AutomationServiceError};
use super::triggers::ReminderSource;
use crate::checklist::{RecruitId, RepositoryError};

/// Shared state for the automation routes.
#[derive(Clone)]
pub struct AutomationApi {
    pub service: Arc<AutomationService>,
    pub engine: Arc<AutomationEngine>,
    pub reminders: Arc<dyn ReminderSource>,
}

/// Router for automation management and the scheduler-driven reminder sweep.
pub fn automation_router(api: AutomationApi) -> Router {
    Router::new()
        .route(
            "/api/v1/automations",
            post(create_handler).get(list_handler),
        )
        .route(
            "/api/v1/automations/reminders/run",
            post(run_reminders_handler),
        )
        .route(
            "/api/v1/automations/:automation_id",
            get(fetch_handler).put(update_handler).delete(delete_handler),
        )
        .route(
            "/api/v1/automations/:automation_id/logs",
            get(logs_handler),
        )
        .route(
            "/api/v1/recruits/:recruit_id/automation-logs",
            get(recruit_logs_handler),
        )
        .with_state(api)
}

pub(crate) fn error_response(error: AutomationServiceError) -> Response {
    let (status, kind) = match &error {
        AutomationServiceError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
        AutomationServiceError::NotFound(_)
        | AutomationServiceError::Repository(RepositoryError::NotFound) => {
            (StatusCode::NOT_FOUND, "not_found")
        }
        AutomationServiceError::Repository(RepositoryError::Conflict) => {
            (StatusCode::CONFLICT, "conflict")
        }
        AutomationServiceError::Repository(RepositoryError::Unavailable(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %error, "automation request failed");
    }
    let payload = json!({
        "error": error.to_string(),
        "kind": kind,
    });
    (status, Json(payload)).into_response()
}

pub(crate) async fn create_handler(
    State(api): State<AutomationApi>,
    Json(draft): Json<AutomationDraft>,
) -> Response {
    match api.service.create(draft, Utc::now()) {
        Ok(automation) => (StatusCode::CREATED, Json(automation)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_handler(State(api): State<AutomationApi>) -> Response {
    match api.service.list() {
        Ok(automations) => (StatusCode::OK, Json(automations)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn fetch_handler(
    State(api): State<AutomationApi>,
    Path(automation_id): Path<String>,
) -> Response {
    match api.service.get(&AutomationId(automation_id)) {
        Ok(automation) => (StatusCode::OK, Json(automation)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_handler(
    State(api): State<AutomationApi>,
    Path(automation_id): Path<String>,
    Json(update): Json<AutomationUpdate>,
) -> Response {
    match api
        .service
        .update(&AutomationId(automation_id), update, Utc::now())
    {
        Ok(automation) => (StatusCode::OK, Json(automation)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_handler(
    State(api): State<AutomationApi>,
    Path(automation_id): Path<String>,
) -> Response {
    match api.service.delete(&AutomationId(automation_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn logs_handler(
    State(api): State<AutomationApi>,
    Path(automation_id): Path<String>,
) -> Response {
    match api.service.logs(&AutomationId(automation_id)) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn recruit_logs_handler(
    State(api): State<AutomationApi>,
    Path(recruit_id): Path<String>,
) -> Response {
    match api.service.recruit_logs(&RecruitId(recruit_id)) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn run_reminders_handler(State(api): State<AutomationApi>) -> Response {
    let report = api.engine.run_reminders(api.reminders.as_ref(), Utc::now());
    (StatusCode::OK, Json(report)).into_response()
}
