use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::contracting::{CarrierId, ContractRequestId, ContractStatus, ContractingError};
use super::domain::{Actor, ActorRole, ItemId, PhaseId, RecruitId, UserId};
use super::evaluation::EvaluationError;
use super::repository::{ItemProgressView, RepositoryError};
use super::response::CandidateResponse;
use super::service::{ChecklistService, ChecklistServiceError};
use super::signature::{SignatureError, SubmissionId};
use crate::contacts::ResolutionError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Router exposing checklist responses, quizzes, signatures, and contracting.
pub fn checklist_router(service: Arc<ChecklistService>) -> Router {
    Router::new()
        .route(
            "/api/v1/recruits/:recruit_id/items/:item_id/responses",
            post(submit_response_handler),
        )
        .route(
            "/api/v1/recruits/:recruit_id/items/:item_id/progress",
            get(progress_handler),
        )
        .route(
            "/api/v1/recruits/:recruit_id/items/:item_id/quiz/attempts",
            post(start_quiz_handler),
        )
        .route(
            "/api/v1/recruits/:recruit_id/items/:item_id/quiz/submissions",
            post(submit_quiz_handler),
        )
        .route(
            "/api/v1/recruits/:recruit_id/items/:item_id/signature",
            post(initiate_signature_handler),
        )
        .route(
            "/api/v1/recruits/:recruit_id/items/:item_id/approve",
            post(approve_handler),
        )
        .route(
            "/api/v1/recruits/:recruit_id/items/:item_id/reject",
            post(reject_handler),
        )
        .route(
            "/api/v1/recruits/:recruit_id/items/:item_id/block",
            put(block_handler),
        )
        .route(
            "/api/v1/recruits/:recruit_id/phases/:phase_id/enter",
            post(enter_phase_handler),
        )
        .route(
            "/api/v1/signatures/:submission_id/signers/:signer_index/open",
            post(open_handler),
        )
        .route(
            "/api/v1/signatures/:submission_id/signers/:signer_index/sign",
            post(sign_handler),
        )
        .route(
            "/api/v1/signatures/:submission_id/signers/:signer_index/decline",
            post(decline_handler),
        )
        .route(
            "/api/v1/signatures/:submission_id/void",
            post(void_handler),
        )
        .route("/api/v1/signatures/expire", post(expire_signatures_handler))
        .route(
            "/api/v1/recruits/:recruit_id/contracts",
            post(add_contract_handler).get(list_contracts_handler),
        )
        .route(
            "/api/v1/recruits/:recruit_id/contracts/:request_id/writing-number",
            put(writing_number_handler),
        )
        .route(
            "/api/v1/recruits/:recruit_id/contracts/:request_id/status",
            put(contract_status_handler),
        )
        .with_state(service)
}

/// Resolve the caller from gateway headers. Requests without them are the recruit acting
/// on their own checklist.
pub(crate) fn actor_from_headers(headers: &HeaderMap, recruit_id: &RecruitId) -> Actor {
    let role = headers
        .get(ACTOR_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "upline" => ActorRole::Upline,
            "admin" => ActorRole::Admin,
            "system" => ActorRole::System,
            _ => ActorRole::Recruit,
        })
        .unwrap_or(ActorRole::Recruit);
    let user_id = headers
        .get(ACTOR_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| UserId::new(value.trim()))
        .unwrap_or_else(|| recruit_id.as_user());
    Actor { user_id, role }
}

pub(crate) fn error_response(error: ChecklistServiceError) -> Response {
    let (status, kind) = match &error {
        ChecklistServiceError::Evaluation(EvaluationError::Validation(_)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "validation")
        }
        ChecklistServiceError::Evaluation(EvaluationError::Configuration(_))
        | ChecklistServiceError::Signature(SignatureError::Configuration(_)) => {
            (StatusCode::CONFLICT, "configuration")
        }
        ChecklistServiceError::Signature(SignatureError::Resolution(
            ResolutionError::Directory(_),
        )) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        ChecklistServiceError::Signature(
            SignatureError::Resolution(_) | SignatureError::SignerWithoutEmail(_),
        ) => (StatusCode::UNPROCESSABLE_ENTITY, "unresolved_signer"),
        ChecklistServiceError::Signature(SignatureError::UnknownSigner(_))
        | ChecklistServiceError::Repository(RepositoryError::NotFound)
        | ChecklistServiceError::ItemNotFound(_)
        | ChecklistServiceError::PhaseNotFound(_)
        | ChecklistServiceError::SubmissionNotFound(_)
        | ChecklistServiceError::ContractRequestNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        ChecklistServiceError::Contracting(ContractingError::NotPermitted(_))
        | ChecklistServiceError::NotPermitted { .. } => (StatusCode::FORBIDDEN, "forbidden"),
        ChecklistServiceError::WrongItemType { .. }
        | ChecklistServiceError::SystemDerivedResponse(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "validation")
        }
        ChecklistServiceError::Signature(
            SignatureError::AlreadySigned(_)
            | SignatureError::NotYourTurn { .. }
            | SignatureError::Closed(_),
        )
        | ChecklistServiceError::Contracting(
            ContractingError::Closed(_) | ContractingError::InvalidTransition { .. },
        )
        | ChecklistServiceError::Repository(RepositoryError::Conflict)
        | ChecklistServiceError::ItemInactive(_)
        | ChecklistServiceError::ItemBlocked(_)
        | ChecklistServiceError::AlreadyCompleted(_)
        | ChecklistServiceError::SubmissionOpen(_)
        | ChecklistServiceError::NotAwaitingApproval(_)
        | ChecklistServiceError::EvaluationInFlight(_) => (StatusCode::CONFLICT, "conflict"),
        ChecklistServiceError::Repository(RepositoryError::Unavailable(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %error, "checklist request failed");
    }
    let payload = json!({
        "error": error.to_string(),
        "kind": kind,
    });
    (status, Json(payload)).into_response()
}

pub(crate) async fn submit_response_handler(
    State(service): State<Arc<ChecklistService>>,
    Path((recruit_id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(candidate): Json<CandidateResponse>,
) -> Response {
    let recruit_id = RecruitId(recruit_id);
    let actor = actor_from_headers(&headers, &recruit_id);
    match service.submit(&recruit_id, &ItemId(item_id), candidate, &actor, Utc::now()) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn progress_handler(
    State(service): State<Arc<ChecklistService>>,
    Path((recruit_id, item_id)): Path<(String, String)>,
) -> Response {
    let recruit_id = RecruitId(recruit_id);
    let item_id = ItemId(item_id);
    match service.item_progress(&recruit_id, &item_id) {
        Ok(Some(progress)) => {
            (StatusCode::OK, Json(ItemProgressView::from(&progress))).into_response()
        }
        Ok(None) => {
            let payload = json!({
                "recruit_id": recruit_id,
                "item_id": item_id,
                "status": "not_started",
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn start_quiz_handler(
    State(service): State<Arc<ChecklistService>>,
    Path((recruit_id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let recruit_id = RecruitId(recruit_id);
    let actor = actor_from_headers(&headers, &recruit_id);
    match service.start_quiz_attempt(&recruit_id, &ItemId(item_id), &actor, Utc::now()) {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct QuizSubmissionRequest {
    pub attempt_number: u32,
    pub answers: BTreeMap<String, Vec<String>>,
}

pub(crate) async fn submit_quiz_handler(
    State(service): State<Arc<ChecklistService>>,
    Path((recruit_id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<QuizSubmissionRequest>,
) -> Response {
    let recruit_id = RecruitId(recruit_id);
    let actor = actor_from_headers(&headers, &recruit_id);
    let candidate = CandidateResponse::Quiz {
        attempt_number: request.attempt_number,
        answers: request.answers,
    };
    match service.submit(&recruit_id, &ItemId(item_id), candidate, &actor, Utc::now()) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn initiate_signature_handler(
    State(service): State<Arc<ChecklistService>>,
    Path((recruit_id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let recruit_id = RecruitId(recruit_id);
    let actor = actor_from_headers(&headers, &recruit_id);
    match service.initiate_signature(&recruit_id, &ItemId(item_id), &actor, Utc::now()) {
        Ok(progress) => (StatusCode::CREATED, Json(progress)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn approve_handler(
    State(service): State<Arc<ChecklistService>>,
    Path((recruit_id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let recruit_id = RecruitId(recruit_id);
    let actor = actor_from_headers(&headers, &recruit_id);
    match service.approve_item(&recruit_id, &ItemId(item_id), &actor, Utc::now()) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub(crate) async fn reject_handler(
    State(service): State<Arc<ChecklistService>>,
    Path((recruit_id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<ReasonRequest>,
) -> Response {
    let recruit_id = RecruitId(recruit_id);
    let actor = actor_from_headers(&headers, &recruit_id);
    match service.reject_item(
        &recruit_id,
        &ItemId(item_id),
        &actor,
        request.reason,
        Utc::now(),
    ) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub blocked: bool,
}

pub(crate) async fn block_handler(
    State(service): State<Arc<ChecklistService>>,
    Path((recruit_id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<BlockRequest>,
) -> Response {
    let recruit_id = RecruitId(recruit_id);
    let actor = actor_from_headers(&headers, &recruit_id);
    match service.set_blocked(
        &recruit_id,
        &ItemId(item_id),
        request.blocked,
        &actor,
        Utc::now(),
    ) {
        Ok(progress) => (StatusCode::OK, Json(ItemProgressView::from(&progress))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn enter_phase_handler(
    State(service): State<Arc<ChecklistService>>,
    Path((recruit_id, phase_id)): Path<(String, String)>,
) -> Response {
    let recruit_id = RecruitId(recruit_id);
    match service.enter_phase(&recruit_id, &PhaseId(phase_id), Utc::now()) {
        Ok(Some(event)) => (StatusCode::CREATED, Json(event)).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn open_handler(
    State(service): State<Arc<ChecklistService>>,
    Path((submission_id, signer_index)): Path<(String, usize)>,
) -> Response {
    match service.mark_signature_opened(&SubmissionId(submission_id), signer_index, Utc::now()) {
        Ok(submission) => (StatusCode::OK, Json(submission)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn sign_handler(
    State(service): State<Arc<ChecklistService>>,
    Path((submission_id, signer_index)): Path<(String, usize)>,
) -> Response {
    match service.record_signature(&SubmissionId(submission_id), signer_index, Utc::now()) {
        Ok(progress) => (StatusCode::OK, Json(progress)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn decline_handler(
    State(service): State<Arc<ChecklistService>>,
    Path((submission_id, signer_index)): Path<(String, usize)>,
    Json(request): Json<ReasonRequest>,
) -> Response {
    match service.decline_signature(
        &SubmissionId(submission_id),
        signer_index,
        request.reason,
        Utc::now(),
    ) {
        Ok(progress) => (StatusCode::OK, Json(progress)).into_response(),
        Err(error) => error_response(error),
    }
}

/// Callers without an upline or admin role header are refused.
pub(crate) async fn void_handler(
    State(service): State<Arc<ChecklistService>>,
    Path(submission_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ReasonRequest>,
) -> Response {
    let submission_id = SubmissionId(submission_id);
    let actor = actor_from_headers(&headers, &RecruitId::new("unknown"));
    match service.void_signature(&submission_id, &actor, request.reason, Utc::now()) {
        Ok(progress) => (StatusCode::OK, Json(progress)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn expire_signatures_handler(
    State(service): State<Arc<ChecklistService>>,
) -> Response {
    match service.expire_signatures(Utc::now()) {
        Ok(expired) => (StatusCode::OK, Json(json!({ "expired": expired }))).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct ContractRequestBody {
    pub carrier_id: String,
    pub carrier_name: String,
}

pub(crate) async fn add_contract_handler(
    State(service): State<Arc<ChecklistService>>,
    Path(recruit_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ContractRequestBody>,
) -> Response {
    let recruit_id = RecruitId(recruit_id);
    let actor = actor_from_headers(&headers, &recruit_id);
    match service.add_contract_request(
        &recruit_id,
        CarrierId(body.carrier_id),
        body.carrier_name,
        &actor,
        Utc::now(),
    ) {
        Ok(request) => (StatusCode::CREATED, Json(request)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_contracts_handler(
    State(service): State<Arc<ChecklistService>>,
    Path(recruit_id): Path<String>,
) -> Response {
    match service.contract_requests(&RecruitId(recruit_id)) {
        Ok(requests) => (StatusCode::OK, Json(requests)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct WritingNumberRequest {
    pub item_id: String,
    #[serde(default)]
    pub writing_number: Option<String>,
}

pub(crate) async fn writing_number_handler(
    State(service): State<Arc<ChecklistService>>,
    Path((recruit_id, request_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<WritingNumberRequest>,
) -> Response {
    let recruit_id = RecruitId(recruit_id);
    let actor = actor_from_headers(&headers, &recruit_id);
    match service.record_writing_number(
        &recruit_id,
        &ItemId(body.item_id),
        &ContractRequestId(request_id),
        body.writing_number,
        &actor,
        Utc::now(),
    ) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct ContractStatusRequest {
    pub item_id: String,
    pub status: ContractStatus,
}

pub(crate) async fn contract_status_handler(
    State(service): State<Arc<ChecklistService>>,
    Path((recruit_id, request_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<ContractStatusRequest>,
) -> Response {
    let recruit_id = RecruitId(recruit_id);
    let actor = actor_from_headers(&headers, &recruit_id);
    match service.update_contract_status(
        &recruit_id,
        &ItemId(body.item_id),
        &ContractRequestId(request_id),
        body.status,
        &actor,
        Utc::now(),
    ) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}
