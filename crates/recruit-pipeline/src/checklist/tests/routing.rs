use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::checklist::router::{
    checklist_router, progress_handler, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER,
};
use crate::checklist::service::{ChecklistService, ChecklistStores};
use crate::contacts::RecipientResolver;

fn router_for(harness: &Harness) -> Router {
    checklist_router(Arc::clone(&harness.service))
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    actor: Option<(&str, &str)>,
    body: Option<Value>,
) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = actor {
        request = request
            .header(ACTOR_ID_HEADER, id)
            .header(ACTOR_ROLE_HEADER, role);
    }
    let body = match body {
        Some(payload) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&payload).expect("serialize payload"))
        }
        None => Body::empty(),
    };
    router
        .clone()
        .oneshot(request.body(body).expect("request"))
        .await
        .expect("router response")
}

fn as_upline() -> Option<(&'static str, &'static str)> {
    Some((UPLINE, "upline"))
}

fn acknowledgment_payload() -> Value {
    json!({ "type": "acknowledgment", "acknowledged": true, "scroll_completed": true })
}

#[tokio::test]
async fn submit_route_records_completion() {
    let harness = two_phase_service(vec![acknowledgment_item("ack", ORIENTATION)]);
    let router = router_for(&harness);

    let before = send(
        &router,
        Method::GET,
        "/api/v1/recruits/rec-1/items/ack/progress",
        None,
        None,
    )
    .await;
    assert_eq!(before.status(), StatusCode::OK);
    assert_eq!(read_json_body(before).await["status"], "not_started");

    let response = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/items/ack/responses",
        None,
        Some(acknowledgment_payload()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["progress"]["status"], "completed");
    assert_eq!(body["events"].as_array().map(Vec::len), Some(4));

    let after = send(
        &router,
        Method::GET,
        "/api/v1/recruits/rec-1/items/ack/progress",
        None,
        None,
    )
    .await;
    let body = read_json_body(after).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["response"]["type"], "acknowledgment");
}

#[tokio::test]
async fn invalid_responses_are_unprocessable() {
    let harness = two_phase_service(vec![text_item("why")]);
    let router = router_for(&harness);

    let response = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/items/why/responses",
        None,
        Some(json!({ "type": "text_response", "text": "I enjoy helping families" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "validation");
    assert_eq!(body["error"], "Response must include: license");
}

#[tokio::test]
async fn unknown_items_are_not_found() {
    let harness = two_phase_service(vec![acknowledgment_item("ack", ORIENTATION)]);
    let router = router_for(&harness);

    let response = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/items/missing/responses",
        None,
        Some(acknowledgment_payload()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json_body(response).await["kind"], "not_found");
}

#[tokio::test]
async fn recruits_cannot_answer_for_someone_else() {
    let harness = two_phase_service(vec![acknowledgment_item("ack", ORIENTATION)]);
    let router = router_for(&harness);

    let response = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/items/ack/responses",
        Some(("rec-2", "recruit")),
        Some(acknowledgment_payload()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(read_json_body(response).await["kind"], "forbidden");
}

#[tokio::test]
async fn approval_routes_respect_actor_roles() {
    let harness = two_phase_service(vec![video_item("welcome", false)]);
    let router = router_for(&harness);
    let submitted = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/items/welcome/responses",
        None,
        Some(json!({ "type": "video_embed", "watched": true, "fully_watched": true })),
    )
    .await;
    assert_eq!(
        read_json_body(submitted).await["progress"]["status"],
        "pending_approval"
    );

    let refused = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/items/welcome/approve",
        None,
        None,
    )
    .await;
    assert_eq!(refused.status(), StatusCode::FORBIDDEN);

    let approved = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/items/welcome/approve",
        as_upline(),
        None,
    )
    .await;
    assert_eq!(approved.status(), StatusCode::OK);
    let body = read_json_body(approved).await;
    assert_eq!(body["progress"]["status"], "completed");
    assert_eq!(body["progress"]["completed_by"], UPLINE);

    let again = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/items/welcome/approve",
        as_upline(),
        None,
    )
    .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn blocked_items_answer_with_conflict() {
    let harness = two_phase_service(vec![acknowledgment_item("ack", ORIENTATION)]);
    let router = router_for(&harness);

    let blocked = send(
        &router,
        Method::PUT,
        "/api/v1/recruits/rec-1/items/ack/block",
        as_upline(),
        Some(json!({ "blocked": true })),
    )
    .await;
    assert_eq!(blocked.status(), StatusCode::OK);
    assert_eq!(read_json_body(blocked).await["status"], "blocked");

    let response = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/items/ack/responses",
        None,
        Some(acknowledgment_payload()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json_body(response).await["kind"], "conflict");
}

#[tokio::test]
async fn entering_a_phase_reports_only_the_first_entry() {
    let harness = two_phase_service(vec![acknowledgment_item("ack", ORIENTATION)]);
    let router = router_for(&harness);
    let uri = format!("/api/v1/recruits/rec-1/phases/{ORIENTATION}/enter");

    let first = send(&router, Method::POST, &uri, None, None).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let body = read_json_body(first).await;
    assert_eq!(body["event"], "phase_entered");
    assert_eq!(body["phase_id"], ORIENTATION);

    let second = send(&router, Method::POST, &uri, None, None).await;
    assert_eq!(second.status(), StatusCode::NO_CONTENT);

    let missing = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/phases/phase-unknown/enter",
        None,
        None,
    )
    .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn quiz_routes_open_and_grade_attempts() {
    let harness = two_phase_service(vec![quiz_item("product-quiz")]);
    let router = router_for(&harness);

    let opened = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/items/product-quiz/quiz/attempts",
        None,
        None,
    )
    .await;
    assert_eq!(opened.status(), StatusCode::CREATED);
    let body = read_json_body(opened).await;
    assert_eq!(body["plan"]["attempt_number"], 1);
    assert_eq!(body["questions"].as_array().map(Vec::len), Some(3));

    let graded = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/items/product-quiz/quiz/submissions",
        None,
        Some(json!({
            "attempt_number": 1,
            "answers": { "q1": ["a"], "q2": ["b"], "q3": ["a"] }
        })),
    )
    .await;
    assert_eq!(graded.status(), StatusCode::OK);
    let body = read_json_body(graded).await;
    assert_eq!(body["progress"]["status"], "in_progress");
}

#[tokio::test]
async fn signature_routes_enforce_signing_order() {
    let harness = build_service(
        vec![phase(ORIENTATION, 1), phase(LICENSING, 2)],
        vec![signature_item("agreement")],
    );
    let router = router_for(&harness);

    let created = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/items/agreement/signature",
        None,
        None,
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = read_json_body(created).await;
    let id = body["submission"]["id"]
        .as_str()
        .expect("submission id")
        .to_string();

    let out_of_turn = send(
        &router,
        Method::POST,
        &format!("/api/v1/signatures/{id}/signers/1/sign"),
        None,
        None,
    )
    .await;
    assert_eq!(out_of_turn.status(), StatusCode::CONFLICT);

    let unknown = send(
        &router,
        Method::POST,
        &format!("/api/v1/signatures/{id}/signers/5/open"),
        None,
        None,
    )
    .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let signed = send(
        &router,
        Method::POST,
        &format!("/api/v1/signatures/{id}/signers/0/sign"),
        None,
        None,
    )
    .await;
    assert_eq!(signed.status(), StatusCode::OK);
    assert_eq!(
        read_json_body(signed).await["submission"]["status"],
        "in_progress"
    );

    let unauthorised_void = send(
        &router,
        Method::POST,
        &format!("/api/v1/signatures/{id}/void"),
        None,
        Some(json!({})),
    )
    .await;
    assert_eq!(unauthorised_void.status(), StatusCode::FORBIDDEN);

    let voided = send(
        &router,
        Method::POST,
        &format!("/api/v1/signatures/{id}/void"),
        as_upline(),
        Some(json!({ "reason": "replaced" })),
    )
    .await;
    assert_eq!(voided.status(), StatusCode::OK);
    assert_eq!(read_json_body(voided).await["submission"]["status"], "voided");

    let expired = send(&router, Method::POST, "/api/v1/signatures/expire", None, None).await;
    assert_eq!(expired.status(), StatusCode::OK);
    assert_eq!(read_json_body(expired).await["expired"], json!([]));
}

#[tokio::test]
async fn contract_routes_track_writing_numbers() {
    let harness = build_service(
        vec![phase(ORIENTATION, 1), phase(LICENSING, 2)],
        vec![contracting_item("carriers", 1)],
    );
    let router = router_for(&harness);
    let payload = json!({ "carrier_id": "mutual", "carrier_name": "Mutual Life" });

    let refused = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/contracts",
        None,
        Some(payload.clone()),
    )
    .await;
    assert_eq!(refused.status(), StatusCode::FORBIDDEN);

    let created = send(
        &router,
        Method::POST,
        "/api/v1/recruits/rec-1/contracts",
        as_upline(),
        Some(payload),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let request = read_json_body(created).await;
    assert_eq!(request["status"], "requested");
    let request_id = request["id"].as_str().expect("request id").to_string();

    let listed = send(&router, Method::GET, "/api/v1/recruits/rec-1/contracts", None, None).await;
    assert_eq!(
        read_json_body(listed).await.as_array().map(Vec::len),
        Some(1)
    );

    let recorded = send(
        &router,
        Method::PUT,
        &format!("/api/v1/recruits/rec-1/contracts/{request_id}/writing-number"),
        as_upline(),
        Some(json!({ "item_id": "carriers", "writing_number": "WN-77" })),
    )
    .await;
    assert_eq!(recorded.status(), StatusCode::OK);
    let body = read_json_body(recorded).await;
    assert_eq!(body["request"]["status"], "writing_received");
    assert_eq!(body["summary"]["percent_complete"], 100);
    assert_eq!(body["outcome"]["progress"]["status"], "completed");

    let backwards = send(
        &router,
        Method::PUT,
        &format!("/api/v1/recruits/rec-1/contracts/{request_id}/status"),
        as_upline(),
        Some(json!({ "item_id": "carriers", "status": "requested" })),
    )
    .await;
    assert_eq!(backwards.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn progress_handler_reports_storage_outages() {
    let stores = ChecklistStores {
        catalog: Arc::new(MemoryCatalog::new(
            vec![phase(ORIENTATION, 1)],
            vec![acknowledgment_item("ack", ORIENTATION)],
        )),
        progress: Arc::new(UnavailableProgress),
        signatures: Arc::new(MemorySignatures::default()),
        contracts: Arc::new(MemoryContracts::default()),
    };
    let service = Arc::new(ChecklistService::new(
        stores,
        RecipientResolver::new(Arc::new(directory())),
        Arc::new(RecordingSink::default()),
    ));

    let response = progress_handler(
        State(service),
        Path((RECRUIT.to_string(), "ack".to_string())),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(read_json_body(response).await["kind"], "internal");
}
