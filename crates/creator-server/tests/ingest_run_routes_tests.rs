//! HTTP tests for the ingest run API
//!
//! The router is built with the in-memory dispatcher; the Postgres pool is
//! lazy and never touched by these routes.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use common::Harness;
use creator_server::api::{create_router, AppState};
use creator_server::config::CorsConfig;
use creator_server::ingest_runs::{EventType, IngestRunState, IngestRunStore, IngestRunTask};

fn test_app(harness: &Harness) -> Router {
    let db = PgPool::connect_lazy("postgresql://localhost/test").unwrap();
    let state = AppState {
        db,
        dispatcher: harness.dispatcher.clone(),
    };
    let cors = CorsConfig {
        allowed_origins: vec!["*".to_string()],
        allow_credentials: false,
    };
    create_router(state, &cors)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };

    (status, json)
}

async fn get_request(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post_request(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/json")
            .header("x-user-id", "user-42")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

// ============================================================================
// POST /api/v1/ingest-runs
// ============================================================================

#[tokio::test]
async fn test_start_ingest_run_returns_created() {
    let harness = Harness::new();
    harness.register_gwo("FV_4DP2P2Y2");
    harness.register_gwo("FV_9ZC2DFV3");
    let app = test_app(&harness);

    let (status, body) = post_request(
        &app,
        "/api/v1/ingest-runs",
        json!({ "versions": ["FV_9ZC2DFV3", "FV_4DP2P2Y2", "FV_9ZC2DFV3"] }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["state"], "waiting");
    assert_eq!(body["data"]["name"], "INGEST_RUN-FV_4DP2P2Y2-FV_9ZC2DFV3");
    assert_eq!(body["data"]["creator_id"], "user-42");
    assert!(body["data"]["input_fingerprint"].is_string());

    let id: Uuid = body["data"]["id"].as_str().unwrap().parse().unwrap();
    assert_eq!(
        harness.queue.drain(),
        vec![IngestRunTask::Run { ingest_run_id: id }]
    );
    assert_eq!(harness.store.versions(id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_start_ingest_run_rejects_empty_versions() {
    let harness = Harness::new();
    let app = test_app(&harness);

    let (status, body) =
        post_request(&app, "/api/v1/ingest-runs", json!({ "versions": ["  "] })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(harness.queue.is_empty());
}

#[tokio::test]
async fn test_start_ingest_run_rejects_unknown_version() {
    let harness = Harness::new();
    harness.register_gwo("FV_1");
    let app = test_app(&harness);

    let (status, body) = post_request(
        &app,
        "/api/v1/ingest-runs",
        json!({ "versions": ["FV_1", "FV_NOPE"] }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["message"].as_str().unwrap().contains("FV_NOPE"));
    assert!(harness.queue.is_empty());
}

// ============================================================================
// POST /api/v1/ingest-runs/:id/cancel
// ============================================================================

#[tokio::test]
async fn test_cancel_ingest_run_is_accepted() {
    let harness = Harness::new();
    harness.register_gwo("FV_1");
    let run = harness
        .dispatcher
        .create_ingest_run(&["FV_1".to_string()], None)
        .await
        .unwrap();
    let app = test_app(&harness);

    let (status, body) =
        post_request(&app, &format!("/api/v1/ingest-runs/{}/cancel", run.id), json!({})).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["id"], run.id.to_string());

    // The state only changes once the worker executes the task
    assert_eq!(
        harness.store.get(run.id).await.unwrap().unwrap().state,
        IngestRunState::Waiting
    );

    let outcomes = harness.drain().await;
    assert_eq!(
        outcomes[0].0,
        IngestRunTask::Cancel {
            ingest_run_id: run.id,
            requested_by: Some("user-42".to_string()),
        }
    );

    let events = harness.store.events(run.id).await.unwrap();
    let canceled = events
        .iter()
        .find(|e| e.event_type == EventType::Canceled)
        .unwrap();
    assert_eq!(canceled.user_id.as_deref(), Some("user-42"));
}

#[tokio::test]
async fn test_cancel_missing_run_is_not_found() {
    let harness = Harness::new();
    let app = test_app(&harness);

    let (status, body) = post_request(
        &app,
        &format!("/api/v1/ingest-runs/{}/cancel", Uuid::new_v4()),
        json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(harness.queue.is_empty());
}

// ============================================================================
// GET /api/v1/ingest-runs
// ============================================================================

#[tokio::test]
async fn test_get_ingest_run_includes_versions_and_events() {
    let harness = Harness::new();
    harness.register_gwo("FV_1");
    let run = harness
        .dispatcher
        .create_ingest_run(&["FV_1".to_string()], Some("user-42".to_string()))
        .await
        .unwrap();
    harness.dispatcher.enqueue_run(run.id).await.unwrap();
    harness.drain().await;
    let app = test_app(&harness);

    let (status, body) = get_request(&app, &format!("/api/v1/ingest-runs/{}", run.id)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "complete");
    assert_eq!(body["data"]["versions"][0]["kf_id"], "FV_1");

    let codes: Vec<&str> = body["data"]["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["IR_INI", "IR_STA", "IR_COM"]);
}

#[tokio::test]
async fn test_get_missing_run_is_not_found() {
    let harness = Harness::new();
    let app = test_app(&harness);

    let (status, body) =
        get_request(&app, &format!("/api/v1/ingest-runs/{}", Uuid::new_v4())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_list_ingest_runs_filters_by_state() {
    let harness = Harness::new();
    harness.register_gwo("FV_1");
    harness.register_gwo("FV_2");
    let waiting = harness
        .dispatcher
        .create_ingest_run(&["FV_1".to_string()], None)
        .await
        .unwrap();
    let canceled = harness
        .dispatcher
        .create_ingest_run(&["FV_2".to_string()], None)
        .await
        .unwrap();
    harness.dispatcher.cancel(canceled.id, None).await.unwrap();
    let app = test_app(&harness);

    let (status, body) = get_request(&app, "/api/v1/ingest-runs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["meta"]["count"], 2);
    assert_eq!(body["meta"]["limit"], 20);

    let (status, body) = get_request(&app, "/api/v1/ingest-runs?state=waiting").await;
    assert_eq!(status, StatusCode::OK);
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], waiting.id.to_string());
}

#[tokio::test]
async fn test_list_ingest_runs_rejects_bad_limit() {
    let harness = Harness::new();
    let app = test_app(&harness);

    let (status, body) = get_request(&app, "/api/v1/ingest-runs?limit=0").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

// ============================================================================
// Misc
// ============================================================================

#[tokio::test]
async fn test_root_reports_service() {
    let harness = Harness::new();
    let app = test_app(&harness);

    let (status, body) = get_request(&app, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Study Creator");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let harness = Harness::new();
    let app = test_app(&harness);

    let (status, _) = get_request(&app, "/api/v1/nothing-here").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
