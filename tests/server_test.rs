// HTTP tests for the sqlgate router, driven with tower's oneshot

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use sqlgate_core::{Error, Result};
use sqlgate_runner::ConversationEngine;
use sqlgate_runner::testing::{
    InMemoryAuditLog, RecordingExecutor, ScriptedProposer, StaticIndex, country_schema,
};
use sqlgate_schema::StaticSchemaSource;
use sqlgate_server::{AppState, ReadinessCheck, create_router};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const INSERT_PROPOSAL: &str = r#"{"sql": "INSERT INTO country (code, name) VALUES ('TST', 'Testland')", "requires_confirmation": true}"#;

struct DownCheck;

#[async_trait]
impl ReadinessCheck for DownCheck {
    fn name(&self) -> &str {
        "database"
    }

    async fn check(&self) -> Result<()> {
        Err(Error::Database("connection refused".to_string()))
    }
}

fn state(proposer: ScriptedProposer, executor: Arc<RecordingExecutor>) -> AppState {
    let engine = ConversationEngine::builder()
        .schema_source(Arc::new(StaticSchemaSource::new(country_schema())))
        .proposer(Arc::new(proposer))
        .executor(executor)
        .audit_log(Arc::new(InMemoryAuditLog::new()))
        .retrieval_index(Arc::new(StaticIndex::confident()))
        .build()
        .unwrap();
    AppState::new(Arc::new(engine), "world")
}

fn router(proposer: ScriptedProposer) -> (Router, Arc<RecordingExecutor>) {
    let executor = Arc::new(RecordingExecutor::with_rows(vec![json!({"name": "Aruba"})]));
    let app = create_router(state(proposer, executor.clone()), Duration::from_secs(5));
    (app, executor)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_and_readiness() {
    let (app, _) = router(ScriptedProposer::always("SELECT 1"));

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));

    let (status, _) = send(&app, get("/readiness")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_readiness_reports_failed_checks() {
    let executor = Arc::new(RecordingExecutor::new());
    let state = state(ScriptedProposer::always("SELECT 1"), executor)
        .with_readiness_check(Arc::new(DownCheck));
    let app = create_router(state, Duration::from_secs(5));

    let (status, body) = send(&app, get("/readiness")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["failures"][0]["check"], "database");
}

#[tokio::test]
async fn test_read_query_uses_default_database() {
    let (app, executor) = router(ScriptedProposer::always("SELECT name FROM country"));

    let (status, body) = send(
        &app,
        post(
            "/api/v1/query",
            json!({"user_id": "alice", "request": "country names"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "executed");
    assert_eq!(body["results"], json!([{"name": "Aruba"}]));
    assert_eq!(executor.executed()[0].0, "world");
}

#[tokio::test]
async fn test_confirm_flow_over_http() {
    let (app, executor) = router(ScriptedProposer::always(INSERT_PROPOSAL));

    let (status, body) = send(
        &app,
        post(
            "/api/v1/query",
            json!({"user_id": "alice", "request": "add Testland", "db_name": "world"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmation_needed");
    let sql = body["sql"].as_str().unwrap().to_string();
    assert!(executor.executed().is_empty());

    let confirm = json!({"user_id": "alice", "sql": sql, "confirm": true});
    let (status, body) = send(&app, post("/api/v1/confirm", confirm.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "executed");
    assert_eq!(body["affected_rows"], 1);

    let (status, body) = send(&app, post("/api/v1/confirm", confirm)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["reason"], "conflicting_state");
    assert_eq!(executor.executed().len(), 1);

    let (status, body) = send(&app, get("/api/v1/sessions/alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"][0]["status"], "executed");

    let (status, body) = send(&app, get("/api/v1/history/alice?limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["db_name"], "world");
    assert_eq!(body["entries"][0]["user_prompt"], "add Testland");
}

#[tokio::test]
async fn test_cancel_over_http() {
    let (app, executor) = router(ScriptedProposer::always(INSERT_PROPOSAL));
    let (_, body) = send(
        &app,
        post(
            "/api/v1/query",
            json!({"user_id": "alice", "request": "add Testland"}),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        post(
            "/api/v1/confirm",
            json!({"user_id": "alice", "sql": body["sql"], "confirm": false}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    assert!(executor.executed().is_empty());
}

#[tokio::test]
async fn test_error_statuses() {
    let (app, _) = router(ScriptedProposer::new(Vec::<String>::new()));

    let (status, body) = send(&app, get("/api/v1/sessions/nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    let (status, body) = send(
        &app,
        post("/api/v1/query", json!({"user_id": " ", "request": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "malformed_input");

    // the proposer has nothing scripted, so the model call fails
    let (status, body) = send(
        &app,
        post("/api/v1/query", json!({"user_id": "alice", "request": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "upstream_failure");

    let (status, _) = send(&app, get("/api/v1/history/alice?limit=0")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(
        &app,
        post(
            "/api/v1/confirm",
            json!({"user_id": "nobody", "sql": "DELETE FROM country", "confirm": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["reason"], "not_found");
}
