use crate::types::*;
use async_trait::async_trait;
use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use sqlgate_core::{Error, ErrorKind, Result};
use sqlgate_runner::{ConfirmOutcome, ConversationEngine, QueryOutcome};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

const DEFAULT_HISTORY_LIMIT: i64 = 20;

/// A dependency the readiness endpoint probes.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConversationEngine>,
    /// Database used when a request names none
    pub default_db: String,
    pub readiness: Vec<Arc<dyn ReadinessCheck>>,
}

impl AppState {
    pub fn new(engine: Arc<ConversationEngine>, default_db: impl Into<String>) -> Self {
        Self {
            engine,
            default_db: default_db.into(),
            readiness: Vec::new(),
        }
    }

    pub fn with_readiness_check(mut self, check: Arc<dyn ReadinessCheck>) -> Self {
        self.readiness.push(check);
        self
    }

    fn db_name(&self, requested: Option<String>) -> String {
        requested
            .filter(|db| !db.trim().is_empty())
            .unwrap_or_else(|| self.default_db.clone())
    }
}

pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        // Health check endpoints
        .route("/health", get(health_check))
        .route("/readiness", get(readiness_check))
        // API endpoints
        .route("/api/v1/query", post(query))
        .route("/api/v1/confirm", post(confirm))
        .route("/api/v1/history/:user_id", get(history))
        .route("/api/v1/sessions/:user_id", get(session))
        // Middleware layers (applied in reverse order)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint - returns OK if the service is running
async fn health_check() -> impl IntoResponse {
    tracing::debug!("Health check requested");
    (StatusCode::OK, "OK")
}

/// Readiness check endpoint - probes every registered dependency
async fn readiness_check(State(state): State<AppState>) -> Response {
    tracing::debug!("Readiness check requested");

    let mut failures = Vec::new();
    for check in &state.readiness {
        if let Err(e) = check.check().await {
            tracing::warn!(check = %check.name(), error = %e, "Readiness check failed");
            failures.push(serde_json::json!({
                "check": check.name(),
                "error": e.to_string(),
            }));
        }
    }

    if failures.is_empty() {
        (StatusCode::OK, "READY").into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not_ready", "failures": failures })),
        )
            .into_response()
    }
}

async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> std::result::Result<Json<QueryOutcome>, AppError> {
    require_user(&req.user_id)?;
    let db_name = state.db_name(req.db_name);

    let outcome = state
        .engine
        .query(&req.user_id, &db_name, &req.request)
        .await?;
    Ok(Json(outcome))
}

async fn confirm(
    State(state): State<AppState>,
    Json(req): Json<ConfirmRequest>,
) -> std::result::Result<Response, AppError> {
    require_user(&req.user_id)?;
    let db_name = state.db_name(req.db_name);

    let outcome = state
        .engine
        .confirm(&req.user_id, &db_name, &req.sql, req.confirm)
        .await?;

    let status = match &outcome {
        ConfirmOutcome::Rejected { reason, .. } => status_for(*reason),
        _ => StatusCode::OK,
    };
    Ok((status, Json(outcome)).into_response())
}

async fn history(
    Path(user_id): Path<String>,
    Query(params): Query<HistoryParams>,
    State(state): State<AppState>,
) -> std::result::Result<Json<HistoryResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit <= 0 {
        return Err(Error::MalformedInput("limit must be positive".to_string()).into());
    }
    let db_name = state.db_name(params.db_name);

    let entries = state.engine.history(&user_id, &db_name, limit).await?;
    Ok(Json(HistoryResponse {
        user_id,
        db_name,
        entries,
    }))
}

async fn session(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> std::result::Result<Json<SessionResponse>, AppError> {
    let entries = state.engine.session_entries(&user_id).await?;
    Ok(Json(SessionResponse { user_id, entries }))
}

fn require_user(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(Error::MalformedInput("user_id must not be empty".to_string()));
    }
    Ok(())
}

/// HTTP status for an error classification.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ConflictingState => StatusCode::CONFLICT,
        ErrorKind::MalformedInput | ErrorKind::ValidationFailure => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// Error handling
pub struct AppError(Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let body = ErrorResponse {
            error: self.0.to_string(),
            kind,
        };
        (status, Json(body)).into_response()
    }
}
