//! Paracad HTTP REST API
//!
//! Axum-based HTTP server that exposes the pipeline and the snippet store
//! over HTTP. Runs alongside the Unix socket IPC server.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a
//! pure inner function. The inner functions are directly testable without
//! axum dispatch machinery.
//!
//! Endpoints:
//! - GET    /health         — health check with DB status
//! - GET    /version        — server version info
//! - POST   /parse          — text to structured instructions
//! - POST   /search         — semantic snippet search
//! - POST   /snippets       — add a snippet
//! - GET    /snippets       — list all snippets
//! - DELETE /snippets/:id   — delete a snippet
//! - GET    /stats          — store statistics
//! - POST   /generate       — code generation from instructions (no retrieval)
//! - POST   /run            — full pipeline: text to script

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use paracad_core::ipc::{ParacadRequest, ParacadResponse};
use paracad_core::ParacadConfig;
use serde::Deserialize;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub pool: PgPool,
    pub config: ParacadConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/parse", post(parse_handler))
        .route("/search", post(search_handler))
        .route("/snippets", post(add_snippet_handler).get(list_snippets_handler))
        .route("/snippets/:id", delete(delete_snippet_handler))
        .route("/stats", get(stats_handler))
        .route("/generate", post(generate_handler))
        .route("/run", post(run_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    pool: PgPool,
    config: ParacadConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState { pool, config });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Paracad HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub instructions: Vec<paracad_core::instruction::Instruction>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub text: Option<String>,
    #[serde(default)]
    pub save: bool,
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check — queries DB and returns (status_code, json_body).
pub async fn health_inner(pool: &PgPool, socket_path: &str) -> (StatusCode, serde_json::Value) {
    let pg_ver = match paracad_core::db::health_check(pool).await {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                }),
            );
        }
    };

    let pgvector_ver = match paracad_core::db::check_pgvector(pool).await {
        Ok(v) => v,
        Err(e) => format!("unavailable: {}", e),
    };

    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "postgresql": pg_ver,
            "pgvector": pgvector_ver,
            "socket": socket_path,
        }),
    )
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "paracad/1",
    })
}

/// Inner parse — validates text and calls the IPC router.
pub async fn parse_inner(
    pool: &PgPool,
    config: &ParacadConfig,
    req: ParseRequest,
) -> (StatusCode, serde_json::Value) {
    let text = match req.text {
        Some(t) if !t.trim().is_empty() => t,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "text field is required",
                    "status": "error",
                }),
            );
        }
    };

    dispatch(ParacadRequest::Parse { text }, pool, config).await
}

/// Inner search — validates query and calls the IPC router, timing the call.
pub async fn search_inner(
    pool: &PgPool,
    config: &ParacadConfig,
    req: SearchRequest,
) -> (StatusCode, serde_json::Value) {
    let query = match req.query {
        Some(q) if !q.trim().is_empty() => q,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "query field is required",
                    "status": "error",
                }),
            );
        }
    };

    let start = Instant::now();

    let (status, mut data) = dispatch(
        ParacadRequest::Search {
            query,
            limit: req.limit,
        },
        pool,
        config,
    )
    .await;

    let took_ms = start.elapsed().as_millis() as u64;
    if let Some(obj) = data.as_object_mut() {
        obj.insert("took_ms".to_string(), serde_json::json!(took_ms));
    }

    (status, data)
}

/// Inner snippet add — forwards the payload to the IPC router.
pub async fn add_snippet_inner(
    pool: &PgPool,
    config: &ParacadConfig,
    payload: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    dispatch(ParacadRequest::AddSnippet { payload }, pool, config).await
}

/// Inner snippet list.
pub async fn list_snippets_inner(
    pool: &PgPool,
    config: &ParacadConfig,
) -> (StatusCode, serde_json::Value) {
    dispatch(ParacadRequest::ListSnippets, pool, config).await
}

/// Inner snippet delete.
pub async fn delete_snippet_inner(
    pool: &PgPool,
    config: &ParacadConfig,
    id: Uuid,
) -> (StatusCode, serde_json::Value) {
    dispatch(ParacadRequest::DeleteSnippet { id }, pool, config).await
}

/// Inner stats.
pub async fn stats_inner(
    pool: &PgPool,
    config: &ParacadConfig,
) -> (StatusCode, serde_json::Value) {
    dispatch(ParacadRequest::Stats, pool, config).await
}

/// Inner generate — instruction JSON straight to the coder model.
pub async fn generate_inner(
    pool: &PgPool,
    config: &ParacadConfig,
    req: GenerateRequest,
) -> (StatusCode, serde_json::Value) {
    if req.instructions.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            serde_json::json!({
                "error": "instructions must not be empty",
                "status": "error",
            }),
        );
    }

    dispatch(
        ParacadRequest::Generate {
            instructions: req.instructions,
        },
        pool,
        config,
    )
    .await
}

/// Inner run — the full text-to-script pipeline.
pub async fn run_inner(
    pool: &PgPool,
    config: &ParacadConfig,
    req: RunRequest,
) -> (StatusCode, serde_json::Value) {
    let text = match req.text {
        Some(t) if !t.trim().is_empty() => t,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "text field is required",
                    "status": "error",
                }),
            );
        }
    };

    dispatch(
        ParacadRequest::Run {
            text,
            save: req.save,
        },
        pool,
        config,
    )
    .await
}

/// Route a request through the IPC router and map the envelope onto HTTP.
async fn dispatch(
    request: ParacadRequest,
    pool: &PgPool,
    config: &ParacadConfig,
) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(request, pool, config).await;

    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({
                "error": e,
                "status": "error",
            }),
        ),
    }
}

/// Unwrap the IPC envelope: ok -> data, error -> message.
fn response_to_http(response: ParacadResponse) -> Result<serde_json::Value, String> {
    if response.status == "ok" {
        Ok(response.data.unwrap_or(serde_json::json!({})))
    } else {
        Err(response
            .error
            .unwrap_or_else(|| "unknown error".to_string()))
    }
}

// ============================================================================
// Axum handlers (thin wrappers)
// ============================================================================

async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.pool, &state.config.service.socket_path).await;
    (status, Json(body))
}

async fn version_handler() -> impl IntoResponse {
    Json(version_inner())
}

async fn parse_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ParseRequest>,
) -> impl IntoResponse {
    let (status, body) = parse_inner(&state.pool, &state.config, req).await;
    (status, Json(body))
}

async fn search_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<SearchRequest>,
) -> impl IntoResponse {
    let (status, body) = search_inner(&state.pool, &state.config, req).await;
    (status, Json(body))
}

async fn add_snippet_handler(
    State(state): State<Arc<HttpState>>,
    Json(payload): Json<serde_json::Value>,
) -> impl IntoResponse {
    let (status, body) = add_snippet_inner(&state.pool, &state.config, payload).await;
    (status, Json(body))
}

async fn list_snippets_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = list_snippets_inner(&state.pool, &state.config).await;
    (status, Json(body))
}

async fn delete_snippet_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = delete_snippet_inner(&state.pool, &state.config, id).await;
    (status, Json(body))
}

async fn stats_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = stats_inner(&state.pool, &state.config).await;
    (status, Json(body))
}

async fn generate_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<GenerateRequest>,
) -> impl IntoResponse {
    let (status, body) = generate_inner(&state.pool, &state.config, req).await;
    (status, Json(body))
}

async fn run_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<RunRequest>,
) -> impl IntoResponse {
    let (status, body) = run_inner(&state.pool, &state.config, req).await;
    (status, Json(body))
}
