//! `txflow serve` -- HTTP JSON API over the workflow engine.
//!
//! Endpoints:
//! - GET  /health                                   - Server status (never authenticated)
//! - POST /transactions                             - Create a transaction
//! - GET  /transactions/{id}                        - Transaction with history
//! - POST /transactions/{id}/transition             - Request a status change
//! - GET  /transactions/{id}/available-transitions  - Edges from the current status
//! - GET  /transactions/{id}/history                - History, newest first
//! - GET  /admin/statuses, POST /admin/statuses     - Workflow statuses
//! - GET  /admin/transitions, POST /admin/transitions
//! - POST /admin/cache/refresh                      - Reload the workflow graph
//!
//! Errors are `{"error": <code>, "details": <message>}`.

mod admin;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use txflow_engine::{AdminError, EngineError, WorkflowEngine};
use txflow_storage::MemoryStore;

use self::admin::{
    handle_add_status, handle_add_transition, handle_list_statuses, handle_list_transitions,
    handle_refresh_cache,
};
use self::handlers::{
    handle_available_transitions, handle_create_transaction, handle_get_transaction,
    handle_health, handle_history, handle_not_found, handle_transition,
};
use self::middleware::admin_auth_middleware;
use self::state::AppState;
use crate::config::ServerConfig;

/// Maximum request body size: 64 KB.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Construct a JSON error response.
fn json_error(status: StatusCode, code: &str, details: &str) -> Response {
    (
        status,
        Json(serde_json::json!({"error": code, "details": details})),
    )
        .into_response()
}

/// HTTP status for a stable error code.
fn status_for(code: &str) -> StatusCode {
    match code {
        "not_found" => StatusCode::NOT_FOUND,
        "terminal_status"
        | "no_such_transition"
        | "missing_reason"
        | "invalid_input"
        | "no_initial_status"
        | "ambiguous_initial_status"
        | "transition_from_final" => StatusCode::BAD_REQUEST,
        "concurrency_conflict"
        | "duplicate"
        | "duplicate_status_name"
        | "duplicate_transition"
        | "initial_status_exists" => StatusCode::CONFLICT,
        "store_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        "timeout" => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Handler error, rendered through [`json_error`].
#[derive(Debug)]
pub(crate) enum ApiError {
    Engine(EngineError),
    Admin(AdminError),
    /// Malformed request body.
    BadRequest(String),
    /// Path did not name a resource.
    NotFound(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl From<AdminError> for ApiError {
    fn from(err: AdminError) -> Self {
        ApiError::Admin(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, details) = match &self {
            ApiError::Engine(e) => (e.code(), e.to_string()),
            ApiError::Admin(e) => (e.code(), e.to_string()),
            ApiError::BadRequest(msg) => ("invalid_input", msg.clone()),
            ApiError::NotFound(msg) => ("not_found", msg.clone()),
        };
        let status = status_for(code);
        if status.is_server_error() {
            tracing::warn!(code, %details, "request failed");
        }
        json_error(status, code, &details)
    }
}

/// Build the router over an already constructed engine.
fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let admin = Router::new()
        .route(
            "/admin/statuses",
            get(handle_list_statuses).post(handle_add_status),
        )
        .route(
            "/admin/transitions",
            get(handle_list_transitions).post(handle_add_transition),
        )
        .route("/admin/cache/refresh", post(handle_refresh_cache))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(handle_health))
        .route("/transactions", post(handle_create_transaction))
        .route("/transactions/{id}", get(handle_get_transaction))
        .route("/transactions/{id}/transition", post(handle_transition))
        .route(
            "/transactions/{id}/available-transitions",
            get(handle_available_transitions),
        )
        .route("/transactions/{id}/history", get(handle_history))
        .merge(admin)
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server over a freshly seeded in-memory store.
pub(crate) async fn start_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = WorkflowEngine::new(Arc::new(MemoryStore::seeded()), config.engine.clone());
    // Warm the graph cache so consistency issues are logged at startup.
    let graph = engine.graph().await?;
    tracing::info!(
        statuses = graph.statuses().len(),
        transitions = graph.transitions().len(),
        "workflow graph loaded"
    );

    if config.admin_api_key.is_some() {
        tracing::info!("admin API key authentication enabled");
    }
    let state = Arc::new(AppState::new(engine, config.admin_api_key));
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("txflow listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
