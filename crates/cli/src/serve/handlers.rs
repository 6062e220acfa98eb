//! Transaction routes plus health and fallback.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use txflow_engine::{
    AvailableTransition, HistoryEntry, NewTransaction, TransactionDetail, TransactionView,
    TransitionRequest,
};
use uuid::Uuid;

use super::state::AppState;
use super::{json_error, ApiError};

/// Unparseable ids name no transaction, so they are 404 rather than 400.
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::NotFound(format!("transaction with ID {raw} not found")))
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not_found", "no such route")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /transactions
pub(crate) async fn handle_create_transaction(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewTransaction>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(input) = body?;
    let view = state.engine.create_transaction(input).await?;
    let location = format!("/transactions/{}", view.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(view)).into_response())
}

/// GET /transactions/{id}
pub(crate) async fn handle_get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TransactionDetail>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.get_transaction(id).await?))
}

/// POST /transactions/{id}/transition
pub(crate) async fn handle_transition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<TransitionRequest>, JsonRejection>,
) -> Result<Json<TransactionView>, ApiError> {
    let id = parse_id(&id)?;
    let Json(request) = body?;
    Ok(Json(state.engine.request_transition(id, request).await?))
}

/// GET /transactions/{id}/available-transitions
pub(crate) async fn handle_available_transitions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AvailableTransition>>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.list_available_transitions(id).await?))
}

/// GET /transactions/{id}/history
pub(crate) async fn handle_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.get_history(id).await?))
}
