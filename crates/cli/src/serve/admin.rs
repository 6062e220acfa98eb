//! Administrative routes. Every successful mutation invalidates the graph
//! cache inside `WorkflowAdmin`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use txflow_engine::{CacheStats, GraphIssue};
use txflow_storage::{NewStatus, NewTransition, StatusRecord, TransitionRecord};

use super::state::AppState;
use super::ApiError;

#[derive(Serialize)]
pub(crate) struct RefreshResponse {
    statuses: usize,
    transitions: usize,
    issues: Vec<GraphIssue>,
    stats: CacheStats,
}

/// GET /admin/statuses
pub(crate) async fn handle_list_statuses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StatusRecord>>, ApiError> {
    Ok(Json(state.admin.list_statuses().await?))
}

/// POST /admin/statuses
pub(crate) async fn handle_add_status(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewStatus>, JsonRejection>,
) -> Result<(StatusCode, Json<StatusRecord>), ApiError> {
    let Json(status) = body?;
    let created = state.admin.add_status(status).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /admin/transitions
pub(crate) async fn handle_list_transitions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TransitionRecord>>, ApiError> {
    Ok(Json(state.admin.list_transitions().await?))
}

/// POST /admin/transitions
pub(crate) async fn handle_add_transition(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewTransition>, JsonRejection>,
) -> Result<(StatusCode, Json<TransitionRecord>), ApiError> {
    let Json(transition) = body?;
    let created = state.admin.add_transition(transition).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /admin/cache/refresh
pub(crate) async fn handle_refresh_cache(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let graph = state.admin.refresh_cache().await?;
    Ok(Json(RefreshResponse {
        statuses: graph.statuses().len(),
        transitions: graph.transitions().len(),
        issues: graph.issues().to_vec(),
        stats: state.engine.cache_stats(),
    }))
}
