//! Admin API key authentication.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use super::json_error;
use super::state::AppState;

/// When an admin key is configured, requests must carry either
/// `Authorization: Bearer <key>` or `X-API-Key: <key>`.
pub(crate) async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let expected_key = match &state.admin_key {
        Some(k) => k,
        None => return next.run(request).await,
    };

    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    if let Some(auth) = auth_header {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            if token == expected_key {
                return next.run(request).await;
            }
            return json_error(StatusCode::FORBIDDEN, "forbidden", "invalid API key");
        }
    }

    let api_key_header = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    if let Some(key) = api_key_header {
        if key == expected_key {
            return next.run(request).await;
        }
        return json_error(StatusCode::FORBIDDEN, "forbidden", "invalid API key");
    }

    json_error(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "authentication required",
    )
}
