//! Inbound webhook endpoint for the primary platform.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::application::sync::SyncError;
use crate::application::webhook::SIGNATURE_HEADER;

use super::state::HttpState;

/// POST: verify and process one event. 200 on success, 401 on signature
/// mismatch, 500 when processing fails after verification.
pub async fn receive(State(state): State<HttpState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.sync.handle_webhook(&body, signature).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(SyncError::Rejected(err)) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid signature", "details": err.to_string() })),
        )
            .into_response(),
        Err(err) => {
            error!(
                target = "infra::http::webhook",
                error = %err,
                "webhook processing failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "webhook processing failed", "details": err.to_string() })),
            )
                .into_response()
        }
    }
}

/// GET: static description, no side effects.
pub async fn describe(State(state): State<HttpState>) -> Response {
    let status = state.sync.status();
    Json(json!({
        "service": "diramo webhook receiver",
        "events": ["POST_PUBLISHED", "POST_UPDATED", "POST_DELETED"],
        "is_running": status.is_running,
        "last_sync": status.last_sync,
    }))
    .into_response()
}
