//! External time-trigger endpoint for the scheduled broadcast runner.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde_json::json;
use time::OffsetDateTime;
use tracing::warn;

use super::error::{ApiError, codes};
use super::state::HttpState;

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Authenticate the trigger and run one due-job batch. A single static
/// secret, exact compare; mismatch rejects immediately with no retry.
pub async fn trigger(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let Some(expected) = state.cron_secret.as_deref() else {
        warn!(
            target = "infra::http::cron",
            "cron trigger rejected: no secret configured"
        );
        return Err(ApiError::unauthorized("cron secret not configured"));
    };

    let provided = headers
        .get(CRON_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided != Some(expected) {
        return Err(ApiError::unauthorized("invalid cron secret"));
    }

    let outcomes = state
        .runner
        .run_due(OffsetDateTime::now_utc())
        .await
        .map_err(|err| ApiError::repo(codes::CRON, "broadcast batch failed", &err))?;

    Ok(Json(json!({
        "message": format!("processed {} job(s)", outcomes.len()),
        "results": outcomes,
    })))
}
