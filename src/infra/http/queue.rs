//! Queue management endpoints consumed by the (external) admin UI.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{NewQueueRecord, QueueFilter};
use crate::domain::entities::ChannelTarget;
use crate::domain::types::{Channel, DispatchStatus, Priority};

use super::error::{ApiError, codes};
use super::state::HttpState;

const LIST_LIMIT: u32 = 100;
const DEFAULT_MAX_RETRIES: i32 = 3;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
}

pub async fn list(
    State(state): State<HttpState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            DispatchStatus::try_from(raw)
                .map_err(|()| ApiError::bad_request("unknown status filter", Some(raw.to_string())))
        })
        .transpose()?;
    let priority = query
        .priority
        .as_deref()
        .map(|raw| {
            Priority::try_from(raw).map_err(|()| {
                ApiError::bad_request("unknown priority filter", Some(raw.to_string()))
            })
        })
        .transpose()?;

    let filter = QueueFilter { status, priority };
    let records = state
        .queue
        .list(&filter, LIST_LIMIT)
        .await
        .map_err(|err| ApiError::repo(codes::QUEUE, "failed to list queue", &err))?;

    Ok(Json(json!({ "items": records })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub content_id: Uuid,
    pub platforms: Vec<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_for: Option<OffsetDateTime>,
    pub priority: Option<String>,
}

pub async fn enqueue(
    State(state): State<HttpState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.platforms.is_empty() {
        return Err(ApiError::bad_request(
            "at least one platform is required",
            None,
        ));
    }

    // Validation errors never enter the queue.
    let mut channels = Vec::with_capacity(request.platforms.len());
    for name in &request.platforms {
        let channel = Channel::try_from(name.as_str())
            .map_err(|()| ApiError::bad_request("unknown platform", Some(name.clone())))?;
        channels.push(ChannelTarget::enabled(channel));
    }

    let priority = match request.priority.as_deref() {
        Some(raw) => Priority::try_from(raw)
            .map_err(|()| ApiError::bad_request("unknown priority", Some(raw.to_string())))?,
        None => Priority::Normal,
    };

    let record = state
        .queue
        .enqueue(NewQueueRecord {
            content_id: request.content_id,
            channels,
            priority,
            scheduled_for: request.scheduled_for,
            max_retries: DEFAULT_MAX_RETRIES,
        })
        .await
        .map_err(|err| ApiError::repo(codes::QUEUE, "failed to enqueue", &err))?;

    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub id: Uuid,
}

pub async fn remove(
    State(state): State<HttpState>,
    Query(query): Query<DeleteQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .queue
        .delete(query.id)
        .await
        .map_err(|err| ApiError::repo(codes::QUEUE, "failed to delete", &err))?;

    if !deleted {
        return Err(ApiError::not_found("queue record not found"));
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn stats(State(state): State<HttpState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .processor
        .stats()
        .await
        .map_err(|err| ApiError::repo(codes::QUEUE, "failed to read stats", &err))?;

    Ok(Json(json!({
        "pending": stats.pending,
        "processing": stats.processing,
        "completed": stats.completed,
        "failed": stats.failed,
        "total": stats.total(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<u32>,
}

pub async fn activity(
    State(state): State<HttpState>,
    Query(query): Query<ActivityQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let records = state
        .activity
        .list_recent(limit)
        .await
        .map_err(|err| ApiError::repo(codes::ACTIVITY, "failed to list activity", &err))?;

    Ok(Json(json!({ "items": records })))
}
