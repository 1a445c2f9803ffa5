//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{ActivityKind, Channel, DispatchStatus, JobStatus, Priority};

/// One target inside a queue record's ordered channel set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelTarget {
    pub channel: Channel,
    pub enabled: bool,
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl ChannelTarget {
    pub fn enabled(channel: Channel) -> Self {
        Self {
            channel,
            enabled: true,
            settings: serde_json::Value::Null,
        }
    }
}

/// One pending distribution of one content item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueRecord {
    pub id: Uuid,
    pub content_id: Uuid,
    pub channels: Vec<ChannelTarget>,
    pub status: DispatchStatus,
    pub priority: Priority,
    pub scheduled_for: Option<OffsetDateTime>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Denormalized payload of a social broadcast job. Self-contained so the job
/// stays executable even if the originating content changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastPayload {
    pub channels: Vec<Channel>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

/// One coarse dispatch unit bound to a wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: BroadcastPayload,
    pub run_at: OffsetDateTime,
    pub status: JobStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Immutable audit entry; append-only, never mutated or deleted here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub kind: ActivityKind,
    pub channel: Channel,
    pub external_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: OffsetDateTime,
}

/// Minimal read model of a locally authored post.
///
/// The engine reads it to publish and mutates it only through webhook
/// reconciliation; authoring lives outside this subsystem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub body_markdown: String,
    /// Id assigned by the primary platform once published there.
    pub external_id: Option<String>,
    pub published_at: Option<OffsetDateTime>,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}
