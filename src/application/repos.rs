//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{
    ActivityRecord, BroadcastPayload, ChannelTarget, ContentItem, QueueRecord, ScheduledJob,
};
use crate::domain::types::{ActivityKind, Channel, DispatchStatus, Priority};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewQueueRecord {
    pub content_id: Uuid,
    pub channels: Vec<ChannelTarget>,
    pub priority: Priority,
    pub scheduled_for: Option<OffsetDateTime>,
    pub max_retries: i32,
}

#[derive(Debug, Clone, Default)]
pub struct QueueFilter {
    pub status: Option<DispatchStatus>,
    pub priority: Option<Priority>,
}

/// Per-status record counts surfaced to the admin UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }
}

/// Persisted queue of distribution requests.
///
/// All mutation is status-gated: `claim_due` and the outcome setters only
/// touch records in the state they expect, so concurrent processor instances
/// and crash-restarts cannot double-dispatch.
#[async_trait]
pub trait QueueRepo: Send + Sync {
    async fn enqueue(&self, record: NewQueueRecord) -> Result<QueueRecord, RepoError>;

    /// Atomically claim up to `limit` due pending records, moving them to
    /// `processing` as part of the selection. Ordering: priority desc,
    /// scheduled_for asc (null treated as due now), created_at asc.
    async fn claim_due(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<QueueRecord>, RepoError>;

    /// Transition a `processing` record to `completed`.
    async fn mark_completed(&self, id: Uuid) -> Result<(), RepoError>;

    /// Record a failed cycle on a `processing` record: bump `retry_count`,
    /// store `last_error`, and either return it to `pending` or, once
    /// `retry_count` reaches `max_retries`, move it to terminal `failed`.
    async fn mark_retry(&self, id: Uuid, error: &str) -> Result<QueueRecord, RepoError>;

    /// Return records stuck in `processing` since before `stale_before` to
    /// `pending`, so a crashed processor's work is re-claimed.
    async fn release_stale(&self, stale_before: OffsetDateTime) -> Result<u64, RepoError>;

    async fn list(&self, filter: &QueueFilter, limit: u32) -> Result<Vec<QueueRecord>, RepoError>;

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError>;

    async fn stats(&self) -> Result<QueueStats, RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewScheduledJob {
    pub job_type: String,
    pub payload: BroadcastPayload,
    pub run_at: OffsetDateTime,
}

#[async_trait]
pub trait ScheduledJobsRepo: Send + Sync {
    async fn enqueue_job(&self, job: NewScheduledJob) -> Result<ScheduledJob, RepoError>;

    /// Atomically claim up to `limit` due queued jobs, moving them to
    /// `running` as part of the selection, ordered by run_at asc.
    async fn claim_due_jobs(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, RepoError>;

    async fn mark_job_success(&self, id: Uuid) -> Result<(), RepoError>;

    /// Terminal failure: `attempts` set, `last_error` preserved for operator
    /// inspection.
    async fn mark_job_failed(&self, id: Uuid, attempts: i32, error: &str)
    -> Result<(), RepoError>;

    /// Return a running job to `queued` with a new `run_at` and bumped
    /// `attempts`.
    async fn reschedule_job(
        &self,
        id: Uuid,
        attempts: i32,
        run_at: OffsetDateTime,
        error: &str,
    ) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewActivityRecord {
    pub kind: ActivityKind,
    pub channel: Channel,
    pub external_id: Option<String>,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait ActivityRepo: Send + Sync {
    async fn append(&self, record: NewActivityRecord) -> Result<(), RepoError>;

    async fn list_recent(&self, limit: u32) -> Result<Vec<ActivityRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct RemoteContentUpdate {
    pub external_id: String,
    pub slug: String,
    pub title: String,
    pub published_at: Option<OffsetDateTime>,
    /// Remote-side modification time used by the newest-wins policy.
    pub occurred_at: OffsetDateTime,
}

/// Read/reconcile access to locally authored content.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    async fn find_content(&self, id: Uuid) -> Result<Option<ContentItem>, RepoError>;

    /// Lookup by the id the primary platform assigned, never by slug (slugs
    /// can change remotely).
    async fn find_by_external_id(&self, external_id: &str)
    -> Result<Option<ContentItem>, RepoError>;

    /// Record the external id handed back by the primary platform.
    async fn set_external_id(&self, id: Uuid, external_id: &str) -> Result<(), RepoError>;

    /// Apply a remotely-initiated update. Idempotent: re-applying the same
    /// update leaves the row unchanged.
    async fn apply_remote_update(&self, update: &RemoteContentUpdate) -> Result<(), RepoError>;

    /// Soft-delete in response to a remote deletion event. Idempotent.
    async fn apply_remote_delete(&self, external_id: &str) -> Result<(), RepoError>;
}
