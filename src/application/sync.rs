//! Bidirectional sync controller: reconciles remotely-initiated changes from
//! the primary platform with locally-initiated state.
//!
//! Explicitly constructed and injected at the composition root; never a
//! module-level global, so tests get clean isolation.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::repos::{
    ActivityRepo, ContentRepo, NewActivityRecord, RemoteContentUpdate, RepoError,
};
use crate::application::webhook::{
    WebhookEnvelope, WebhookError, WebhookEventKind, verify_signature,
};
use crate::domain::types::{ActivityKind, Channel};

#[derive(Debug, Error)]
pub enum SyncError {
    /// Rejected before any state mutation; maps to 401.
    #[error(transparent)]
    Rejected(WebhookError),
    /// Verified but failed during processing; maps to 500.
    #[error(transparent)]
    Processing(WebhookError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SyncStatus {
    pub is_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
struct SyncEvent {
    envelope: WebhookEnvelope,
    received_at: OffsetDateTime,
}

pub struct SyncController {
    content: Arc<dyn ContentRepo>,
    activity: Arc<dyn ActivityRepo>,
    webhook_secret: Option<String>,
    is_running: AtomicBool,
    last_sync: std::sync::Mutex<Option<OffsetDateTime>>,
    // FIFO drained under one async lock, so per-content ordering of remote
    // events is preserved.
    pending: tokio::sync::Mutex<VecDeque<SyncEvent>>,
}

impl SyncController {
    pub fn new(
        content: Arc<dyn ContentRepo>,
        activity: Arc<dyn ActivityRepo>,
        webhook_secret: Option<String>,
    ) -> Self {
        if webhook_secret.is_none() {
            warn!(
                target = "application::sync",
                "webhook signature verification disabled: no secret configured"
            );
        }
        Self {
            content,
            activity,
            webhook_secret,
            is_running: AtomicBool::new(false),
            last_sync: std::sync::Mutex::new(None),
            pending: tokio::sync::Mutex::new(VecDeque::new()),
        }
    }

    /// Idempotent: returns immediately if already running.
    pub fn initialize(&self) {
        if self
            .is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!(target = "application::sync", "sync controller initialized");
        }
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            is_running: self.is_running.load(Ordering::Acquire),
            last_sync: *self.last_sync.lock().expect("last_sync lock poisoned"),
        }
    }

    pub async fn queue_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Verify, parse, enqueue, and drain one inbound webhook.
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<(), SyncError> {
        if let Err(err) = verify_signature(self.webhook_secret.as_deref(), body, signature) {
            counter!("diramo_webhook_rejected_total").increment(1);
            warn!(
                target = "application::sync",
                "rejected webhook with invalid signature"
            );
            return Err(SyncError::Rejected(err));
        }

        let envelope = WebhookEnvelope::parse(body).map_err(SyncError::Processing)?;

        // Lazy re-initialization on first webhook after a restart.
        self.initialize();

        let received_at = OffsetDateTime::now_utc();
        {
            let mut pending = self.pending.lock().await;
            pending.push_back(SyncEvent {
                envelope,
                received_at,
            });
        }
        self.drain().await?;

        *self.last_sync.lock().expect("last_sync lock poisoned") = Some(received_at);
        Ok(())
    }

    async fn drain(&self) -> Result<(), SyncError> {
        loop {
            let event = { self.pending.lock().await.pop_front() };
            let Some(event) = event else { return Ok(()) };
            self.apply(event).await?;
        }
    }

    async fn apply(&self, event: SyncEvent) -> Result<(), SyncError> {
        let envelope = &event.envelope;
        let occurred_at = envelope.occurred_at(event.received_at);

        match envelope.event {
            WebhookEventKind::PostPublished | WebhookEventKind::PostUpdated => {
                let local = self
                    .content
                    .find_by_external_id(&envelope.data.post_id)
                    .await?;

                let Some(local) = local else {
                    info!(
                        target = "application::sync",
                        external_id = envelope.data.post_id,
                        "remote event references unknown content; skipped"
                    );
                    return Ok(());
                };

                // Newest wins: a remote change older than the local record is
                // discarded, not merged.
                if occurred_at < local.updated_at {
                    info!(
                        target = "application::sync",
                        external_id = envelope.data.post_id,
                        "discarding stale remote event (local copy is newer)"
                    );
                    return Ok(());
                }

                self.content
                    .apply_remote_update(&RemoteContentUpdate {
                        external_id: envelope.data.post_id.clone(),
                        slug: envelope.data.slug.clone(),
                        title: envelope.data.title.clone(),
                        published_at: matches!(envelope.event, WebhookEventKind::PostPublished)
                            .then_some(occurred_at),
                        occurred_at,
                    })
                    .await?;

                let kind = match envelope.event {
                    WebhookEventKind::PostPublished => ActivityKind::PostPublished,
                    _ => ActivityKind::PostUpdated,
                };
                self.record_activity(kind, &envelope.data.post_id).await;
            }
            WebhookEventKind::PostDeleted => {
                self.content
                    .apply_remote_delete(&envelope.data.post_id)
                    .await?;
                self.record_activity(ActivityKind::PostDeleted, &envelope.data.post_id)
                    .await;
            }
        }
        Ok(())
    }

    async fn record_activity(&self, kind: ActivityKind, external_id: &str) {
        let record = NewActivityRecord {
            kind,
            channel: Channel::Hashnode,
            external_id: Some(external_id.to_string()),
            metadata: serde_json::json!({ "source": "webhook" }),
        };
        if let Err(err) = self.activity.append(record).await {
            warn!(
                target = "application::sync",
                error = %err,
                "failed to append activity record"
            );
        }
    }
}
