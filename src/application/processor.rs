//! Polling queue processor: claims due distribution requests and drives them
//! through the channel publishers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, gauge};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::application::channels::{ChannelRegistry, Outbound};
use crate::application::policy::SuccessPolicy;
use crate::application::repos::{
    ActivityRepo, ContentRepo, NewActivityRecord, QueueRepo, QueueStats, RepoError,
};
use crate::application::scheduler::{ScheduleHandle, Scheduler};
use crate::domain::entities::QueueRecord;
use crate::domain::types::{ActivityKind, Channel, DispatchStatus};

pub const DEFAULT_BATCH_SIZE: u32 = 20;
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(600);

/// Outcome of one `process_queue` invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
}

pub struct QueueProcessor {
    queue: Arc<dyn QueueRepo>,
    content: Arc<dyn ContentRepo>,
    activity: Arc<dyn ActivityRepo>,
    registry: ChannelRegistry,
    policy: SuccessPolicy,
    scheduler: Arc<dyn Scheduler>,
    batch_size: u32,
    stale_after: Duration,
    in_flight: AtomicBool,
    poll_handle: std::sync::Mutex<Option<ScheduleHandle>>,
}

impl QueueProcessor {
    pub fn new(
        queue: Arc<dyn QueueRepo>,
        content: Arc<dyn ContentRepo>,
        activity: Arc<dyn ActivityRepo>,
        registry: ChannelRegistry,
        policy: SuccessPolicy,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            queue,
            content,
            activity,
            registry,
            policy,
            scheduler,
            batch_size: DEFAULT_BATCH_SIZE,
            stale_after: DEFAULT_STALE_AFTER,
            in_flight: AtomicBool::new(false),
            poll_handle: std::sync::Mutex::new(None),
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Begin periodic polling. Calling while already running is a no-op.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let mut handle = self.poll_handle.lock().expect("poll handle lock poisoned");
        if handle.is_some() {
            return;
        }

        let processor = Arc::clone(self);
        let task: crate::application::scheduler::PeriodicTask = Arc::new(move || {
            let processor = Arc::clone(&processor);
            Box::pin(async move {
                if let Err(err) = processor.process_queue().await {
                    error!(
                        target = "application::processor",
                        error = %err,
                        "poll cycle aborted"
                    );
                }
            })
        });

        *handle = Some(self.scheduler.schedule_periodic(interval, task));
        info!(
            target = "application::processor",
            interval_ms = interval.as_millis() as u64,
            "queue processor started"
        );
    }

    /// Halt future polling. An in-flight cycle is allowed to finish. Safe to
    /// call when not running.
    pub fn stop(&self) {
        let mut handle = self.poll_handle.lock().expect("poll handle lock poisoned");
        if let Some(handle) = handle.take() {
            handle.cancel();
            info!(target = "application::processor", "queue processor stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll_handle
            .lock()
            .expect("poll handle lock poisoned")
            .is_some()
    }

    pub async fn stats(&self) -> Result<QueueStats, RepoError> {
        self.queue.stats().await
    }

    /// Run one claim-and-dispatch cycle. Single-flight: if a previous
    /// invocation is still in progress the call returns immediately without
    /// touching the store.
    pub async fn process_queue(&self) -> Result<ProcessSummary, RepoError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(ProcessSummary::default());
        }
        let result = self.process_cycle().await;
        self.in_flight.store(false, Ordering::Release);
        result
    }

    async fn process_cycle(&self) -> Result<ProcessSummary, RepoError> {
        let now = OffsetDateTime::now_utc();

        let released = self.queue.release_stale(now - self.stale_after).await?;
        if released > 0 {
            warn!(
                target = "application::processor",
                released, "returned stale processing records to pending"
            );
        }

        let records = self.queue.claim_due(now, self.batch_size).await?;
        let mut summary = ProcessSummary {
            claimed: records.len(),
            ..ProcessSummary::default()
        };

        for record in records {
            match self.dispatch_record(&record).await? {
                DispatchStatus::Completed => summary.completed += 1,
                DispatchStatus::Failed => summary.failed += 1,
                _ => summary.retried += 1,
            }
        }

        if let Ok(stats) = self.queue.stats().await {
            gauge!("diramo_queue_pending").set(stats.pending as f64);
        }

        Ok(summary)
    }

    /// Dispatch one claimed record to each of its enabled channels
    /// sequentially. Channel failures are caught per channel; only store
    /// failures propagate.
    async fn dispatch_record(&self, record: &QueueRecord) -> Result<DispatchStatus, RepoError> {
        let content = self.content.find_content(record.content_id).await?;

        let Some(content) = content else {
            let updated = self
                .queue
                .mark_retry(record.id, "content item no longer exists")
                .await?;
            return Ok(updated.status);
        };

        let mut attempted = 0usize;
        let mut succeeded = 0usize;
        let mut errors: Vec<String> = Vec::new();

        for target in record.channels.iter().filter(|t| t.enabled) {
            attempted += 1;

            let Some(publisher) = self.registry.get(target.channel) else {
                errors.push(format!("{}: no publisher registered", target.channel.as_str()));
                continue;
            };

            match publisher
                .publish(Outbound::Post(&content), &target.settings)
                .await
            {
                Ok(receipt) => {
                    succeeded += 1;
                    counter!("diramo_dispatch_success_total", "channel" => target.channel.as_str())
                        .increment(1);
                    self.record_publish(record, target.channel, &receipt.external_id)
                        .await;
                    if target.channel == Channel::Hashnode && content.external_id.is_none() {
                        self.content
                            .set_external_id(content.id, &receipt.external_id)
                            .await?;
                    }
                }
                Err(err) => {
                    counter!("diramo_dispatch_failure_total", "channel" => target.channel.as_str())
                        .increment(1);
                    warn!(
                        target = "application::processor",
                        channel = target.channel.as_str(),
                        queue_id = %record.id,
                        error = %err,
                        "channel publish failed"
                    );
                    errors.push(format!("{}: {err}", target.channel.as_str()));
                }
            }
        }

        if (self.policy)(succeeded, attempted) {
            self.queue.mark_completed(record.id).await?;
            info!(
                target = "application::processor",
                queue_id = %record.id,
                succeeded,
                attempted,
                "distribution completed"
            );
            return Ok(DispatchStatus::Completed);
        }

        let error_text = if errors.is_empty() {
            "no enabled channels".to_string()
        } else {
            errors.join("; ")
        };
        let updated = self.queue.mark_retry(record.id, &error_text).await?;
        if updated.status == DispatchStatus::Failed {
            warn!(
                target = "application::processor",
                queue_id = %record.id,
                retry_count = updated.retry_count,
                "distribution failed permanently"
            );
        }
        Ok(updated.status)
    }

    /// Activity append is the caller's duty, not the publisher's; a logging
    /// failure must not undo a delivery that already happened remotely.
    async fn record_publish(&self, record: &QueueRecord, channel: Channel, external_id: &str) {
        let activity = NewActivityRecord {
            kind: ActivityKind::PostPublished,
            channel,
            external_id: Some(external_id.to_string()),
            metadata: serde_json::json!({
                "queue_id": record.id,
                "content_id": record.content_id,
            }),
        };
        if let Err(err) = self.activity.append(activity).await {
            error!(
                target = "application::processor",
                error = %err,
                "failed to append activity record"
            );
        }
    }
}
