//! In-memory repository and publisher fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use diramo::application::channels::{
    ChannelError, ChannelPublisher, ChannelRegistry, Outbound, PublishReceipt,
};
use diramo::application::repos::{
    ActivityRepo, ContentRepo, NewActivityRecord, NewQueueRecord, NewScheduledJob, QueueFilter,
    QueueRepo, QueueStats, RemoteContentUpdate, RepoError, ScheduledJobsRepo,
};
use diramo::application::scheduler::{PeriodicTask, ScheduleHandle, Scheduler};
use diramo::domain::entities::{ActivityRecord, ContentItem, QueueRecord, ScheduledJob};
use diramo::domain::types::{Channel, DispatchStatus, JobStatus};

// ============ Queue ============

#[derive(Default)]
pub struct MemoryQueueRepo {
    records: Mutex<HashMap<Uuid, QueueRecord>>,
    claimed_at: Mutex<HashMap<Uuid, OffsetDateTime>>,
}

impl MemoryQueueRepo {
    pub async fn get(&self, id: Uuid) -> Option<QueueRecord> {
        self.records.lock().await.get(&id).cloned()
    }

    /// Backdate a processing record's claim time to simulate a crashed
    /// processor instance.
    pub async fn backdate_claim(&self, id: Uuid, claimed_at: OffsetDateTime) {
        self.claimed_at.lock().await.insert(id, claimed_at);
    }
}

#[async_trait]
impl QueueRepo for MemoryQueueRepo {
    async fn enqueue(&self, record: NewQueueRecord) -> Result<QueueRecord, RepoError> {
        let stored = QueueRecord {
            id: Uuid::new_v4(),
            content_id: record.content_id,
            channels: record.channels,
            status: DispatchStatus::Pending,
            priority: record.priority,
            scheduled_for: record.scheduled_for,
            retry_count: 0,
            max_retries: record.max_retries,
            last_error: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.records.lock().await.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn claim_due(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<QueueRecord>, RepoError> {
        let mut records = self.records.lock().await;
        let mut due: Vec<QueueRecord> = records
            .values()
            .filter(|r| r.status == DispatchStatus::Pending)
            .filter(|r| r.scheduled_for.is_none_or(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            b.priority
                .weight()
                .cmp(&a.priority.weight())
                .then_with(|| a.scheduled_for.cmp(&b.scheduled_for))
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        due.truncate(limit as usize);

        let mut claimed_at = self.claimed_at.lock().await;
        for record in &mut due {
            record.status = DispatchStatus::Processing;
            records.insert(record.id, record.clone());
            claimed_at.insert(record.id, now);
        }
        Ok(due)
    }

    async fn mark_completed(&self, id: Uuid) -> Result<(), RepoError> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&id)
            && record.status == DispatchStatus::Processing
        {
            record.status = DispatchStatus::Completed;
        }
        Ok(())
    }

    async fn mark_retry(&self, id: Uuid, error: &str) -> Result<QueueRecord, RepoError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&id).ok_or(RepoError::NotFound)?;
        if record.status == DispatchStatus::Processing {
            record.retry_count += 1;
            record.last_error = Some(error.to_string());
            record.status = if record.retry_count >= record.max_retries {
                DispatchStatus::Failed
            } else {
                DispatchStatus::Pending
            };
        }
        Ok(record.clone())
    }

    async fn release_stale(&self, stale_before: OffsetDateTime) -> Result<u64, RepoError> {
        let mut records = self.records.lock().await;
        let claimed_at = self.claimed_at.lock().await;
        let mut released = 0u64;
        for record in records.values_mut() {
            if record.status == DispatchStatus::Processing
                && claimed_at.get(&record.id).is_some_and(|at| *at < stale_before)
            {
                record.status = DispatchStatus::Pending;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn list(&self, filter: &QueueFilter, limit: u32) -> Result<Vec<QueueRecord>, RepoError> {
        let records = self.records.lock().await;
        let mut items: Vec<QueueRecord> = records
            .values()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| filter.priority.is_none_or(|p| r.priority == p))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.priority
                .weight()
                .cmp(&a.priority.weight())
                .then_with(|| a.scheduled_for.cmp(&b.scheduled_for))
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        Ok(self.records.lock().await.remove(&id).is_some())
    }

    async fn stats(&self) -> Result<QueueStats, RepoError> {
        let records = self.records.lock().await;
        let mut stats = QueueStats::default();
        for record in records.values() {
            match record.status {
                DispatchStatus::Pending => stats.pending += 1,
                DispatchStatus::Processing => stats.processing += 1,
                DispatchStatus::Completed => stats.completed += 1,
                DispatchStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

// ============ Scheduled jobs ============

#[derive(Default)]
pub struct MemoryJobsRepo {
    jobs: Mutex<HashMap<Uuid, ScheduledJob>>,
}

impl MemoryJobsRepo {
    pub async fn get(&self, id: Uuid) -> Option<ScheduledJob> {
        self.jobs.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl ScheduledJobsRepo for MemoryJobsRepo {
    async fn enqueue_job(&self, job: NewScheduledJob) -> Result<ScheduledJob, RepoError> {
        let stored = ScheduledJob {
            id: Uuid::new_v4(),
            job_type: job.job_type,
            payload: job.payload,
            run_at: job.run_at,
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.jobs.lock().await.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn claim_due_jobs(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, RepoError> {
        let mut jobs = self.jobs.lock().await;
        let mut due: Vec<ScheduledJob> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued && j.run_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.run_at.cmp(&b.run_at));
        due.truncate(limit as usize);
        for job in &mut due {
            job.status = JobStatus::Running;
            jobs.insert(job.id, job.clone());
        }
        Ok(due)
    }

    async fn mark_job_success(&self, id: Uuid) -> Result<(), RepoError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&id)
            && job.status == JobStatus::Running
        {
            job.status = JobStatus::Success;
        }
        Ok(())
    }

    async fn mark_job_failed(
        &self,
        id: Uuid,
        attempts: i32,
        error: &str,
    ) -> Result<(), RepoError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&id)
            && job.status == JobStatus::Running
        {
            job.status = JobStatus::Failed;
            job.attempts = attempts;
            job.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn reschedule_job(
        &self,
        id: Uuid,
        attempts: i32,
        run_at: OffsetDateTime,
        error: &str,
    ) -> Result<(), RepoError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&id)
            && job.status == JobStatus::Running
        {
            job.status = JobStatus::Queued;
            job.attempts = attempts;
            job.run_at = run_at;
            job.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

// ============ Activity log ============

#[derive(Default)]
pub struct MemoryActivityRepo {
    entries: Mutex<Vec<ActivityRecord>>,
}

impl MemoryActivityRepo {
    pub async fn all(&self) -> Vec<ActivityRecord> {
        self.entries.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl ActivityRepo for MemoryActivityRepo {
    async fn append(&self, record: NewActivityRecord) -> Result<(), RepoError> {
        self.entries.lock().await.push(ActivityRecord {
            id: Uuid::new_v4(),
            kind: record.kind,
            channel: record.channel,
            external_id: record.external_id,
            metadata: record.metadata,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<ActivityRecord>, RepoError> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().rev().take(limit as usize).cloned().collect())
    }
}

// ============ Content ============

#[derive(Default)]
pub struct MemoryContentRepo {
    items: Mutex<HashMap<Uuid, ContentItem>>,
}

impl MemoryContentRepo {
    pub async fn insert(&self, item: ContentItem) {
        self.items.lock().await.insert(item.id, item);
    }

    pub async fn get(&self, id: Uuid) -> Option<ContentItem> {
        self.items.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl ContentRepo for MemoryContentRepo {
    async fn find_content(&self, id: Uuid) -> Result<Option<ContentItem>, RepoError> {
        let items = self.items.lock().await;
        Ok(items.get(&id).filter(|item| item.deleted_at.is_none()).cloned())
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ContentItem>, RepoError> {
        let items = self.items.lock().await;
        Ok(items
            .values()
            .find(|item| item.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn set_external_id(&self, id: Uuid, external_id: &str) -> Result<(), RepoError> {
        let mut items = self.items.lock().await;
        if let Some(item) = items.get_mut(&id)
            && item.external_id.is_none()
        {
            item.external_id = Some(external_id.to_string());
        }
        Ok(())
    }

    async fn apply_remote_update(&self, update: &RemoteContentUpdate) -> Result<(), RepoError> {
        let mut items = self.items.lock().await;
        let item = items
            .values_mut()
            .find(|item| item.external_id.as_deref() == Some(update.external_id.as_str()));
        if let Some(item) = item {
            let changed = item.slug != update.slug
                || item.title != update.title
                || (update.published_at.is_some() && item.published_at != update.published_at);
            if changed {
                item.slug = update.slug.clone();
                item.title = update.title.clone();
                if update.published_at.is_some() {
                    item.published_at = update.published_at;
                }
                item.updated_at = update.occurred_at;
            }
        }
        Ok(())
    }

    async fn apply_remote_delete(&self, external_id: &str) -> Result<(), RepoError> {
        let mut items = self.items.lock().await;
        let item = items
            .values_mut()
            .find(|item| item.external_id.as_deref() == Some(external_id));
        if let Some(item) = item
            && item.deleted_at.is_none()
        {
            item.deleted_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }
}

// ============ Publishers ============

pub enum ScriptedOutcome {
    Succeed(&'static str),
    FailRemote,
    FailAuth,
}

/// Publisher whose outcomes are scripted per call; once the script is
/// exhausted every further call succeeds.
pub struct ScriptedPublisher {
    channel: Channel,
    script: Mutex<VecDeque<ScriptedOutcome>>,
    calls: AtomicUsize,
}

impl ScriptedPublisher {
    pub fn new(channel: Channel, script: Vec<ScriptedOutcome>) -> Self {
        Self {
            channel,
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding(channel: Channel) -> Self {
        Self::new(channel, Vec::new())
    }

    pub fn failing(channel: Channel) -> Arc<FailingPublisher> {
        Arc::new(FailingPublisher { channel })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelPublisher for ScriptedPublisher {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn publish(
        &self,
        _outbound: Outbound<'_>,
        _settings: &serde_json::Value,
    ) -> Result<PublishReceipt, ChannelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().await.pop_front() {
            Some(ScriptedOutcome::Succeed(external_id)) => Ok(PublishReceipt {
                external_id: external_id.to_string(),
                url: None,
            }),
            None => Ok(PublishReceipt {
                external_id: external_id_or_default(self.channel),
                url: None,
            }),
            Some(ScriptedOutcome::FailRemote) => Err(ChannelError::Remote {
                status: 503,
                message: "remote unavailable".to_string(),
            }),
            Some(ScriptedOutcome::FailAuth) => {
                Err(ChannelError::Auth("credential rejected".to_string()))
            }
        }
    }
}

fn external_id_or_default(channel: Channel) -> String {
    format!("ext-{}", channel.as_str())
}

/// Publisher that always fails with a retryable remote error.
pub struct FailingPublisher {
    channel: Channel,
}

#[async_trait]
impl ChannelPublisher for FailingPublisher {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn publish(
        &self,
        _outbound: Outbound<'_>,
        _settings: &serde_json::Value,
    ) -> Result<PublishReceipt, ChannelError> {
        Err(ChannelError::Remote {
            status: 503,
            message: "remote unavailable".to_string(),
        })
    }
}

pub fn registry_of(publishers: Vec<Arc<dyn ChannelPublisher>>) -> ChannelRegistry {
    let mut registry = ChannelRegistry::new();
    for publisher in publishers {
        registry.register(publisher);
    }
    registry
}

// ============ Scheduler ============

/// Scheduler that records scheduled tasks instead of spawning timers, so a
/// test drives each tick by hand.
#[derive(Default)]
pub struct ManualScheduler {
    tasks: std::sync::Mutex<Vec<PeriodicTask>>,
    cancelled: Arc<AtomicUsize>,
}

impl ManualScheduler {
    pub fn scheduled(&self) -> usize {
        self.tasks.lock().expect("tasks lock").len()
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn tick(&self) {
        let task = {
            let tasks = self.tasks.lock().expect("tasks lock");
            tasks.first().cloned()
        };
        if let Some(task) = task {
            task().await;
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_periodic(&self, _interval: Duration, task: PeriodicTask) -> ScheduleHandle {
        self.tasks.lock().expect("tasks lock").push(task);
        let cancelled = Arc::clone(&self.cancelled);
        ScheduleHandle::new(move || {
            cancelled.fetch_add(1, Ordering::SeqCst);
        })
    }
}

// ============ Fixtures ============

pub fn sample_content(id: Uuid, slug: &str) -> ContentItem {
    ContentItem {
        id,
        slug: slug.to_string(),
        title: "Sample Post".to_string(),
        excerpt: "A sample excerpt".to_string(),
        body_markdown: "# Sample\n\nBody.".to_string(),
        external_id: None,
        published_at: Some(OffsetDateTime::now_utc()),
        updated_at: OffsetDateTime::now_utc(),
        deleted_at: None,
    }
}
