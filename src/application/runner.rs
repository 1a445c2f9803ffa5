//! Cron-triggered social broadcast runner.
//!
//! Stateless between invocations: each external trigger claims one batch of
//! due jobs, dispatches it, and returns. Retry growth here is the only place
//! gated by real elapsed-time backoff.

use std::sync::Arc;

use metrics::{counter, histogram};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::backoff;
use crate::application::channels::{ChannelRegistry, Outbound};
use crate::application::repos::{
    ActivityRepo, NewActivityRecord, RepoError, ScheduledJobsRepo,
};
use crate::domain::entities::ScheduledJob;
use crate::domain::types::ActivityKind;

pub const JOB_BATCH_SIZE: u32 = 10;
pub const MAX_JOB_ATTEMPTS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobOutcomeStatus {
    Success,
    Failed,
    Rescheduled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub status: JobOutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<OffsetDateTime>,
}

pub struct BroadcastRunner {
    jobs: Arc<dyn ScheduledJobsRepo>,
    activity: Arc<dyn ActivityRepo>,
    registry: ChannelRegistry,
}

impl BroadcastRunner {
    pub fn new(
        jobs: Arc<dyn ScheduledJobsRepo>,
        activity: Arc<dyn ActivityRepo>,
        registry: ChannelRegistry,
    ) -> Self {
        Self {
            jobs,
            activity,
            registry,
        }
    }

    /// Claim and execute one batch of due jobs. A single bad job never
    /// blocks the rest of the batch.
    pub async fn run_due(&self, now: OffsetDateTime) -> Result<Vec<JobOutcome>, RepoError> {
        let started = std::time::Instant::now();
        let jobs = self.jobs.claim_due_jobs(now, JOB_BATCH_SIZE).await?;

        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            outcomes.push(self.run_job(job, now).await?);
        }

        histogram!("diramo_cron_batch_ms").record(started.elapsed().as_millis() as f64);
        Ok(outcomes)
    }

    async fn run_job(&self, job: ScheduledJob, now: OffsetDateTime) -> Result<JobOutcome, RepoError> {
        let mut succeeded = 0usize;
        let mut errors: Vec<String> = Vec::new();

        // Channels are delivered sequentially so partial-failure bookkeeping
        // stays simple and a single remote host is never hit concurrently.
        for channel in &job.payload.channels {
            let Some(publisher) = self.registry.get(*channel) else {
                errors.push(format!("{}: no publisher registered", channel.as_str()));
                continue;
            };

            let outbound = Outbound::Message {
                text: &job.payload.message,
                media_url: job.payload.media_url.as_deref(),
            };
            match publisher.publish(outbound, &serde_json::Value::Null).await {
                Ok(receipt) => {
                    succeeded += 1;
                    counter!("diramo_broadcast_success_total", "channel" => channel.as_str())
                        .increment(1);
                    self.record_broadcast(&job, *channel, &receipt.external_id)
                        .await;
                }
                Err(err) => {
                    counter!("diramo_broadcast_failure_total", "channel" => channel.as_str())
                        .increment(1);
                    warn!(
                        target = "application::runner",
                        channel = channel.as_str(),
                        job_id = %job.id,
                        error = %err,
                        "broadcast channel failed"
                    );
                    errors.push(format!("{}: {err}", channel.as_str()));
                }
            }
        }

        if succeeded > 0 {
            self.jobs.mark_job_success(job.id).await?;
            info!(
                target = "application::runner",
                job_id = %job.id,
                succeeded,
                "broadcast job succeeded"
            );
            return Ok(JobOutcome {
                job_id: job.id,
                status: JobOutcomeStatus::Success,
                next_run: None,
            });
        }

        let error_text = if errors.is_empty() {
            "payload lists no channels".to_string()
        } else {
            errors.join("; ")
        };
        let attempts = job.attempts + 1;

        if attempts >= MAX_JOB_ATTEMPTS {
            self.jobs
                .mark_job_failed(job.id, attempts, &error_text)
                .await?;
            error!(
                target = "application::runner",
                job_id = %job.id,
                attempts,
                "broadcast job failed permanently"
            );
            return Ok(JobOutcome {
                job_id: job.id,
                status: JobOutcomeStatus::Failed,
                next_run: None,
            });
        }

        let next_run = now + backoff::delay(attempts as u32);
        self.jobs
            .reschedule_job(job.id, attempts, next_run, &error_text)
            .await?;
        info!(
            target = "application::runner",
            job_id = %job.id,
            attempts,
            next_run = %next_run,
            "broadcast job rescheduled"
        );
        Ok(JobOutcome {
            job_id: job.id,
            status: JobOutcomeStatus::Rescheduled,
            next_run: Some(next_run),
        })
    }

    async fn record_broadcast(&self, job: &ScheduledJob, channel: crate::domain::types::Channel, external_id: &str) {
        let activity = NewActivityRecord {
            kind: ActivityKind::BroadcastSent,
            channel,
            external_id: Some(external_id.to_string()),
            metadata: serde_json::json!({ "job_id": job.id }),
        };
        if let Err(err) = self.activity.append(activity).await {
            error!(
                target = "application::runner",
                error = %err,
                "failed to append activity record"
            );
        }
    }
}
