use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{NewScheduledJob, RepoError, ScheduledJobsRepo};
use crate::domain::entities::{BroadcastPayload, ScheduledJob};
use crate::domain::types::JobStatus;

use super::{PostgresRepositories, map_sqlx_error};

const JOB_COLUMNS: &str =
    "id, job_type, payload, run_at, status, attempts, last_error, created_at";

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    job_type: String,
    payload: serde_json::Value,
    run_at: OffsetDateTime,
    status: JobStatus,
    attempts: i32,
    last_error: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<JobRow> for ScheduledJob {
    type Error = RepoError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let payload: BroadcastPayload = serde_json::from_value(row.payload)
            .map_err(|err| RepoError::from_persistence(format!("bad job payload: {err}")))?;

        Ok(Self {
            id: row.id,
            job_type: row.job_type,
            payload,
            run_at: row.run_at,
            status: row.status,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
        })
    }
}

/// RETURNING gives back claimed rows in arbitrary order; re-establish the
/// run_at order the selection promised.
fn restore_run_order(jobs: &mut [ScheduledJob]) {
    jobs.sort_by(|a, b| a.run_at.cmp(&b.run_at));
}

#[async_trait]
impl ScheduledJobsRepo for PostgresRepositories {
    async fn enqueue_job(&self, job: NewScheduledJob) -> Result<ScheduledJob, RepoError> {
        let payload = serde_json::to_value(&job.payload)
            .map_err(|err| RepoError::from_persistence(err.to_string()))?;

        let sql = format!(
            "INSERT INTO scheduled_jobs (job_type, payload, run_at, status) \
             VALUES ($1, $2, $3, 'queued'::job_status) \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(&job.job_type)
            .bind(payload)
            .bind(job.run_at)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        ScheduledJob::try_from(row)
    }

    async fn claim_due_jobs(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, RepoError> {
        // queued -> running happens inside the selection, which keeps the
        // runner safe under horizontal scaling.
        let sql = format!(
            "UPDATE scheduled_jobs \
                SET status = 'running'::job_status \
              WHERE id IN ( \
                    SELECT id FROM scheduled_jobs \
                     WHERE status = 'queued'::job_status AND run_at <= $1 \
                     ORDER BY run_at ASC \
                     FOR UPDATE SKIP LOCKED \
                     LIMIT $2 \
              ) \
             RETURNING {JOB_COLUMNS}"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut jobs = rows
            .into_iter()
            .map(ScheduledJob::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        restore_run_order(&mut jobs);
        Ok(jobs)
    }

    async fn mark_job_success(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE scheduled_jobs SET status = 'success'::job_status \
              WHERE id = $1 AND status = 'running'::job_status",
        )
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn mark_job_failed(
        &self,
        id: Uuid,
        attempts: i32,
        error: &str,
    ) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE scheduled_jobs \
                SET status = 'failed'::job_status, attempts = $2, last_error = $3 \
              WHERE id = $1 AND status = 'running'::job_status",
        )
        .bind(id)
        .bind(attempts)
        .bind(error)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn reschedule_job(
        &self,
        id: Uuid,
        attempts: i32,
        run_at: OffsetDateTime,
        error: &str,
    ) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE scheduled_jobs \
                SET status = 'queued'::job_status, attempts = $2, run_at = $3, last_error = $4 \
              WHERE id = $1 AND status = 'running'::job_status",
        )
        .bind(id)
        .bind(attempts)
        .bind(run_at)
        .bind(error)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
