use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    NewQueueRecord, QueueFilter, QueueRepo, QueueStats, RepoError,
};
use crate::domain::entities::{ChannelTarget, QueueRecord};
use crate::domain::types::{DispatchStatus, Priority};

use super::{PostgresRepositories, map_sqlx_error};

const QUEUE_COLUMNS: &str = "id, content_id, channels, status, priority, \
     scheduled_for, retry_count, max_retries, last_error, created_at";

#[derive(sqlx::FromRow)]
struct QueueRow {
    id: Uuid,
    content_id: Uuid,
    channels: serde_json::Value,
    status: DispatchStatus,
    priority: Priority,
    scheduled_for: Option<OffsetDateTime>,
    retry_count: i32,
    max_retries: i32,
    last_error: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<QueueRow> for QueueRecord {
    type Error = RepoError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        let channels: Vec<ChannelTarget> = serde_json::from_value(row.channels)
            .map_err(|err| RepoError::from_persistence(format!("bad channel set: {err}")))?;

        Ok(Self {
            id: row.id,
            content_id: row.content_id,
            channels,
            status: row.status,
            priority: row.priority,
            scheduled_for: row.scheduled_for,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            last_error: row.last_error,
            created_at: row.created_at,
        })
    }
}

/// `UPDATE ... RETURNING` emits rows in no defined order, so the claim
/// subquery's ordering must be restored before the batch is dispatched.
fn restore_claim_order(records: &mut [QueueRecord]) {
    records.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.scheduled_for.cmp(&b.scheduled_for))
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

#[async_trait]
impl QueueRepo for PostgresRepositories {
    async fn enqueue(&self, record: NewQueueRecord) -> Result<QueueRecord, RepoError> {
        let channels = serde_json::to_value(&record.channels)
            .map_err(|err| RepoError::from_persistence(err.to_string()))?;

        let sql = format!(
            "INSERT INTO distribution_queue \
                 (content_id, channels, status, priority, scheduled_for, max_retries) \
             VALUES ($1, $2, 'pending'::dispatch_status, $3, $4, $5) \
             RETURNING {QUEUE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, QueueRow>(&sql)
            .bind(record.content_id)
            .bind(channels)
            .bind(record.priority)
            .bind(record.scheduled_for)
            .bind(record.max_retries)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        QueueRecord::try_from(row)
    }

    async fn claim_due(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<QueueRecord>, RepoError> {
        // Claim is one conditional update so concurrent processor instances
        // never select the same record.
        let sql = format!(
            "UPDATE distribution_queue \
                SET status = 'processing'::dispatch_status, claimed_at = $1 \
              WHERE id IN ( \
                    SELECT id FROM distribution_queue \
                     WHERE status = 'pending'::dispatch_status \
                       AND (scheduled_for IS NULL OR scheduled_for <= $1) \
                     ORDER BY priority DESC, \
                              scheduled_for ASC NULLS FIRST, \
                              created_at ASC \
                     FOR UPDATE SKIP LOCKED \
                     LIMIT $2 \
              ) \
             RETURNING {QUEUE_COLUMNS}"
        );
        let rows = sqlx::query_as::<_, QueueRow>(&sql)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut records = rows
            .into_iter()
            .map(QueueRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        restore_claim_order(&mut records);
        Ok(records)
    }

    async fn mark_completed(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE distribution_queue \
                SET status = 'completed'::dispatch_status, claimed_at = NULL \
              WHERE id = $1 AND status = 'processing'::dispatch_status",
        )
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn mark_retry(&self, id: Uuid, error: &str) -> Result<QueueRecord, RepoError> {
        // Terminality and the retry ceiling live in one statement so a crash
        // between read and write cannot overshoot max_retries.
        let sql = format!(
            "UPDATE distribution_queue \
                SET retry_count = retry_count + 1, \
                    last_error = $2, \
                    claimed_at = NULL, \
                    status = CASE WHEN retry_count + 1 >= max_retries \
                                  THEN 'failed'::dispatch_status \
                                  ELSE 'pending'::dispatch_status END \
              WHERE id = $1 AND status = 'processing'::dispatch_status \
             RETURNING {QUEUE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, QueueRow>(&sql)
            .bind(id)
            .bind(error)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        QueueRecord::try_from(row)
    }

    async fn release_stale(&self, stale_before: OffsetDateTime) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "UPDATE distribution_queue \
                SET status = 'pending'::dispatch_status, claimed_at = NULL \
              WHERE status = 'processing'::dispatch_status AND claimed_at < $1",
        )
        .bind(stale_before)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn list(&self, filter: &QueueFilter, limit: u32) -> Result<Vec<QueueRecord>, RepoError> {
        let limit = limit.clamp(1, 100);
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {QUEUE_COLUMNS} FROM distribution_queue WHERE 1=1"));

        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status);
        }
        if let Some(priority) = filter.priority {
            qb.push(" AND priority = ");
            qb.push_bind(priority);
        }

        qb.push(" ORDER BY priority DESC, scheduled_for ASC NULLS FIRST, created_at ASC LIMIT ");
        qb.push_bind(i64::from(limit));

        let rows = qb
            .build_query_as::<QueueRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(QueueRecord::try_from).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM distribution_queue WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<QueueStats, RepoError> {
        let rows = sqlx::query(
            "SELECT status::text AS status, COUNT(*) AS count \
               FROM distribution_queue GROUP BY status",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(map_sqlx_error)?;
            let count: i64 = row.try_get("count").map_err(map_sqlx_error)?;
            let count = count as u64;
            match DispatchStatus::try_from(status.as_str()) {
                Ok(DispatchStatus::Pending) => stats.pending = count,
                Ok(DispatchStatus::Processing) => stats.processing = count,
                Ok(DispatchStatus::Completed) => stats.completed = count,
                Ok(DispatchStatus::Failed) => stats.failed = count,
                Err(()) => {
                    return Err(RepoError::from_persistence(format!(
                        "unknown dispatch status `{status}`"
                    )));
                }
            }
        }
        Ok(stats)
    }
}
