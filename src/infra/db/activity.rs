use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{ActivityRepo, NewActivityRecord, RepoError};
use crate::domain::entities::ActivityRecord;
use crate::domain::types::{ActivityKind, Channel};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: Uuid,
    kind: String,
    channel: String,
    external_id: Option<String>,
    metadata: serde_json::Value,
    created_at: OffsetDateTime,
}

impl TryFrom<ActivityRow> for ActivityRecord {
    type Error = RepoError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let kind = ActivityKind::try_from(row.kind.as_str()).map_err(|_| {
            RepoError::from_persistence(format!("unknown activity kind `{}`", row.kind))
        })?;
        let channel = Channel::try_from(row.channel.as_str()).map_err(|_| {
            RepoError::from_persistence(format!("unknown channel `{}`", row.channel))
        })?;

        Ok(Self {
            id: row.id,
            kind,
            channel,
            external_id: row.external_id,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl ActivityRepo for PostgresRepositories {
    async fn append(&self, record: NewActivityRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO activity_log (kind, channel, external_id, metadata) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(record.kind.as_str())
        .bind(record.channel.as_str())
        .bind(record.external_id)
        .bind(record.metadata)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<ActivityRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT id, kind, channel, external_id, metadata, created_at \
               FROM activity_log ORDER BY created_at DESC LIMIT $1",
        )
        .bind(i64::from(limit.clamp(1, 200)))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ActivityRecord::try_from).collect()
    }
}
