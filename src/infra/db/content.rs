use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{ContentRepo, RemoteContentUpdate, RepoError};
use crate::domain::entities::ContentItem;

use super::{PostgresRepositories, map_sqlx_error};

const CONTENT_COLUMNS: &str = "id, slug, title, excerpt, body_markdown, \
     external_id, published_at, updated_at, deleted_at";

#[derive(sqlx::FromRow)]
struct ContentRow {
    id: Uuid,
    slug: String,
    title: String,
    excerpt: String,
    body_markdown: String,
    external_id: Option<String>,
    published_at: Option<OffsetDateTime>,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl From<ContentRow> for ContentItem {
    fn from(row: ContentRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            title: row.title,
            excerpt: row.excerpt,
            body_markdown: row.body_markdown,
            external_id: row.external_id,
            published_at: row.published_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[async_trait]
impl ContentRepo for PostgresRepositories {
    async fn find_content(&self, id: Uuid) -> Result<Option<ContentItem>, RepoError> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM posts WHERE id = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, ContentRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(ContentItem::from))
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ContentItem>, RepoError> {
        let sql = format!("SELECT {CONTENT_COLUMNS} FROM posts WHERE external_id = $1");
        let row = sqlx::query_as::<_, ContentRow>(&sql)
            .bind(external_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(ContentItem::from))
    }

    async fn set_external_id(&self, id: Uuid, external_id: &str) -> Result<(), RepoError> {
        sqlx::query("UPDATE posts SET external_id = $2 WHERE id = $1 AND external_id IS NULL")
            .bind(id)
            .bind(external_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn apply_remote_update(&self, update: &RemoteContentUpdate) -> Result<(), RepoError> {
        // The IS DISTINCT FROM guard makes redelivery of the same event a
        // true no-op: an unchanged row keeps its updated_at.
        sqlx::query(
            "UPDATE posts \
                SET slug = $2, \
                    title = $3, \
                    published_at = COALESCE($4, published_at), \
                    updated_at = $5 \
              WHERE external_id = $1 \
                AND (slug IS DISTINCT FROM $2 \
                     OR title IS DISTINCT FROM $3 \
                     OR ($4 IS NOT NULL AND published_at IS DISTINCT FROM $4))",
        )
        .bind(&update.external_id)
        .bind(&update.slug)
        .bind(&update.title)
        .bind(update.published_at)
        .bind(update.occurred_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn apply_remote_delete(&self, external_id: &str) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE posts SET deleted_at = COALESCE(deleted_at, now()) WHERE external_id = $1",
        )
        .bind(external_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
