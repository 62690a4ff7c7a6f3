use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{ContentItem, InteractionKind, UserInteraction},
};

use super::ContentStore;

/// Postgres-backed store.
///
/// Queries use the runtime API rather than compile-time checked macros so
/// the crate builds without a live database.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects with a short acquire timeout so an unreachable database
    /// fails fast and the composition root can fall back to the fixture
    /// store.
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content_items (
                id UUID PRIMARY KEY,
                url TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                source TEXT NOT NULL,
                content_summary TEXT NOT NULL,
                ts TIMESTAMPTZ NOT NULL,
                category TEXT NOT NULL,
                author TEXT,
                image_url TEXT,
                upvotes BIGINT NOT NULL DEFAULT 0,
                downvotes BIGINT NOT NULL DEFAULT 0,
                comment_count BIGINT NOT NULL DEFAULT 0,
                engagement_score DOUBLE PRECISION NOT NULL DEFAULT 0,
                quality_score DOUBLE PRECISION,
                quality_factors TEXT[] NOT NULL DEFAULT '{}',
                filtered BOOLEAN NOT NULL DEFAULT FALSE,
                filter_reason TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_interactions (
                id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                content_id UUID NOT NULL,
                interaction_type TEXT NOT NULL,
                rating SMALLINT,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_interactions_user \
             ON user_interactions (user_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn item_from_row(row: &sqlx::postgres::PgRow) -> AppResult<ContentItem> {
        Ok(ContentItem {
            id: row.try_get("id")?,
            url: row.try_get("url")?,
            title: row.try_get("title")?,
            source: row.try_get("source")?,
            content_summary: row.try_get("content_summary")?,
            timestamp: row.try_get::<DateTime<Utc>, _>("ts")?,
            category: row.try_get("category")?,
            author: row.try_get("author")?,
            image_url: row.try_get("image_url")?,
            upvotes: row.try_get("upvotes")?,
            downvotes: row.try_get("downvotes")?,
            comment_count: row.try_get("comment_count")?,
            engagement_score: row.try_get("engagement_score")?,
            quality_score: row.try_get("quality_score")?,
            quality_factors: row.try_get("quality_factors")?,
            filtered: row.try_get("filtered")?,
            filter_reason: row.try_get("filter_reason")?,
        })
    }

    fn interaction_from_row(row: &sqlx::postgres::PgRow) -> AppResult<UserInteraction> {
        let kind: String = row.try_get("interaction_type")?;
        let interaction_type = kind
            .parse::<InteractionKind>()
            .map_err(AppError::Internal)?;
        let rating: Option<i16> = row.try_get("rating")?;

        Ok(UserInteraction {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            content_id: row.try_get("content_id")?,
            interaction_type,
            rating: rating.map(|r| r as i8),
            created_at: row.try_get("created_at")?,
        })
    }

    const SELECT_ITEM: &'static str = "SELECT id, url, title, source, content_summary, ts, \
         category, author, image_url, upvotes, downvotes, comment_count, engagement_score, \
         quality_score, quality_factors, filtered, filter_reason FROM content_items";
}

#[async_trait]
impl ContentStore for PgStore {
    async fn upsert_content(&self, items: &[ContentItem]) -> AppResult<usize> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            // Engagement counters refresh on conflict; filter verdict fields
            // are left untouched so re-ingestion cannot unfilter an item.
            sqlx::query(
                r#"
                INSERT INTO content_items
                    (id, url, title, source, content_summary, ts, category, author,
                     image_url, upvotes, downvotes, comment_count, engagement_score,
                     quality_score, quality_factors, filtered, filter_reason)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                        $14, $15, $16, $17)
                ON CONFLICT (url) DO UPDATE SET
                    upvotes = EXCLUDED.upvotes,
                    downvotes = EXCLUDED.downvotes,
                    comment_count = EXCLUDED.comment_count,
                    engagement_score = EXCLUDED.engagement_score
                "#,
            )
            .bind(item.id)
            .bind(&item.url)
            .bind(&item.title)
            .bind(&item.source)
            .bind(&item.content_summary)
            .bind(item.timestamp)
            .bind(&item.category)
            .bind(&item.author)
            .bind(&item.image_url)
            .bind(item.upvotes)
            .bind(item.downvotes)
            .bind(item.comment_count)
            .bind(item.engagement_score)
            .bind(item.quality_score)
            .bind(&item.quality_factors)
            .bind(item.filtered)
            .bind(&item.filter_reason)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(items.len())
    }

    async fn recent_unfiltered(&self, limit: i64) -> AppResult<Vec<ContentItem>> {
        let sql = format!(
            "{} WHERE filtered = FALSE ORDER BY ts DESC LIMIT $1",
            Self::SELECT_ITEM
        );
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(Self::item_from_row).collect()
    }

    async fn recent_filtered(&self, limit: i64) -> AppResult<Vec<ContentItem>> {
        let sql = format!(
            "{} WHERE filtered = TRUE ORDER BY ts DESC LIMIT $1",
            Self::SELECT_ITEM
        );
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(Self::item_from_row).collect()
    }

    async fn content_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<ContentItem>> {
        let sql = format!("{} WHERE id = ANY($1)", Self::SELECT_ITEM);
        let rows = sqlx::query(&sql).bind(ids).fetch_all(&self.pool).await?;
        rows.iter().map(Self::item_from_row).collect()
    }

    async fn delete_content(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM content_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_filter_verdict(
        &self,
        id: Uuid,
        cleaned_summary: &str,
        quality_score: f64,
        quality_factors: &[String],
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE content_items SET content_summary = $2, quality_score = $3, \
             quality_factors = $4, filtered = TRUE, filter_reason = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(cleaned_summary)
        .bind(quality_score)
        .bind(quality_factors)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_interaction(&self, interaction: &UserInteraction) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO user_interactions (id, user_id, content_id, interaction_type, \
             rating, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(interaction.id)
        .bind(&interaction.user_id)
        .bind(interaction.content_id)
        .bind(interaction.interaction_type.as_str())
        .bind(interaction.rating.map(|r| r as i16))
        .bind(interaction.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn interactions_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> AppResult<Vec<UserInteraction>> {
        let rows = sqlx::query(
            "SELECT id, user_id, content_id, interaction_type, rating, created_at \
             FROM user_interactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::interaction_from_row).collect()
    }

    async fn recent_interactions(&self, limit: i64) -> AppResult<Vec<UserInteraction>> {
        let rows = sqlx::query(
            "SELECT id, user_id, content_id, interaction_type, rating, created_at \
             FROM user_interactions ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::interaction_from_row).collect()
    }
}
