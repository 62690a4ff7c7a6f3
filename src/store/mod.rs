use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{ContentItem, UserInteraction},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Durable document store for content and interaction history.
///
/// The storage engine itself is an external collaborator; this trait is the
/// full contract the pipeline needs from it: upsert-by-url bulk writes,
/// recency-ordered queries, and single-row verdict updates. Implementations
/// are chosen once at composition time — Postgres in production, the
/// in-memory fixture when the database is unreachable and in tests.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Bulk write, upserting by `url`. Returns the number of rows written.
    async fn upsert_content(&self, items: &[ContentItem]) -> AppResult<usize>;

    /// Most recent items not yet processed by the filter, newest first.
    async fn recent_unfiltered(&self, limit: i64) -> AppResult<Vec<ContentItem>>;

    /// Most recent filter-approved items, newest first. Serves both as the
    /// duplicate-comparison window and as the recommendation corpus.
    async fn recent_filtered(&self, limit: i64) -> AppResult<Vec<ContentItem>>;

    async fn content_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<ContentItem>>;

    /// Removes an item (duplicate or sub-quality verdict).
    async fn delete_content(&self, id: Uuid) -> AppResult<bool>;

    /// Persists a keep verdict: cleaned summary, quality metadata, and the
    /// `filtered` flag in one write.
    async fn apply_filter_verdict(
        &self,
        id: Uuid,
        cleaned_summary: &str,
        quality_score: f64,
        quality_factors: &[String],
    ) -> AppResult<()>;

    async fn insert_interaction(&self, interaction: &UserInteraction) -> AppResult<()>;

    async fn interactions_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> AppResult<Vec<UserInteraction>>;

    /// Recent interactions across all users, for model training.
    async fn recent_interactions(&self, limit: i64) -> AppResult<Vec<UserInteraction>>;
}

pub type SharedStore = Arc<dyn ContentStore>;
