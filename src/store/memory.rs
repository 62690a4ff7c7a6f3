use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{ContentItem, UserInteraction},
};

use super::ContentStore;

/// In-memory store used as the fixture data provider.
///
/// Selected at composition time when Postgres is unreachable, and used
/// directly by tests. Behavior mirrors the Postgres implementation closely
/// enough that pipeline code cannot tell them apart.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    content: HashMap<Uuid, ContentItem>,
    interactions: Vec<UserInteraction>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with the fixture corpus.
    pub async fn with_sample_data() -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write().await;
            for item in sample_corpus() {
                inner.content.insert(item.id, item);
            }
        }
        store
    }

    /// Inserts items keyed by id without upsert-by-url semantics.
    ///
    /// Tests use this to construct states the write path would normally
    /// prevent, such as two rows sharing a URL.
    pub async fn seed_content(&self, items: Vec<ContentItem>) {
        let mut inner = self.inner.write().await;
        for item in items {
            inner.content.insert(item.id, item);
        }
    }

    pub async fn content_count(&self) -> usize {
        self.inner.read().await.content.len()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn upsert_content(&self, items: &[ContentItem]) -> AppResult<usize> {
        let mut inner = self.inner.write().await;
        for item in items {
            let existing_id = inner
                .content
                .values()
                .find(|c| c.url == item.url)
                .map(|c| c.id);

            match existing_id {
                Some(id) => {
                    // Keep identity and any existing filter verdict; refresh
                    // the producer-supplied engagement counters.
                    let entry = inner.content.get_mut(&id).expect("id just looked up");
                    entry.upvotes = item.upvotes;
                    entry.downvotes = item.downvotes;
                    entry.comment_count = item.comment_count;
                    entry.engagement_score = item.engagement_score;
                }
                None => {
                    inner.content.insert(item.id, item.clone());
                }
            }
        }
        Ok(items.len())
    }

    async fn recent_unfiltered(&self, limit: i64) -> AppResult<Vec<ContentItem>> {
        let inner = self.inner.read().await;
        let mut items: Vec<ContentItem> = inner
            .content
            .values()
            .filter(|c| !c.filtered)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn recent_filtered(&self, limit: i64) -> AppResult<Vec<ContentItem>> {
        let inner = self.inner.read().await;
        let mut items: Vec<ContentItem> = inner
            .content
            .values()
            .filter(|c| c.filtered)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn content_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<ContentItem>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.content.get(id).cloned())
            .collect())
    }

    async fn delete_content(&self, id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.content.remove(&id).is_some())
    }

    async fn apply_filter_verdict(
        &self,
        id: Uuid,
        cleaned_summary: &str,
        quality_score: f64,
        quality_factors: &[String],
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(item) = inner.content.get_mut(&id) {
            item.content_summary = cleaned_summary.to_string();
            item.quality_score = Some(quality_score);
            item.quality_factors = quality_factors.to_vec();
            item.filtered = true;
            item.filter_reason = None;
        }
        Ok(())
    }

    async fn insert_interaction(&self, interaction: &UserInteraction) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.interactions.push(interaction.clone());
        Ok(())
    }

    async fn interactions_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> AppResult<Vec<UserInteraction>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<UserInteraction> = inner
            .interactions
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn recent_interactions(&self, limit: i64) -> AppResult<Vec<UserInteraction>> {
        let inner = self.inner.read().await;
        let mut rows = inner.interactions.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}

/// Fixture corpus used when no durable store is reachable.
///
/// All items are pre-filtered so they are immediately eligible as
/// recommendation candidates.
pub fn sample_corpus() -> Vec<ContentItem> {
    let now = Utc::now();
    let entries: [(&str, &str, &str, &str, &str, i64, i64, i64, f64, i64); 5] = [
        (
            "https://fixture.local/tech/ai-chips",
            "Chipmakers race to ship next-generation AI accelerators",
            "TechCrunch",
            "Tech",
            "Several manufacturers announced accelerator lines aimed at inference \
             workloads, promising better performance per watt. Analysts expect cloud \
             providers to begin deployments before the end of the year.",
            45,
            5,
            12,
            120.0,
            2,
        ),
        (
            "https://fixture.local/business/markets",
            "Markets steady as quarterly earnings beat forecasts",
            "Financial Times",
            "Business",
            "Equities held their ground after a week of stronger-than-expected \
             earnings reports. Analysts predict continued growth in the technology \
             and healthcare sectors over the next quarter.",
            28,
            3,
            8,
            85.0,
            5,
        ),
        (
            "https://fixture.local/sports/final",
            "Underdogs complete comeback in championship final",
            "Sports Network",
            "Sports",
            "The championship game turned into a thriller as the visiting side \
             erased a twenty-point deficit and won in the final seconds. Supporters \
             filled the streets well into the night.",
            67,
            9,
            25,
            210.0,
            8,
        ),
        (
            "https://fixture.local/health/trial",
            "Early trial results promising for autoimmune treatment",
            "Health Journal",
            "Health",
            "Researchers reported encouraging results from a mid-stage trial of a \
             new therapy for autoimmune conditions, with a safety profile the team \
             described as manageable. Larger trials are planned.",
            52,
            2,
            15,
            140.0,
            12,
        ),
        (
            "https://fixture.local/entertainment/festival",
            "Independent films sweep festival awards",
            "Entertainment Weekly",
            "Entertainment",
            "The annual film festival concluded with independent productions taking \
             most major categories, a shift festival organizers attributed to a \
             strong year for first-time directors.",
            37,
            6,
            10,
            95.0,
            18,
        ),
    ];

    entries
        .into_iter()
        .map(
            |(url, title, source, category, summary, up, down, comments, engagement, age)| {
                ContentItem {
                    id: Uuid::new_v4(),
                    url: url.to_string(),
                    title: title.to_string(),
                    source: source.to_string(),
                    content_summary: summary.to_string(),
                    timestamp: now - Duration::hours(age),
                    category: category.to_string(),
                    author: None,
                    image_url: None,
                    upvotes: up,
                    downvotes: down,
                    comment_count: comments,
                    engagement_score: engagement,
                    quality_score: Some(0.7),
                    quality_factors: vec!["Fixture corpus".to_string()],
                    filtered: true,
                    filter_reason: None,
                }
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::item;
    use crate::models::InteractionKind;

    #[tokio::test]
    async fn test_upsert_is_keyed_by_url() {
        let store = MemoryStore::new();
        let first = item("http://a.com/1", "First", "Tech", 1);
        store.upsert_content(&[first.clone()]).await.unwrap();

        let mut second = item("http://a.com/1", "First again", "Tech", 1);
        second.upvotes = 99;
        store.upsert_content(&[second]).await.unwrap();

        assert_eq!(store.content_count().await, 1);
        let stored = store.content_by_ids(&[first.id]).await.unwrap();
        assert_eq!(stored[0].upvotes, 99);
    }

    #[tokio::test]
    async fn test_recent_queries_split_on_filtered_flag() {
        let store = MemoryStore::new();
        let mut kept = item("http://a.com/kept", "Kept", "Tech", 1);
        kept.filtered = true;
        let fresh = item("http://a.com/fresh", "Fresh", "Tech", 2);
        store.seed_content(vec![kept, fresh]).await;

        assert_eq!(store.recent_unfiltered(10).await.unwrap().len(), 1);
        assert_eq!(store.recent_filtered(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_verdict_marks_item_filtered() {
        let store = MemoryStore::new();
        let target = item("http://a.com/v", "Verdict", "Tech", 1);
        let id = target.id;
        store.seed_content(vec![target]).await;

        store
            .apply_filter_verdict(id, "cleaned summary text", 0.8, &["ok".to_string()])
            .await
            .unwrap();

        let stored = store.content_by_ids(&[id]).await.unwrap();
        assert!(stored[0].filtered);
        assert_eq!(stored[0].quality_score, Some(0.8));
        assert_eq!(stored[0].content_summary, "cleaned summary text");
    }

    #[tokio::test]
    async fn test_interactions_filtered_by_user() {
        let store = MemoryStore::new();
        for (user, n) in [("alice", 3i64), ("bob", 2)] {
            for i in 0..n {
                store
                    .insert_interaction(&UserInteraction {
                        id: Uuid::new_v4(),
                        user_id: user.to_string(),
                        content_id: Uuid::new_v4(),
                        interaction_type: InteractionKind::View,
                        rating: None,
                        created_at: Utc::now() - Duration::minutes(i),
                    })
                    .await
                    .unwrap();
            }
        }

        assert_eq!(store.interactions_for_user("alice", 10).await.unwrap().len(), 3);
        assert_eq!(store.interactions_for_user("bob", 10).await.unwrap().len(), 2);
        assert_eq!(store.recent_interactions(10).await.unwrap().len(), 5);
    }

    #[test]
    fn test_sample_corpus_is_prefiltered() {
        let corpus = sample_corpus();
        assert_eq!(corpus.len(), 5);
        assert!(corpus.iter().all(|c| c.filtered));
    }
}
