use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    models::{ContentItem, RecommendedItem, ScoreDetails, UserInteraction, UserPreferences},
    store::{memory::sample_corpus, ContentStore, SharedStore},
};

use super::{
    candidates::generate_candidates,
    diversity::{select_diverse, DEFAULT_CATEGORY_CAP},
    explain::explanation,
    model::ModelRegistry,
    profile::build_profile,
    ranking::{rank_candidates, RankingContext},
};

/// Recent-window size fed into candidate generation.
const RECENT_CORPUS_WINDOW: i64 = 300;

/// Most recent interactions considered per user.
const INTERACTION_WINDOW: i64 = 1000;

pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 10;

/// The two-stage recommendation pipeline: profile → candidates → ranking
/// → diversity → explanations.
///
/// Stateless between calls; every request reads its own snapshot. The
/// entry point never fails past its boundary: store errors degrade to
/// the fixture corpus, a missing or stale model degrades to the
/// heuristic scorer, and the result is always a (possibly empty) list.
pub struct Recommender {
    store: SharedStore,
    registry: Arc<ModelRegistry>,
}

impl Recommender {
    pub fn new(store: SharedStore, registry: Arc<ModelRegistry>) -> Self {
        Self { store, registry }
    }

    pub async fn recommend(
        &self,
        user_id: &str,
        preferences: &UserPreferences,
        limit: usize,
        verbose: bool,
    ) -> Vec<RecommendedItem> {
        let now = Utc::now();
        tracing::info!(user_id = %user_id, limit, "Generating recommendations");

        // Corpus snapshot, degrading to the fixture corpus on store failure.
        let corpus = match self.store.recent_filtered(RECENT_CORPUS_WINDOW).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "Store unavailable, serving fixture corpus");
                sample_corpus()
            }
        };
        if corpus.is_empty() {
            tracing::warn!(user_id = %user_id, "Empty corpus, nothing to recommend");
            return Vec::new();
        }

        // Interaction history; absence is cold start, not failure.
        let interactions = match self
            .store
            .interactions_for_user(user_id, INTERACTION_WINDOW)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Interaction lookup failed, treating as cold start");
                Vec::new()
            }
        };

        let content_by_id = self.interacted_content(&interactions, &corpus).await;
        let profile = build_profile(&interactions, &content_by_id);
        let interacted: HashSet<Uuid> = interactions.iter().map(|i| i.content_id).collect();

        // Stage 1: candidate generation.
        let candidates = generate_candidates(&corpus, &interacted, &profile, preferences, now);
        tracing::info!(
            user_id = %user_id,
            corpus = corpus.len(),
            candidates = candidates.len(),
            cold_start = profile.is_empty(),
            "Candidate generation complete"
        );
        if candidates.is_empty() {
            return Vec::new();
        }

        // Stage 2: ranking. Readers keep whatever model is currently
        // published; none (or a stale one) means the heuristic scorer.
        let model = self.registry.current_fresh(now).await;
        if model.is_none() {
            tracing::info!(user_id = %user_id, "No fresh ranking model, using heuristic scorer");
        }
        let ctx = RankingContext {
            profile: &profile,
            preferences,
            now,
        };
        let ranked = rank_candidates(candidates, model.as_deref(), &ctx);

        // Diversity-constrained selection, then explanations.
        let selected = select_diverse(ranked, limit, DEFAULT_CATEGORY_CAP);
        let results: Vec<RecommendedItem> = selected
            .into_iter()
            .map(|candidate| {
                let details = ScoreDetails {
                    model_score: candidate.score,
                    component_scores: candidate.components,
                    feature_importance: candidate.importance,
                };
                let reason = explanation(&candidate.item, &details, now);
                RecommendedItem {
                    content: candidate.item,
                    reason,
                    score_details: verbose.then_some(details),
                }
            })
            .collect();

        tracing::info!(user_id = %user_id, returned = results.len(), "Recommendations generated");
        results
    }

    /// Content items behind the user's interactions: served from the
    /// corpus when possible, fetched by id otherwise, skipped when the
    /// store cannot resolve them.
    async fn interacted_content(
        &self,
        interactions: &[UserInteraction],
        corpus: &[ContentItem],
    ) -> HashMap<Uuid, ContentItem> {
        let mut content_by_id: HashMap<Uuid, ContentItem> =
            corpus.iter().map(|c| (c.id, c.clone())).collect();

        let missing: Vec<Uuid> = interactions
            .iter()
            .map(|i| i.content_id)
            .filter(|id| !content_by_id.contains_key(id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if missing.is_empty() {
            return content_by_id;
        }

        match self.store.content_by_ids(&missing).await {
            Ok(items) => {
                for item in items {
                    content_by_id.insert(item.id, item);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not resolve interacted content");
            }
        }
        content_by_id
    }
}
