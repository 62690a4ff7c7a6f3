use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{ComponentScores, ContentItem, UserPreferences};

use super::{model::TrainedModel, profile::AffinityProfile};

/// Feature schema, in vector order. Training and inference both go
/// through [`feature_vector`], so the two can never drift apart.
pub const FEATURE_NAMES: [&str; 14] = [
    "category_encoded",
    "source_encoded",
    "age_hours",
    "title_length",
    "content_length",
    "has_image",
    "total_votes",
    "vote_ratio",
    "comment_count",
    "engagement_score",
    "user_category_pref",
    "user_source_pref",
    "recency_decay",
    "keyword_overlap",
];

/// Decay constant for the recency *feature*.
pub const FEATURE_RECENCY_K: f64 = 0.01;

/// Decay constant for the recency *explanation component*. Steeper than
/// the feature decay so the phrasing favors genuinely fresh items.
pub const COMPONENT_RECENCY_K: f64 = 0.03;

/// Explanation group a feature's importance contributes to; features
/// outside the four narratable groups return `None`.
pub fn group_for_feature(name: &str) -> Option<&'static str> {
    match name {
        "category_encoded" | "user_category_pref" => Some("category_match"),
        "age_hours" | "recency_decay" => Some("recency"),
        "vote_ratio" | "total_votes" => Some("popularity"),
        "comment_count" | "engagement_score" => Some("engagement"),
        _ => None,
    }
}

/// Per-request ranking inputs shared across candidates.
#[derive(Clone, Copy)]
pub struct RankingContext<'a> {
    pub profile: &'a AffinityProfile,
    pub preferences: &'a UserPreferences,
    pub now: DateTime<Utc>,
}

impl<'a> RankingContext<'a> {
    /// Signed category preference in [-1, 1]: interaction-derived when
    /// evidence exists, else the caller's explicit weight rescaled.
    pub fn category_preference(&self, category: &str) -> f64 {
        let signal = self.profile.category_signal(category);
        if signal != 0.0 {
            signal
        } else {
            self.preferences.category_weight(category) / 100.0
        }
    }

    pub fn source_preference(&self, source: &str) -> f64 {
        self.profile.source_signal(source)
    }
}

/// The numeric (non-categorical) feature tail, aligned with
/// `FEATURE_NAMES[2..]`.
pub fn numeric_features(item: &ContentItem, ctx: &RankingContext<'_>) -> [f64; 12] {
    let age_hours = item.age_hours(ctx.now);
    [
        age_hours,
        item.title.chars().count() as f64,
        item.content_summary.chars().count() as f64,
        if item.image_url.is_some() { 1.0 } else { 0.0 },
        item.total_votes() as f64,
        item.vote_ratio(),
        item.comment_count as f64,
        item.effective_engagement(),
        ctx.category_preference(&item.category),
        ctx.source_preference(&item.source),
        (-FEATURE_RECENCY_K * age_hours).exp(),
        ctx.profile.keyword_overlap(&item.combined_text()),
    ]
}

/// Full feature vector in `FEATURE_NAMES` order, with the categorical
/// codes already encoded by the model's label encoders.
pub fn feature_vector(
    item: &ContentItem,
    ctx: &RankingContext<'_>,
    category_code: f64,
    source_code: f64,
) -> Vec<f64> {
    let mut features = Vec::with_capacity(FEATURE_NAMES.len());
    features.push(category_code);
    features.push(source_code);
    features.extend(numeric_features(item, ctx));
    features
}

/// Explanation components, computed independently of the ranking model
/// and never fed back into it.
pub fn component_scores(item: &ContentItem, ctx: &RankingContext<'_>) -> ComponentScores {
    let age_hours = item.age_hours(ctx.now);
    ComponentScores {
        category_match: ctx.category_preference(&item.category).clamp(0.0, 1.0),
        recency: (-COMPONENT_RECENCY_K * age_hours).exp(),
        popularity: item.vote_ratio() * (item.total_votes() as f64 / 20.0).min(1.0),
        engagement: (item.comment_count as f64 / 20.0).min(1.0),
    }
}

/// Deterministic linear fallback scorer, substituted transparently when
/// no trained model is available.
pub fn heuristic_score(item: &ContentItem, ctx: &RankingContext<'_>) -> f64 {
    let components = component_scores(item, ctx);
    let source = ctx.source_preference(&item.source).clamp(0.0, 1.0);
    let score = 0.35 * components.category_match
        + 0.25 * components.recency
        + 0.20 * components.popularity
        + 0.10 * components.engagement
        + 0.10 * source;
    score.clamp(0.0, 1.0)
}

/// A candidate with its ranking score and explanation inputs.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub item: ContentItem,
    pub score: f64,
    pub components: ComponentScores,
    pub importance: HashMap<String, f64>,
}

/// Stage 2 of the pipeline: scores every candidate with the trained model
/// (or the heuristic fallback) and returns them highest first.
pub fn rank_candidates(
    candidates: Vec<ContentItem>,
    model: Option<&TrainedModel>,
    ctx: &RankingContext<'_>,
) -> Vec<ScoredCandidate> {
    let model_importance = model.map(|m| m.group_importance());

    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|item| {
            let score = match model {
                Some(model) => model.score(&item, ctx),
                None => heuristic_score(&item, ctx),
            };
            let components = component_scores(&item, ctx);
            let importance = model_importance
                .clone()
                .unwrap_or_else(|| components.as_importance());
            ScoredCandidate {
                item,
                score,
                components,
                importance,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::item;
    use crate::services::profile::AffinityProfile;

    fn empty_ctx() -> (AffinityProfile, UserPreferences) {
        (AffinityProfile::default(), UserPreferences::default())
    }

    #[test]
    fn test_feature_vector_matches_schema_length() {
        let content = item("http://a/1", "A title", "Tech", 5);
        let (profile, prefs) = empty_ctx();
        let ctx = RankingContext {
            profile: &profile,
            preferences: &prefs,
            now: Utc::now(),
        };
        let features = feature_vector(&content, &ctx, 1.0, 2.0);
        assert_eq!(features.len(), FEATURE_NAMES.len());
        assert_eq!(features[0], 1.0);
        assert_eq!(features[1], 2.0);
    }

    #[test]
    fn test_recency_score_is_monotonic_in_age() {
        let (profile, prefs) = empty_ctx();
        let now = Utc::now();
        let ctx = RankingContext {
            profile: &profile,
            preferences: &prefs,
            now,
        };
        let newer = component_scores(&item("http://a/1", "t", "Tech", 1), &ctx);
        let older = component_scores(&item("http://a/2", "t", "Tech", 30), &ctx);
        assert!(newer.recency >= older.recency);
        assert!(newer.recency > older.recency, "strict for distinct ages");
    }

    #[test]
    fn test_category_preference_falls_back_to_explicit_weights() {
        let profile = AffinityProfile::default();
        let prefs: UserPreferences =
            serde_json::from_str(r#"{"weights":{"Tech":90},"rating_weight":0}"#).unwrap();
        let ctx = RankingContext {
            profile: &profile,
            preferences: &prefs,
            now: Utc::now(),
        };
        assert!((ctx.category_preference("Tech") - 0.9).abs() < 1e-9);
        assert!((ctx.category_preference("Sports") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_heuristic_orders_by_explicit_preference() {
        let profile = AffinityProfile::default();
        let prefs: UserPreferences =
            serde_json::from_str(r#"{"weights":{"Tech":90},"rating_weight":0}"#).unwrap();
        let now = Utc::now();
        let ctx = RankingContext {
            profile: &profile,
            preferences: &prefs,
            now,
        };
        let tech = item("http://a/tech", "t", "Tech", 5);
        let sports = item("http://a/sports", "t", "Sports", 5);
        assert!(heuristic_score(&tech, &ctx) > heuristic_score(&sports, &ctx));
    }

    #[test]
    fn test_scores_stay_in_bounds() {
        let profile = AffinityProfile::default();
        let prefs = UserPreferences::default();
        let now = Utc::now();
        let ctx = RankingContext {
            profile: &profile,
            preferences: &prefs,
            now,
        };
        let mut extreme = item("http://a/x", "t", "Tech", 0);
        extreme.upvotes = 1_000_000;
        extreme.comment_count = 1_000_000;
        extreme.engagement_score = 1e9;
        let score = heuristic_score(&extreme, &ctx);
        assert!((0.0..=1.0).contains(&score));
        let components = component_scores(&extreme, &ctx);
        for value in [
            components.category_match,
            components.recency,
            components.popularity,
            components.engagement,
        ] {
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn test_rank_candidates_sorts_descending() {
        let profile = AffinityProfile::default();
        let prefs: UserPreferences =
            serde_json::from_str(r#"{"weights":{"Tech":90},"rating_weight":0}"#).unwrap();
        let ctx = RankingContext {
            profile: &profile,
            preferences: &prefs,
            now: Utc::now(),
        };
        let pool = vec![
            item("http://a/s1", "s", "Sports", 5),
            item("http://a/t1", "t", "Tech", 5),
            item("http://a/s2", "s", "Sports", 5),
            item("http://a/t2", "t", "Tech", 5),
        ];
        let ranked = rank_candidates(pool, None, &ctx);
        assert_eq!(ranked.len(), 4);
        assert_eq!(ranked[0].item.category, "Tech");
        assert_eq!(ranked[1].item.category, "Tech");
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
