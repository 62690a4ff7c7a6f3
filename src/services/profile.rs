use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{ContentItem, UserInteraction};

use super::similarity::is_stopword;

/// Minimum token length counted toward keyword affinity.
const MIN_KEYWORD_LEN: usize = 3;

/// Cap on distinct keywords extracted per interacted item.
const KEYWORDS_PER_ITEM: usize = 50;

/// A user's derived affinities: signed raw weights plus 0-100 normalized
/// maps. Recomputed per request, never persisted.
#[derive(Debug, Clone, Default)]
pub struct AffinityProfile {
    category_weights: HashMap<String, f64>,
    source_weights: HashMap<String, f64>,
    keyword_counts: HashMap<String, f64>,
    total_category_weight: f64,
    total_source_weight: f64,
    /// Normalized 0-100 affinities, relative to the strongest entry.
    pub category_affinity: HashMap<String, f64>,
    pub source_affinity: HashMap<String, f64>,
    pub keyword_affinity: HashMap<String, f64>,
}

impl AffinityProfile {
    /// True for the cold-start case: no usable interaction evidence.
    pub fn is_empty(&self) -> bool {
        self.category_weights.is_empty() && self.source_weights.is_empty()
    }

    /// Categories with positive evidence, strongest first, at most `n`.
    pub fn top_categories(&self, n: usize) -> Vec<&str> {
        top_positive(&self.category_weights, n)
    }

    pub fn top_sources(&self, n: usize) -> Vec<&str> {
        top_positive(&self.source_weights, n)
    }

    /// Signed category signal in [-1, 1]: raw weight over the total
    /// absolute weight. Zero when the category was never interacted with.
    pub fn category_signal(&self, category: &str) -> f64 {
        if self.total_category_weight == 0.0 {
            return 0.0;
        }
        self.category_weights.get(category).copied().unwrap_or(0.0) / self.total_category_weight
    }

    pub fn source_signal(&self, source: &str) -> f64 {
        if self.total_source_weight == 0.0 {
            return 0.0;
        }
        self.source_weights.get(source).copied().unwrap_or(0.0) / self.total_source_weight
    }

    /// Fraction of a text's keywords present in the user's keyword
    /// affinity map, in [0, 1].
    pub fn keyword_overlap(&self, text: &str) -> f64 {
        if self.keyword_affinity.is_empty() {
            return 0.0;
        }
        let tokens = keyword_tokens(text);
        if tokens.is_empty() {
            return 0.0;
        }
        let matched = tokens
            .iter()
            .filter(|t| self.keyword_affinity.contains_key(*t))
            .count();
        matched as f64 / tokens.len() as f64
    }
}

fn top_positive(weights: &HashMap<String, f64>, n: usize) -> Vec<&str> {
    let mut entries: Vec<(&str, f64)> = weights
        .iter()
        .filter(|(_, w)| **w > 0.0)
        .map(|(k, w)| (k.as_str(), *w))
        .collect();
    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    entries.into_iter().take(n).map(|(k, _)| k).collect()
}

/// Distinct alphabetic tokens of length ≥ 3 with stopwords removed,
/// capped per item, in first-seen order.
fn keyword_tokens(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|t| t.len() >= MIN_KEYWORD_LEN && !is_stopword(t))
    {
        if !seen.iter().any(|s: &String| s == token) {
            seen.push(token.to_string());
            if seen.len() >= KEYWORDS_PER_ITEM {
                break;
            }
        }
    }
    seen
}

/// Builds an affinity profile from a user's interactions joined against
/// their content items.
///
/// Each interaction contributes its evidence weight to the item's category
/// and source, and its keywords to the keyword counts. An empty history
/// yields an empty profile — cold start is a state, not an error.
pub fn build_profile(
    interactions: &[UserInteraction],
    content_by_id: &HashMap<Uuid, ContentItem>,
) -> AffinityProfile {
    let mut profile = AffinityProfile::default();

    for interaction in interactions {
        let Some(content) = content_by_id.get(&interaction.content_id) else {
            continue;
        };
        let weight = interaction.evidence_weight();

        *profile
            .category_weights
            .entry(content.category.clone())
            .or_insert(0.0) += weight;
        *profile
            .source_weights
            .entry(content.source.clone())
            .or_insert(0.0) += weight;

        // Keyword evidence only accumulates from positive signals.
        if weight > 0.0 {
            for token in keyword_tokens(&content.combined_text()) {
                *profile.keyword_counts.entry(token).or_insert(0.0) += weight;
            }
        }
    }

    profile.total_category_weight = profile.category_weights.values().map(|w| w.abs()).sum();
    profile.total_source_weight = profile.source_weights.values().map(|w| w.abs()).sum();

    profile.category_affinity = normalize_to_hundred(&profile.category_weights);
    profile.source_affinity = normalize_to_hundred(&profile.source_weights);
    profile.keyword_affinity = normalize_to_hundred(&profile.keyword_counts);

    profile
}

/// Scales positive weights to 0-100 relative to the maximum; negative
/// weights floor at zero.
fn normalize_to_hundred(weights: &HashMap<String, f64>) -> HashMap<String, f64> {
    let max = weights.values().cloned().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return HashMap::new();
    }
    weights
        .iter()
        .map(|(k, w)| (k.clone(), (w / max * 100.0).clamp(0.0, 100.0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::item;
    use crate::models::InteractionKind;
    use chrono::Utc;

    fn interaction(
        user: &str,
        content: &ContentItem,
        kind: InteractionKind,
        rating: Option<i8>,
    ) -> UserInteraction {
        UserInteraction {
            id: Uuid::new_v4(),
            user_id: user.to_string(),
            content_id: content.id,
            interaction_type: kind,
            rating,
            created_at: Utc::now(),
        }
    }

    fn corpus() -> (HashMap<Uuid, ContentItem>, ContentItem, ContentItem, ContentItem) {
        let tech = item("http://t/1", "Compiler release improves build times", "Tech", 2);
        let sports = item("http://s/1", "Cup final decided in extra time", "Sports", 3);
        let mut tech2 = item("http://t/2", "New framework for embedded systems", "Tech", 4);
        tech2.source = "Hacker Wire".to_string();
        let map = [&tech, &sports, &tech2]
            .into_iter()
            .map(|c| (c.id, c.clone()))
            .collect();
        (map, tech, sports, tech2)
    }

    #[test]
    fn test_empty_history_yields_empty_profile() {
        let profile = build_profile(&[], &HashMap::new());
        assert!(profile.is_empty());
        assert!(profile.top_categories(3).is_empty());
        assert_eq!(profile.category_signal("Tech"), 0.0);
        assert_eq!(profile.keyword_overlap("compiler build times"), 0.0);
    }

    #[test]
    fn test_category_ordering_follows_evidence() {
        let (map, tech, sports, tech2) = corpus();
        let interactions = vec![
            interaction("u", &tech, InteractionKind::Share, None), // 2.5
            interaction("u", &tech2, InteractionKind::Click, None), // 1.5
            interaction("u", &sports, InteractionKind::View, None), // 1.0
        ];
        let profile = build_profile(&interactions, &map);

        assert_eq!(profile.top_categories(3), vec!["Tech", "Sports"]);
        assert!(profile.category_signal("Tech") > profile.category_signal("Sports"));
        assert_eq!(profile.category_affinity.get("Tech"), Some(&100.0));
    }

    #[test]
    fn test_negative_rating_pushes_weight_down() {
        let (map, tech, sports, _) = corpus();
        let interactions = vec![
            interaction("u", &tech, InteractionKind::View, Some(-1)), // -1.0
            interaction("u", &sports, InteractionKind::View, Some(1)), // 3.0
        ];
        let profile = build_profile(&interactions, &map);

        assert!(profile.category_signal("Tech") < 0.0);
        assert!(profile.category_signal("Sports") > 0.0);
        // Negative categories never surface in the top list.
        assert_eq!(profile.top_categories(3), vec!["Sports"]);
        // Normalized map floors negatives at zero.
        assert!(profile.category_affinity.get("Tech").is_none());
    }

    #[test]
    fn test_signals_are_bounded() {
        let (map, tech, _, _) = corpus();
        let interactions: Vec<_> = (0..20)
            .map(|_| interaction("u", &tech, InteractionKind::Share, Some(1)))
            .collect();
        let profile = build_profile(&interactions, &map);
        let signal = profile.category_signal("Tech");
        assert!((-1.0..=1.0).contains(&signal));
        assert!((signal - 1.0).abs() < 1e-9, "single-category history saturates");
    }

    #[test]
    fn test_keyword_overlap_reflects_interacted_text() {
        let (map, tech, _, _) = corpus();
        let interactions = vec![interaction("u", &tech, InteractionKind::Save, None)];
        let profile = build_profile(&interactions, &map);

        let related = profile.keyword_overlap("compiler improves embedded build");
        let unrelated = profile.keyword_overlap("cup final penalty shootout drama");
        assert!(related > unrelated);
        assert!((0.0..=1.0).contains(&related));
    }

    #[test]
    fn test_unknown_content_ids_are_skipped() {
        let (map, tech, _, _) = corpus();
        let mut orphan = interaction("u", &tech, InteractionKind::View, None);
        orphan.content_id = Uuid::new_v4();
        let profile = build_profile(&[orphan], &map);
        assert!(profile.is_empty());
    }
}
