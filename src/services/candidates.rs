use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{ContentItem, UserPreferences};

use super::profile::AffinityProfile;

/// Number of top affinities considered when matching candidates.
const TOP_AFFINITIES: usize = 3;

/// Freshness-injection bounds: very fresh and demonstrably popular items
/// are admitted regardless of profile match.
const FRESH_AGE_HOURS: f64 = 12.0;
const FRESH_MIN_UPVOTES: i64 = 10;

/// Stage 1 of the recommendation pipeline: narrows the recent corpus to a
/// relevant, non-interacted candidate set for one user.
///
/// An item qualifies when its category or source sits in the user's top
/// affinities, when the caller explicitly boosted its category, or when it
/// is fresh and popular (diversity injection for narrow profiles). With no
/// affinity signal at all, the whole window minus interacted items is the
/// candidate set.
pub fn generate_candidates(
    corpus: &[ContentItem],
    interacted: &HashSet<Uuid>,
    profile: &AffinityProfile,
    preferences: &UserPreferences,
    now: DateTime<Utc>,
) -> Vec<ContentItem> {
    let top_categories: HashSet<&str> = profile
        .top_categories(TOP_AFFINITIES)
        .into_iter()
        .chain(preferences.boosted_categories())
        .collect();
    let top_sources: HashSet<&str> = profile.top_sources(TOP_AFFINITIES).into_iter().collect();

    let cold_start = top_categories.is_empty() && top_sources.is_empty();

    corpus
        .iter()
        .filter(|item| !interacted.contains(&item.id))
        .filter(|item| {
            if cold_start {
                return true;
            }
            if top_categories.contains(item.category.as_str())
                || top_sources.contains(item.source.as_str())
            {
                return true;
            }
            item.age_hours(now) < FRESH_AGE_HOURS && item.upvotes > FRESH_MIN_UPVOTES
        })
        .cloned()
        .collect()
}
