use chrono::{DateTime, Utc};

use crate::models::{ContentItem, ScoreDetails};

/// Secondary reasons below this importance share are not worth saying.
const MATERIALITY_FLOOR: f64 = 10.0;

/// Maximum secondary reasons appended after the primary one.
const MAX_SECONDARY: usize = 2;

/// Human-readable content age.
pub fn age_text(age_hours: f64) -> String {
    if age_hours < 1.0 {
        "just now".to_string()
    } else if age_hours < 2.0 {
        "1 hour ago".to_string()
    } else if age_hours < 24.0 {
        format!("{} hours ago", age_hours as i64)
    } else if age_hours < 48.0 {
        "yesterday".to_string()
    } else {
        format!("{} days ago", (age_hours / 24.0) as i64)
    }
}

fn primary_reason(group: &str, pct: f64, item: &ContentItem, age_hours: f64) -> String {
    match group {
        "category_match" => {
            if pct >= 70.0 {
                format!("it's in your top interest category ({})", item.category)
            } else if pct >= 40.0 {
                format!("it matches your interest in {}", item.category)
            } else {
                format!("it's related to {}", item.category)
            }
        }
        "recency" => {
            if pct >= 70.0 {
                format!("it's very recent (posted {})", age_text(age_hours))
            } else if pct >= 40.0 {
                format!("it's fresh content from {}", age_text(age_hours))
            } else {
                format!("it was posted {}", age_text(age_hours))
            }
        }
        "popularity" => {
            if item.upvotes > 50 {
                format!("it's highly rated with {} upvotes", item.upvotes)
            } else if item.upvotes > 20 {
                format!("it has {} upvotes from other users", item.upvotes)
            } else {
                "it has positive ratings".to_string()
            }
        }
        _ => {
            if item.comment_count > 20 {
                format!("it has high engagement ({} comments)", item.comment_count)
            } else if item.comment_count > 5 {
                format!("it has active discussion ({} comments)", item.comment_count)
            } else {
                "it has some discussion activity".to_string()
            }
        }
    }
}

fn secondary_reason(group: &str, item: &ContentItem, age_hours: f64) -> Option<String> {
    match group {
        "category_match" => Some(format!("matches your {} preference", item.category)),
        "recency" => {
            if age_hours < 6.0 {
                Some("it's very recent".to_string())
            } else if age_hours < 24.0 {
                Some("it's from today".to_string())
            } else {
                None
            }
        }
        "popularity" => {
            if item.upvotes > 0 {
                Some(format!("has {} upvotes", item.upvotes))
            } else {
                None
            }
        }
        _ => {
            if item.comment_count > 0 {
                Some(format!("has {} comments", item.comment_count))
            } else {
                None
            }
        }
    }
}

/// Turns an item's score breakdown into a single explanatory sentence.
///
/// The importance map ranks the four explanation groups; the strongest
/// one becomes the primary reason with a magnitude-appropriate template,
/// followed by up to two material secondary reasons. Source attribution
/// and a diversity-framing clause pad thin explanations.
pub fn explanation(item: &ContentItem, details: &ScoreDetails, now: DateTime<Utc>) -> String {
    let age_hours = item.age_hours(now);

    let mut groups: Vec<(&str, f64)> = details
        .feature_importance
        .iter()
        .map(|(k, v)| (k.as_str(), *v))
        .collect();
    groups.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut reasons: Vec<String> = Vec::new();

    if let Some((group, importance)) = groups.first() {
        // Round to the nearest 5% so templates do not flap between runs.
        let pct = (importance / 5.0).round() * 5.0;
        reasons.push(primary_reason(group, pct, item, age_hours));

        for (group, importance) in groups.iter().skip(1).take(MAX_SECONDARY) {
            if *importance < MATERIALITY_FLOOR {
                continue;
            }
            if let Some(reason) = secondary_reason(group, item, age_hours) {
                reasons.push(reason);
            }
        }
    }

    if reasons.len() < 3 && !item.source.is_empty() && item.source != "Unknown" {
        reasons.push(format!("published by {}", item.source));
    }

    if details.model_score < 0.7
        && details.component_scores.category_match < 0.4
        && reasons.len() < 3
    {
        reasons.push("for some variety in your feed".to_string());
    }

    if reasons.is_empty() {
        reasons.push(format!("relevant {} content", item.category));
    }

    let mut sentence = format!("Recommended because {}", reasons[0]);
    if reasons.len() > 1 {
        sentence.push_str(", and ");
        sentence.push_str(&reasons[1..].join(", "));
    }
    sentence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::item;
    use crate::models::ComponentScores;
    use std::collections::HashMap;

    fn details(importance: &[(&str, f64)], model_score: f64, category_match: f64) -> ScoreDetails {
        ScoreDetails {
            model_score,
            component_scores: ComponentScores {
                category_match,
                recency: 0.5,
                popularity: 0.5,
                engagement: 0.5,
            },
            feature_importance: importance
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    #[test]
    fn test_age_text_buckets() {
        assert_eq!(age_text(0.5), "just now");
        assert_eq!(age_text(1.5), "1 hour ago");
        assert_eq!(age_text(7.2), "7 hours ago");
        assert_eq!(age_text(30.0), "yesterday");
        assert_eq!(age_text(72.0), "3 days ago");
    }

    #[test]
    fn test_dominant_category_gets_strong_template() {
        let content = item("http://a/1", "t", "Tech", 2);
        let d = details(
            &[
                ("category_match", 80.0),
                ("recency", 10.0),
                ("popularity", 5.0),
                ("engagement", 5.0),
            ],
            0.9,
            0.9,
        );
        let reason = explanation(&content, &d, Utc::now());
        assert!(reason.starts_with("Recommended because it's in your top interest category (Tech)"));
        // Secondary recency at exactly 10% is material; a two-hour-old
        // item reads as very recent.
        assert!(reason.contains("it's very recent"));
    }

    #[test]
    fn test_weak_category_gets_soft_template() {
        let content = item("http://a/1", "t", "Tech", 2);
        let d = details(
            &[
                ("category_match", 30.0),
                ("recency", 28.0),
                ("popularity", 22.0),
                ("engagement", 20.0),
            ],
            0.6,
            0.3,
        );
        let reason = explanation(&content, &d, Utc::now());
        assert!(reason.contains("it's related to Tech"));
    }

    #[test]
    fn test_immaterial_secondary_reasons_are_dropped() {
        let mut content = item("http://a/1", "t", "Tech", 2);
        content.source = String::new();
        let d = details(
            &[
                ("category_match", 92.0),
                ("recency", 4.0),
                ("popularity", 2.0),
                ("engagement", 2.0),
            ],
            0.9,
            0.9,
        );
        let reason = explanation(&content, &d, Utc::now());
        assert!(!reason.contains("upvotes"));
        assert!(!reason.contains("comments"));
        assert!(!reason.contains("from today"));
    }

    #[test]
    fn test_source_attribution_pads_thin_explanations() {
        let content = item("http://a/1", "t", "Tech", 2);
        let d = details(
            &[
                ("category_match", 95.0),
                ("recency", 3.0),
                ("popularity", 1.0),
                ("engagement", 1.0),
            ],
            0.9,
            0.9,
        );
        let reason = explanation(&content, &d, Utc::now());
        assert!(reason.contains("published by Example Wire"));
    }

    #[test]
    fn test_diversity_clause_for_off_profile_items() {
        let mut content = item("http://a/1", "t", "Gardening", 2);
        content.source = String::new();
        let d = details(
            &[
                ("recency", 80.0),
                ("category_match", 8.0),
                ("popularity", 6.0),
                ("engagement", 6.0),
            ],
            0.4,
            0.1,
        );
        let reason = explanation(&content, &d, Utc::now());
        assert!(reason.contains("for some variety in your feed"));
    }

    #[test]
    fn test_engagement_primary_mentions_comments() {
        let mut content = item("http://a/1", "t", "Tech", 2);
        content.comment_count = 42;
        let d = details(
            &[
                ("engagement", 60.0),
                ("category_match", 20.0),
                ("recency", 10.0),
                ("popularity", 10.0),
            ],
            0.8,
            0.5,
        );
        let reason = explanation(&content, &d, Utc::now());
        assert!(reason.contains("high engagement (42 comments)"));
    }

    #[test]
    fn test_empty_importance_still_produces_sentence() {
        let content = item("http://a/1", "t", "Tech", 2);
        let d = ScoreDetails {
            model_score: 0.8,
            component_scores: ComponentScores {
                category_match: 0.5,
                recency: 0.5,
                popularity: 0.5,
                engagement: 0.5,
            },
            feature_importance: HashMap::new(),
        };
        let reason = explanation(&content, &d, Utc::now());
        assert!(reason.starts_with("Recommended because"));
    }
}
