use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Default preference weight on the 0-100 scale (neutral).
pub const NEUTRAL_PREFERENCE: f64 = 50.0;

/// A stored content item.
///
/// `url` is the sole hard identity: ingestion upserts by it, and the
/// deduplication filter treats an exact URL collision as a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentItem {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub source: String,
    pub content_summary: String,
    /// Creation time of the underlying content, not of the row.
    pub timestamp: DateTime<Utc>,
    pub category: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(default)]
    pub engagement_score: f64,
    /// Set by the quality filter; always within [0, 1].
    #[serde(default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub quality_factors: Vec<String>,
    /// True once the item has passed the dedup/quality filter.
    #[serde(default)]
    pub filtered: bool,
    #[serde(default)]
    pub filter_reason: Option<String>,
}

impl ContentItem {
    /// Content age in hours relative to `now`, floored at zero.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        let secs = (now - self.timestamp).num_seconds();
        (secs.max(0) as f64) / 3600.0
    }

    pub fn total_votes(&self) -> i64 {
        self.upvotes + self.downvotes
    }

    /// Share of upvotes among all votes. Zero votes yields 0.0 rather
    /// than dividing by zero.
    pub fn vote_ratio(&self) -> f64 {
        let total = self.total_votes();
        self.upvotes as f64 / (total.max(1)) as f64
    }

    /// Engagement score, deriving one from votes and comments when the
    /// producer did not supply it.
    pub fn effective_engagement(&self) -> f64 {
        if self.engagement_score != 0.0 {
            self.engagement_score
        } else {
            self.upvotes as f64 + self.comment_count as f64 * 2.0 - self.downvotes as f64 * 0.5
        }
    }

    /// Title and body joined, as fed to the similarity vectorizer.
    pub fn combined_text(&self) -> String {
        format!("{} {}", self.title, self.content_summary)
    }
}

// ============================================================================
// Ingestion boundary
// ============================================================================

/// Minimum summary length for an item to be filter-eligible.
pub const MIN_SUMMARY_CHARS: usize = 50;

/// A raw item as delivered by an ingestion producer.
///
/// Field names accept both the compact producer spelling (`link`,
/// `summary`, `published`) and the stored spelling. Validation happens
/// exactly once, here, at the boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct RawContentItem {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "link")]
    pub url: String,
    #[serde(default, alias = "summary")]
    pub content_summary: String,
    #[serde(default, alias = "published")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(default)]
    pub engagement_score: f64,
}

impl RawContentItem {
    /// Validates the producer payload and converts it into a storable
    /// item. Rejections name the missing field so producers can be fixed.
    pub fn validate(self) -> Result<ContentItem, String> {
        if self.title.trim().is_empty() {
            return Err("missing title".to_string());
        }
        if self.url.trim().is_empty() || self.url == "#" {
            return Err("missing url".to_string());
        }
        if self.source.trim().is_empty() {
            return Err("missing source".to_string());
        }
        if self.content_summary.trim().chars().count() < MIN_SUMMARY_CHARS {
            return Err(format!(
                "summary shorter than {} characters",
                MIN_SUMMARY_CHARS
            ));
        }
        let timestamp = self
            .timestamp
            .ok_or_else(|| "missing timestamp".to_string())?;

        Ok(ContentItem {
            id: Uuid::new_v4(),
            url: self.url.trim().to_string(),
            title: self.title.trim().to_string(),
            source: self.source.trim().to_string(),
            content_summary: self.content_summary.trim().to_string(),
            timestamp,
            category: self
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "General".to_string()),
            author: self.author,
            image_url: self.image_url,
            upvotes: self.upvotes,
            downvotes: self.downvotes,
            comment_count: self.comment_count,
            engagement_score: self.engagement_score,
            quality_score: None,
            quality_factors: Vec::new(),
            filtered: false,
            filter_reason: None,
        })
    }
}

// ============================================================================
// Interactions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    View,
    Click,
    Save,
    Share,
}

impl InteractionKind {
    /// Evidence weight used when accumulating affinity profiles.
    pub fn evidence_weight(self) -> f64 {
        match self {
            InteractionKind::View => 1.0,
            InteractionKind::Click => 1.5,
            InteractionKind::Save => 2.0,
            InteractionKind::Share => 2.5,
        }
    }

    /// Ordinal relevance label used as the regression target. A proxy,
    /// not measured ground truth.
    pub fn relevance_label(self) -> f64 {
        match self {
            InteractionKind::View => 0.5,
            InteractionKind::Click => 0.8,
            InteractionKind::Save => 0.7,
            InteractionKind::Share => 0.9,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InteractionKind::View => "view",
            InteractionKind::Click => "click",
            InteractionKind::Save => "save",
            InteractionKind::Share => "share",
        }
    }
}

impl std::str::FromStr for InteractionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(InteractionKind::View),
            "click" => Ok(InteractionKind::Click),
            "save" => Ok(InteractionKind::Save),
            "share" => Ok(InteractionKind::Share),
            other => Err(format!("unknown interaction type: {}", other)),
        }
    }
}

/// A single immutable interaction event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserInteraction {
    pub id: Uuid,
    pub user_id: String,
    pub content_id: Uuid,
    pub interaction_type: InteractionKind,
    /// Explicit feedback: +1 thumbs up, -1 thumbs down, absent otherwise.
    #[serde(default)]
    pub rating: Option<i8>,
    pub created_at: DateTime<Utc>,
}

impl UserInteraction {
    /// Evidence weight with explicit ratings overriding the kind weight.
    pub fn evidence_weight(&self) -> f64 {
        match self.rating {
            Some(r) if r > 0 => 3.0,
            Some(r) if r < 0 => -1.0,
            _ => self.interaction_type.evidence_weight(),
        }
    }

    /// Regression target with explicit ratings overriding the kind label.
    pub fn relevance_label(&self) -> f64 {
        match self.rating {
            Some(r) if r > 0 => 1.0,
            Some(r) if r < 0 => 0.0,
            _ => self.interaction_type.relevance_label(),
        }
    }
}

// ============================================================================
// Preferences & recommendation output
// ============================================================================

/// Caller-supplied preference weights, 0-100 per category with 50 neutral.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPreferences {
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    #[serde(default = "default_rating_weight")]
    pub rating_weight: f64,
}

fn default_rating_weight() -> f64 {
    NEUTRAL_PREFERENCE
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            weights: HashMap::new(),
            rating_weight: NEUTRAL_PREFERENCE,
        }
    }
}

impl UserPreferences {
    /// Weight for a category, defaulting to neutral when unspecified.
    pub fn category_weight(&self, category: &str) -> f64 {
        self.weights
            .get(category)
            .copied()
            .unwrap_or(NEUTRAL_PREFERENCE)
    }

    /// Categories the caller boosted above the neutral default.
    pub fn boosted_categories(&self) -> Vec<&str> {
        self.weights
            .iter()
            .filter(|(_, w)| **w > 55.0)
            .map(|(c, _)| c.as_str())
            .collect()
    }
}

/// Per-item component scores computed independently of the ranking model,
/// used only to phrase explanations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentScores {
    pub category_match: f64,
    pub recency: f64,
    pub popularity: f64,
    pub engagement: f64,
}

impl ComponentScores {
    /// Component percentages summing to 100, used when no trained model
    /// supplies a feature-importance breakdown.
    pub fn as_importance(&self) -> HashMap<String, f64> {
        let total = self.category_match + self.recency + self.popularity + self.engagement;
        let mut out = HashMap::new();
        if total > 0.0 {
            out.insert(
                "category_match".to_string(),
                self.category_match / total * 100.0,
            );
            out.insert("recency".to_string(), self.recency / total * 100.0);
            out.insert("popularity".to_string(), self.popularity / total * 100.0);
            out.insert("engagement".to_string(), self.engagement / total * 100.0);
        } else {
            for key in ["category_match", "recency", "popularity", "engagement"] {
                out.insert(key.to_string(), 25.0);
            }
        }
        out
    }
}

/// Scoring breakdown attached to recommendations in verbose mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreDetails {
    pub model_score: f64,
    pub component_scores: ComponentScores,
    /// Importance percentage per explanation group.
    pub feature_importance: HashMap<String, f64>,
}

/// One entry of the ranked recommendation output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedItem {
    pub content: ContentItem,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_details: Option<ScoreDetails>,
}
