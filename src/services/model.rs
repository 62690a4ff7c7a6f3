use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{ContentItem, UserInteraction, UserPreferences},
    store::{ContentStore, SharedStore},
};

use super::{
    boost::{BoostParams, GradientBoostedTrees},
    profile::build_profile,
    ranking::{feature_vector, group_for_feature, numeric_features, RankingContext, FEATURE_NAMES},
};

/// Artifact file name inside the model directory.
const MODEL_FILE: &str = "ranking_model.json";

/// A published model is reused for this long unless a retrain is forced.
const MODEL_TTL_HOURS: i64 = 24;

/// Bounds on the data pulled for one training run.
const TRAINING_INTERACTIONS: i64 = 1000;
const TRAINING_CORPUS: i64 = 500;

/// Synthetic rows generated per corpus item when bootstrapping.
const BOOTSTRAP_ROWS_PER_ITEM: usize = 3;

/// Validation share of the training data.
const VALIDATION_FRACTION: f64 = 0.2;

/// Maps categorical values onto stable numeric codes. Unseen values
/// encode to the reserved zero slot instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut classes: Vec<String> = values
            .into_iter()
            .map(|v| v.to_string())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        classes.sort();
        Self { classes }
    }

    pub fn encode(&self, value: &str) -> f64 {
        match self.classes.binary_search_by(|c| c.as_str().cmp(value)) {
            Ok(index) => (index + 1) as f64,
            Err(_) => 0.0,
        }
    }
}

/// The persisted ranking artifact: scorer, encoders, aggregated feature
/// importance, and provenance metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub trained_at: DateTime<Utc>,
    /// True when trained on synthesized bootstrap rows; such a model
    /// encodes no real preference signal.
    pub bootstrap: bool,
    pub examples: usize,
    pub validation_rmse: Option<f64>,
    model: GradientBoostedTrees,
    category_encoder: LabelEncoder,
    source_encoder: LabelEncoder,
    /// Raw split gain per feature name.
    feature_importance: HashMap<String, f64>,
}

impl TrainedModel {
    /// Scores one candidate in [0, 1] through the shared feature schema.
    pub fn score(&self, item: &ContentItem, ctx: &RankingContext<'_>) -> f64 {
        let features = feature_vector(
            item,
            ctx,
            self.category_encoder.encode(&item.category),
            self.source_encoder.encode(&item.source),
        );
        self.model.predict(&features).clamp(0.0, 1.0)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.trained_at < Duration::hours(MODEL_TTL_HOURS)
    }

    /// Importance percentages aggregated into the four explanation
    /// groups. Features outside those groups are not narratable and are
    /// excluded from the total.
    pub fn group_importance(&self) -> HashMap<String, f64> {
        let mut groups: HashMap<String, f64> = [
            ("category_match", 0.0),
            ("recency", 0.0),
            ("popularity", 0.0),
            ("engagement", 0.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let mut total = 0.0;
        for (feature, gain) in &self.feature_importance {
            if let Some(group) = group_for_feature(feature) {
                *groups.get_mut(group).expect("known group") += gain;
                total += gain;
            }
        }

        if total > 0.0 {
            for value in groups.values_mut() {
                *value = *value / total * 100.0;
            }
        } else {
            for value in groups.values_mut() {
                *value = 25.0;
            }
        }
        groups
    }
}

/// Outcome of one `train` call.
#[derive(Debug, Clone, Serialize)]
pub struct TrainSummary {
    /// False when a fresh artifact was reused instead of retraining.
    pub trained: bool,
    pub bootstrap: bool,
    pub examples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_rmse: Option<f64>,
    pub trained_at: DateTime<Utc>,
}

impl TrainSummary {
    fn from_model(model: &TrainedModel, trained: bool) -> Self {
        Self {
            trained,
            bootstrap: model.bootstrap,
            examples: model.examples,
            validation_rmse: model.validation_rmse,
            trained_at: model.trained_at,
        }
    }
}

/// Holds the currently published model and owns the training lifecycle.
///
/// Readers clone the current `Arc` and keep scoring against it while a
/// retrain runs; the writer publishes by an atomic pointer swap only
/// after training and serialization have fully succeeded. On disk the
/// artifact is written to a temporary file and renamed into place, so a
/// half-written model is never visible.
pub struct ModelRegistry {
    artifact_path: PathBuf,
    current: RwLock<Option<Arc<TrainedModel>>>,
    train_lock: Mutex<()>,
}

impl ModelRegistry {
    /// Opens the registry, loading a previously persisted artifact when
    /// one exists and parses.
    pub fn open(model_dir: impl AsRef<Path>) -> Self {
        let artifact_path = model_dir.as_ref().join(MODEL_FILE);
        let current = match std::fs::read_to_string(&artifact_path) {
            Ok(json) => match serde_json::from_str::<TrainedModel>(&json) {
                Ok(model) => {
                    tracing::info!(
                        path = %artifact_path.display(),
                        trained_at = %model.trained_at,
                        bootstrap = model.bootstrap,
                        "Loaded persisted ranking model"
                    );
                    Some(Arc::new(model))
                }
                Err(e) => {
                    tracing::warn!(path = %artifact_path.display(), error = %e, "Ignoring unreadable model artifact");
                    None
                }
            },
            Err(_) => None,
        };

        Self {
            artifact_path,
            current: RwLock::new(current),
            train_lock: Mutex::new(()),
        }
    }

    /// The currently published model, regardless of age.
    pub async fn current(&self) -> Option<Arc<TrainedModel>> {
        self.current.read().await.clone()
    }

    /// The currently published model if it is still within its TTL.
    pub async fn current_fresh(&self, now: DateTime<Utc>) -> Option<Arc<TrainedModel>> {
        self.current.read().await.clone().filter(|m| m.is_fresh(now))
    }

    /// Trains and publishes a new model. Single-writer and blocking:
    /// concurrent callers queue behind the training lock, and each
    /// re-checks freshness once it acquires it.
    pub async fn train(&self, store: &SharedStore, force: bool) -> AppResult<TrainSummary> {
        let _guard = self.train_lock.lock().await;

        let now = Utc::now();
        if !force {
            if let Some(model) = self.current_fresh(now).await {
                tracing::info!(
                    trained_at = %model.trained_at,
                    "Reusing fresh ranking model"
                );
                return Ok(TrainSummary::from_model(&model, false));
            }
        }

        let interactions = store.recent_interactions(TRAINING_INTERACTIONS).await?;
        let corpus = store.recent_filtered(TRAINING_CORPUS).await?;

        let content_ids: Vec<Uuid> = interactions
            .iter()
            .map(|i| i.content_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let mut content_by_id: HashMap<Uuid, ContentItem> = store
            .content_by_ids(&content_ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        for item in &corpus {
            content_by_id.entry(item.id).or_insert_with(|| item.clone());
        }

        let mut rows = build_training_rows(&interactions, &content_by_id, now);
        let bootstrap = rows.is_empty();
        if bootstrap {
            tracing::warn!(
                corpus = corpus.len(),
                "No interaction history; training on synthesized bootstrap rows"
            );
            rows = build_bootstrap_rows(&corpus);
        }
        if rows.is_empty() {
            return Err(AppError::Training(
                "no content or interaction data available for training".to_string(),
            ));
        }

        let model = fit_artifact(rows, bootstrap, now)?;
        self.persist(&model).await?;

        let model = Arc::new(model);
        *self.current.write().await = Some(Arc::clone(&model));

        tracing::info!(
            examples = model.examples,
            bootstrap = model.bootstrap,
            validation_rmse = ?model.validation_rmse,
            "Published new ranking model"
        );

        Ok(TrainSummary::from_model(&model, true))
    }

    /// Write-then-rename so readers of the artifact file never observe a
    /// partial write.
    async fn persist(&self, model: &TrainedModel) -> AppResult<()> {
        let json = serde_json::to_string(model)
            .map_err(|e| AppError::Internal(format!("Model serialization error: {}", e)))?;

        if let Some(parent) = self.artifact_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AppError::Internal(format!("Model dir error: {}", e)))?;
            }
        }
        let tmp_path = self.artifact_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| AppError::Internal(format!("Model write error: {}", e)))?;
        tokio::fs::rename(&tmp_path, &self.artifact_path)
            .await
            .map_err(|e| AppError::Internal(format!("Model publish error: {}", e)))?;

        Ok(())
    }
}

/// One labeled example before categorical encoding.
struct TrainRow {
    category: String,
    source: String,
    numeric: [f64; 12],
    label: f64,
}

/// Builds labeled rows from real interactions, one per interaction whose
/// content is known, with user-affinity context features derived from
/// that user's own history.
fn build_training_rows(
    interactions: &[UserInteraction],
    content_by_id: &HashMap<Uuid, ContentItem>,
    now: DateTime<Utc>,
) -> Vec<TrainRow> {
    let mut by_user: HashMap<&str, Vec<UserInteraction>> = HashMap::new();
    for interaction in interactions {
        by_user
            .entry(interaction.user_id.as_str())
            .or_default()
            .push(interaction.clone());
    }

    let neutral_prefs = UserPreferences::default();
    let mut rows = Vec::new();

    for user_interactions in by_user.values() {
        let profile = build_profile(user_interactions, content_by_id);
        let ctx = RankingContext {
            profile: &profile,
            preferences: &neutral_prefs,
            now,
        };
        for interaction in user_interactions {
            let Some(content) = content_by_id.get(&interaction.content_id) else {
                continue;
            };
            rows.push(TrainRow {
                category: content.category.clone(),
                source: content.source.clone(),
                numeric: numeric_features(content, &ctx),
                label: interaction.relevance_label(),
            });
        }
    }

    rows
}

/// Synthesizes plausible rows over the corpus so a usable model exists
/// before any real data accrues. The label distribution is skewed toward
/// mid/positive values; the resulting artifact is flagged `bootstrap`.
fn build_bootstrap_rows(corpus: &[ContentItem]) -> Vec<TrainRow> {
    let mut rng = rand::thread_rng();
    let labels = [0.0, 0.5, 0.8, 1.0];
    let label_weights =
        WeightedIndex::new([1, 3, 4, 2]).expect("static non-zero weights");

    let mut rows = Vec::with_capacity(corpus.len() * BOOTSTRAP_ROWS_PER_ITEM);
    for item in corpus {
        for _ in 0..BOOTSTRAP_ROWS_PER_ITEM {
            let age_hours: f64 = rng.gen_range(1.0..72.0);
            let total_votes = rng.gen_range(5..120) as f64;
            let vote_ratio: f64 = rng.gen_range(0.3..1.0);
            rows.push(TrainRow {
                category: item.category.clone(),
                source: item.source.clone(),
                numeric: [
                    age_hours,
                    item.title.chars().count() as f64,
                    item.content_summary.chars().count() as f64,
                    if rng.gen_bool(0.5) { 1.0 } else { 0.0 },
                    total_votes,
                    vote_ratio,
                    rng.gen_range(0..30) as f64,
                    rng.gen_range(30.0..200.0),
                    rng.gen_range(-0.2..0.8),
                    rng.gen_range(-0.3..0.7),
                    (-0.01 * age_hours).exp(),
                    rng.gen_range(0.0..0.3),
                ],
                label: labels[label_weights.sample(&mut rng)],
            });
        }
    }
    rows
}

/// Encodes, splits, fits, and packages the artifact.
fn fit_artifact(
    rows: Vec<TrainRow>,
    bootstrap: bool,
    now: DateTime<Utc>,
) -> AppResult<TrainedModel> {
    let category_encoder = LabelEncoder::fit(rows.iter().map(|r| r.category.as_str()));
    let source_encoder = LabelEncoder::fit(rows.iter().map(|r| r.source.as_str()));

    let mut examples: Vec<(Vec<f64>, f64)> = rows
        .iter()
        .map(|row| {
            let mut features = Vec::with_capacity(FEATURE_NAMES.len());
            features.push(category_encoder.encode(&row.category));
            features.push(source_encoder.encode(&row.source));
            features.extend(row.numeric);
            (features, row.label)
        })
        .collect();

    examples.shuffle(&mut rand::thread_rng());

    let validation_len = if examples.len() >= 5 {
        ((examples.len() as f64 * VALIDATION_FRACTION) as usize).max(1)
    } else {
        0
    };
    let (val, train) = examples.split_at(validation_len);

    let train_x: Vec<Vec<f64>> = train.iter().map(|(x, _)| x.clone()).collect();
    let train_y: Vec<f64> = train.iter().map(|(_, y)| *y).collect();
    let val_x: Vec<Vec<f64>> = val.iter().map(|(x, _)| x.clone()).collect();
    let val_y: Vec<f64> = val.iter().map(|(_, y)| *y).collect();

    let params = BoostParams::for_dataset(train_x.len());
    let model = GradientBoostedTrees::fit(&train_x, &train_y, &val_x, &val_y, &params)
        .map_err(AppError::Training)?;

    let feature_importance = FEATURE_NAMES
        .iter()
        .zip(model.feature_gain.iter())
        .map(|(name, gain)| (name.to_string(), *gain))
        .collect();
    let validation_rmse = model.validation_rmse;

    Ok(TrainedModel {
        trained_at: now,
        bootstrap,
        examples: rows.len(),
        validation_rmse,
        model,
        category_encoder,
        source_encoder,
        feature_importance,
    })
}
