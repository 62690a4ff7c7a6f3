use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        InteractionKind, RawContentItem, RecommendedItem, UserInteraction, UserPreferences,
    },
    services::{
        recommend::DEFAULT_RECOMMENDATION_LIMIT, ContentFilter, FilterOptions, FilterReport,
        Recommender, TrainSummary,
    },
    store::ContentStore,
};

use super::AppState;

// Request/Response types

#[derive(Debug, Serialize)]
pub struct RejectedItem {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: Vec<RejectedItem>,
}

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub user_id: String,
    pub content_id: Uuid,
    pub interaction_type: InteractionKind,
    #[serde(default)]
    pub rating: Option<i8>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    pub user_id: String,
    #[serde(default)]
    pub preferences: Option<UserPreferences>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub verbose: bool,
}

fn default_limit() -> usize {
    DEFAULT_RECOMMENDATION_LIMIT
}

#[derive(Debug, Deserialize, Default)]
pub struct TrainRequest {
    #[serde(default)]
    pub force: bool,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Ingestion boundary: validates each raw item once and upserts the
/// survivors by URL. Invalid items are rejected individually; the batch
/// itself always proceeds.
pub async fn ingest_content(
    State(state): State<AppState>,
    Json(raw_items): Json<Vec<RawContentItem>>,
) -> AppResult<(StatusCode, Json<IngestResponse>)> {
    let mut items = Vec::with_capacity(raw_items.len());
    let mut rejected = Vec::new();

    for raw in raw_items {
        let url = raw.url.clone();
        match raw.validate() {
            Ok(item) => items.push(item),
            Err(reason) => {
                tracing::debug!(url = %url, reason = %reason, "Rejected producer item");
                rejected.push(RejectedItem { url, reason });
            }
        }
    }

    let accepted = state.store.upsert_content(&items).await?;
    tracing::info!(accepted, rejected = rejected.len(), "Ingested content batch");

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse { accepted, rejected }),
    ))
}

/// Records one immutable interaction event.
pub async fn record_interaction(
    State(state): State<AppState>,
    Json(request): Json<InteractionRequest>,
) -> AppResult<StatusCode> {
    if let Some(rating) = request.rating {
        if !(-1..=1).contains(&rating) {
            return Err(AppError::InvalidInput(
                "rating must be -1, 0, or 1".to_string(),
            ));
        }
    }
    if request.user_id.trim().is_empty() {
        return Err(AppError::InvalidInput("user_id is required".to_string()));
    }

    let interaction = UserInteraction {
        id: Uuid::new_v4(),
        user_id: request.user_id,
        content_id: request.content_id,
        interaction_type: request.interaction_type,
        rating: request.rating.filter(|r| *r != 0),
        created_at: Utc::now(),
    };
    state.store.insert_interaction(&interaction).await?;

    Ok(StatusCode::CREATED)
}

/// Runs one dedup/quality filter batch.
pub async fn run_filter(
    State(state): State<AppState>,
    Json(options): Json<FilterOptions>,
) -> AppResult<Json<FilterReport>> {
    let report = ContentFilter::new(state.store.clone()).run(options).await?;
    Ok(Json(report))
}

/// Generates personalized recommendations. Always returns a list; every
/// failure mode inside the pipeline degrades rather than surfacing.
pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> Json<Vec<RecommendedItem>> {
    let preferences = request.preferences.unwrap_or_default();
    let recommender = Recommender::new(state.store.clone(), state.registry.clone());
    let results = recommender
        .recommend(
            &request.user_id,
            &preferences,
            request.limit.max(1),
            request.verbose,
        )
        .await;
    Json(results)
}

/// Blocking single-writer retrain of the ranking model.
pub async fn train(
    State(state): State<AppState>,
    Json(request): Json<TrainRequest>,
) -> AppResult<Json<TrainSummary>> {
    let summary = state.registry.train(&state.store, request.force).await?;
    Ok(Json(summary))
}
