use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::request_id::request_context;

use super::{handlers, AppState};

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .layer(middleware::from_fn(request_context))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Ingestion boundary
        .route("/content", post(handlers::ingest_content))
        .route("/interactions", post(handlers::record_interaction))
        // Pipeline operations
        .route("/filter", post(handlers::run_filter))
        .route("/recommendations", post(handlers::recommend))
        .route("/train", post(handlers::train))
}
