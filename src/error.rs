use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Similarity computation error: {0}")]
    Similarity(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(msg) | AppError::Ingestion(msg) => {
                (StatusCode::BAD_REQUEST, msg)
            }
            AppError::Training(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Store(_) | AppError::Similarity(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
