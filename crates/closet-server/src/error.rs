//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use closet_common::StageError;
use serde_json::json;
use thiserror::Error;

/// Result type alias for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Error surface for the HTTP boundary.
///
/// Stage handlers work in terms of [`StageError`]; this wrapper maps each
/// category to a status code when a stage is invoked over HTTP.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Stage(#[from] StageError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Stage(err) = self;

        let (status, error_message) = match err {
            StageError::ClientInput(message) => (StatusCode::BAD_REQUEST, message),
            StageError::Adapter { ref message } => {
                tracing::error!("Adapter error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            },
            StageError::Infrastructure(ref source) => {
                tracing::error!("Infrastructure error: {:?}", source);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            },
            // A not-found precursor reads as a bad request to the caller,
            // even though the root cause is pipeline state.
            StageError::InconsistentState(ref message) => {
                tracing::error!("Inconsistent state: {}", message);
                (StatusCode::BAD_REQUEST, err.to_string())
            },
        };

        let body = Json(json!({ "error": error_message }));

        (status, body).into_response()
    }
}
