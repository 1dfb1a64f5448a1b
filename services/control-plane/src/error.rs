use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Error taxonomy of the gating core. Everything is locally classified;
/// nothing here is a fatal process-level failure.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("dataset version not found: {0}")]
    NotFound(String),

    #[error("dataset version already exists: {0}")]
    Conflict(String),

    #[error("insufficient outlier samples for audit: got {got}, need {need}")]
    InsufficientSamples { got: usize, need: usize },

    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("{service} failure: {message}")]
    ExternalService {
        service: &'static str,
        message: String,
    },
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let code = match &self {
            GateError::Validation(_) | GateError::InsufficientSamples { .. } => {
                StatusCode::BAD_REQUEST
            }
            GateError::NotFound(_) => StatusCode::NOT_FOUND,
            GateError::Conflict(_) | GateError::IllegalTransition(_) => StatusCode::CONFLICT,
            GateError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
        };
        (code, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
