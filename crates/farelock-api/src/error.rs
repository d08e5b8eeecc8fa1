//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use farelock_issuer::IssuanceError;
use farelock_verify::VerifyError;
use serde_json::json;
use tracing::error;

/// Errors a handler can answer with.
#[derive(Debug)]
pub enum ApiError {
    /// Resource does not exist.
    NotFound(String),
    /// Request was malformed or failed validation.
    Validation(String),
    /// Something failed on our side.
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Validation(message) => (StatusCode::BAD_REQUEST, message),
            Self::Internal(source) => {
                error!(error = %source, "internal error handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            },
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<IssuanceError> for ApiError {
    fn from(error: IssuanceError) -> Self {
        match error {
            IssuanceError::MissingClaim { .. }
            | IssuanceError::InvalidWindow { .. }
            | IssuanceError::Serialization(_) => Self::Validation(error.to_string()),
            other => Self::Internal(other.into()),
        }
    }
}

impl From<VerifyError> for ApiError {
    fn from(error: VerifyError) -> Self {
        Self::Internal(error.into())
    }
}

impl From<farelock_core::StorageError> for ApiError {
    fn from(error: farelock_core::StorageError) -> Self {
        Self::Internal(error.into())
    }
}
