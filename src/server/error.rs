//! HTTP error responses
//!
//! Bodies are terse and generic. The underlying reason is logged, never returned.

use crate::auth::{AuthError, ErrorKind};
use crate::posts::PostError;
use crate::storage::StorageError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not Found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("Internal Server Error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e.kind() {
            ErrorKind::Unauthenticated => ApiError::Unauthorized,
            ErrorKind::Forbidden => ApiError::Forbidden,
            ErrorKind::NotFound => ApiError::NotFound,
            ErrorKind::Conflict => ApiError::Conflict("conflict".to_string()),
            ErrorKind::Internal => {
                warn!(error = %e, "Auth operation failed");
                ApiError::Internal
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(_) => ApiError::NotFound,
            StorageError::Conflict(_) => ApiError::Conflict("conflict".to_string()),
            StorageError::Database(_) => {
                warn!(error = %e, "Storage operation failed");
                ApiError::Internal
            }
        }
    }
}

impl From<PostError> for ApiError {
    fn from(e: PostError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
