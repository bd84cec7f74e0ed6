//! Error types for se-api

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use se_core::DirectoryError;
use se_sync::SyncError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication failed")]
    AuthFailed,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Store error: {0}")]
    Store(#[from] se_core::Error),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
}

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::AuthFailed => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) | ApiError::Sync(SyncError::InvalidSampleSize) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Sync(_) | ApiError::Store(_) | ApiError::Directory(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

/// Result type alias for se-api
pub type Result<T> = std::result::Result<T, ApiError>;
