//! Unified error handling for the API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::routes::envelope::ApiResponse;
use crate::services::{ProcessingError, SyncError};
use crate::zoho::ZohoError;

/// Application-level error type for the JSON API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Zoho API operation failed.
    #[error("Zoho error: {0}")]
    Zoho(#[from] ZohoError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request conflicts with current state.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::AlreadyRunning => Self::Conflict(err.to_string()),
            SyncError::Listing(e) => Self::Zoho(e),
            SyncError::Processing(e) => e.into(),
        }
    }
}

impl From<ProcessingError> for AppError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::NotFound(key) => Self::NotFound(format!("inventory adjustment {key}")),
            ProcessingError::Repository(e) => Self::Database(e),
        }
    }
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Database(RepositoryError::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(RepositoryError::Conflict(_)) | Self::Conflict(_) => {
                StatusCode::CONFLICT
            }
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Zoho(_) => StatusCode::BAD_GATEWAY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "API request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(RepositoryError::NotFound) => "Not found".to_string(),
            Self::Database(RepositoryError::Conflict(detail)) => detail.clone(),
            Self::Database(_) => "Internal server error".to_string(),
            Self::Zoho(ZohoError::RateLimited(secs)) => {
                format!("Zoho rate limit reached, retry after {secs} seconds")
            }
            Self::Zoho(_) => "External service error".to_string(),
            _ => self.to_string(),
        };

        (status, Json(ApiResponse::<()>::failure(message))).into_response()
    }
}
