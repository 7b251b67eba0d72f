//! Error handling

use axum::{
    response::{IntoResponse, Response},
    http::{header, HeaderValue, StatusCode},
    Json,
};
use serde_json::json;

use crawlguard_core::{RateCheck, StoreError, SyncError, ValidationError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Auth errors
    #[error("admin key required")]
    Unauthorized,
    #[error("identity is blocked: {0}")]
    Forbidden(String),

    // Resource errors
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),

    // Validation errors
    #[error("{0}")]
    ValidationError(String),

    // Throttling
    #[error("rate limit exceeded")]
    RateLimited(RateCheck),

    // Storage errors
    #[error("storage: {0}")]
    StorageError(String),

    // External service errors
    #[error("sync: {0}")]
    SyncError(String),

    // Generic errors
    #[error("internal: {0}")]
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::RateLimited(check) = &self {
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Rate limit exceeded",
                    "status": StatusCode::TOO_MANY_REQUESTS.as_u16(),
                    "limit_type": check.limit_type,
                    "retry_after": check.retry_after,
                })),
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(check.retry_after));
            return response;
        }

        let (status, error_message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Admin key required".to_string()),
            AppError::Forbidden(identity) => (StatusCode::FORBIDDEN, format!("Identity {} is blocked", identity)),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::StorageError(msg) => {
                tracing::error!("Storage error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error occurred".to_string())
            }
            AppError::SyncError(msg) => {
                tracing::error!("Sync error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded".to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::StorageError(other.to_string()),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::AlreadyRunning => AppError::Conflict(err.to_string()),
            SyncError::Storage(e) => e.into(),
            other => AppError::SyncError(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalError(format!("blocking task failed: {}", err))
    }
}
