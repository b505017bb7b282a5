use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::canvas::{CanvasError, RenderError};
use crate::utils::{error_codes, error_to_api_response};

/// The backing store failed or refused the request.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("user {0} does not exist")]
    UnknownUser(i64),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuotaError {
    #[error("quota limit must be at least 1")]
    ZeroLimit,

    #[error("quota window must be positive")]
    EmptyWindow,

    #[error("quota subject must not be empty")]
    EmptySubject,
}

/// Everything a handler can fail with.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Canvas(#[from] CanvasError),

    #[error("authentication required")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    TooLarge(String),

    #[error("{message}")]
    RateLimited {
        message: String,
        retry_at: Option<DateTime<Utc>>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to issue token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Validation(_) | AppError::Canvas(_) => {
                (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR)
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, error_codes::AUTH_FAILED),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND),
            AppError::Conflict(_) => (StatusCode::CONFLICT, error_codes::CONFLICT),
            AppError::TooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, error_codes::TOO_LARGE),
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, error_codes::RATE_LIMIT),
            AppError::Store(_) | AppError::Render(_) | AppError::Token(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR)
            }
        };

        match self {
            AppError::RateLimited {
                message,
                retry_at: Some(retry_at),
            } => {
                let mut body = error_to_api_response::<serde_json::Value>(code, message);
                body.resp_data = Some(serde_json::json!({ "retry_at": retry_at }));
                (status, body).into_response()
            }
            err if status.is_server_error() => {
                tracing::error!(error = %err, "request failed");
                (
                    status,
                    error_to_api_response::<serde_json::Value>(code, "internal server error".to_string()),
                )
                    .into_response()
            }
            err => (
                status,
                error_to_api_response::<serde_json::Value>(code, err.to_string()),
            )
                .into_response(),
        }
    }
}
