//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::audit::PersistenceError;
use crate::domain::ComplianceError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Compliance check not found: {0}")]
    CheckNotFound(String),

    // Core errors
    #[error(transparent)]
    Compliance(#[from] ComplianceError),

    // Server errors (5xx)
    #[error("Audit store error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 404 Not Found
            AppError::CheckNotFound(id) => {
                (StatusCode::NOT_FOUND, "check_not_found", Some(id.clone()))
            }

            AppError::Compliance(err) => match err {
                ComplianceError::Validation(v) => {
                    (StatusCode::BAD_REQUEST, "validation_error", Some(v.field.to_string()))
                }
                // 503: nothing was recorded, the caller should retry
                ComplianceError::Persistence(msg) => {
                    tracing::error!("Persistence error: {}", msg);
                    (StatusCode::SERVICE_UNAVAILABLE, "persistence_error", None)
                }
                ComplianceError::Internal(msg) => {
                    tracing::error!("Internal error: {}", msg);
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
                }
            },

            // 5xx
            AppError::Persistence(e) => {
                tracing::error!("Audit store error: {:?}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "persistence_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
