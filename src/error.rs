// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types for the HTTP surface, the sync adapters and the local store.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Failure of a single sync adapter operation.
///
/// Adapter errors never escape the dispatcher; they are logged and recorded
/// as adapter-scoped status text.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// Missing or invalid adapter configuration (credentials, endpoint).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection refused, timeout, broker/network failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend rejected our credentials.
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// The backend answered with an unexpected status or body.
    #[error("API error: {0}")]
    Api(String),

    /// A multi-step operation failed after earlier steps already changed
    /// remote state (for example delete succeeded, insert failed).
    #[error("Partial failure: {0}")]
    PartialFailure(String),
}

impl SyncError {
    /// Build an error from a failed reqwest call.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            SyncError::Transport(err.to_string())
        } else if err.is_decode() {
            SyncError::Api(format!("JSON parse error: {}", err))
        } else {
            SyncError::Api(err.to_string())
        }
    }

    /// Short machine-readable kind, used in status reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Config(_) => "config",
            SyncError::Transport(_) => "transport",
            SyncError::Auth(_) => "auth",
            SyncError::Api(_) => "api",
            SyncError::PartialFailure(_) => "partial_failure",
        }
    }
}

/// Failure talking to the local health-data store.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Local store unavailable: {0}")]
    Unavailable(String),

    #[error("Local store API version {found} is below the supported minimum {minimum}")]
    UnsupportedVersion { found: i64, minimum: i64 },

    #[error("Local store returned malformed data: {0}")]
    Malformed(String),
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Local store error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Gateway(err) => {
                tracing::warn!(error = %err, "Local store error");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "local_store_unavailable",
                    Some(err.to_string()),
                )
            }
            AppError::Sync(err) => (StatusCode::BAD_GATEWAY, "sync_error", Some(err.to_string())),
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
