// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Administrator access required")]
    AdminRequired,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("Assistant API error: {0}")]
    AssistantApi(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Remediation text shown alongside permission failures.
    pub const PERMISSION_REMEDIATION: &'static str =
        "Ask an administrator to approve your account, or check that the document store \
         security rules grant this identity access to the collection.";

    /// Build a database error, promoting store-side permission failures so
    /// they reach the user with remediation instead of a generic 500.
    pub fn from_store(err: impl std::fmt::Display) -> Self {
        let msg = err.to_string();
        if msg.contains("PERMISSION_DENIED") || msg.contains("PermissionDenied") {
            AppError::PermissionDenied(msg)
        } else {
            AppError::Database(msg)
        }
    }

    /// Check if this error is a permission/rule failure.
    pub fn is_permission_error(&self) -> bool {
        matches!(self, AppError::PermissionDenied(_) | AppError::AdminRequired)
    }
}

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<&'static str>,
}

impl AppError {
    fn classify(&self) -> (StatusCode, &'static str, Option<String>) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::AdminRequired => (StatusCode::FORBIDDEN, "admin_required", None),
            AppError::PermissionDenied(msg) => {
                (StatusCode::FORBIDDEN, "permission_denied", Some(msg.clone()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::MissingCredential(name) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "missing_credential",
                Some(format!("{} is not configured", name)),
            ),
            AppError::AssistantApi(msg) => {
                (StatusCode::BAD_GATEWAY, "assistant_error", Some(msg.clone()))
            }
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None),
        }
    }

    /// Body sent to clients, over HTTP or as a stream `error` event.
    pub fn body(&self) -> ErrorResponse {
        let (_, error, details) = self.classify();
        ErrorResponse {
            error: error.to_string(),
            details,
            remediation: self
                .is_permission_error()
                .then_some(Self::PERMISSION_REMEDIATION),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::PermissionDenied(msg) => tracing::warn!(error = %msg, "Permission denied"),
            AppError::MissingCredential(name) => {
                tracing::error!(credential = name, "Missing credential")
            }
            AppError::Database(msg) => tracing::error!(error = %msg, "Database error"),
            AppError::Internal(err) => tracing::error!(error = %err, "Internal server error"),
            _ => {}
        }

        let (status, _, _) = self.classify();
        (status, Json(self.body())).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
