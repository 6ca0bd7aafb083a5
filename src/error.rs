// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for sign-in, registration and session handling

use crate::limiter::ThrottleError;
use crate::users::DirectoryError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required field was empty
    #[error("{0}")]
    MissingParameters(String),

    /// Unknown user or wrong password; never says which
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Please try again in {retry_after_secs} seconds")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("{0}")]
    Registration(String),

    #[error("{0}")]
    Validation(String),

    /// Form token absent from the session or different from it
    #[error("Anti-CSRF token mismatch")]
    TokenMismatch,

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Invalid throttle quota: {0}")]
    InvalidQuota(String),
}

impl From<ThrottleError> for AuthError {
    fn from(err: ThrottleError) -> Self {
        match err {
            ThrottleError::TooManyRequests { retry_after_secs } => {
                Self::TooManyRequests { retry_after_secs }
            }
            ThrottleError::InvalidQuota(msg) => Self::InvalidQuota(msg),
            ThrottleError::Persistence(e) => Self::Persistence(e.to_string()),
        }
    }
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Duplicate => Self::Registration(err.to_string()),
            other => Self::Persistence(other.to_string()),
        }
    }
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingParameters(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Registration(_) => StatusCode::CONFLICT,
            Self::TokenMismatch => StatusCode::FORBIDDEN,
            Self::Persistence(_) | Self::Hashing(_) | Self::InvalidQuota(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingParameters(_) => "MISSING_PARAMETERS",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TooManyRequests { .. } => "RATE_LIMITED",
            Self::Registration(_) => "REGISTRATION_FAILED",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::TokenMismatch => "TOKEN_MISMATCH",
            Self::Persistence(_) | Self::Hashing(_) | Self::InvalidQuota(_) => "INTERNAL",
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(ErrorResponse {
            error,
            code: self.code(),
            retry_after_secs: match self {
                Self::TooManyRequests { retry_after_secs } => Some(retry_after_secs),
                _ => None,
            },
        });

        match self {
            Self::TooManyRequests { retry_after_secs } => (
                status,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AuthError>;
