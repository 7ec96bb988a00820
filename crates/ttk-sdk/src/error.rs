//! Error types for the resilient API client

use crate::auth::AuthError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by [`crate::ResilientClient`]
#[derive(Debug, Error)]
pub enum ApiError {
    /// Rejected with 401 even after a forced token refresh
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Still rate limited when the attempt budget ran out
    #[error("Rate limited after {attempts} attempt(s)")]
    RateLimited {
        retry_after: Option<Duration>,
        attempts: u32,
    },

    /// Network failure or 5xx that outlasted the retries
    #[error("Transient failure after {attempts} attempt(s): {cause}")]
    Transient { attempts: u32, cause: String },

    /// Client error other than 401/429, never retried
    #[error("Request failed with status {status}: {body}")]
    Permanent { status: u16, body: String },

    /// No usable token could be obtained before sending
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Invalid request
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// HTTP client construction error
    #[error("HTTP client error: {0}")]
    HttpClient(reqwest::Error),
}

impl ApiError {
    /// Get error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized { .. } => "TTK_API_UNAUTHORIZED",
            ApiError::RateLimited { .. } => "TTK_API_RATE_LIMIT",
            ApiError::Transient { .. } => "TTK_API_TRANSIENT",
            ApiError::Permanent { .. } => "TTK_API_PERMANENT",
            ApiError::Auth(_) => "TTK_API_AUTH_ERROR",
            ApiError::InvalidRequest { .. } => "TTK_API_INVALID_REQUEST",
            ApiError::HttpClient(_) => "TTK_API_HTTP_CLIENT_ERROR",
        }
    }

    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized { .. } => "unauthorized",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Transient { .. } => "transient",
            ApiError::Permanent { .. } => "permanent",
            ApiError::Auth(_) => "auth",
            ApiError::InvalidRequest { .. } => "invalid_request",
            ApiError::HttpClient(_) => "http_client",
        }
    }

    /// Check if the same call may succeed later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited { .. } | ApiError::Transient { .. }
        )
    }

    /// Check if error is a client error
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. }
                | ApiError::Permanent { .. }
                | ApiError::InvalidRequest { .. }
        )
    }
}
