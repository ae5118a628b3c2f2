//! Error types for the gateway client.

use std::time::Duration;

/// Gateway and artifact-store errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Resource not found (unknown bounty, missing artifact index).
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Account not authorized for the requested operation.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Rate limit exceeded.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Gateway refused the request (4xx other than the ones above).
    #[error("rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Network error or 5xx.
    #[error("network error: {message}")]
    Network { message: String },

    /// Response body did not match the expected envelope.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Artifact identifier or artifact metadata failed validation.
    #[error("invalid artifact {uri}: {reason}")]
    InvalidArtifact { uri: String, reason: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl GatewayError {
    /// Whether the error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network { .. })
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
