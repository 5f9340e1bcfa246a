//! Error types for the client library.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when calling the search, ingestion, event or token APIs.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Network or HTTP request failure.
    ///
    /// Indicates issues like DNS resolution, connection failures, or socket errors.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Middleware layer error.
    ///
    /// Errors from the retry middleware wrapping the HTTP client.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    /// JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The API rejected the credential (HTTP 401).
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The credential lacks the scope for this call (HTTP 403).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The addressed resource does not exist (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded (HTTP 429).
    #[error("Rate limit exceeded: {retry_after:?}")]
    RateLimitError {
        /// Suggested wait time before retrying, if provided by the API.
        retry_after: Option<Duration>,
    },

    /// API service unavailable (5xx errors).
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Any other non-success status.
    #[error("API error ({status}): {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// Client configuration issue.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The request was rejected before it was sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No domain with this id is configured.
    #[error("Unknown domain: {0}")]
    UnknownDomain(String),
}

impl ClientError {
    /// Builds the error for a non-success HTTP status.
    #[must_use]
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let message = extract_error_message(body);
        match status {
            401 => Self::AuthenticationError(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            429 => Self::RateLimitError { retry_after },
            500..=599 => Self::ServiceUnavailable(message),
            _ => Self::ApiError { status, message },
        }
    }

    /// Check if the API rejected the credential.
    pub const fn is_authentication_error(&self) -> bool {
        matches!(self, Self::AuthenticationError(_) | Self::Forbidden(_))
    }
}

/// Failure to obtain an access token.
///
/// Cloneable so every caller waiting on one coalesced acquisition receives the
/// same outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    /// The generation exchange (API key for a token pair) failed.
    #[error("Token generation failed: {0}")]
    GenerationFailed(String),

    /// The refresh exchange (refresh token for an access token) failed.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// No API key is configured, so there is nothing to exchange.
    #[error("No API key configured")]
    MissingApiKey,

    /// The background acquisition task panicked or was aborted.
    #[error("Token acquisition aborted: {0}")]
    Aborted(String),
}

/// Pulls a human-readable message out of an error body.
///
/// Accepts `{"message": ..}`, `{"error": {"message": ..}}`, `{"error": ..}` and
/// `{"errors": [{"message": ..}]}`, otherwise returns the raw text.
fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    let candidates = [
        value.get("message"),
        value.get("error").and_then(|e| e.get("message")),
        value.get("error"),
        value
            .get("errors")
            .and_then(|e| e.get(0))
            .and_then(|e| e.get("message")),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .map_or_else(|| body.trim().to_string(), str::to_string)
}
