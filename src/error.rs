//! Error types for feed operations
//!
//! Errors are classified by recoverability:
//! - Retryable: network issues, timeouts, rate limits, 5xx responses
//! - NonRetryable: malformed payloads, configuration errors, local IO
//!
//! None of these are fatal. Callers log them, surface a [`FeedNotice`],
//! and leave committed state untouched.

use std::path::PathBuf;
use thiserror::Error;

/// Error types for transport, configuration, and persistence
#[derive(Debug, Error)]
pub enum FeedError {
    // Retryable errors
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    // Non-retryable errors
    #[error("Malformed payload: {0}")]
    Payload(String),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file not found at {0}")]
    ConfigNotFound(PathBuf),

    #[error("Unknown timezone: {0}")]
    Timezone(String),
}

impl FeedError {
    /// Returns true if repeating the same action may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Http(e) => e.is_timeout() || e.is_connect(),
            FeedError::Status { status, .. } => Self::is_retryable_status(*status),
            _ => false,
        }
    }

    /// Timeouts, throttling and server errors.
    pub fn is_retryable_status(status: u16) -> bool {
        status == 408 || status == 429 || (500..600).contains(&status)
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            FeedError::Http(_) => "Check your connection and try again.",
            FeedError::Status { status, .. } if *status == 429 => {
                "The server is busy. Wait a moment and try again."
            }
            FeedError::Status { .. } => "The server could not complete the request. Try again.",
            FeedError::Payload(_) | FeedError::Json(_) => {
                "The server sent an unexpected response. Try again later."
            }
            FeedError::Io(_) => "Check file permissions and disk space.",
            FeedError::Config(_) | FeedError::ConfigNotFound(_) => {
                "Check your configuration in ~/.wirefeed/config.json"
            }
            FeedError::Timezone(_) => "Use an IANA timezone name such as Europe/Prague.",
        }
    }
}

/// Serializable, non-fatal notice handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedNotice {
    pub message: String,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

impl From<&FeedError> for FeedNotice {
    fn from(err: &FeedError) -> Self {
        FeedNotice {
            message: err.to_string(),
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
