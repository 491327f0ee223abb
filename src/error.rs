//! Error types for chatstream
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling. Each completion stage
//! fails with its own variant so callers can decide whether to retry.

use thiserror::Error;

/// Main error type for chatstream operations
///
/// Covers message and session validation, token budget violations,
/// gateway and provider failures, and the ambient configuration and
/// storage errors of the binary.
#[derive(Error, Debug)]
pub enum ChatStreamError {
    /// Malformed message or session fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// A single message costs more tokens than the session can ever hold
    #[error("Message too large: costs {cost} tokens, limit is {limit}")]
    OversizedMessage {
        /// Token cost of the rejected message
        cost: usize,
        /// Tokens available to evictable messages
        limit: usize,
    },

    /// Attempted mutation of a session that has ended
    #[error("Session {0} has ended; no more messages allowed")]
    SessionEnded(String),

    /// Gateway lookup failed for a reason other than "not found"
    #[error("Session lookup failed: {0}")]
    SessionLookup(String),

    /// A new session could not be constructed from the completion config
    #[error("Could not create session: {0}")]
    SessionCreation(String),

    /// A user or assistant message failed validation
    #[error("Could not create message: {0}")]
    MessageCreation(String),

    /// Gateway create/save failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The provider request could not be sent or was refused
    #[error("Provider request failed: {0}")]
    ProviderRequest(String),

    /// The provider stream failed after it started
    #[error("Streaming error: {0}")]
    Streaming(String),

    /// The caller canceled the invocation
    #[error("Completion canceled")]
    Canceled,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ChatStreamError {
    /// Whether a caller may reasonably retry the failed operation
    ///
    /// Gateway and transport failures are transient from the core's point
    /// of view. Input problems and cancellation are not.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatstream::error::ChatStreamError;
    ///
    /// assert!(ChatStreamError::Persistence("locked".into()).is_retryable());
    /// assert!(!ChatStreamError::Canceled.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SessionLookup(_)
                | Self::Persistence(_)
                | Self::ProviderRequest(_)
                | Self::Streaming(_)
                | Self::Storage(_)
                | Self::Http(_)
        )
    }
}

/// Result type alias for chatstream operations
///
/// Uses `anyhow::Error` so context can be attached on the way up. The
/// originating [`ChatStreamError`] is recovered with `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

/// Extracts the [`ChatStreamError`] carried by an `anyhow::Error`, if any
pub fn as_chat_error(err: &anyhow::Error) -> Option<&ChatStreamError> {
    err.downcast_ref::<ChatStreamError>()
}
