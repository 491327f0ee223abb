use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;

/// One user turn to run through the orchestrator
#[derive(Debug, Clone)]
pub struct CompletionInput {
    /// Session to continue, or the id to create it under. Empty means "new
    /// session with a generated id".
    pub chat_id: String,
    /// Owner of the session
    pub user_id: String,
    /// Text of the user turn
    pub user_message: String,
    /// Settings used only when the session has to be created
    pub config: CompletionConfig,
}

impl CompletionInput {
    /// Creates an input with the default completion settings
    pub fn new(
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            user_message: user_message.into(),
            config: CompletionConfig::default(),
        }
    }

    /// Replaces the settings used for new sessions
    pub fn with_config(mut self, config: CompletionConfig) -> Self {
        self.config = config;
        self
    }
}

/// Cumulative assistant text for a session
///
/// Every snapshot on the output channel carries the whole reply so far,
/// never just the latest fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionOutput {
    pub chat_id: String,
    pub user_id: String,
    pub content: String,
}

/// Phase of a completion, carried in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Requesting,
    Streaming,
    Finalizing,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::Requesting => "requesting",
            Self::Streaming => "streaming",
            Self::Finalizing => "finalizing",
            Self::Persisting => "persisting",
        };
        f.write_str(name)
    }
}
