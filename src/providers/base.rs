//! Base provider trait and common request/response types
//!
//! This module defines the [`Provider`] trait that completion backends
//! implement, along with the request shape sent to them and the incremental
//! deltas they stream back.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::chat::{Role, Session};
use crate::error::Result;

/// A role/content pair as sent to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    /// Author of the message
    pub role: Role,
    /// Message text
    pub content: String,
}

/// Streaming chat completion request
///
/// Serializes to the OpenAI `/chat/completions` request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// Conversation so far, oldest first
    pub messages: Vec<RequestMessage>,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling mass
    pub top_p: f32,
    /// Number of completions
    pub n: u32,
    /// Stop sequences
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// Upper bound on generated tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Presence penalty
    pub presence_penalty: f32,
    /// Frequency penalty
    pub frequency_penalty: f32,
    /// Always true for this crate
    pub stream: bool,
}

impl CompletionRequest {
    /// Builds a streaming request from a session's retained messages and config
    ///
    /// # Examples
    ///
    /// ```
    /// use chatstream::chat::{Message, ModelSpec, Role, Session, SessionConfig};
    /// use chatstream::providers::CompletionRequest;
    /// use chatstream::tokenizer::WordCounter;
    ///
    /// let system = Message::create(Role::System, "Be brief.", "gpt-4o-mini", &WordCounter).unwrap();
    /// let config = SessionConfig::new(ModelSpec::new("gpt-4o-mini", 4096));
    /// let session = Session::create("user-1", system, config).unwrap();
    ///
    /// let request = CompletionRequest::from_session(&session);
    /// assert!(request.stream);
    /// assert_eq!(request.messages.len(), 1);
    /// assert_eq!(request.model, "gpt-4o-mini");
    /// ```
    pub fn from_session(session: &Session) -> Self {
        let config = session.config();

        Self {
            model: config.model.name.clone(),
            messages: session.to_request_messages(),
            temperature: config.temperature,
            top_p: config.top_p,
            n: config.n,
            stop: config.stop.clone(),
            max_tokens: config.max_tokens,
            presence_penalty: config.presence_penalty,
            frequency_penalty: config.frequency_penalty,
            stream: true,
        }
    }
}

/// One incremental fragment of a streamed completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionDelta {
    /// Text appended by this fragment; may be empty for role or keep-alive frames
    pub content: String,
    /// Set on the final fragment of a choice
    pub finish_reason: Option<String>,
}

impl CompletionDelta {
    /// Creates a delta carrying only text
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: None,
        }
    }
}

/// Stream of deltas; the stream ending is the end-of-stream signal
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<CompletionDelta>> + Send>>;

/// Provider trait for streaming completion backends
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use chatstream::error::Result;
/// use chatstream::providers::{CompletionDelta, CompletionRequest, DeltaStream, Provider};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Provider for Echo {
///     async fn stream_completion(&self, request: CompletionRequest) -> Result<DeltaStream> {
///         let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
///         Ok(Box::pin(futures::stream::iter(vec![Ok::<_, anyhow::Error>(
///             CompletionDelta::text(last),
///         )])))
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Starts a streaming completion
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent or is refused.
    /// Failures after the stream has started arrive as stream items.
    async fn stream_completion(&self, request: CompletionRequest) -> Result<DeltaStream>;

    /// Short provider name for logs
    fn name(&self) -> &str {
        "provider"
    }
}
