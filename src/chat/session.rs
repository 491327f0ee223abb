//! Chat sessions: identity, lifecycle, and generation settings around a buffer

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::buffer::ConversationBuffer;
use crate::chat::message::{Message, Role};
use crate::error::{ChatStreamError, Result};
use crate::providers::RequestMessage;

/// Model identity and its context ceiling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model identifier sent to the provider (e.g. "gpt-4o-mini")
    pub name: String,
    /// Maximum tokens the retained conversation may occupy
    pub max_tokens: usize,
}

impl ModelSpec {
    /// Creates a model spec
    pub fn new(name: impl Into<String>, max_tokens: usize) -> Self {
        Self {
            name: name.into(),
            max_tokens,
        }
    }
}

/// Generation parameters fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Model and its token ceiling
    pub model: ModelSpec,
    /// Sampling temperature, 0.0 to 2.0
    pub temperature: f32,
    /// Nucleus sampling mass, 0.0 to 1.0
    pub top_p: f32,
    /// Number of completions requested
    pub n: u32,
    /// Sequences that stop generation
    #[serde(default)]
    pub stop: Vec<String>,
    /// Upper bound on generated tokens; provider default when unset
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Presence penalty, -2.0 to 2.0
    pub presence_penalty: f32,
    /// Frequency penalty, -2.0 to 2.0
    pub frequency_penalty: f32,
    /// Keep the initial system message out of eviction
    #[serde(default)]
    pub pin_system_message: bool,
}

impl SessionConfig {
    /// Creates a config for `model` with provider-neutral defaults
    ///
    /// # Examples
    ///
    /// ```
    /// use chatstream::chat::{ModelSpec, SessionConfig};
    ///
    /// let config = SessionConfig::new(ModelSpec::new("gpt-4o-mini", 4096));
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn new(model: ModelSpec) -> Self {
        Self {
            model,
            temperature: 1.0,
            top_p: 1.0,
            n: 1,
            stop: Vec::new(),
            max_tokens: None,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            pin_system_message: false,
        }
    }

    /// Checks parameter ranges
    ///
    /// # Errors
    ///
    /// Returns `ChatStreamError::Validation` naming the first offending field
    pub fn validate(&self) -> Result<()> {
        if self.model.name.trim().is_empty() {
            return Err(ChatStreamError::Validation("model name is empty".to_string()).into());
        }

        if self.model.max_tokens == 0 {
            return Err(ChatStreamError::Validation(
                "model max_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ChatStreamError::Validation(format!(
                "invalid temperature {}: must be between 0 and 2",
                self.temperature
            ))
            .into());
        }

        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ChatStreamError::Validation(format!(
                "invalid top_p {}: must be between 0 and 1",
                self.top_p
            ))
            .into());
        }

        if self.n == 0 {
            return Err(ChatStreamError::Validation("n must be at least 1".to_string()).into());
        }

        for (name, value) in [
            ("presence_penalty", self.presence_penalty),
            ("frequency_penalty", self.frequency_penalty),
        ] {
            if !(-2.0..=2.0).contains(&value) {
                return Err(ChatStreamError::Validation(format!(
                    "invalid {} {}: must be between -2 and 2",
                    name, value
                ))
                .into());
            }
        }

        Ok(())
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Accepts new messages
    Active,
    /// Terminal; rejects new messages
    Ended,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Ended => f.write_str("ended"),
        }
    }
}

/// A bounded conversation between a user and a model
///
/// The session owns its [`ConversationBuffer`] and every message in it.
/// Its [`SessionConfig`] is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: String,
    user_id: String,
    initial_system_message: Message,
    buffer: ConversationBuffer,
    status: SessionStatus,
    config: SessionConfig,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates an active session with a generated id
    ///
    /// # Arguments
    ///
    /// * `user_id` - Owner of the session, must not be empty
    /// * `initial_system_message` - First message, must have the system role
    /// * `config` - Generation parameters
    ///
    /// # Errors
    ///
    /// Returns `ChatStreamError::Validation` on any invalid field, or
    /// `ChatStreamError::OversizedMessage` if the system message alone
    /// exceeds the model ceiling
    pub fn create(
        user_id: impl Into<String>,
        initial_system_message: Message,
        config: SessionConfig,
    ) -> Result<Self> {
        Self::create_with_id(
            Uuid::new_v4().to_string(),
            user_id,
            initial_system_message,
            config,
        )
    }

    /// Creates an active session under a caller-chosen id
    ///
    /// # Errors
    ///
    /// Same as [`Session::create`], plus an empty `id`
    pub fn create_with_id(
        id: impl Into<String>,
        user_id: impl Into<String>,
        initial_system_message: Message,
        config: SessionConfig,
    ) -> Result<Self> {
        let id = id.into();
        let user_id = user_id.into();

        if id.trim().is_empty() {
            return Err(ChatStreamError::Validation("session id is empty".to_string()).into());
        }
        if user_id.trim().is_empty() {
            return Err(ChatStreamError::Validation("user id is empty".to_string()).into());
        }
        if initial_system_message.role() != Role::System {
            return Err(ChatStreamError::Validation(format!(
                "initial message must have the system role, got {}",
                initial_system_message.role()
            ))
            .into());
        }
        config.validate()?;

        let mut buffer = ConversationBuffer::new(config.model.max_tokens);
        if config.pin_system_message {
            buffer.append_pinned(initial_system_message.clone())?;
        } else {
            buffer.append(initial_system_message.clone())?;
        }

        let now = Utc::now();
        Ok(Self {
            id,
            user_id,
            initial_system_message,
            buffer,
            status: SessionStatus::Active,
            config,
            created_at: now,
            updated_at: now,
        })
    }

    /// Adds a message, evicting old messages as needed
    ///
    /// # Returns
    ///
    /// The number of messages evicted to make room
    ///
    /// # Errors
    ///
    /// Returns `ChatStreamError::SessionEnded` once the session has ended,
    /// or the buffer's `OversizedMessage`. The session is unchanged on error.
    pub fn add_message(&mut self, message: Message) -> Result<usize> {
        if self.status == SessionStatus::Ended {
            return Err(ChatStreamError::SessionEnded(self.id.clone()).into());
        }

        let evicted = self.buffer.append(message)?;
        self.updated_at = Utc::now();
        Ok(evicted)
    }

    /// Ends the session; ending an ended session is a no-op
    pub fn end(&mut self) {
        if self.status == SessionStatus::Active {
            self.status = SessionStatus::Ended;
            self.updated_at = Utc::now();
            tracing::info!("Session {} ended", self.id);
        }
    }

    /// Number of messages in the active context window
    pub fn count_retained_messages(&self) -> usize {
        self.buffer.len()
    }

    /// Tokens used by retained messages
    pub fn token_usage(&self) -> usize {
        self.buffer.token_usage()
    }

    /// Retained messages, oldest first
    pub fn messages(&self) -> &[Message] {
        self.buffer.messages()
    }

    /// Messages evicted under budget pressure, oldest first
    pub fn evicted_messages(&self) -> &[Message] {
        self.buffer.evicted()
    }

    /// Retained messages in provider request form
    pub fn to_request_messages(&self) -> Vec<RequestMessage> {
        self.buffer
            .messages()
            .iter()
            .map(|m| RequestMessage {
                role: m.role(),
                content: m.content().to_string(),
            })
            .collect()
    }

    /// The underlying buffer
    pub fn buffer(&self) -> &ConversationBuffer {
        &self.buffer
    }

    /// Session identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Owner of the session
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The system message the session was created with
    pub fn initial_system_message(&self) -> &Message {
        &self.initial_system_message
    }

    /// Lifecycle status
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// True while messages may be added
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Generation parameters
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Creation timestamp
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Timestamp of the last mutation
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
