//! Immutable conversational turns

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ChatStreamError, Result};
use crate::tokenizer::TokenCounter;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the conversation
    System,
    /// The human side of the conversation
    User,
    /// Model output
    Assistant,
}

impl Role {
    /// Returns the wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ChatStreamError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(ChatStreamError::Validation(format!(
                "invalid role: {}",
                other
            ))),
        }
    }
}

/// A single turn in a session
///
/// Messages are immutable once created. The token cost is computed once,
/// at creation, for the model of the session the message belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: Uuid,
    role: Role,
    content: String,
    token_cost: usize,
    created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a message and computes its token cost
    ///
    /// # Arguments
    ///
    /// * `role` - Author of the message
    /// * `content` - Message text, must not be empty
    /// * `model` - Model whose tokenizer prices the content
    /// * `counter` - Token counter for `model`
    ///
    /// # Errors
    ///
    /// Returns `ChatStreamError::Validation` if the content is empty
    ///
    /// # Examples
    ///
    /// ```
    /// use chatstream::chat::{Message, Role};
    /// use chatstream::tokenizer::WordCounter;
    ///
    /// let msg = Message::create(Role::User, "hello there", "gpt-4", &WordCounter).unwrap();
    /// assert_eq!(msg.role(), Role::User);
    /// assert_eq!(msg.token_cost(), 2);
    /// ```
    pub fn create(
        role: Role,
        content: impl Into<String>,
        model: &str,
        counter: &dyn TokenCounter,
    ) -> Result<Self> {
        let content = content.into();
        let token_cost = counter.count(model, &content);

        let message = Self {
            id: Uuid::new_v4(),
            role,
            content,
            token_cost,
            created_at: Utc::now(),
        };

        message.validate()?;
        Ok(message)
    }

    /// Creates a message from a textual role such as `"user"`
    ///
    /// # Errors
    ///
    /// Returns `ChatStreamError::Validation` for unknown roles or empty content
    pub fn create_from_str(
        role: &str,
        content: impl Into<String>,
        model: &str,
        counter: &dyn TokenCounter,
    ) -> Result<Self> {
        let role: Role = role.parse()?;
        Self::create(role, content, model, counter)
    }

    /// Checks the message invariants
    pub fn validate(&self) -> Result<()> {
        if self.content.is_empty() {
            return Err(ChatStreamError::Validation("content is empty".to_string()).into());
        }

        if self.created_at.timestamp() == 0 && self.created_at.timestamp_subsec_nanos() == 0 {
            return Err(ChatStreamError::Validation("invalid created at".to_string()).into());
        }

        Ok(())
    }

    /// Unique identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Author of the message
    pub fn role(&self) -> Role {
        self.role
    }

    /// Wire name of the author's role
    pub fn role_str(&self) -> &'static str {
        self.role.as_str()
    }

    /// Message text
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Tokens this message occupies in the context window
    pub fn token_cost(&self) -> usize {
        self.token_cost
    }

    /// When the message was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
