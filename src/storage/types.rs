use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::{Session, SessionStatus};

/// Listing metadata for a stored session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier
    pub id: String,
    /// Owner of the session
    pub user_id: String,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Model the session talks to
    pub model: String,
    /// Number of retained messages
    pub message_count: usize,
    /// Tokens used by retained messages
    pub token_usage: usize,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session was last updated
    pub updated_at: DateTime<Utc>,
}

impl SessionSummary {
    /// Summarizes a session
    pub fn from_session(session: &Session) -> Self {
        Self {
            id: session.id().to_string(),
            user_id: session.user_id().to_string(),
            status: session.status(),
            model: session.config().model.name.clone(),
            message_count: session.count_retained_messages(),
            token_usage: session.token_usage(),
            created_at: session.created_at(),
            updated_at: session.updated_at(),
        }
    }
}
