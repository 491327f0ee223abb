//! Token-bounded conversation buffer
//!
//! The buffer keeps the messages that form the active context window and
//! evicts the oldest ones whenever the retained token total would exceed
//! the model ceiling. Evicted messages are kept, in removal order, for
//! history and audit; they are never sent to a provider again.

use serde::{Deserialize, Serialize};

use crate::chat::message::Message;
use crate::error::{ChatStreamError, Result};

/// Information about the current context window status
///
/// Provides context window metrics including maximum tokens, tokens used,
/// remaining tokens, and percentage of context utilized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextInfo {
    /// Maximum tokens available for this context
    pub max_tokens: usize,
    /// Tokens used by retained messages
    pub used_tokens: usize,
    /// Tokens remaining in the context window
    pub remaining_tokens: usize,
    /// Percentage of context window used (0.0-100.0)
    pub percentage_used: f64,
}

impl ContextInfo {
    /// Create a new ContextInfo instance
    ///
    /// # Examples
    ///
    /// ```
    /// use chatstream::chat::ContextInfo;
    ///
    /// let context = ContextInfo::new(8192, 1000);
    /// assert_eq!(context.remaining_tokens, 7192);
    /// assert!(context.percentage_used > 12.0 && context.percentage_used < 13.0);
    /// ```
    pub fn new(max_tokens: usize, used_tokens: usize) -> Self {
        let used_tokens = used_tokens.min(max_tokens);
        let remaining_tokens = max_tokens - used_tokens;
        let percentage_used = if max_tokens == 0 {
            0.0
        } else {
            (used_tokens as f64 / max_tokens as f64) * 100.0
        };

        Self {
            max_tokens,
            used_tokens,
            remaining_tokens,
            percentage_used,
        }
    }
}

/// Sliding window of messages bounded by a token ceiling
///
/// # Eviction
///
/// On every [`append`](Self::append) the new message goes to the back of the
/// retained sequence. While the retained total exceeds `max_tokens`, the
/// oldest evictable message moves from the front of `retained` to the back
/// of `evicted`. The first `pinned` messages are never evictable, and
/// neither is the message being inserted: a message that could not fit even
/// after every evictable message is gone is rejected up front with
/// [`ChatStreamError::OversizedMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "BufferRecord")]
pub struct ConversationBuffer {
    retained: Vec<Message>,
    evicted: Vec<Message>,
    #[serde(skip_serializing)]
    token_usage: usize,
    max_tokens: usize,
    pinned: usize,
}

/// Serialized form; the usage cache is rebuilt on load
#[derive(Deserialize)]
struct BufferRecord {
    retained: Vec<Message>,
    #[serde(default)]
    evicted: Vec<Message>,
    max_tokens: usize,
    #[serde(default)]
    pinned: usize,
}

impl From<BufferRecord> for ConversationBuffer {
    fn from(record: BufferRecord) -> Self {
        let mut buffer = Self {
            pinned: record.pinned.min(record.retained.len()),
            retained: record.retained,
            evicted: record.evicted,
            token_usage: 0,
            max_tokens: record.max_tokens,
        };
        buffer.recompute_token_usage();
        buffer
    }
}

impl ConversationBuffer {
    /// Creates an empty buffer with the given ceiling
    ///
    /// # Examples
    ///
    /// ```
    /// use chatstream::chat::ConversationBuffer;
    ///
    /// let buffer = ConversationBuffer::new(8000);
    /// assert_eq!(buffer.token_usage(), 0);
    /// assert_eq!(buffer.remaining_tokens(), 8000);
    /// ```
    pub fn new(max_tokens: usize) -> Self {
        Self {
            retained: Vec::new(),
            evicted: Vec::new(),
            token_usage: 0,
            max_tokens,
            pinned: 0,
        }
    }

    /// Appends a message, evicting the oldest messages until it fits
    ///
    /// # Returns
    ///
    /// The number of messages evicted by this call
    ///
    /// # Errors
    ///
    /// Returns `ChatStreamError::OversizedMessage` when the message alone
    /// exceeds the capacity left after pinned messages. The buffer is not
    /// modified in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatstream::chat::{ConversationBuffer, Message, Role};
    /// use chatstream::tokenizer::WordCounter;
    ///
    /// let mut buffer = ConversationBuffer::new(3);
    /// let first = Message::create(Role::User, "one two", "m", &WordCounter).unwrap();
    /// let second = Message::create(Role::Assistant, "three four", "m", &WordCounter).unwrap();
    ///
    /// assert_eq!(buffer.append(first).unwrap(), 0);
    /// assert_eq!(buffer.append(second).unwrap(), 1);
    /// assert_eq!(buffer.token_usage(), 2);
    /// assert_eq!(buffer.evicted().len(), 1);
    /// ```
    pub fn append(&mut self, message: Message) -> Result<usize> {
        let cost = message.token_cost();
        let limit = self.evictable_capacity();
        if cost > limit {
            return Err(ChatStreamError::OversizedMessage { cost, limit }.into());
        }

        self.retained.push(message);
        self.token_usage += cost;

        let newest = self.retained.len() - 1;
        let mut usage = self.token_usage;
        let mut evict_count = 0;
        for candidate in &self.retained[self.pinned..newest] {
            if usage <= self.max_tokens {
                break;
            }
            usage -= candidate.token_cost();
            evict_count += 1;
        }

        if evict_count > 0 {
            let removed = self.retained.drain(self.pinned..self.pinned + evict_count);
            self.evicted.extend(removed);
            tracing::debug!(
                "Evicted {} message(s); usage {} -> {} of {}",
                evict_count,
                self.token_usage,
                usage,
                self.max_tokens
            );
        }
        self.token_usage = usage;

        Ok(evict_count)
    }

    /// Appends a message that will never be evicted
    ///
    /// Pinned messages must form a prefix of the retained sequence, so this
    /// is only allowed while every retained message is already pinned.
    ///
    /// # Errors
    ///
    /// Returns `ChatStreamError::Validation` if unpinned messages are already
    /// retained, or `ChatStreamError::OversizedMessage` if it cannot fit.
    pub fn append_pinned(&mut self, message: Message) -> Result<()> {
        if self.pinned != self.retained.len() {
            return Err(ChatStreamError::Validation(
                "pinned messages must precede all other messages".to_string(),
            )
            .into());
        }

        self.append(message)?;
        self.pinned += 1;
        Ok(())
    }

    /// Tokens that unpinned messages may occupy
    fn evictable_capacity(&self) -> usize {
        let pinned_tokens: usize = self.retained[..self.pinned]
            .iter()
            .map(Message::token_cost)
            .sum();
        self.max_tokens.saturating_sub(pinned_tokens)
    }

    /// Recomputes the usage cache from the retained messages
    ///
    /// # Returns
    ///
    /// The recomputed total
    pub fn recompute_token_usage(&mut self) -> usize {
        self.token_usage = self.retained.iter().map(Message::token_cost).sum();
        self.token_usage
    }

    /// Sum of token costs over retained messages
    pub fn token_usage(&self) -> usize {
        self.token_usage
    }

    /// Retained messages, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.retained
    }

    /// Evicted messages, in the order they were removed
    pub fn evicted(&self) -> &[Message] {
        &self.evicted
    }

    /// Number of leading messages exempt from eviction
    pub fn pinned(&self) -> usize {
        self.pinned
    }

    /// The token ceiling
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Returns the number of tokens remaining before hitting the ceiling
    pub fn remaining_tokens(&self) -> usize {
        self.max_tokens.saturating_sub(self.token_usage)
    }

    /// Returns the number of retained messages
    pub fn len(&self) -> usize {
        self.retained.len()
    }

    /// Returns true if no messages are retained
    pub fn is_empty(&self) -> bool {
        self.retained.is_empty()
    }

    /// Context window metrics for display
    pub fn context_info(&self) -> ContextInfo {
        ContextInfo::new(self.max_tokens, self.token_usage)
    }
}
