//! Chat domain: messages, the token-bounded buffer, and sessions
//!
//! A [`Session`] owns a [`ConversationBuffer`] that keeps the retained
//! context window within the model's token ceiling.

pub mod buffer;
pub mod message;
pub mod session;

pub use buffer::{ContextInfo, ConversationBuffer};
pub use message::{Message, Role};
pub use session::{ModelSpec, Session, SessionConfig, SessionStatus};
