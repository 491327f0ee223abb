//! chatstream - Streaming chat completions with bounded conversation memory
//!
//! This library keeps chat sessions inside a model's token budget and runs
//! one user turn at a time through a streaming completion provider,
//! publishing the growing assistant reply as it arrives.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `chat`: Messages, the token-bounded conversation buffer, and sessions
//! - `completion`: The streaming completion orchestrator
//! - `providers`: Provider abstraction and the OpenAI-compatible client
//! - `storage`: Session gateway trait with SQLite and in-memory stores
//! - `tokenizer`: Token counting strategies
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chatstream::completion::{output_channel, ChatCompletionStream, CompletionInput};
//! use chatstream::providers::create_provider;
//! use chatstream::storage::InMemorySessionStore;
//! use chatstream::tokenizer::TiktokenCounter;
//! use chatstream::Config;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let (tx, mut rx) = output_channel(config.stream.channel_capacity);
//!     let engine = ChatCompletionStream::new(
//!         Arc::new(InMemorySessionStore::new()),
//!         Arc::from(create_provider(&config.provider)?),
//!         Arc::new(TiktokenCounter::new()),
//!         tx,
//!     );
//!
//!     tokio::spawn(async move {
//!         while let Some(snapshot) = rx.recv().await {
//!             println!("{}", snapshot.content);
//!         }
//!     });
//!
//!     let input = CompletionInput::new("chat-1", "alice", "Hello!");
//!     let output = engine.execute(input, CancellationToken::new()).await?;
//!     println!("final: {}", output.content);
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod cli;
pub mod commands;
pub mod completion;
pub mod config;
pub mod error;
pub mod providers;
pub mod storage;
pub mod tokenizer;

// Re-export commonly used types
pub use chat::{Message, Role, Session, SessionConfig};
pub use completion::{ChatCompletionStream, CompletionInput, CompletionOutput};
pub use config::Config;
pub use error::{ChatStreamError, Result};

#[cfg(test)]
pub mod test_utils;
