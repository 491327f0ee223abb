//! Provider module for chatstream
//!
//! This module contains the streaming provider abstraction and the
//! OpenAI-compatible implementation.

pub mod base;
pub mod openai;

pub use base::{CompletionDelta, CompletionRequest, DeltaStream, Provider, RequestMessage};
pub use openai::OpenAiProvider;

use crate::config::ProviderConfig;
use crate::error::Result;

/// Create the configured provider instance
///
/// # Errors
///
/// Returns error if provider initialization fails
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn Provider>> {
    Ok(Box::new(OpenAiProvider::new(config.clone())?))
}
