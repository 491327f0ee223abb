//! Token counting for message budgets
//!
//! A [`TokenCounter`] turns a model name and a piece of text into the number
//! of budget units that text consumes. Counters are pure: the same model and
//! text always produce the same count.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tiktoken_rs::CoreBPE;

/// Counts the tokens a text costs for a given model
pub trait TokenCounter: Send + Sync {
    /// Returns the token cost of `text` for `model`
    fn count(&self, model: &str, text: &str) -> usize;
}

/// BPE token counter backed by `tiktoken-rs`
///
/// Encoders are built lazily per model and cached. Models unknown to
/// tiktoken are counted with the `cl100k_base` encoding.
#[derive(Default)]
pub struct TiktokenCounter {
    encoders: RwLock<HashMap<String, Arc<CoreBPE>>>,
}

impl TiktokenCounter {
    /// Creates a counter with an empty encoder cache
    pub fn new() -> Self {
        Self::default()
    }

    fn encoder_for(&self, model: &str) -> Option<Arc<CoreBPE>> {
        if let Ok(cache) = self.encoders.read() {
            if let Some(bpe) = cache.get(model) {
                return Some(Arc::clone(bpe));
            }
        }

        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => {
                tracing::debug!("No tiktoken encoding for {}, using cl100k_base", model);
                match tiktoken_rs::cl100k_base() {
                    Ok(bpe) => bpe,
                    Err(e) => {
                        tracing::error!("Failed to load cl100k_base encoding: {}", e);
                        return None;
                    }
                }
            }
        };

        let bpe = Arc::new(bpe);
        if let Ok(mut cache) = self.encoders.write() {
            cache.insert(model.to_string(), Arc::clone(&bpe));
        }
        Some(bpe)
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, model: &str, text: &str) -> usize {
        match self.encoder_for(model) {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            // Encoding tables failed to load; fall back to the heuristic.
            None => estimate_tokens(text),
        }
    }
}

/// Character-based estimate: characters / 4, rounded up
///
/// Approximates GPT tokenization for English text without loading
/// encoding tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, _model: &str, text: &str) -> usize {
        estimate_tokens(text)
    }
}

/// One token per whitespace-separated word
///
/// # Examples
///
/// ```
/// use chatstream::tokenizer::{TokenCounter, WordCounter};
///
/// assert_eq!(WordCounter.count("any-model", "three small words"), 3);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, _model: &str, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Estimates token count for a string using characters / 4
fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}
