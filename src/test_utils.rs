//! Test utilities for chatstream
//!
//! Fixtures for messages and sessions whose token costs are exact under
//! [`WordCounter`].

use crate::chat::{Message, ModelSpec, Role, Session, SessionConfig};
use crate::tokenizer::WordCounter;

/// Model name used by fixtures
pub const TEST_MODEL: &str = "test-model";

/// Text that costs exactly `n` tokens under [`WordCounter`]
pub fn words(n: usize) -> String {
    vec!["w"; n].join(" ")
}

/// A message of `role` costing exactly `cost` tokens
///
/// # Panics
///
/// Panics if `cost` is zero, since the content would be empty
pub fn message_with_cost(role: Role, cost: usize) -> Message {
    Message::create(role, words(cost), TEST_MODEL, &WordCounter)
        .expect("Failed to create test message")
}

/// An active session with a 10-token system prompt
pub fn test_session(id: &str, max_tokens: usize) -> Session {
    Session::create_with_id(
        id,
        "test-user",
        message_with_cost(Role::System, 10),
        SessionConfig::new(ModelSpec::new(TEST_MODEL, max_tokens)),
    )
    .expect("Failed to create test session")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_costs_are_exact() {
        assert_eq!(message_with_cost(Role::User, 7).token_cost(), 7);
        let session = test_session("fixture", 100);
        assert_eq!(session.token_usage(), 10);
        assert_eq!(session.user_id(), "test-user");
    }
}
