//! Session storage gateways
//!
//! The completion orchestrator only depends on the [`SessionGateway`] trait.
//! Two implementations ship with the crate: [`SqliteSessionStore`] for the
//! binary and [`InMemorySessionStore`] for tests and embedding.
//!
//! Concurrent writers to the same session id are not coordinated here:
//! both stores are last-write-wins.

use async_trait::async_trait;

use crate::chat::Session;
use crate::error::Result;

pub mod memory;
pub mod sqlite;
pub mod types;

pub use memory::InMemorySessionStore;
pub use sqlite::SqliteSessionStore;
pub use types::SessionSummary;

/// Persistence boundary for sessions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionGateway: Send + Sync {
    /// Loads a session; `Ok(None)` when no session has this id
    async fn find_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Stores a session that does not exist yet
    ///
    /// # Errors
    ///
    /// Fails if a session with the same id already exists
    async fn create(&self, session: &Session) -> Result<()>;

    /// Stores a session, replacing any previous version
    async fn save(&self, session: &Session) -> Result<()>;

    /// Summaries of all sessions, most recently updated first
    async fn list(&self) -> Result<Vec<SessionSummary>>;

    /// Removes a session; returns whether anything was removed
    async fn delete(&self, id: &str) -> Result<bool>;
}
