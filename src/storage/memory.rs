use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::chat::Session;
use crate::error::{ChatStreamError, Result};
use crate::storage::{SessionGateway, SessionSummary};

/// Process-local session store
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// True when nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionGateway for InMemorySessionStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn create(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session.id()) {
            return Err(ChatStreamError::Storage(format!(
                "session {} already exists",
                session.id()
            ))
            .into());
        }
        sessions.insert(session.id().to_string(), session.clone());
        Ok(())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.id().to_string(), session.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .read()
            .await
            .values()
            .map(SessionSummary::from_session)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_session;

    fn session(id: &str) -> Session {
        test_session(id, 100)
    }

    #[tokio::test]
    async fn test_create_find_delete() {
        let store = InMemorySessionStore::new();
        assert!(store.is_empty().await);

        store.create(&session("a")).await.unwrap();
        assert!(store.find_by_id("a").await.unwrap().is_some());
        assert!(store.find_by_id("b").await.unwrap().is_none());

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_rejects_existing_id() {
        let store = InMemorySessionStore::new();
        store.create(&session("a")).await.unwrap();
        assert!(store.create(&session("a")).await.is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_save_replaces() {
        let store = InMemorySessionStore::new();
        let mut s = session("a");
        store.save(&s).await.unwrap();
        s.end();
        store.save(&s).await.unwrap();

        let loaded = store.find_by_id("a").await.unwrap().unwrap();
        assert!(!loaded.is_active());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = InMemorySessionStore::new();
        let other = store.clone();
        store.create(&session("shared")).await.unwrap();
        assert!(other.find_by_id("shared").await.unwrap().is_some());
    }
}
