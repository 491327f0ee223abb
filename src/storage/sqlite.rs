use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::chat::{Session, SessionStatus};
use crate::error::{ChatStreamError, Result};
use crate::storage::{SessionGateway, SessionSummary};

/// SQLite-backed session store
///
/// One row per session. Listing columns are kept next to a JSON copy of
/// the whole session so `list` never has to deserialize messages.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    db_path: PathBuf,
}

impl SqliteSessionStore {
    /// Create a store in the user's data directory
    ///
    /// The `CHATSTREAM_DB` environment variable overrides the location.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var("CHATSTREAM_DB") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "chatstream", "chatstream")
            .ok_or_else(|| ChatStreamError::Storage("Could not determine data directory".into()))?;

        Self::new_with_path(proj_dirs.data_dir().join("sessions.db"))
    }

    /// Create a store that uses the specified database path
    ///
    /// # Examples
    ///
    /// ```
    /// use chatstream::storage::SqliteSessionStore;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = SqliteSessionStore::new_with_path(dir.path().join("sessions.db")).unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| ChatStreamError::Storage(e.to_string()))?;
        }

        let store = Self { db_path };
        store.init()?;
        Ok(store)
    }

    /// Path of the database file
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| ChatStreamError::Storage(e.to_string()).into())
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                model TEXT NOT NULL,
                message_count INTEGER NOT NULL,
                token_usage INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                data JSON NOT NULL
            )",
            [],
        )
        .context("Failed to create tables")
        .map_err(|e| ChatStreamError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Insert a new session row
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.open()?;
        let data = serde_json::to_string(session)
            .context("Failed to serialize session")
            .map_err(|e| ChatStreamError::Storage(e.to_string()))?;

        let inserted = conn.execute(
            "INSERT INTO sessions
                (id, user_id, status, model, message_count, token_usage, created_at, updated_at, data)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                session.id(),
                session.user_id(),
                session.status().to_string(),
                session.config().model.name,
                session.count_retained_messages() as i64,
                session.token_usage() as i64,
                session.created_at().to_rfc3339(),
                session.updated_at().to_rfc3339(),
                data
            ],
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(ChatStreamError::Storage(format!(
                    "session {} already exists",
                    session.id()
                ))
                .into())
            }
            Err(e) => Err(ChatStreamError::Storage(format!("Failed to insert session: {}", e)).into()),
        }
    }

    /// Insert or replace a session row
    pub fn save_session(&self, session: &Session) -> Result<()> {
        let conn = self.open()?;
        let data = serde_json::to_string(session)
            .context("Failed to serialize session")
            .map_err(|e| ChatStreamError::Storage(e.to_string()))?;

        conn.execute(
            "INSERT INTO sessions
                (id, user_id, status, model, message_count, token_usage, created_at, updated_at, data)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                status = excluded.status,
                model = excluded.model,
                message_count = excluded.message_count,
                token_usage = excluded.token_usage,
                updated_at = excluded.updated_at,
                data = excluded.data",
            params![
                session.id(),
                session.user_id(),
                session.status().to_string(),
                session.config().model.name,
                session.count_retained_messages() as i64,
                session.token_usage() as i64,
                session.created_at().to_rfc3339(),
                session.updated_at().to_rfc3339(),
                data
            ],
        )
        .context("Failed to save session")
        .map_err(|e| ChatStreamError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Load a session by exact id
    pub fn load_session(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.open()?;

        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM sessions WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query session")
            .map_err(|e| ChatStreamError::Storage(e.to_string()))?;

        match data {
            Some(json) => {
                let session: Session = serde_json::from_str(&json)
                    .context("Failed to deserialize session")
                    .map_err(|e| ChatStreamError::Storage(e.to_string()))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// List all stored sessions, most recently updated first
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let conn = self.open()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, status, model, message_count, token_usage, created_at, updated_at
                FROM sessions
                ORDER BY updated_at DESC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| ChatStreamError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(2)?;
                let message_count: i64 = row.get(4)?;
                let token_usage: i64 = row.get(5)?;
                let created_at: String = row.get(6)?;
                let updated_at: String = row.get(7)?;

                Ok(SessionSummary {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    status: parse_status(&status),
                    model: row.get(3)?,
                    message_count: message_count.max(0) as usize,
                    token_usage: token_usage.max(0) as usize,
                    created_at: parse_timestamp(&created_at),
                    updated_at: parse_timestamp(&updated_at),
                })
            })
            .context("Failed to query sessions")
            .map_err(|e| ChatStreamError::Storage(e.to_string()))?;

        let mut sessions = Vec::new();
        for row in rows {
            match row {
                Ok(summary) => sessions.push(summary),
                Err(e) => tracing::warn!("Skipping unreadable session row: {}", e),
            }
        }

        Ok(sessions)
    }

    /// Delete a session by exact id
    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let conn = self.open()?;

        let removed = conn
            .execute("DELETE FROM sessions WHERE id = ?", params![id])
            .context("Failed to delete session")
            .map_err(|e| ChatStreamError::Storage(e.to_string()))?;

        Ok(removed > 0)
    }

    /// Runs a store operation on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(SqliteSessionStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(store))
            .await
            .map_err(|e| ChatStreamError::Storage(format!("storage task failed: {}", e)))?
    }
}

fn parse_status(status: &str) -> SessionStatus {
    match status {
        "ended" => SessionStatus::Ended,
        _ => SessionStatus::Active,
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl SessionGateway for SqliteSessionStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Session>> {
        let id = id.to_string();
        self.blocking(move |store| store.load_session(&id)).await
    }

    async fn create(&self, session: &Session) -> Result<()> {
        let session = session.clone();
        self.blocking(move |store| store.create_session(&session))
            .await
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let session = session.clone();
        self.blocking(move |store| store.save_session(&session)).await
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        self.blocking(|store| store.list_sessions()).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.blocking(move |store| store.delete_session(&id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Message, ModelSpec, Role, SessionConfig};
    use crate::tokenizer::WordCounter;
    use serial_test::serial;
    use std::env;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Returns both the store and the `TempDir` so the directory outlives the test body.
    fn create_test_store() -> (SqliteSessionStore, tempfile::TempDir) {
        let dir = tempdir().expect("failed to create tempdir");
        let store = SqliteSessionStore::new_with_path(dir.path().join("sessions.db"))
            .expect("failed to create store");
        (store, dir)
    }

    fn session(id: &str) -> Session {
        let system = Message::create(Role::System, "You are terse.", "gpt-test", &WordCounter)
            .expect("system message");
        Session::create_with_id(
            id,
            "user-1",
            system,
            SessionConfig::new(ModelSpec::new("gpt-test", 100)),
        )
        .expect("session")
    }

    fn user(text: &str) -> Message {
        Message::create(Role::User, text, "gpt-test", &WordCounter).unwrap()
    }

    #[test]
    fn test_init_creates_table() {
        let (store, _dir) = create_test_store();
        let conn = Connection::open(store.db_path()).expect("open connection");
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='sessions'",
                [],
                |r| r.get(0),
            )
            .expect("query row");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_create_then_load() {
        let (store, _dir) = create_test_store();
        let mut s = session("chat-1");
        s.add_message(user("hello there")).unwrap();
        store.create_session(&s).expect("create failed");

        let loaded = store
            .load_session("chat-1")
            .expect("load failed")
            .expect("present");
        assert_eq!(loaded.id(), "chat-1");
        assert_eq!(loaded.count_retained_messages(), 2);
        assert_eq!(loaded.token_usage(), s.token_usage());
        assert_eq!(loaded.messages()[1].content(), "hello there");
    }

    #[test]
    fn test_create_duplicate_fails() {
        let (store, _dir) = create_test_store();
        store.create_session(&session("dup")).unwrap();
        let err = store.create_session(&session("dup")).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_save_updates_existing_and_preserves_created_at() {
        let (store, _dir) = create_test_store();
        let mut s = session("chat-2");
        store.create_session(&s).unwrap();
        let before = store.list_sessions().unwrap().remove(0);

        sleep(Duration::from_millis(10));
        s.add_message(user("second turn")).unwrap();
        store.save_session(&s).unwrap();

        let after = store.list_sessions().unwrap().remove(0);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);
        assert_eq!(after.message_count, 2);
    }

    #[test]
    fn test_save_inserts_when_missing() {
        let (store, _dir) = create_test_store();
        store.save_session(&session("fresh")).unwrap();
        assert!(store.load_session("fresh").unwrap().is_some());
    }

    #[test]
    fn test_load_missing_returns_none() {
        let (store, _dir) = create_test_store();
        assert!(store.load_session("nope").unwrap().is_none());
    }

    #[test]
    fn test_list_orders_by_updated_at() {
        let (store, _dir) = create_test_store();
        store.create_session(&session("older")).unwrap();
        sleep(Duration::from_millis(10));
        store.create_session(&session("newer")).unwrap();

        let ids: Vec<String> = store
            .list_sessions()
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["newer".to_string(), "older".to_string()]);
    }

    #[test]
    fn test_ended_status_round_trips() {
        let (store, _dir) = create_test_store();
        let mut s = session("ending");
        s.end();
        store.save_session(&s).unwrap();

        let summary = store.list_sessions().unwrap().remove(0);
        assert_eq!(summary.status, SessionStatus::Ended);
        let loaded = store.load_session("ending").unwrap().unwrap();
        assert!(!loaded.is_active());
    }

    #[test]
    fn test_delete_reports_removal() {
        let (store, _dir) = create_test_store();
        store.create_session(&session("gone")).unwrap();
        assert!(store.delete_session("gone").unwrap());
        assert!(!store.delete_session("gone").unwrap());
        assert!(store.load_session("gone").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gateway_trait_round_trip() {
        let (store, _dir) = create_test_store();
        let gateway: &dyn SessionGateway = &store;
        gateway.create(&session("async-1")).await.unwrap();
        let loaded = gateway.find_by_id("async-1").await.unwrap();
        assert!(loaded.is_some());
        assert_eq!(gateway.list().await.unwrap().len(), 1);
        assert!(gateway.delete("async-1").await.unwrap());
    }

    #[test]
    #[serial]
    fn test_new_respects_env_override() {
        let dir = tempdir().expect("failed to create tempdir");
        let db_path = dir.path().join("nested").join("sessions.db");
        env::set_var("CHATSTREAM_DB", db_path.to_string_lossy().to_string());

        let store = SqliteSessionStore::new().expect("new failed with env override");
        assert_eq!(store.db_path(), &db_path);
        assert!(db_path.parent().unwrap().exists());

        env::remove_var("CHATSTREAM_DB");
    }
}
