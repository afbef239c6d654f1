// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite-based message storage.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{MessageStore, PersistedMessage};
use crate::error::ChatError;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Message storage using SQLite.
///
/// The connection sits behind a mutex and every query runs on the blocking
/// thread pool.
#[derive(Clone)]
pub struct SqliteMessageStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

fn storage_err(context: &str) -> impl Fn(rusqlite::Error) -> ChatError + '_ {
    move |e| ChatError::Storage(format!("{}: {}", context, e))
}

impl SqliteMessageStore {
    /// Open or create the database at the default location.
    pub fn open() -> Result<Self, ChatError> {
        Self::open_at(&default_database_path()?)
    }

    /// Open or create a message database at a specific path.
    pub fn open_at(db_path: &Path) -> Result<Self, ChatError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ChatError::Storage(format!("Failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(db_path).map_err(storage_err("Failed to open message database"))?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(storage_err("Failed to set pragmas"))?;

        init_schema(&conn)?;
        tracing::debug!(path = %db_path.display(), "Opened message store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: db_path.to_path_buf(),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, ChatError> {
        let conn = Connection::open_in_memory().map_err(storage_err("Failed to open in-memory database"))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, ChatError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, ChatError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&conn)
        })
        .await
        .map_err(|e| ChatError::Storage(format!("Storage task failed: {}", e)))?
    }

    /// Number of stored messages for a session.
    pub async fn message_count(&self, session_id: &str) -> Result<u64, ChatError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM session_messages WHERE session_id = ?",
                params![session_id],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(storage_err("Failed to count messages"))
        })
        .await
    }

    /// Session ids, most recently updated first.
    pub async fn list_sessions(&self) -> Result<Vec<String>, ChatError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id FROM sessions ORDER BY updated_at DESC, id")
                .map_err(storage_err("Failed to prepare query"))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(storage_err("Failed to list sessions"))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(storage_err("Failed to read session row"))
        })
        .await
    }

    /// Delete a session and its messages. Returns whether it existed.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, ChatError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM session_messages WHERE session_id = ?", params![session_id])
                .map_err(storage_err("Failed to delete messages"))?;
            let deleted = conn
                .execute("DELETE FROM sessions WHERE id = ?", params![session_id])
                .map_err(storage_err("Failed to delete session"))?;
            Ok(deleted > 0)
        })
        .await
    }
}

/// Initialize the database schema.
fn init_schema(conn: &Connection) -> Result<(), ChatError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_messages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at DESC);
        CREATE INDEX IF NOT EXISTS idx_messages_created_at ON session_messages(session_id, created_at);
        "#,
    )
    .map_err(storage_err("Failed to create schema"))?;

    let current_version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(storage_err("Failed to get schema version"))?;

    if current_version.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?)",
            params![SCHEMA_VERSION],
        )
        .map_err(storage_err("Failed to set schema version"))?;
    }
    Ok(())
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn get_recent_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<PersistedMessage>, ChatError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                SELECT role, content, created_at FROM session_messages
                WHERE session_id = ?
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?
                "#,
                )
                .map_err(storage_err("Failed to prepare query"))?;

            let rows = stmt
                .query_map(params![session_id, limit as i64], |row| {
                    Ok(PersistedMessage {
                        role: row.get(0)?,
                        content: row.get(1)?,
                        timestamp: row.get(2)?,
                    })
                })
                .map_err(storage_err("Failed to get messages"))?;

            let mut messages = rows
                .collect::<Result<Vec<_>, _>>()
                .map_err(storage_err("Failed to read message row"))?;
            messages.reverse();
            Ok(messages)
        })
        .await
    }

    async fn add_message(&self, session_id: &str, role: &str, content: &str) -> Result<(), ChatError> {
        let session_id = session_id.to_string();
        let role = role.to_string();
        let content = content.to_string();
        self.with_conn(move |conn| {
            let now = chrono::Utc::now().timestamp_millis();
            conn.execute(
                r#"
                INSERT INTO sessions (id, created_at, updated_at) VALUES (?1, ?2, ?2)
                ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at
                "#,
                params![session_id, now],
            )
            .map_err(storage_err("Failed to upsert session"))?;

            conn.execute(
                "INSERT INTO session_messages (id, session_id, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
                params![uuid::Uuid::new_v4().to_string(), session_id, role, content, now],
            )
            .map_err(storage_err("Failed to add message"))?;
            Ok(())
        })
        .await
    }
}

/// Default database location: `~/.chatcore/messages.db`.
pub fn default_database_path() -> Result<PathBuf, ChatError> {
    let home = dirs::home_dir()
        .ok_or_else(|| ChatError::Storage("Could not determine home directory".to_string()))?;
    Ok(home.join(".chatcore").join("messages.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteMessageStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("messages.db");
        let store = SqliteMessageStore::open_at(&db_path).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_add_and_get_recent_messages() {
        let (store, _temp) = create_test_store();

        for i in 0..5 {
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            store.add_message("s1", role, &format!("m{}", i)).await.unwrap();
        }
        store.add_message("s2", "user", "other").await.unwrap();

        let recent = store.get_recent_messages("s1", 3).await.unwrap();
        let contents: Vec<_> = recent.iter().filter_map(|m| m.content.clone()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
        assert!(recent.iter().all(|m| m.timestamp.is_some()));
        assert_eq!(store.message_count("s1").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_unknown_session_is_empty() {
        let (store, _temp) = create_test_store();
        assert!(store.get_recent_messages("nope", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_and_delete_sessions() {
        let (store, _temp) = create_test_store();
        store.add_message("a", "user", "1").await.unwrap();
        store.add_message("b", "user", "2").await.unwrap();

        let mut sessions = store.list_sessions().await.unwrap();
        sessions.sort();
        assert_eq!(sessions, vec!["a", "b"]);

        assert!(store.delete_session("a").await.unwrap());
        assert!(!store.delete_session("a").await.unwrap());
        assert_eq!(store.message_count("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reopen_keeps_messages() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("messages.db");
        {
            let store = SqliteMessageStore::open_at(&db_path).unwrap();
            store.add_message("s", "user", "persisted").await.unwrap();
        }
        let store = SqliteMessageStore::open_at(&db_path).unwrap();
        let recent = store.get_recent_messages("s", 10).await.unwrap();
        assert_eq!(recent[0].content.as_deref(), Some("persisted"));
        assert_eq!(store.path(), db_path.as_path());
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let store = SqliteMessageStore::open_in_memory().unwrap();
        store.add_message("s", "assistant", "hi").await.unwrap();
        assert_eq!(store.message_count("s").await.unwrap(), 1);
    }
}
