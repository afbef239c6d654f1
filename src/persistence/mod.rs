// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Message persistence.
//!
//! Sessions are restored from, and optionally written through to, a
//! [`MessageStore`]. Two implementations are provided:
//!
//! - [`SqliteMessageStore`]: SQLite database (WAL mode)
//! - [`InMemoryMessageStore`]: process-local map, for tests and offline use

mod memory;
mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::types::{Message, Role};

pub use memory::InMemoryMessageStore;
pub use sqlite::{default_database_path, SqliteMessageStore, SCHEMA_VERSION};

/// A message as the persistence layer hands it back.
///
/// The role is free text so rows written by other clients survive loading;
/// unknown roles are skipped when a session is restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    /// Creation time, milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl PersistedMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            timestamp: None,
        }
    }

    /// Convert to a conversation message.
    ///
    /// Returns `None` for unknown roles and for absent or blank content.
    pub fn to_message(&self) -> Option<Message> {
        let role = Role::parse(&self.role)?;
        let content = self.content.as_deref()?;
        if content.trim().is_empty() {
            return None;
        }
        Some(Message {
            role,
            content: content.to_string(),
        })
    }
}

impl From<&Message> for PersistedMessage {
    fn from(message: &Message) -> Self {
        Self::new(message.role.as_str(), message.content.clone())
    }
}

/// Where conversation messages are persisted.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// The most recent `limit` messages of a session, oldest first.
    async fn get_recent_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<PersistedMessage>, ChatError>;

    /// Append a message to a session.
    async fn add_message(&self, session_id: &str, role: &str, content: &str) -> Result<(), ChatError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_message_maps_known_roles() {
        let msg = PersistedMessage::new("assistant", "hi").to_message().unwrap();
        assert_eq!(msg, Message::assistant("hi"));
        assert_eq!(
            PersistedMessage::new("system", "S").to_message(),
            Some(Message::system("S"))
        );
    }

    #[test]
    fn test_to_message_skips_bad_rows() {
        assert_eq!(PersistedMessage::new("bogus", "x").to_message(), None);
        assert_eq!(PersistedMessage::new("user", "   ").to_message(), None);
        let absent = PersistedMessage {
            role: "user".to_string(),
            content: None,
            timestamp: Some(1),
        };
        assert_eq!(absent.to_message(), None);
    }

    #[test]
    fn test_deserialize_without_optional_fields() {
        let msg: PersistedMessage = serde_json::from_str(r#"{"role":"user"}"#).unwrap();
        assert_eq!(msg.content, None);
        assert_eq!(msg.timestamp, None);
    }
}
