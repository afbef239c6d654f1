// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{MessageStore, PersistedMessage};
use crate::error::ChatError;

/// Process-local message store.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    sessions: RwLock<HashMap<String, Vec<PersistedMessage>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a session, replacing whatever it held.
    pub fn seed(&self, session_id: impl Into<String>, messages: Vec<PersistedMessage>) {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.into(), messages);
    }

    /// All stored messages of a session.
    pub fn messages(&self, session_id: &str) -> Vec<PersistedMessage> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn get_recent_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<PersistedMessage>, ChatError> {
        let messages = self.messages(session_id);
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn add_message(&self, session_id: &str, role: &str, content: &str) -> Result<(), ChatError> {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(session_id.to_string())
            .or_default()
            .push(PersistedMessage {
                role: role.to_string(),
                content: Some(content.to_string()),
                timestamp: Some(chrono::Utc::now().timestamp_millis()),
            });
        Ok(())
    }
}
