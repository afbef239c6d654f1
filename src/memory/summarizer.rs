// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conversation summarizers used by the context optimizer.

use async_trait::async_trait;

use crate::error::ChatError;
use crate::types::{Message, Role, SharedProvider};

/// Maximum characters taken from each message by the extractive summarizer.
const SNIPPET_CHARS: usize = 200;

const SUMMARY_INSTRUCTION: &str = "Summarize the following conversation in a few sentences. \
Keep names, decisions, open questions and facts the user stated. Reply with the summary only.";

/// Produces a short text standing in for a run of dropped messages.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `messages` in at most roughly `max_chars` characters.
    async fn summarize(&self, messages: &[Message], max_chars: usize) -> Result<String, ChatError>;
}

/// Role-prefixed snippets of each message. No network.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, messages: &[Message], max_chars: usize) -> Result<String, ChatError> {
        let parts: Vec<String> = messages
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| format!("{}: {}", role_label(m.role), truncate_str(m.content.trim(), SNIPPET_CHARS)))
            .collect();

        if parts.is_empty() {
            return Err(ChatError::Summarization("nothing to summarize".to_string()));
        }
        Ok(truncate_str(&parts.join("\n"), max_chars))
    }
}

/// Asks the model for the summary.
pub struct ProviderSummarizer {
    provider: SharedProvider,
}

impl ProviderSummarizer {
    pub fn new(provider: SharedProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    async fn summarize(&self, messages: &[Message], max_chars: usize) -> Result<String, ChatError> {
        let transcript = messages
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| format!("{}: {}", role_label(m.role), m.content.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        if transcript.is_empty() {
            return Err(ChatError::Summarization("nothing to summarize".to_string()));
        }

        let request = [Message::system(SUMMARY_INSTRUCTION), Message::user(transcript)];
        let response = self
            .provider
            .chat(&request)
            .await
            .map_err(|e| ChatError::Summarization(e.to_string()))?;

        let summary = response.content.trim();
        if summary.is_empty() {
            return Err(ChatError::Summarization("model returned an empty summary".to_string()));
        }
        Ok(truncate_str(summary, max_chars))
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::System => "System",
    }
}

/// Truncate to `max_chars` characters, appending `...` when cut.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
