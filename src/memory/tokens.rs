// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Token estimation.
//!
//! A deterministic character-based estimate. It only has to be stable and
//! monotonic, not exact; provider tokenizers differ anyway.

use crate::types::Message;

/// Approximate characters per token.
pub const CHARS_PER_TOKEN: u64 = 4;

/// Fixed per-message overhead for role and formatting.
pub const MESSAGE_OVERHEAD_TOKENS: u64 = 4;

/// Estimate tokens for text content.
pub fn estimate_text_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Estimate tokens for a single message.
pub fn estimate_message_tokens(message: &Message) -> u64 {
    estimate_text_tokens(&message.content) + MESSAGE_OVERHEAD_TOKENS
}

/// Estimate tokens for a list of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> u64 {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Usage as a percentage of a token budget.
pub fn usage_percent(tokens: u64, max_tokens: u64) -> f64 {
    if max_tokens == 0 {
        return 0.0;
    }
    (tokens as f64 / max_tokens as f64) * 100.0
}
