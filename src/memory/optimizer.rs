// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Context window optimization.
//!
//! When a conversation's estimated size crosses the configured threshold, the
//! optimizer keeps every system message, the most recent window of turns, and
//! (optionally) a synthesized summary standing in for the dropped middle.
//! Summarization failures fall back to plain truncation and are only counted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::summarizer::{ExtractiveSummarizer, Summarizer};
use super::tokens::estimate_messages_tokens;
use crate::types::Message;

/// Prefix of the synthesized summary message.
pub const SUMMARY_PREFIX: &str = "Summary of earlier conversation: ";

/// Configuration for context optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerConfig {
    /// Token budget for the whole context.
    pub max_context_tokens: u64,
    /// Fraction of the budget at which optimization kicks in.
    pub summarization_threshold: f64,
    /// Non-system messages kept verbatim after optimizing.
    pub messages_to_keep_after_summary: usize,
    /// Whether to synthesize a summary of dropped messages.
    pub enable_summarization: bool,
    /// Upper bound on summary length.
    pub max_summary_chars: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 4_000,
            summarization_threshold: 0.8,
            messages_to_keep_after_summary: 10,
            enable_summarization: true,
            max_summary_chars: 2_000,
        }
    }
}

impl OptimizerConfig {
    /// Create config for a specific model context window size.
    pub fn for_model(context_window: u64) -> Self {
        Self {
            max_context_tokens: context_window,
            ..Default::default()
        }
    }

    /// Token count above which the context is optimized.
    pub fn threshold_tokens(&self) -> u64 {
        (self.max_context_tokens as f64 * self.summarization_threshold) as u64
    }
}

/// Outcome of an optimization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub messages: Vec<Message>,
    pub summary_created: bool,
    pub tokens_before: u64,
    pub tokens_after: u64,
}

impl OptimizationResult {
    fn unchanged(messages: &[Message], tokens: u64) -> Self {
        Self {
            messages: messages.to_vec(),
            summary_created: false,
            tokens_before: tokens,
            tokens_after: tokens,
        }
    }

    /// Whether anything was dropped.
    pub fn changed(&self) -> bool {
        self.tokens_before != self.tokens_after
    }

    pub fn tokens_saved(&self) -> u64 {
        self.tokens_before.saturating_sub(self.tokens_after)
    }
}

/// Running optimizer statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerStats {
    pub optimizations_performed: u64,
    pub summaries_created: u64,
    pub truncation_fallbacks: u64,
    pub total_tokens_saved: u64,
}

/// Reduces a conversation to fit its token budget.
pub struct ContextOptimizer {
    config: OptimizerConfig,
    summarizer: Arc<dyn Summarizer>,
    stats: OptimizerStats,
}

impl ContextOptimizer {
    /// Create an optimizer using the extractive summarizer.
    pub fn new(config: OptimizerConfig) -> Self {
        Self::with_summarizer(config, Arc::new(ExtractiveSummarizer))
    }

    pub fn with_summarizer(config: OptimizerConfig, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            config,
            summarizer,
            stats: OptimizerStats::default(),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn stats(&self) -> &OptimizerStats {
        &self.stats
    }

    /// Number of non-system messages a restore keeps.
    pub fn restore_window(&self) -> usize {
        self.config.messages_to_keep_after_summary
    }

    pub fn calculate_token_usage(&self, messages: &[Message]) -> u64 {
        estimate_messages_tokens(messages)
    }

    pub fn threshold_tokens(&self) -> u64 {
        self.config.threshold_tokens()
    }

    pub fn should_optimize_context(&self, messages: &[Message]) -> bool {
        self.calculate_token_usage(messages) > self.threshold_tokens()
    }

    /// Optimize `messages` if they are over threshold; otherwise return them
    /// unchanged.
    pub async fn optimize_context(&mut self, messages: &[Message]) -> OptimizationResult {
        let tokens_before = self.calculate_token_usage(messages);
        if tokens_before <= self.threshold_tokens() {
            return OptimizationResult::unchanged(messages, tokens_before);
        }

        let keep = self.config.messages_to_keep_after_summary;
        let non_system = messages.iter().filter(|m| !m.is_system()).count();
        let drop_count = non_system.saturating_sub(keep);

        // Earlier summaries are folded into the new one so only one survives
        let mut preserved = Vec::new();
        let mut dropped = Vec::new();
        let mut recent = Vec::new();
        let mut seen_non_system = 0usize;
        for message in messages {
            if message.is_system() {
                if drop_count > 0 && is_summary_message(message) {
                    dropped.push(message.clone());
                } else {
                    preserved.push(message.clone());
                }
            } else {
                if seen_non_system < drop_count {
                    dropped.push(message.clone());
                } else {
                    recent.push(message.clone());
                }
                seen_non_system += 1;
            }
        }

        if drop_count == 0 {
            tracing::debug!(
                tokens = tokens_before,
                threshold = self.threshold_tokens(),
                "Context over threshold but nothing can be dropped"
            );
            return OptimizationResult::unchanged(messages, tokens_before);
        }

        let mut summary_created = false;
        if self.config.enable_summarization {
            match self
                .summarizer
                .summarize(&strip_summary_prefixes(&dropped), self.config.max_summary_chars)
                .await
            {
                Ok(summary) => {
                    preserved.push(Message::system(format!("{}{}", SUMMARY_PREFIX, summary)));
                    summary_created = true;
                }
                Err(err) => {
                    tracing::warn!("Summarization failed, truncating context instead: {}", err);
                    self.stats.truncation_fallbacks += 1;
                }
            }
        }

        preserved.extend(recent);
        let tokens_after = self.calculate_token_usage(&preserved);

        self.stats.optimizations_performed += 1;
        if summary_created {
            self.stats.summaries_created += 1;
        }
        self.stats.total_tokens_saved += tokens_before.saturating_sub(tokens_after);

        tracing::info!(
            dropped = drop_count,
            tokens_before,
            tokens_after,
            summary = summary_created,
            "Context optimized"
        );

        OptimizationResult {
            messages: preserved,
            summary_created,
            tokens_before,
            tokens_after,
        }
    }
}

/// Whether a message is a synthesized summary.
pub fn is_summary_message(message: &Message) -> bool {
    message.is_system() && message.content.starts_with(SUMMARY_PREFIX)
}

fn strip_summary_prefixes(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .map(|m| match m.content.strip_prefix(SUMMARY_PREFIX) {
            Some(rest) if m.is_system() => Message::system(rest),
            _ => m.clone(),
        })
        .collect()
}

/// Keep every system message (in order) plus the last `window` others.
pub fn select_recent_window(messages: &[Message], window: usize) -> Vec<Message> {
    let non_system = messages.iter().filter(|m| !m.is_system()).count();
    let skip = non_system.saturating_sub(window);
    let mut seen = 0usize;

    messages
        .iter()
        .filter(|m| {
            if m.is_system() {
                return true;
            }
            seen += 1;
            seen > skip
        })
        .cloned()
        .collect()
}
