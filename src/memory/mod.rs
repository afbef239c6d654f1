// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conversation memory management.
//!
//! - [`tokens`]: deterministic token estimation
//! - [`ContextOptimizer`]: keeps a conversation inside its token budget
//! - [`FallbackManager`]: degrades memory operations step by step when the
//!   primary [`ConversationMemory`] fails

pub mod fallback;
pub mod optimizer;
pub mod store;
pub mod strategy;
pub mod summarizer;
pub mod tokens;

pub use fallback::{
    next_level, FallbackAttempt, FallbackConfig, FallbackLevel, FallbackManager, FallbackStatus,
};
pub use optimizer::{
    is_summary_message, select_recent_window, ContextOptimizer, OptimizationResult,
    OptimizerConfig, OptimizerStats, SUMMARY_PREFIX,
};
pub use store::{
    apply_operation, ops, BufferMemory, ConversationMemory, MemoryArgs, MemoryFault,
    MemoryOutcome,
};
pub use strategy::{default_outcome, strategy, FallbackBuffer, Strategy, StrategyTable};
pub use summarizer::{ExtractiveSummarizer, ProviderSummarizer, Summarizer};
pub use tokens::{estimate_message_tokens, estimate_messages_tokens, estimate_text_tokens};
