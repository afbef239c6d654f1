// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! chatcore - session-based chat backend core.
//!
//! Each conversation is a [`ChatSession`] that keeps its history inside a
//! token budget and keeps answering when its memory backend fails. A
//! [`SessionOrchestrator`] caches sessions by id, restores them from a
//! message store and evicts the least recently used ones.
//!
//! # Architecture
//!
//! - [`types`] - Messages, roles and the [`Provider`] trait
//! - [`error`] - Error types and the AI error mapping
//! - [`config`] - Configuration loading, merging and validation
//! - [`providers`] - OpenAI-compatible and offline providers
//! - [`memory`] - Token estimation, context optimization and memory fallback
//! - [`chat`] - System instructions and the chat session
//! - [`orchestrator`] - Session cache and routing
//! - [`persistence`] - SQLite and in-memory message stores
//! - [`rollout`] - Percentage rollout of session features
//! - [`telemetry`] - Tracing setup, operation monitoring, health and dashboard
//! - [`cli`] - REPL and command-line wiring
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chatcore::{OrchestratorConfig, ScriptedProvider, SessionOrchestrator};
//!
//! let orchestrator = SessionOrchestrator::new(
//!     Arc::new(ScriptedProvider::new()),
//!     OrchestratorConfig::default(),
//! );
//! orchestrator.get_or_create_session("s1", None, None).await?;
//! let outcome = orchestrator.send_message("s1", "Hello").await?;
//! ```

pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod persistence;
pub mod providers;
pub mod rollout;
pub mod telemetry;
pub mod types;

// Re-export commonly used types at crate root
pub use chat::{ChatSession, MemoryHealth, SessionInfo, SessionOptions, SystemInstruction};
pub use error::{ChatError, ConfigError, ProviderError};
pub use memory::{ContextOptimizer, FallbackLevel, FallbackManager, OptimizerConfig};
pub use orchestrator::{OrchestratorConfig, SendOutcome, SessionOrchestrator, SessionStats};
pub use persistence::{InMemoryMessageStore, MessageStore, PersistedMessage, SqliteMessageStore};
pub use providers::{
    create_provider, create_provider_from_env, OpenAIProvider, ProviderType, ScriptedProvider,
};
pub use types::{Message, Provider, ProviderConfig, Role, SharedProvider};

/// chatcore version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
