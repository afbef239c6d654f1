// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Command-line front end: runtime wiring, slash commands and the REPL.

pub mod commands;
mod repl;

use std::sync::Arc;

pub use commands::{help_text, parse_command, ReplCommand};
pub use repl::{ask_once, run_repl};

use crate::chat::SystemInstruction;
use crate::config::ResolvedConfig;
use crate::error::{map_ai_error, ChatError};
use crate::orchestrator::SessionOrchestrator;
use crate::persistence::{MessageStore, SqliteMessageStore};
use crate::providers::create_provider_from_config;
use crate::rollout::RolloutPolicy;
use crate::telemetry::{format_report, Dashboard, OperationMonitor, PerformanceMonitor, ResourceUsage};
use crate::types::SharedProvider;

/// Everything a front end needs to talk to sessions.
pub struct ChatRuntime {
    pub orchestrator: SessionOrchestrator,
    pub dashboard: Dashboard,
    pub store: Option<Arc<SqliteMessageStore>>,
    pub system_instruction: Option<SystemInstruction>,
}

impl ChatRuntime {
    /// Build the runtime from resolved configuration.
    ///
    /// With `persist`, messages go to `database_path` (or the default database).
    pub fn from_config(config: &ResolvedConfig, persist: bool) -> anyhow::Result<Self> {
        let provider = create_provider_from_config(config)?;
        let store = if persist {
            let store = match &config.database_path {
                Some(path) => SqliteMessageStore::open_at(path)?,
                None => SqliteMessageStore::open()?,
            };
            tracing::debug!(path = %store.path().display(), "Message store opened");
            Some(Arc::new(store))
        } else {
            None
        };
        Ok(Self::with_provider(config, provider, store))
    }

    /// Like [`from_config`](Self::from_config), with setup failures mapped
    /// into a [`ChatError`] for reporting.
    pub fn connect(config: &ResolvedConfig, persist: bool) -> Result<Self, ChatError> {
        Self::from_config(config, persist).map_err(map_ai_error)
    }

    /// Build the runtime around an existing provider.
    pub fn with_provider(
        config: &ResolvedConfig,
        provider: SharedProvider,
        store: Option<Arc<SqliteMessageStore>>,
    ) -> Self {
        let monitor = Arc::new(OperationMonitor::with_config(config.monitor.clone()));
        let performance = Arc::new(PerformanceMonitor::new(config.thresholds.clone()));

        let mut orchestrator = SessionOrchestrator::new(provider, config.orchestrator.clone())
            .with_monitor(Arc::clone(&monitor))
            .with_rollout(RolloutPolicy::new(config.rollout.clone()))
            .with_session_config(config.optimizer.clone(), config.fallback.clone())
            .with_model_summaries(config.use_model_summaries);
        if let Some(store) = &store {
            orchestrator = orchestrator.with_store(Arc::clone(store) as Arc<dyn MessageStore>);
        }

        Self {
            orchestrator,
            dashboard: Dashboard::new(monitor, performance),
            store,
            system_instruction: config.system_instruction.clone(),
        }
    }

    /// Plain-text dashboard for the current state.
    pub fn dashboard_report(&self) -> String {
        let summary = self.dashboard.summary(
            Some(self.orchestrator.get_session_stats()),
            Some(self.orchestrator.rollout()),
            ResourceUsage::sample(),
        );
        format_report(&summary)
    }
}

/// JSON body reported for a failed one-shot prompt.
pub fn error_json(err: &ChatError) -> serde_json::Value {
    serde_json::json!({
        "success": false,
        "errorType": err.error_type(),
        "error": err.to_string(),
        "retryAfter": err.retry_after(),
        "recoverable": err.is_recoverable(),
    })
}
