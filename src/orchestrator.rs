// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session orchestration.
//!
//! The [`SessionOrchestrator`] caches live [`ChatSession`]s by id, creates
//! them on demand (restoring persisted history), routes messages to them and
//! evicts the least recently used ones once the cache grows past its ceiling.
//!
//! Each session sits behind its own `tokio::sync::Mutex`, so one caller at a
//! time talks to a session while distinct sessions run concurrently. The
//! session map itself is a `std::sync::Mutex` that is never held across an
//! `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::instrument;

use crate::chat::{
    ChatSession, ChunkCallback, InstructionRegistry, MemoryHealth, PresetRegistry, SessionInfo, SessionOptions,
    SystemInstruction,
};
use crate::error::ChatError;
use crate::memory::fallback::duration_ms;
use crate::memory::{FallbackConfig, OptimizerConfig};
use crate::persistence::{MessageStore, PersistedMessage};
use crate::rollout::{RolloutPolicy, CONTEXT_OPTIMIZATION};
use crate::telemetry::{OperationCompletion, OperationKind, OperationMonitor};
use crate::types::SharedProvider;

/// A cached session handle.
pub type SessionHandle = Arc<tokio::sync::Mutex<ChatSession>>;

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Ceiling on cached sessions.
    pub max_sessions: usize,
    /// Minimum time between opportunistic cleanup passes.
    #[serde(with = "duration_ms")]
    pub cleanup_interval: Duration,
    /// Messages loaded from the store when a session is restored.
    pub restore_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            cleanup_interval: Duration::from_secs(300),
            restore_limit: 50,
        }
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub active_sessions: usize,
    pub sessions_created: u64,
    pub sessions_cleaned: u64,
}

/// Result of routing a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub assistant_text: String,
    pub session_info: SessionInfo,
}

struct SessionEntry {
    session: SessionHandle,
    last_access: Instant,
}

/// Creates, caches and routes to chat sessions.
pub struct SessionOrchestrator {
    provider: SharedProvider,
    registry: Arc<dyn InstructionRegistry>,
    monitor: Arc<OperationMonitor>,
    rollout: RolloutPolicy,
    store: Option<Arc<dyn MessageStore>>,
    config: OrchestratorConfig,
    optimizer: OptimizerConfig,
    fallback: FallbackConfig,
    use_model_summaries: bool,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    last_cleanup: Mutex<Instant>,
    sessions_created: AtomicU64,
    sessions_cleaned: AtomicU64,
}

impl SessionOrchestrator {
    pub fn new(provider: SharedProvider, config: OrchestratorConfig) -> Self {
        Self {
            provider,
            registry: Arc::new(PresetRegistry::new()),
            monitor: OperationMonitor::shared(),
            rollout: RolloutPolicy::default(),
            store: None,
            config,
            optimizer: OptimizerConfig::default(),
            fallback: FallbackConfig::default(),
            use_model_summaries: false,
            sessions: Mutex::new(HashMap::new()),
            last_cleanup: Mutex::new(Instant::now()),
            sessions_created: AtomicU64::new(0),
            sessions_cleaned: AtomicU64::new(0),
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn InstructionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<OperationMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_rollout(mut self, rollout: RolloutPolicy) -> Self {
        self.rollout = rollout;
        self
    }

    /// Persist messages to, and restore sessions from, `store`.
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Optimizer and fallback settings used for every new session.
    pub fn with_session_config(mut self, optimizer: OptimizerConfig, fallback: FallbackConfig) -> Self {
        self.optimizer = optimizer;
        self.fallback = fallback;
        self
    }

    pub fn with_model_summaries(mut self, enabled: bool) -> Self {
        self.use_model_summaries = enabled;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<OperationMonitor> {
        &self.monitor
    }

    pub fn rollout(&self) -> &RolloutPolicy {
        &self.rollout
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached session, refreshing its access time.
    fn lookup(&self, session_id: &str) -> Option<SessionHandle> {
        let mut sessions = self.sessions();
        let entry = sessions.get_mut(session_id)?;
        entry.last_access = Instant::now();
        Some(Arc::clone(&entry.session))
    }

    /// Cached session by id, without creating one.
    pub fn session(&self, session_id: &str) -> Option<SessionHandle> {
        self.lookup(session_id)
    }

    fn require(&self, session_id: &str) -> Result<SessionHandle, ChatError> {
        self.lookup(session_id)
            .ok_or_else(|| ChatError::NotFound(format!("Session '{}' not found", session_id)))
    }

    /// Return the cached session or create one.
    ///
    /// A cache hit is returned untouched; `system_instruction` and
    /// `recent_messages` only apply to a newly created session.
    #[instrument(skip(self, system_instruction, recent_messages))]
    pub async fn get_or_create_session(
        &self,
        session_id: &str,
        system_instruction: Option<SystemInstruction>,
        recent_messages: Option<&[PersistedMessage]>,
    ) -> Result<SessionHandle, ChatError> {
        if session_id.trim().is_empty() {
            return Err(ChatError::Validation("Session id must not be empty".to_string()));
        }
        self.maybe_cleanup();

        if let Some(session) = self.lookup(session_id) {
            return Ok(session);
        }

        let guard = self
            .monitor
            .monitor_operation(OperationKind::SessionCreate, Some(session_id));
        let mut session = match self.build_session(session_id, system_instruction) {
            Ok(session) => session,
            Err(err) => {
                guard.fail(&err);
                return Err(err);
            }
        };
        let mut restored = 0;
        if let Some(messages) = recent_messages {
            match session.restore_context(messages).await {
                Ok(count) => restored = count,
                Err(err) => {
                    guard.fail(&err);
                    return Err(err);
                }
            }
        }

        let handle = self.insert(session_id, session);
        guard.finish(OperationCompletion::success().messages(restored));
        Ok(handle)
    }

    fn build_session(
        &self,
        session_id: &str,
        system_instruction: Option<SystemInstruction>,
    ) -> Result<ChatSession, ChatError> {
        let optimization_enabled = self.rollout.is_enabled(CONTEXT_OPTIMIZATION, session_id);
        let mut options = SessionOptions::new(session_id)
            .with_optimizer(self.optimizer.clone())
            .with_fallback(self.fallback.clone())
            .with_optimization(optimization_enabled)
            .with_model_summaries(self.use_model_summaries)
            .with_monitor(Arc::clone(&self.monitor));
        if let Some(instruction) = system_instruction {
            options = options.with_system_instruction(instruction);
        }
        ChatSession::new(Arc::clone(&self.provider), options, self.registry.as_ref())
    }

    fn insert(&self, session_id: &str, session: ChatSession) -> SessionHandle {
        let mut sessions = self.sessions();
        // Another caller may have created it while we were restoring
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.last_access = Instant::now();
            return Arc::clone(&entry.session);
        }

        if sessions.len() >= self.config.max_sessions {
            let excess = sessions.len() + 1 - self.config.max_sessions;
            let evicted = evict_lru(&mut sessions, excess);
            self.sessions_cleaned.fetch_add(evicted as u64, Ordering::Relaxed);
        }

        let handle = Arc::new(tokio::sync::Mutex::new(session));
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                session: Arc::clone(&handle),
                last_access: Instant::now(),
            },
        );
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session = session_id, active = sessions.len(), "Session cached");
        handle
    }

    /// Return a cached session, or create one seeded from the attached store.
    ///
    /// A store read failure is logged and the session starts empty.
    #[instrument(skip(self, system_instruction))]
    pub async fn load_session(
        &self,
        session_id: &str,
        system_instruction: Option<SystemInstruction>,
    ) -> Result<SessionHandle, ChatError> {
        if let Some(session) = self.lookup(session_id) {
            return Ok(session);
        }

        let recent = match &self.store {
            Some(store) => match store.get_recent_messages(session_id, self.config.restore_limit).await {
                Ok(messages) => Some(messages),
                Err(err) => {
                    tracing::warn!(session = session_id, "Could not load persisted messages: {}", err);
                    None
                }
            },
            None => None,
        };
        self.get_or_create_session(session_id, system_instruction, recent.as_deref())
            .await
    }

    /// Route a message to a cached session.
    ///
    /// With a store attached, the user and assistant messages are persisted
    /// once the model has answered. A persistence failure is logged, not
    /// returned.
    #[instrument(skip(self, text))]
    pub async fn send_message(&self, session_id: &str, text: &str) -> Result<SendOutcome, ChatError> {
        self.maybe_cleanup();
        let handle = self.require(session_id)?;

        let (assistant_text, session_info) = {
            let mut session = handle.lock().await;
            let reply = session.send_message(text).await?;
            (reply, session.info())
        };

        self.persist_exchange(session_id, text, &assistant_text).await;
        Ok(SendOutcome {
            assistant_text,
            session_info,
        })
    }

    /// Route a message to a cached session, streaming the reply.
    #[instrument(skip(self, text, on_chunk, cancel))]
    pub async fn send_message_stream(
        &self,
        session_id: &str,
        text: &str,
        on_chunk: ChunkCallback,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<SendOutcome, ChatError> {
        self.maybe_cleanup();
        let handle = self.require(session_id)?;

        let (assistant_text, session_info) = {
            let mut session = handle.lock().await;
            let reply = session.send_message_stream(text, on_chunk, cancel).await?;
            (reply, session.info())
        };

        self.persist_exchange(session_id, text, &assistant_text).await;
        Ok(SendOutcome {
            assistant_text,
            session_info,
        })
    }

    async fn persist_exchange(&self, session_id: &str, user_text: &str, assistant_text: &str) {
        let Some(store) = &self.store else {
            return;
        };
        for (role, content) in [("user", user_text.trim()), ("assistant", assistant_text)] {
            if let Err(err) = store.add_message(session_id, role, content).await {
                tracing::warn!(session = session_id, role, "Failed to persist message: {}", err);
            }
        }
    }

    /// Replace a cached session's history with `recent_messages`.
    ///
    /// Never fails: returns `false` (and logs) for an unknown session or a
    /// failed restore.
    #[instrument(skip(self, recent_messages), fields(count = recent_messages.len()))]
    pub async fn sync_session_with_database(&self, session_id: &str, recent_messages: &[PersistedMessage]) -> bool {
        let Some(handle) = self.lookup(session_id) else {
            tracing::warn!(session = session_id, "Cannot sync unknown session");
            return false;
        };

        let guard = self
            .monitor
            .monitor_operation(OperationKind::SessionSync, Some(session_id));
        let mut session = handle.lock().await;
        let result = match session.clear_history() {
            Ok(()) => session.restore_context(recent_messages).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(count) => {
                guard.finish(OperationCompletion::success().messages(count));
                true
            }
            Err(err) => {
                tracing::warn!(session = session_id, "Session sync failed: {}", err);
                guard.fail(&err);
                false
            }
        }
    }

    /// Drop a session from the cache.
    pub fn remove_session(&self, session_id: &str) -> bool {
        let removed = self.sessions().remove(session_id).is_some();
        if removed {
            tracing::debug!(session = session_id, "Session removed");
        }
        removed
    }

    pub async fn get_memory_health_status(&self, session_id: &str) -> Option<MemoryHealth> {
        let handle = self.lookup(session_id)?;
        let session = handle.lock().await;
        Some(session.memory_health())
    }

    pub fn get_session_stats(&self) -> SessionStats {
        SessionStats {
            active_sessions: self.sessions().len(),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_cleaned: self.sessions_cleaned.load(Ordering::Relaxed),
        }
    }

    /// Ids of cached sessions, sorted.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn maybe_cleanup(&self) {
        let due = {
            let mut last = self.last_cleanup.lock().unwrap_or_else(|e| e.into_inner());
            if last.elapsed() >= self.config.cleanup_interval {
                *last = Instant::now();
                true
            } else {
                false
            }
        };
        if due {
            self.cleanup_now();
        }
    }

    /// Evict least recently used sessions until the cache is within its
    /// ceiling. Returns the number evicted.
    pub fn cleanup_now(&self) -> usize {
        let guard = self.monitor.monitor_operation(OperationKind::SessionCleanup, None);
        let evicted = {
            let mut sessions = self.sessions();
            let excess = sessions.len().saturating_sub(self.config.max_sessions);
            evict_lru(&mut sessions, excess)
        };
        if evicted > 0 {
            self.sessions_cleaned.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::info!(evicted, "Evicted idle sessions");
        }
        guard.finish(OperationCompletion::success().messages(evicted));
        evicted
    }
}

/// Remove up to `count` least recently used sessions, skipping any that are
/// locked or whose handle is still held by a caller.
fn evict_lru(sessions: &mut HashMap<String, SessionEntry>, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    let mut candidates: Vec<(String, Instant)> = sessions
        .iter()
        .map(|(id, entry)| (id.clone(), entry.last_access))
        .collect();
    candidates.sort_by_key(|(_, last_access)| *last_access);

    let mut evicted = 0;
    for (id, _) in candidates {
        if evicted == count {
            break;
        }
        // A handle held outside the map means a caller may still lock it.
        let busy = sessions
            .get(&id)
            .map(|entry| Arc::strong_count(&entry.session) > 1 || entry.session.try_lock().is_err())
            .unwrap_or(true);
        if busy {
            tracing::debug!(session = %id, "Skipping busy session during eviction");
            continue;
        }
        sessions.remove(&id);
        evicted += 1;
    }
    if evicted < count {
        tracing::warn!(wanted = count, evicted, "Session cache over ceiling, remaining sessions are busy");
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::persistence::InMemoryMessageStore;
    use crate::providers::ScriptedProvider;
    use crate::rollout::RolloutConfig;

    fn orchestrator(max_sessions: usize) -> SessionOrchestrator {
        SessionOrchestrator::new(
            Arc::new(ScriptedProvider::new()),
            OrchestratorConfig {
                max_sessions,
                ..OrchestratorConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_create_then_hit() {
        let orch = orchestrator(10);
        let first = orch
            .get_or_create_session("a", Some(SystemInstruction::text("S")), None)
            .await
            .unwrap();
        let second = orch
            .get_or_create_session("a", Some(SystemInstruction::text("ignored")), None)
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.system_prompt(), Some("S"));
        assert_eq!(orch.get_session_stats().sessions_created, 1);
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let orch = orchestrator(10);
        let result = orch.get_or_create_session("  ", None, None).await;
        assert!(matches!(result, Err(ChatError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_with_restore() {
        let orch = orchestrator(10);
        let recent = vec![
            PersistedMessage::new("user", "q"),
            PersistedMessage::new("assistant", "a"),
        ];
        let handle = orch.get_or_create_session("a", None, Some(&recent)).await.unwrap();
        assert_eq!(handle.lock().await.get_message_count(), 2);
    }

    #[tokio::test]
    async fn test_insert_evicts_least_recently_used() {
        let orch = orchestrator(2);
        orch.get_or_create_session("a", None, None).await.unwrap();
        orch.get_or_create_session("b", None, None).await.unwrap();
        // Touch "a" so "b" becomes the oldest
        orch.get_or_create_session("a", None, None).await.unwrap();
        orch.get_or_create_session("c", None, None).await.unwrap();

        assert_eq!(orch.session_ids(), vec!["a", "c"]);
        let stats = orch.get_session_stats();
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.sessions_created, 3);
        assert_eq!(stats.sessions_cleaned, 1);
    }

    #[tokio::test]
    async fn test_busy_session_is_not_evicted() {
        let orch = orchestrator(1);
        let a = orch.get_or_create_session("a", None, None).await.unwrap();
        let _busy = a.lock().await;

        orch.get_or_create_session("b", None, None).await.unwrap();
        assert_eq!(orch.session_ids(), vec!["a", "b"]);

        drop(_busy);
        drop(a);
        assert_eq!(orch.cleanup_now(), 1);
        assert_eq!(orch.get_session_stats().active_sessions, 1);
    }

    #[tokio::test]
    async fn test_held_handle_is_not_evicted() {
        let orch = orchestrator(1);
        let a = orch.get_or_create_session("a", None, None).await.unwrap();

        orch.get_or_create_session("b", None, None).await.unwrap();
        assert_eq!(orch.session_ids(), vec!["a", "b"]);

        a.lock().await.send_message("kept").await.unwrap();
        let cached = orch.session("a").unwrap();
        assert!(Arc::ptr_eq(&a, &cached));
        assert_eq!(cached.lock().await.get_message_count(), 2);

        // The lookup above touched "a", so "b" is now the oldest
        drop(cached);
        drop(a);
        assert_eq!(orch.cleanup_now(), 1);
        assert_eq!(orch.session_ids(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_opportunistic_cleanup_after_interval() {
        let orch = SessionOrchestrator::new(
            Arc::new(ScriptedProvider::new()),
            OrchestratorConfig {
                max_sessions: 1,
                cleanup_interval: Duration::ZERO,
                restore_limit: 10,
            },
        );
        let a = orch.get_or_create_session("a", None, None).await.unwrap();
        let guard = a.lock().await;
        orch.get_or_create_session("b", None, None).await.unwrap();
        drop(guard);
        drop(a);

        // The next access runs a cleanup pass first
        orch.get_or_create_session("b", None, None).await.unwrap();
        assert_eq!(orch.session_ids(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_send_unknown_session() {
        let orch = orchestrator(10);
        let result = orch.send_message("nope", "hi").await;
        assert!(matches!(result, Err(ChatError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_send_persists_exchange() {
        let store = Arc::new(InMemoryMessageStore::new());
        let orch = orchestrator(10).with_store(Arc::clone(&store) as Arc<dyn MessageStore>);
        orch.get_or_create_session("a", None, None).await.unwrap();

        let outcome = orch.send_message("a", "hello").await.unwrap();
        assert_eq!(outcome.assistant_text, "echo: hello");
        assert_eq!(outcome.session_info.message_count, 2);

        let stored = store.messages("a");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].role, "user");
        assert_eq!(stored[1].content.as_deref(), Some("echo: hello"));
    }

    #[tokio::test]
    async fn test_failed_send_persists_nothing() {
        let store = Arc::new(InMemoryMessageStore::new());
        let provider = Arc::new(ScriptedProvider::new().fail(ProviderError::Timeout(100)));
        let orch = SessionOrchestrator::new(provider, OrchestratorConfig::default())
            .with_store(Arc::clone(&store) as Arc<dyn MessageStore>);
        orch.get_or_create_session("a", None, None).await.unwrap();

        assert!(orch.send_message("a", "hello").await.is_err());
        assert!(store.messages("a").is_empty());
    }

    #[tokio::test]
    async fn test_load_session_from_store() {
        let store = Arc::new(InMemoryMessageStore::new());
        store.seed(
            "a",
            vec![
                PersistedMessage::new("user", "earlier"),
                PersistedMessage::new("assistant", "reply"),
                PersistedMessage::new("user", "latest"),
            ],
        );
        let orch = SessionOrchestrator::new(
            Arc::new(ScriptedProvider::new()),
            OrchestratorConfig {
                restore_limit: 2,
                ..OrchestratorConfig::default()
            },
        )
        .with_store(store);

        let handle = orch.load_session("a", None).await.unwrap();
        let history = handle.lock().await.get_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "latest");
    }

    #[tokio::test]
    async fn test_sync_session_with_database() {
        let orch = orchestrator(10);
        assert!(!orch.sync_session_with_database("missing", &[]).await);

        orch.get_or_create_session("a", Some(SystemInstruction::text("S")), None)
            .await
            .unwrap();
        orch.send_message("a", "old").await.unwrap();

        let fresh = vec![PersistedMessage::new("user", "new")];
        assert!(orch.sync_session_with_database("a", &fresh).await);

        let handle = orch.get_or_create_session("a", None, None).await.unwrap();
        let history = handle.lock().await.get_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "new");
    }

    #[tokio::test]
    async fn test_remove_and_health() {
        let orch = orchestrator(10);
        orch.get_or_create_session("a", None, None).await.unwrap();

        let health = orch.get_memory_health_status("a").await.unwrap();
        assert!(health.is_healthy());
        assert!(orch.get_memory_health_status("b").await.is_none());

        assert!(orch.remove_session("a"));
        assert!(!orch.remove_session("a"));
        assert_eq!(orch.get_session_stats().active_sessions, 0);
    }

    #[tokio::test]
    async fn test_rollout_controls_optimization() {
        let orch = orchestrator(10)
            .with_rollout(RolloutPolicy::new(RolloutConfig::empty().with_flag(CONTEXT_OPTIMIZATION, 0)));
        let handle = orch.get_or_create_session("a", None, None).await.unwrap();
        assert!(!handle.lock().await.optimization_enabled());
    }

    #[tokio::test]
    async fn test_sessions_share_monitor() {
        let monitor = OperationMonitor::shared();
        let orch = orchestrator(10).with_monitor(Arc::clone(&monitor));
        orch.get_or_create_session("a", None, None).await.unwrap();
        orch.get_or_create_session("b", None, None).await.unwrap();
        orch.send_message("a", "x").await.unwrap();
        orch.send_message("b", "y").await.unwrap();

        assert_eq!(monitor.operation_metrics("session_create").unwrap().count, 2);
        assert_eq!(monitor.operation_metrics("send_message").unwrap().count, 2);
    }
}
