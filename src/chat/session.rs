// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A single conversation with the model.
//!
//! [`ChatSession`] owns the primary conversation memory, the fallback manager
//! that stands in for it when it fails, and the context optimizer. Every memory
//! access goes through [`FallbackManager::execute_with_fallback`]; every public
//! operation is recorded on the injected [`OperationMonitor`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::instrument;

use super::instructions::{InstructionRegistry, SystemInstruction};
use crate::error::ChatError;
use crate::memory::{
    apply_operation, ops, select_recent_window, BufferMemory, ContextOptimizer, ConversationMemory,
    ExtractiveSummarizer, FallbackConfig, FallbackLevel, FallbackManager, MemoryArgs, MemoryOutcome,
    OptimizerConfig, OptimizerStats, ProviderSummarizer, Summarizer,
};
use crate::persistence::PersistedMessage;
use crate::telemetry::{OperationCompletion, OperationKind, OperationMonitor};
use crate::types::{Message, ProviderResponse, Role, SharedProvider, StreamEvent};

/// Receives streamed reply text as it arrives.
pub type ChunkCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Construction options for a [`ChatSession`].
#[derive(Clone)]
pub struct SessionOptions {
    pub session_id: String,
    pub system_instruction: Option<SystemInstruction>,
    pub optimizer: OptimizerConfig,
    pub fallback: FallbackConfig,
    pub optimization_enabled: bool,
    /// Summarize with the model instead of extractively.
    pub use_model_summaries: bool,
    /// Shared monitor; a private one is created when absent.
    pub monitor: Option<Arc<OperationMonitor>>,
}

impl SessionOptions {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            system_instruction: None,
            optimizer: OptimizerConfig::default(),
            fallback: FallbackConfig::default(),
            optimization_enabled: true,
            use_model_summaries: false,
            monitor: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: SystemInstruction) -> Self {
        self.system_instruction = Some(instruction);
        self
    }

    pub fn with_optimizer(mut self, config: OptimizerConfig) -> Self {
        self.optimizer = config;
        self
    }

    pub fn with_fallback(mut self, config: FallbackConfig) -> Self {
        self.fallback = config;
        self
    }

    pub fn with_optimization(mut self, enabled: bool) -> Self {
        self.optimization_enabled = enabled;
        self
    }

    pub fn with_model_summaries(mut self, enabled: bool) -> Self {
        self.use_model_summaries = enabled;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<OperationMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }
}

/// One visible history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Summary of a session for callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub model: String,
    pub message_count: usize,
    pub fallback_level: FallbackLevel,
    pub optimization_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Memory health of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryHealth {
    pub session_id: String,
    pub fallback_level: FallbackLevel,
    pub fallback_attempts: u32,
    pub max_fallback_attempts: u32,
    pub recent_fallback_count: usize,
    pub buffer_len: usize,
    pub context_tokens: u64,
    pub optimization_enabled: bool,
    pub optimizer_stats: OptimizerStats,
}

impl MemoryHealth {
    pub fn is_healthy(&self) -> bool {
        !self.fallback_level.is_degraded()
    }
}

/// A provider reply together with what it cost.
struct Exchange {
    reply: String,
    tokens_used: u64,
    tokens_saved: u64,
    messages: usize,
}

/// A conversation bound to one provider.
pub struct ChatSession {
    session_id: String,
    provider: SharedProvider,
    memory: Box<dyn ConversationMemory>,
    fallback: FallbackManager,
    optimizer: ContextOptimizer,
    monitor: Arc<OperationMonitor>,
    system_prompt: Option<String>,
    optimization_enabled: bool,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    /// Set when a memory operation ran degraded during the current call.
    fallback_seen: bool,
}

impl ChatSession {
    /// Create a session backed by an in-process buffer.
    pub fn new(
        provider: SharedProvider,
        options: SessionOptions,
        registry: &dyn InstructionRegistry,
    ) -> Result<Self, ChatError> {
        Self::with_memory(provider, options, registry, Box::new(BufferMemory::new()))
    }

    /// Create a session over a caller-supplied primary memory.
    pub fn with_memory(
        provider: SharedProvider,
        options: SessionOptions,
        registry: &dyn InstructionRegistry,
        memory: Box<dyn ConversationMemory>,
    ) -> Result<Self, ChatError> {
        if options.session_id.trim().is_empty() {
            return Err(ChatError::Validation("Session id must not be empty".to_string()));
        }
        if provider.model().trim().is_empty() {
            return Err(ChatError::ModelInitialization(format!(
                "{} provider has no model configured",
                provider.name()
            )));
        }

        let system_prompt = match &options.system_instruction {
            Some(instruction) => instruction.resolve(registry)?,
            None => None,
        };

        let summarizer: Arc<dyn Summarizer> = if options.use_model_summaries {
            Arc::new(ProviderSummarizer::new(Arc::clone(&provider)))
        } else {
            Arc::new(ExtractiveSummarizer)
        };

        let now = Utc::now();
        let mut session = Self {
            session_id: options.session_id,
            provider,
            memory,
            fallback: FallbackManager::new(options.fallback),
            optimizer: ContextOptimizer::with_summarizer(options.optimizer, summarizer),
            monitor: options.monitor.unwrap_or_else(OperationMonitor::shared),
            system_prompt,
            optimization_enabled: options.optimization_enabled,
            created_at: now,
            last_activity: now,
            fallback_seen: false,
        };

        if let Some(prompt) = session.system_prompt.clone() {
            session.memory_op(ops::ADD_MESSAGE, MemoryArgs::Message(Message::system(prompt)))?;
        }
        tracing::debug!(
            session = %session.session_id,
            model = %session.provider.model(),
            system = session.system_prompt.is_some(),
            "Chat session created"
        );
        Ok(session)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn optimization_enabled(&self) -> bool {
        self.optimization_enabled
    }

    pub fn monitor(&self) -> &Arc<OperationMonitor> {
        &self.monitor
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Direct access to the fallback manager.
    pub fn fallback_mut(&mut self) -> &mut FallbackManager {
        &mut self.fallback
    }

    fn memory_op(&mut self, name: &str, args: MemoryArgs) -> Result<MemoryOutcome, ChatError> {
        let memory = &mut self.memory;
        let outcome = self
            .fallback
            .execute_with_fallback(name, args, |args| apply_operation(memory.as_mut(), name, args));
        if self.fallback.current_level().is_degraded() {
            self.fallback_seen = true;
        }
        outcome
    }

    fn context(&mut self) -> Result<Vec<Message>, ChatError> {
        self.memory_op(ops::GET_CONTEXT, MemoryArgs::None)
            .map(MemoryOutcome::into_messages)
    }

    /// Messages as they stand, without touching fallback state.
    fn current_messages(&self) -> Vec<Message> {
        if self.fallback.current_level().is_degraded() {
            return self.fallback.best_available();
        }
        self.memory
            .messages()
            .unwrap_or_else(|_| self.fallback.best_available())
    }

    /// Send a message and return the reply.
    ///
    /// The user and assistant messages are committed together only once the
    /// model has answered; a failed call leaves history untouched.
    #[instrument(skip(self, text), fields(session = %self.session_id))]
    pub async fn send_message(&mut self, text: &str) -> Result<String, ChatError> {
        let guard = self
            .monitor
            .monitor_operation(OperationKind::SendMessage, Some(&self.session_id));
        self.fallback_seen = false;

        match self.exchange(text, None, None).await {
            Ok(exchange) => {
                guard.finish(self.completion(&exchange));
                Ok(exchange.reply)
            }
            Err(err) => {
                tracing::warn!(error_type = err.error_type(), "send_message failed: {}", err);
                guard.fail_with_fallback(&err, self.fallback_seen);
                Err(err)
            }
        }
    }

    /// Send a message, forwarding reply text to `on_chunk` as it streams.
    ///
    /// Sending `true` on `cancel` aborts the call with [`ChatError::Cancelled`].
    /// Nothing is appended unless the stream completes.
    #[instrument(skip(self, text, on_chunk, cancel), fields(session = %self.session_id))]
    pub async fn send_message_stream(
        &mut self,
        text: &str,
        on_chunk: ChunkCallback,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<String, ChatError> {
        let guard = self
            .monitor
            .monitor_operation(OperationKind::StreamMessage, Some(&self.session_id));
        self.fallback_seen = false;

        match self.exchange(text, Some(on_chunk), cancel).await {
            Ok(exchange) => {
                guard.finish(self.completion(&exchange));
                Ok(exchange.reply)
            }
            Err(err) => {
                tracing::warn!(error_type = err.error_type(), "stream failed: {}", err);
                guard.fail_with_fallback(&err, self.fallback_seen);
                Err(err)
            }
        }
    }

    fn completion(&self, exchange: &Exchange) -> OperationCompletion {
        OperationCompletion::success()
            .tokens(exchange.tokens_used)
            .messages(exchange.messages)
            .fallback(self.fallback_seen)
            .saved(exchange.tokens_saved)
    }

    async fn exchange(
        &mut self,
        text: &str,
        on_chunk: Option<ChunkCallback>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<Exchange, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Validation("Message must not be empty".to_string()));
        }

        let (mut context, tokens_saved) = self.prepare_context().await?;
        context.push(Message::user(text));

        let response = match on_chunk {
            Some(on_chunk) => self.stream_reply(&context, on_chunk, cancel).await?,
            None => self.provider.chat(&context).await?,
        };

        let tokens_used = match &response.usage {
            Some(usage) => usage.total() as u64,
            None => {
                self.optimizer.calculate_token_usage(&context)
                    + crate::memory::estimate_text_tokens(&response.content)
            }
        };

        // The optimized context, the user message and the reply land in one
        // write so a memory failure leaves the previous history intact.
        let reply = response.content;
        let messages = context.len() + 1;
        context.push(Message::assistant(reply.clone()));
        self.memory_op(ops::RESTORE_CONTEXT, MemoryArgs::Messages(context))?;
        self.last_activity = Utc::now();

        Ok(Exchange {
            reply,
            tokens_used,
            tokens_saved,
            messages,
        })
    }

    async fn stream_reply(
        &self,
        context: &[Message],
        on_chunk: ChunkCallback,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<ProviderResponse, ChatError> {
        let on_event = Box::new(move |event: StreamEvent| {
            if let StreamEvent::TextDelta(text) = event {
                on_chunk(&text);
            }
        });
        let call = self.provider.stream_chat(context, on_event);

        let Some(mut cancel) = cancel else {
            return Ok(call.await?);
        };
        if *cancel.borrow() {
            return Err(ChatError::Cancelled);
        }
        tokio::select! {
            response = call => Ok(response?),
            _ = cancelled(&mut cancel) => {
                tracing::info!(session = %self.session_id, "Stream cancelled by caller");
                Err(ChatError::Cancelled)
            }
        }
    }

    /// Read the context, optimizing it first when it is over threshold.
    /// Returns the context and the tokens saved. Nothing is written back;
    /// the caller commits the optimized context with the exchange. Fails with
    /// [`ChatError::ContextOptimization`] when the optimized context still
    /// exceeds the token budget.
    async fn prepare_context(&mut self) -> Result<(Vec<Message>, u64), ChatError> {
        let context = self.context()?;
        if !self.optimization_enabled || !self.optimizer.should_optimize_context(&context) {
            return Ok((context, 0));
        }

        let guard = self
            .monitor
            .monitor_operation(OperationKind::OptimizeContext, Some(&self.session_id));
        let result = self.optimizer.optimize_context(&context).await;
        let limit = self.optimizer.config().max_context_tokens;
        if result.tokens_after > limit {
            let err = ChatError::ContextOptimization(format!(
                "context is still {} tokens after optimization, limit is {}",
                result.tokens_after, limit
            ));
            guard.fail(&err);
            return Err(err);
        }
        let saved = result.tokens_saved();
        guard.finish(
            OperationCompletion::success()
                .tokens(result.tokens_after)
                .messages(result.messages.len())
                .saved(saved),
        );
        Ok((result.messages, saved))
    }

    /// Replace the conversation with persisted messages.
    ///
    /// Unknown roles and empty content are skipped, only the most recent
    /// retention window is kept, and the configured system instruction stays
    /// first. If memory is exhausted the restored messages are kept in the
    /// fallback buffer instead of failing. Returns the number of non-system
    /// messages restored.
    #[instrument(skip(self, persisted), fields(session = %self.session_id, count = persisted.len()))]
    pub async fn restore_context(&mut self, persisted: &[PersistedMessage]) -> Result<usize, ChatError> {
        let guard = self
            .monitor
            .monitor_operation(OperationKind::RestoreContext, Some(&self.session_id));
        self.fallback_seen = false;

        let mut restored: Vec<Message> = persisted
            .iter()
            .filter_map(|p| {
                let message = p.to_message();
                if message.is_none() {
                    tracing::debug!(role = %p.role, "Skipping unrestorable message");
                }
                message
            })
            .filter(|m| !(m.is_system() && Some(m.content.as_str()) == self.system_prompt.as_deref()))
            .collect();

        let window = self.optimizer.restore_window();
        if restored.iter().filter(|m| !m.is_system()).count() > window {
            restored = select_recent_window(&restored, window);
        }

        let mut messages = Vec::with_capacity(restored.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend(restored);

        let mut tokens_saved = 0;
        if self.optimization_enabled && self.optimizer.should_optimize_context(&messages) {
            let result = self.optimizer.optimize_context(&messages).await;
            tokens_saved = result.tokens_saved();
            messages = result.messages;
        }

        let count = messages.iter().filter(|m| !m.is_system()).count();
        match self.memory_op(ops::RESTORE_CONTEXT, MemoryArgs::Messages(messages.clone())) {
            Ok(_) => {}
            Err(ChatError::SessionMemory { attempts, last_error, .. }) => {
                tracing::warn!(
                    attempts,
                    "Memory exhausted during restore, keeping messages in fallback buffer: {}",
                    last_error
                );
                self.fallback.seed_buffer(&messages);
                self.fallback_seen = true;
            }
            Err(err) => {
                guard.fail_with_fallback(&err, self.fallback_seen);
                return Err(err);
            }
        }
        self.last_activity = Utc::now();

        guard.finish(
            OperationCompletion::success()
                .messages(count)
                .fallback(self.fallback_seen)
                .saved(tokens_saved),
        );
        Ok(count)
    }

    /// Remove every non-system message.
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub fn clear_history(&mut self) -> Result<(), ChatError> {
        let guard = self
            .monitor
            .monitor_operation(OperationKind::ClearHistory, Some(&self.session_id));
        self.fallback_seen = false;

        match self.memory_op(ops::CLEAR_MEMORY, MemoryArgs::None) {
            Ok(_) => {
                self.last_activity = Utc::now();
                guard.finish(OperationCompletion::success().fallback(self.fallback_seen));
                Ok(())
            }
            Err(err) => {
                guard.fail_with_fallback(&err, self.fallback_seen);
                Err(err)
            }
        }
    }

    /// Number of user and assistant messages.
    pub fn get_message_count(&self) -> usize {
        self.current_messages().iter().filter(|m| !m.is_system()).count()
    }

    /// User and assistant messages in order.
    pub fn get_history(&self) -> Vec<HistoryEntry> {
        self.current_messages()
            .into_iter()
            .filter(|m| !m.is_system())
            .map(|m| HistoryEntry {
                role: m.role,
                content: m.content,
            })
            .collect()
    }

    /// The full context sent to the model, system messages included.
    pub fn conversation_history(&mut self) -> Result<Vec<Message>, ChatError> {
        self.context()
    }

    pub fn memory_health(&self) -> MemoryHealth {
        let status = self.fallback.get_status();
        MemoryHealth {
            session_id: self.session_id.clone(),
            fallback_level: status.level,
            fallback_attempts: status.attempts,
            max_fallback_attempts: status.max_attempts,
            recent_fallback_count: status.recent_fallback_count,
            buffer_len: status.buffer_len,
            context_tokens: self.optimizer.calculate_token_usage(&self.current_messages()),
            optimization_enabled: self.optimization_enabled,
            optimizer_stats: self.optimizer.stats().clone(),
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            model: self.provider.model().to_string(),
            message_count: self.get_message_count(),
            fallback_level: self.fallback.current_level(),
            optimization_enabled: self.optimization_enabled,
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }
}

/// Resolves once `true` is observed. Never resolves if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
