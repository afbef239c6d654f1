// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Progressive memory fallback.
//!
//! Every memory operation of a session goes through
//! [`FallbackManager::execute_with_fallback`]. The primary operation is always
//! tried first. When it fails the manager escalates one [`FallbackLevel`] and
//! runs that level's substitute strategy against an in-process buffer that is
//! kept as a shadow copy of the primary while it is healthy. The level stays
//! degraded until the next primary success, and repeated failures end in a
//! [`ChatError::SessionMemory`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::store::{ops, MemoryArgs, MemoryFault, MemoryOutcome};
use super::strategy::{default_outcome, FallbackBuffer, StrategyTable};
use crate::error::ChatError;
use crate::types::Message;

/// Window in which fallback attempts count as recent.
pub const RECENT_FALLBACK_WINDOW: Duration = Duration::from_secs(300);

/// Degradation level, ordered from healthy to no memory at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackLevel {
    None,
    SimpleBuffer,
    BasicContext,
    NoMemory,
}

impl FallbackLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SimpleBuffer => "simple_buffer",
            Self::BasicContext => "basic_context",
            Self::NoMemory => "no_memory",
        }
    }

    pub fn is_degraded(&self) -> bool {
        *self != Self::None
    }
}

impl std::fmt::Display for FallbackLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The level after `current`, or `None` once there is nowhere left to go.
pub fn next_level(current: FallbackLevel) -> Option<FallbackLevel> {
    match current {
        FallbackLevel::None => Some(FallbackLevel::SimpleBuffer),
        FallbackLevel::SimpleBuffer => Some(FallbackLevel::BasicContext),
        FallbackLevel::BasicContext => Some(FallbackLevel::NoMemory),
        FallbackLevel::NoMemory => None,
    }
}

/// Fallback configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackConfig {
    /// Consecutive failures after which operations raise instead of degrading.
    pub max_fallback_attempts: u32,
    /// Recent messages kept at the simple-buffer level (and buffer capacity).
    pub simple_buffer_size: usize,
    /// Recent messages served at the basic-context level.
    pub basic_context_size: usize,
    pub preserve_system_messages: bool,
    /// A substitute strategy running longer than this counts as failed.
    #[serde(with = "duration_ms")]
    pub fallback_timeout: Duration,
    /// Fallback attempts kept for inspection.
    pub history_limit: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_fallback_attempts: 4,
            simple_buffer_size: 50,
            basic_context_size: 10,
            preserve_system_messages: true,
            fallback_timeout: Duration::from_secs(5),
            history_limit: 50,
        }
    }
}

/// Serde adapter storing a `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackAttempt {
    pub operation: String,
    pub attempt: u32,
    /// Level at which the failure happened.
    pub level: FallbackLevel,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Point-in-time view of a manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackStatus {
    pub level: FallbackLevel,
    pub attempts: u32,
    pub max_attempts: u32,
    pub recent_fallback_count: usize,
    pub buffer_len: usize,
}

/// Runs memory operations with progressive degradation.
#[derive(Debug)]
pub struct FallbackManager {
    config: FallbackConfig,
    strategies: StrategyTable,
    level: FallbackLevel,
    attempts: u32,
    buffer: FallbackBuffer,
    history: VecDeque<FallbackAttempt>,
}

impl FallbackManager {
    pub fn new(config: FallbackConfig) -> Self {
        let strategies = StrategyTable::standard(&config);
        Self::with_strategies(config, strategies)
    }

    pub fn with_strategies(config: FallbackConfig, strategies: StrategyTable) -> Self {
        let buffer = FallbackBuffer::new(config.simple_buffer_size, config.preserve_system_messages);
        Self {
            config,
            strategies,
            level: FallbackLevel::None,
            attempts: 0,
            buffer,
            history: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    pub fn current_level(&self) -> FallbackLevel {
        self.level
    }

    pub fn fallback_attempts(&self) -> u32 {
        self.attempts
    }

    /// Mutable access to the strategy table.
    pub fn strategies_mut(&mut self) -> &mut StrategyTable {
        &mut self.strategies
    }

    /// Run `operation` against the primary memory, degrading on failure.
    pub fn execute_with_fallback<F>(
        &mut self,
        operation_name: &str,
        args: MemoryArgs,
        operation: F,
    ) -> Result<MemoryOutcome, ChatError>
    where
        F: FnOnce(&MemoryArgs) -> Result<MemoryOutcome, MemoryFault>,
    {
        let mut error = match operation(&args) {
            Ok(outcome) => {
                self.mirror(operation_name, &args, &outcome);
                if self.level.is_degraded() {
                    tracing::info!(
                        operation = operation_name,
                        from = %self.level,
                        "Memory recovered, leaving fallback"
                    );
                    self.level = FallbackLevel::None;
                    self.attempts = 0;
                }
                return Ok(outcome);
            }
            Err(err) => err,
        };

        loop {
            self.attempts += 1;
            self.record(operation_name, &error);

            let next = next_level(self.level);
            if self.attempts >= self.config.max_fallback_attempts || next.is_none() {
                tracing::error!(
                    operation = operation_name,
                    attempts = self.attempts,
                    level = %self.level,
                    "Memory fallback exhausted: {}",
                    error
                );
                return Err(ChatError::SessionMemory {
                    operation: operation_name.to_string(),
                    attempts: self.attempts,
                    last_error: error.to_string(),
                });
            }

            if let Some(next) = next {
                tracing::warn!(
                    operation = operation_name,
                    from = %self.level,
                    to = %next,
                    attempt = self.attempts,
                    "Memory operation failed, degrading: {}",
                    error
                );
                self.level = next;
            }

            match self.run_substitute(operation_name, &args) {
                Ok(outcome) => return Ok(outcome),
                Err(err) => error = err,
            }
        }
    }

    fn run_substitute(&mut self, operation_name: &str, args: &MemoryArgs) -> Result<MemoryOutcome, MemoryFault> {
        let Some(strategy) = self.strategies.get(self.level, operation_name).cloned() else {
            tracing::debug!(
                operation = operation_name,
                level = %self.level,
                "No substitute strategy, returning default"
            );
            return Ok(default_outcome(operation_name));
        };

        let start = Instant::now();
        let outcome = strategy(&mut self.buffer, args)?;
        let elapsed = start.elapsed();
        if elapsed > self.config.fallback_timeout {
            return Err(MemoryFault(format!(
                "{} strategy at {} took {}ms, limit {}ms",
                operation_name,
                self.level,
                elapsed.as_millis(),
                self.config.fallback_timeout.as_millis()
            )));
        }
        Ok(outcome)
    }

    /// Keep the substitute buffer in step with a healthy primary.
    fn mirror(&mut self, operation_name: &str, args: &MemoryArgs, outcome: &MemoryOutcome) {
        match (operation_name, args, outcome) {
            (ops::ADD_MESSAGE, MemoryArgs::Message(message), _) => self.buffer.push(message.clone()),
            (ops::RESTORE_CONTEXT, MemoryArgs::Messages(messages), _) => self.buffer.replace(messages),
            (ops::GET_CONTEXT, _, MemoryOutcome::Messages(messages)) => self.buffer.replace(messages),
            (ops::CLEAR_MEMORY, _, _) => self.buffer.clear_recent(),
            _ => {}
        }
    }

    fn record(&mut self, operation_name: &str, error: &MemoryFault) {
        let limit = self.config.history_limit.max(1);
        while self.history.len() >= limit {
            self.history.pop_front();
        }
        self.history.push_back(FallbackAttempt {
            operation: operation_name.to_string(),
            attempt: self.attempts,
            level: self.level,
            error: error.to_string(),
            at: Utc::now(),
        });
    }

    /// Seed the substitute buffer directly, bypassing the primary.
    pub fn seed_buffer(&mut self, messages: &[Message]) {
        self.buffer.replace(messages);
    }

    /// Best context available without the primary: the buffer as seen from
    /// the current level (or the simple-buffer view when healthy).
    pub fn best_available(&self) -> Vec<Message> {
        match self.level {
            FallbackLevel::None | FallbackLevel::SimpleBuffer => self.buffer.view(self.config.simple_buffer_size),
            FallbackLevel::BasicContext => self.buffer.view(self.config.basic_context_size),
            FallbackLevel::NoMemory => self.buffer.preserved().to_vec(),
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &FallbackAttempt> {
        self.history.iter()
    }

    /// Attempts recorded within [`RECENT_FALLBACK_WINDOW`].
    pub fn recent_fallback_count(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(RECENT_FALLBACK_WINDOW).unwrap_or_else(|_| chrono::Duration::zero());
        self.history.iter().filter(|a| a.at >= cutoff).count()
    }

    pub fn get_status(&self) -> FallbackStatus {
        FallbackStatus {
            level: self.level,
            attempts: self.attempts,
            max_attempts: self.config.max_fallback_attempts,
            recent_fallback_count: self.recent_fallback_count(),
            buffer_len: self.buffer.len(),
        }
    }

    /// Return to the healthy level and forget history. The buffer is kept.
    pub fn reset(&mut self) {
        self.level = FallbackLevel::None;
        self.attempts = 0;
        self.history.clear();
    }
}

impl Default for FallbackManager {
    fn default() -> Self {
        Self::new(FallbackConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::strategy::strategy;

    fn fail(_: &MemoryArgs) -> Result<MemoryOutcome, MemoryFault> {
        Err(MemoryFault::new("primary down"))
    }

    fn ok(_: &MemoryArgs) -> Result<MemoryOutcome, MemoryFault> {
        Ok(MemoryOutcome::Done(true))
    }

    #[test]
    fn test_next_level_transitions() {
        assert_eq!(next_level(FallbackLevel::None), Some(FallbackLevel::SimpleBuffer));
        assert_eq!(next_level(FallbackLevel::SimpleBuffer), Some(FallbackLevel::BasicContext));
        assert_eq!(next_level(FallbackLevel::BasicContext), Some(FallbackLevel::NoMemory));
        assert_eq!(next_level(FallbackLevel::NoMemory), None);
    }

    #[test]
    fn test_primary_success_stays_healthy() {
        let mut manager = FallbackManager::default();
        let outcome = manager
            .execute_with_fallback(ops::ADD_MESSAGE, MemoryArgs::Message(Message::user("hi")), ok)
            .unwrap();
        assert_eq!(outcome, MemoryOutcome::Done(true));
        assert_eq!(manager.current_level(), FallbackLevel::None);
        // Shadowed into the buffer
        assert_eq!(manager.get_status().buffer_len, 1);
    }

    #[test]
    fn test_failure_degrades_one_level_and_uses_substitute() {
        let mut manager = FallbackManager::default();
        manager.seed_buffer(&[Message::system("S"), Message::user("a")]);

        let outcome = manager
            .execute_with_fallback(ops::GET_CONTEXT, MemoryArgs::None, fail)
            .unwrap();
        assert_eq!(manager.current_level(), FallbackLevel::SimpleBuffer);
        assert_eq!(manager.fallback_attempts(), 1);
        assert_eq!(outcome.into_messages(), vec![Message::system("S"), Message::user("a")]);
    }

    #[test]
    fn test_consecutive_failures_exhaust() {
        let mut manager = FallbackManager::default();
        let mut levels = Vec::new();
        for _ in 0..3 {
            manager
                .execute_with_fallback(ops::ADD_MESSAGE, MemoryArgs::Message(Message::user("x")), fail)
                .unwrap();
            levels.push(manager.current_level());
        }
        assert_eq!(
            levels,
            vec![FallbackLevel::SimpleBuffer, FallbackLevel::BasicContext, FallbackLevel::NoMemory]
        );
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));

        let err = manager
            .execute_with_fallback(ops::ADD_MESSAGE, MemoryArgs::Message(Message::user("x")), fail)
            .unwrap_err();
        match err {
            ChatError::SessionMemory { operation, attempts, last_error } => {
                assert_eq!(operation, "add_message");
                assert_eq!(attempts, 4);
                assert_eq!(last_error, "primary down");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(manager.history().count(), 4);
    }

    #[test]
    fn test_success_resets_after_degradation() {
        let mut manager = FallbackManager::default();
        manager
            .execute_with_fallback(ops::CLEAR_MEMORY, MemoryArgs::None, fail)
            .unwrap();
        manager
            .execute_with_fallback(ops::CLEAR_MEMORY, MemoryArgs::None, fail)
            .unwrap();
        assert_eq!(manager.current_level(), FallbackLevel::BasicContext);

        manager
            .execute_with_fallback(ops::CLEAR_MEMORY, MemoryArgs::None, ok)
            .unwrap();
        assert_eq!(manager.current_level(), FallbackLevel::None);
        assert_eq!(manager.fallback_attempts(), 0);
        // History survives recovery
        assert_eq!(manager.get_status().recent_fallback_count, 2);
    }

    #[test]
    fn test_failing_substitutes_escalate_within_one_call() {
        let config = FallbackConfig {
            max_fallback_attempts: 10,
            ..Default::default()
        };
        let mut table = StrategyTable::standard(&config);
        for level in [FallbackLevel::SimpleBuffer, FallbackLevel::BasicContext] {
            table.set(level, ops::GET_CONTEXT, strategy(|_, _| Err(MemoryFault::new("substitute down"))));
        }
        let mut manager = FallbackManager::with_strategies(config, table);
        manager.seed_buffer(&[Message::system("S"), Message::user("a")]);

        let outcome = manager
            .execute_with_fallback(ops::GET_CONTEXT, MemoryArgs::None, fail)
            .unwrap();
        assert_eq!(manager.current_level(), FallbackLevel::NoMemory);
        assert_eq!(manager.fallback_attempts(), 3);
        assert_eq!(outcome.into_messages(), vec![Message::system("S")]);

        let levels: Vec<_> = manager.history().map(|a| a.level).collect();
        assert_eq!(
            levels,
            vec![FallbackLevel::None, FallbackLevel::SimpleBuffer, FallbackLevel::BasicContext]
        );
    }

    #[test]
    fn test_exhaustion_when_every_level_fails() {
        let config = FallbackConfig {
            max_fallback_attempts: 10,
            ..Default::default()
        };
        let mut table = StrategyTable::empty();
        for level in [FallbackLevel::SimpleBuffer, FallbackLevel::BasicContext, FallbackLevel::NoMemory] {
            table.set(level, ops::ADD_MESSAGE, strategy(|_, _| Err(MemoryFault::new("nope"))));
        }
        let mut manager = FallbackManager::with_strategies(config, table);
        let err = manager
            .execute_with_fallback(ops::ADD_MESSAGE, MemoryArgs::Message(Message::user("x")), fail)
            .unwrap_err();
        assert!(matches!(err, ChatError::SessionMemory { attempts: 4, .. }));
    }

    #[test]
    fn test_unknown_operation_returns_safe_default() {
        let mut manager = FallbackManager::default();
        assert_eq!(
            manager.execute_with_fallback("save_checkpoint", MemoryArgs::None, fail).unwrap(),
            MemoryOutcome::Done(true)
        );
        assert_eq!(
            manager.execute_with_fallback("load_profile", MemoryArgs::None, fail).unwrap(),
            MemoryOutcome::Messages(vec![])
        );
        assert_eq!(
            manager.execute_with_fallback("summarize", MemoryArgs::None, fail).unwrap(),
            MemoryOutcome::Nothing
        );
    }

    #[test]
    fn test_slow_substitute_counts_as_failure() {
        let config = FallbackConfig {
            max_fallback_attempts: 2,
            fallback_timeout: Duration::from_millis(1),
            ..Default::default()
        };
        let mut table = StrategyTable::standard(&config);
        table.set(
            FallbackLevel::SimpleBuffer,
            ops::GET_CONTEXT,
            strategy(|_, _| {
                std::thread::sleep(Duration::from_millis(20));
                Ok(MemoryOutcome::Messages(vec![]))
            }),
        );
        let mut manager = FallbackManager::with_strategies(config, table);
        let err = manager
            .execute_with_fallback(ops::GET_CONTEXT, MemoryArgs::None, fail)
            .unwrap_err();
        match err {
            ChatError::SessionMemory { last_error, .. } => assert!(last_error.contains("took")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let config = FallbackConfig {
            max_fallback_attempts: 100,
            history_limit: 3,
            ..Default::default()
        };
        let mut manager = FallbackManager::new(config);
        for _ in 0..3 {
            let _ = manager.execute_with_fallback(ops::GET_CONTEXT, MemoryArgs::None, fail);
        }
        // NoMemory is terminal: the fourth failure raises
        assert!(manager.execute_with_fallback(ops::GET_CONTEXT, MemoryArgs::None, fail).is_err());
        assert_eq!(manager.history().count(), 3);
        assert_eq!(manager.history().last().map(|a| a.attempt), Some(4));
    }

    #[test]
    fn test_get_context_success_refreshes_shadow() {
        let mut manager = FallbackManager::default();
        manager
            .execute_with_fallback(ops::GET_CONTEXT, MemoryArgs::None, |_| {
                Ok(MemoryOutcome::Messages(vec![Message::system("S"), Message::user("q")]))
            })
            .unwrap();
        assert_eq!(manager.best_available(), vec![Message::system("S"), Message::user("q")]);
    }

    #[test]
    fn test_config_serde_uses_millis() {
        let json = serde_json::to_value(FallbackConfig::default()).unwrap();
        assert_eq!(json["fallbackTimeout"], 5000);
        assert_eq!(json["maxFallbackAttempts"], 4);
    }
}
