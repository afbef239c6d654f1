// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Substitute memory strategies used while a session is degraded.
//!
//! Each degraded [`FallbackLevel`] maps operation names to a [`Strategy`]
//! acting on the shared [`FallbackBuffer`]. The table is plain data so tests
//! can swap single entries.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::fallback::{FallbackConfig, FallbackLevel};
use super::store::{ops, MemoryArgs, MemoryFault, MemoryOutcome};
use crate::types::Message;

/// Substitute implementation of one named operation.
pub type Strategy =
    Arc<dyn Fn(&mut FallbackBuffer, &MemoryArgs) -> Result<MemoryOutcome, MemoryFault> + Send + Sync>;

/// Wrap a closure as a [`Strategy`].
pub fn strategy<F>(f: F) -> Strategy
where
    F: Fn(&mut FallbackBuffer, &MemoryArgs) -> Result<MemoryOutcome, MemoryFault> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// In-process copy of the conversation kept for degraded operation.
///
/// System messages live in `preserved` (when preservation is on) and are never
/// evicted; everything else rolls through `recent`.
#[derive(Debug, Clone)]
pub struct FallbackBuffer {
    preserved: Vec<Message>,
    recent: VecDeque<Message>,
    capacity: usize,
    preserve_system: bool,
}

impl FallbackBuffer {
    pub fn new(capacity: usize, preserve_system: bool) -> Self {
        Self {
            preserved: Vec::new(),
            recent: VecDeque::with_capacity(capacity.min(256)),
            capacity: capacity.max(1),
            preserve_system,
        }
    }

    pub fn push(&mut self, message: Message) {
        if message.is_system() && self.preserve_system {
            if !self.preserved.contains(&message) {
                self.preserved.push(message);
            }
            return;
        }
        self.recent.push_back(message);
        while self.recent.len() > self.capacity {
            self.recent.pop_front();
        }
    }

    /// Replace the whole buffer.
    pub fn replace(&mut self, messages: &[Message]) {
        self.preserved.clear();
        self.recent.clear();
        for message in messages {
            self.push(message.clone());
        }
    }

    /// Drop everything except system messages.
    pub fn clear_recent(&mut self) {
        self.recent.retain(Message::is_system);
    }

    /// Keep only preserved messages and forget the rest.
    pub fn retain_preserved(&mut self) {
        self.recent.clear();
    }

    /// Preserved messages followed by the last `window` recent ones.
    pub fn view(&self, window: usize) -> Vec<Message> {
        let skip = self.recent.len().saturating_sub(window);
        self.preserved
            .iter()
            .chain(self.recent.iter().skip(skip))
            .cloned()
            .collect()
    }

    pub fn preserved(&self) -> &[Message] {
        &self.preserved
    }

    pub fn len(&self) -> usize {
        self.preserved.len() + self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Broad class of an operation, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    Mutating,
    Read,
    Other,
}

const MUTATING_PREFIXES: &[&str] = &["add_", "save_", "clear_", "restore_", "set_", "update_", "delete_"];
const READ_PREFIXES: &[&str] = &["get_", "load_", "list_", "fetch_"];

pub fn classify_operation(name: &str) -> OperationClass {
    if MUTATING_PREFIXES.iter().any(|p| name.starts_with(p)) {
        OperationClass::Mutating
    } else if READ_PREFIXES.iter().any(|p| name.starts_with(p)) {
        OperationClass::Read
    } else {
        OperationClass::Other
    }
}

/// Result returned for operations with no registered strategy.
pub fn default_outcome(name: &str) -> MemoryOutcome {
    match classify_operation(name) {
        OperationClass::Mutating => MemoryOutcome::Done(true),
        OperationClass::Read => MemoryOutcome::Messages(Vec::new()),
        OperationClass::Other => MemoryOutcome::Nothing,
    }
}

/// Strategies by level and operation name.
#[derive(Clone, Default)]
pub struct StrategyTable {
    strategies: HashMap<FallbackLevel, HashMap<String, Strategy>>,
}

impl StrategyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in strategies for every degraded level.
    pub fn standard(config: &FallbackConfig) -> Self {
        let mut table = Self::empty();
        table.insert_windowed(FallbackLevel::SimpleBuffer, config.simple_buffer_size);
        table.insert_windowed(FallbackLevel::BasicContext, config.basic_context_size);

        let level = FallbackLevel::NoMemory;
        let preserve = config.preserve_system_messages;
        table.set(
            level,
            ops::ADD_MESSAGE,
            strategy(move |buffer, args| {
                // Writes go nowhere, but system messages are still kept
                if let MemoryArgs::Message(message) = args {
                    if preserve && message.is_system() {
                        buffer.push(message.clone());
                    }
                }
                Ok(MemoryOutcome::Done(true))
            }),
        );
        table.set(
            level,
            ops::GET_CONTEXT,
            strategy(|buffer, _| Ok(MemoryOutcome::Messages(buffer.preserved().to_vec()))),
        );
        table.set(
            level,
            ops::RESTORE_CONTEXT,
            strategy(|buffer, args| {
                if let MemoryArgs::Messages(messages) = args {
                    buffer.replace(messages);
                    buffer.retain_preserved();
                }
                Ok(MemoryOutcome::Done(true))
            }),
        );
        table.set(
            level,
            ops::CLEAR_MEMORY,
            strategy(|buffer, _| {
                buffer.clear_recent();
                Ok(MemoryOutcome::Done(true))
            }),
        );
        table
    }

    fn insert_windowed(&mut self, level: FallbackLevel, window: usize) {
        self.set(
            level,
            ops::ADD_MESSAGE,
            strategy(|buffer, args| match args {
                MemoryArgs::Message(message) => {
                    buffer.push(message.clone());
                    Ok(MemoryOutcome::Done(true))
                }
                _ => Err(MemoryFault::new("add_message requires a message")),
            }),
        );
        self.set(
            level,
            ops::GET_CONTEXT,
            strategy(move |buffer, _| Ok(MemoryOutcome::Messages(buffer.view(window)))),
        );
        self.set(
            level,
            ops::RESTORE_CONTEXT,
            strategy(|buffer, args| match args {
                MemoryArgs::Messages(messages) => {
                    buffer.replace(messages);
                    Ok(MemoryOutcome::Done(true))
                }
                _ => Err(MemoryFault::new("restore_context requires messages")),
            }),
        );
        self.set(
            level,
            ops::CLEAR_MEMORY,
            strategy(|buffer, _| {
                buffer.clear_recent();
                Ok(MemoryOutcome::Done(true))
            }),
        );
    }

    /// Register or replace a strategy.
    pub fn set(&mut self, level: FallbackLevel, operation: &str, strategy: Strategy) {
        self.strategies
            .entry(level)
            .or_default()
            .insert(operation.to_string(), strategy);
    }

    pub fn get(&self, level: FallbackLevel, operation: &str) -> Option<&Strategy> {
        self.strategies.get(&level)?.get(operation)
    }
}

impl std::fmt::Debug for StrategyTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (level, ops) in &self.strategies {
            let mut names: Vec<&String> = ops.keys().collect();
            names.sort();
            map.entry(level, &names);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(table: &StrategyTable, level: FallbackLevel, op: &str, buffer: &mut FallbackBuffer, args: MemoryArgs) -> MemoryOutcome {
        let strategy = table.get(level, op).unwrap();
        strategy(buffer, &args).unwrap()
    }

    #[test]
    fn test_buffer_preserves_system_and_bounds_recent() {
        let mut buffer = FallbackBuffer::new(3, true);
        buffer.push(Message::system("S"));
        for i in 0..5 {
            buffer.push(Message::user(format!("m{}", i)));
        }
        buffer.push(Message::system("S"));

        assert_eq!(buffer.len(), 4);
        let view = buffer.view(2);
        assert_eq!(view, vec![Message::system("S"), Message::user("m3"), Message::user("m4")]);

        buffer.clear_recent();
        assert_eq!(buffer.view(10), vec![Message::system("S")]);
    }

    #[test]
    fn test_buffer_without_preservation_evicts_system() {
        let mut buffer = FallbackBuffer::new(2, false);
        buffer.push(Message::system("S"));
        buffer.push(Message::user("a"));
        buffer.push(Message::user("b"));
        assert_eq!(buffer.view(10), vec![Message::user("a"), Message::user("b")]);
    }

    #[test]
    fn test_classify_operation() {
        assert_eq!(classify_operation("save_context"), OperationClass::Mutating);
        assert_eq!(classify_operation("delete_session"), OperationClass::Mutating);
        assert_eq!(classify_operation("list_sessions"), OperationClass::Read);
        assert_eq!(classify_operation("summarize"), OperationClass::Other);

        assert_eq!(default_outcome("update_title"), MemoryOutcome::Done(true));
        assert_eq!(default_outcome("fetch_recent"), MemoryOutcome::Messages(vec![]));
        assert_eq!(default_outcome("ping"), MemoryOutcome::Nothing);
    }

    #[test]
    fn test_levels_use_their_window() {
        let config = FallbackConfig {
            simple_buffer_size: 4,
            basic_context_size: 2,
            ..Default::default()
        };
        let table = StrategyTable::standard(&config);
        let mut buffer = FallbackBuffer::new(config.simple_buffer_size, true);
        let mut messages = vec![Message::system("S")];
        messages.extend((0..6).map(|i| Message::user(format!("m{}", i))));
        run(&table, FallbackLevel::SimpleBuffer, ops::RESTORE_CONTEXT, &mut buffer, MemoryArgs::Messages(messages));

        let simple = run(&table, FallbackLevel::SimpleBuffer, ops::GET_CONTEXT, &mut buffer, MemoryArgs::None);
        assert_eq!(simple.into_messages().len(), 5);

        let basic = run(&table, FallbackLevel::BasicContext, ops::GET_CONTEXT, &mut buffer, MemoryArgs::None)
            .into_messages();
        assert_eq!(basic, vec![Message::system("S"), Message::user("m4"), Message::user("m5")]);

        let none = run(&table, FallbackLevel::NoMemory, ops::GET_CONTEXT, &mut buffer, MemoryArgs::None);
        assert_eq!(none.into_messages(), vec![Message::system("S")]);
    }

    #[test]
    fn test_no_memory_writes_into_void() {
        let table = StrategyTable::standard(&FallbackConfig::default());
        let mut buffer = FallbackBuffer::new(10, true);
        let outcome = run(
            &table,
            FallbackLevel::NoMemory,
            ops::ADD_MESSAGE,
            &mut buffer,
            MemoryArgs::Message(Message::user("lost")),
        );
        assert_eq!(outcome, MemoryOutcome::Done(true));
        assert!(buffer.is_empty());

        run(
            &table,
            FallbackLevel::NoMemory,
            ops::ADD_MESSAGE,
            &mut buffer,
            MemoryArgs::Message(Message::system("kept")),
        );
        assert_eq!(buffer.preserved(), &[Message::system("kept")]);
    }

    #[test]
    fn test_override_strategy() {
        let mut table = StrategyTable::standard(&FallbackConfig::default());
        table.set(
            FallbackLevel::SimpleBuffer,
            ops::GET_CONTEXT,
            strategy(|_, _| Err(MemoryFault::new("broken"))),
        );
        let mut buffer = FallbackBuffer::new(10, true);
        let strategy = table.get(FallbackLevel::SimpleBuffer, ops::GET_CONTEXT).unwrap();
        assert!(strategy(&mut buffer, &MemoryArgs::None).is_err());
        assert!(table.get(FallbackLevel::None, ops::GET_CONTEXT).is_none());
    }
}
