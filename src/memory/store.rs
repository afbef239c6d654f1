// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Primary conversation memory and the named-operation vocabulary shared with
//! the fallback manager.

use thiserror::Error;

use crate::types::Message;

/// Operation names understood by memory backends and fallback strategies.
pub mod ops {
    pub const ADD_MESSAGE: &str = "add_message";
    pub const GET_CONTEXT: &str = "get_context";
    pub const RESTORE_CONTEXT: &str = "restore_context";
    pub const CLEAR_MEMORY: &str = "clear_memory";
}

/// A memory backend failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct MemoryFault(pub String);

impl MemoryFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Arguments of a named memory operation.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryArgs {
    None,
    Message(Message),
    Messages(Vec<Message>),
}

/// Result of a named memory operation.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryOutcome {
    /// A write finished; `false` if it was accepted but had no effect.
    Done(bool),
    Messages(Vec<Message>),
    Nothing,
}

impl MemoryOutcome {
    /// Messages carried by a read, empty otherwise.
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Self::Messages(messages) => messages,
            _ => Vec::new(),
        }
    }
}

/// The primary conversation memory of a session.
pub trait ConversationMemory: Send + Sync {
    fn add_message(&mut self, message: Message) -> Result<(), MemoryFault>;

    /// Full context in order, system messages included.
    fn messages(&self) -> Result<Vec<Message>, MemoryFault>;

    /// Replace the whole context.
    fn replace(&mut self, messages: Vec<Message>) -> Result<(), MemoryFault>;

    /// Remove non-system messages.
    fn clear(&mut self) -> Result<(), MemoryFault>;
}

/// Dispatch a named operation against a primary memory.
pub fn apply_operation(
    memory: &mut dyn ConversationMemory,
    operation: &str,
    args: &MemoryArgs,
) -> Result<MemoryOutcome, MemoryFault> {
    match (operation, args) {
        (ops::ADD_MESSAGE, MemoryArgs::Message(message)) => {
            memory.add_message(message.clone())?;
            Ok(MemoryOutcome::Done(true))
        }
        (ops::GET_CONTEXT, _) => Ok(MemoryOutcome::Messages(memory.messages()?)),
        (ops::RESTORE_CONTEXT, MemoryArgs::Messages(messages)) => {
            memory.replace(messages.clone())?;
            Ok(MemoryOutcome::Done(true))
        }
        (ops::CLEAR_MEMORY, _) => {
            memory.clear()?;
            Ok(MemoryOutcome::Done(true))
        }
        (name, args) => Err(MemoryFault(format!(
            "unsupported memory operation '{}' with {:?}",
            name, args
        ))),
    }
}

/// In-process, unbounded message buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferMemory {
    messages: Vec<Message>,
}

impl BufferMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl ConversationMemory for BufferMemory {
    fn add_message(&mut self, message: Message) -> Result<(), MemoryFault> {
        self.messages.push(message);
        Ok(())
    }

    fn messages(&self) -> Result<Vec<Message>, MemoryFault> {
        Ok(self.messages.clone())
    }

    fn replace(&mut self, messages: Vec<Message>) -> Result<(), MemoryFault> {
        self.messages = messages;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), MemoryFault> {
        self.messages.retain(Message::is_system);
        Ok(())
    }
}
