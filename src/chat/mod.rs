// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Chat sessions.
//!
//! A [`ChatSession`] is one conversation: it resolves its system instruction
//! through an [`InstructionRegistry`], keeps history in a primary memory
//! guarded by the fallback manager, optimizes context before each call and
//! records every operation on an [`OperationMonitor`](crate::telemetry::OperationMonitor).

mod instructions;
mod session;

pub use instructions::{InstructionRegistry, PresetRegistry, SystemInstruction};
pub use session::{ChatSession, ChunkCallback, HistoryEntry, MemoryHealth, SessionInfo, SessionOptions};
