// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Percentage rollout of session features.
//!
//! A flag is enabled for a session when the session falls into the flag's
//! percentage bucket. Bucketing hashes `flag:session_id`, so a session keeps
//! its answer for a given flag across restarts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Flag deciding whether new sessions get context optimization.
pub const CONTEXT_OPTIMIZATION: &str = "context_optimization";

/// Rollout percentages by flag name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutConfig {
    #[serde(default)]
    pub flags: HashMap<String, u8>,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self::empty().with_flag(CONTEXT_OPTIMIZATION, 100)
    }
}

impl RolloutConfig {
    /// Config with no flags at all.
    pub fn empty() -> Self {
        Self { flags: HashMap::new() }
    }

    /// Set a flag's percentage, clamped to 100.
    pub fn with_flag(mut self, name: impl Into<String>, percentage: u8) -> Self {
        self.flags.insert(name.into(), percentage.min(100));
        self
    }
}

/// Answers "is this flag on for this session".
#[derive(Debug, Clone)]
pub struct RolloutPolicy {
    config: RolloutConfig,
}

impl RolloutPolicy {
    pub fn new(config: RolloutConfig) -> Self {
        Self { config }
    }

    pub fn flags(&self) -> &HashMap<String, u8> {
        &self.config.flags
    }

    /// Percentage for a flag; unknown flags are fully on.
    pub fn percentage(&self, flag: &str) -> u8 {
        self.config.flags.get(flag).copied().unwrap_or(100)
    }

    pub fn is_enabled(&self, flag: &str, session_id: &str) -> bool {
        match self.percentage(flag) {
            0 => false,
            100 => true,
            pct => bucket(flag, session_id) < pct,
        }
    }
}

impl Default for RolloutPolicy {
    fn default() -> Self {
        Self::new(RolloutConfig::default())
    }
}

/// Stable bucket in `0..100`.
pub fn bucket(flag: &str, session_id: &str) -> u8 {
    let digest = Sha256::digest(format!("{}:{}", flag, session_id).as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % 100) as u8
}
