// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Defines the structure of file and resolved configuration,
//! supporting JSON and YAML formats.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::chat::SystemInstruction;
use crate::memory::{FallbackConfig, OptimizerConfig};
use crate::orchestrator::OrchestratorConfig;
use crate::rollout::RolloutConfig;
use crate::telemetry::{HealthThresholds, LoggingConfig, MonitorConfig};

/// File configuration for chatcore.
/// Can be defined in .chatcore.json or .chatcore/config.json in the workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatcoreConfig {
    /// Provider to use (openai, ollama, openai-compatible, offline)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Model name to use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Custom base URL for API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Request timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Literal system instruction for new sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    /// Named preset used when no literal instruction is given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    /// Ask the model for summaries instead of extracting them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_model_summaries: Option<bool>,

    /// Stream replies in the CLI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// SQLite database for persisted messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimizer: Option<OptimizerConfigPartial>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackConfigPartial>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestrator: Option<OrchestratorConfigPartial>,

    /// Monitor settings (replaces the whole section)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorConfig>,

    /// Health thresholds (replaces the whole section)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<HealthThresholds>,

    /// Rollout percentages, merged flag by flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollout: Option<HashMap<String, u8>>,

    /// Log output (replaces the whole section)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Optimizer fields settable from a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerConfigPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_context_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summarization_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_to_keep_after_summary: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_summarization: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_summary_chars: Option<usize>,
}

/// Fallback fields settable from a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackConfigPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fallback_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simple_buffer_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic_context_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_system_messages: Option<bool>,
    /// Milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,
}

/// Orchestrator fields settable from a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfigPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<usize>,
    /// Milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_limit: Option<usize>,
}

/// Fully resolved configuration with all defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub system_instruction: Option<SystemInstruction>,
    pub use_model_summaries: bool,
    pub stream: bool,
    pub default_session: Option<String>,
    pub database_path: Option<PathBuf>,
    pub optimizer: OptimizerConfig,
    pub fallback: FallbackConfig,
    pub orchestrator: OrchestratorConfig,
    pub monitor: MonitorConfig,
    pub thresholds: HealthThresholds,
    pub rollout: RolloutConfig,
    pub logging: LoggingConfig,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: None,
            base_url: None,
            api_key_env: None,
            temperature: None,
            max_tokens: None,
            timeout_ms: None,
            system_instruction: None,
            use_model_summaries: false,
            stream: false,
            default_session: None,
            database_path: None,
            optimizer: OptimizerConfig::default(),
            fallback: FallbackConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            monitor: MonitorConfig::default(),
            thresholds: HealthThresholds::default(),
            rollout: RolloutConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_default() {
        let config = ChatcoreConfig::default();
        assert!(config.provider.is_none());
        assert!(config.optimizer.is_none());
    }

    #[test]
    fn test_file_config_camel_case() {
        let json = r#"{
            "provider": "openai",
            "apiKeyEnv": "MY_KEY",
            "optimizer": {"maxContextTokens": 8000},
            "fallback": {"fallbackTimeout": 250},
            "thresholds": {"errorRateWarning": 0.1},
            "rollout": {"context_optimization": 20}
        }"#;
        let config: ChatcoreConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.api_key_env.as_deref(), Some("MY_KEY"));
        assert_eq!(config.optimizer.unwrap().max_context_tokens, Some(8000));
        assert_eq!(config.fallback.unwrap().fallback_timeout, Some(250));

        let thresholds = config.thresholds.unwrap();
        assert_eq!(thresholds.error_rate_warning, 0.1);
        assert_eq!(
            thresholds.error_rate_critical,
            HealthThresholds::default().error_rate_critical
        );
        assert_eq!(config.rollout.unwrap()["context_optimization"], 20);
    }

    #[test]
    fn test_logging_section() {
        let yaml = "logging:\n  filter: chatcore::memory=debug\n  spanTimings: true\n";
        let config: ChatcoreConfig = serde_yaml::from_str(yaml).unwrap();
        let logging = config.logging.unwrap();
        assert_eq!(logging.filter, "chatcore::memory=debug");
        assert!(logging.span_timings);
        assert!(logging.ansi);
    }

    #[test]
    fn test_file_config_yaml() {
        let yaml = "provider: ollama\nmodel: llama3.2\norchestrator:\n  maxSessions: 5\n";
        let config: ChatcoreConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.orchestrator.unwrap().max_sessions, Some(5));
    }

    #[test]
    fn test_resolved_config_serializes() {
        let json = serde_json::to_value(ResolvedConfig::default()).unwrap();
        assert_eq!(json["provider"], "ollama");
        assert_eq!(json["fallback"]["maxFallbackAttempts"], 4);
        assert_eq!(json["orchestrator"]["cleanupInterval"], 300_000);
    }
}
