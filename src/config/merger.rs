// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use std::path::PathBuf;
use std::time::Duration;

use crate::chat::SystemInstruction;
use crate::error::ConfigError;

use super::types::{ChatcoreConfig, ResolvedConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub session: Option<String>,
    pub system: Option<String>,
    pub preset: Option<String>,
    pub stream: Option<bool>,
    pub database_path: Option<PathBuf>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Local config (.chatcore.local.json)
/// 3. Workspace config (.chatcore.json)
/// 4. Global config (~/.chatcore/config.json)
/// 5. Default values
pub fn merge_config(
    global: Option<ChatcoreConfig>,
    workspace: Option<ChatcoreConfig>,
    local: Option<ChatcoreConfig>,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    for config in [global, workspace, local].into_iter().flatten() {
        apply_file_config(&mut result, &config);
    }

    apply_cli_options(&mut result, &cli);

    result
}

fn apply_file_config(result: &mut ResolvedConfig, config: &ChatcoreConfig) {
    if let Some(ref provider) = config.provider {
        result.provider = provider.clone();
    }

    if config.model.is_some() {
        result.model = config.model.clone();
    }

    if config.base_url.is_some() {
        result.base_url = config.base_url.clone();
    }

    if config.api_key_env.is_some() {
        result.api_key_env = config.api_key_env.clone();
    }

    if config.temperature.is_some() {
        result.temperature = config.temperature;
    }

    if config.max_tokens.is_some() {
        result.max_tokens = config.max_tokens;
    }

    if config.timeout_ms.is_some() {
        result.timeout_ms = config.timeout_ms;
    }

    // A literal instruction beats a preset from the same file.
    if let Some(ref text) = config.system_instruction {
        result.system_instruction = Some(SystemInstruction::text(text.clone()));
    } else if let Some(ref preset) = config.preset {
        result.system_instruction = Some(SystemInstruction::preset(preset.clone()));
    }

    if let Some(summaries) = config.use_model_summaries {
        result.use_model_summaries = summaries;
    }

    if let Some(stream) = config.stream {
        result.stream = stream;
    }

    if let Some(ref path) = config.database_path {
        result.database_path = Some(PathBuf::from(path));
    }

    if let Some(ref optimizer) = config.optimizer {
        let target = &mut result.optimizer;
        if let Some(v) = optimizer.max_context_tokens {
            target.max_context_tokens = v;
        }
        if let Some(v) = optimizer.summarization_threshold {
            target.summarization_threshold = v;
        }
        if let Some(v) = optimizer.messages_to_keep_after_summary {
            target.messages_to_keep_after_summary = v;
        }
        if let Some(v) = optimizer.enable_summarization {
            target.enable_summarization = v;
        }
        if let Some(v) = optimizer.max_summary_chars {
            target.max_summary_chars = v;
        }
    }

    if let Some(ref fallback) = config.fallback {
        let target = &mut result.fallback;
        if let Some(v) = fallback.max_fallback_attempts {
            target.max_fallback_attempts = v;
        }
        if let Some(v) = fallback.simple_buffer_size {
            target.simple_buffer_size = v;
        }
        if let Some(v) = fallback.basic_context_size {
            target.basic_context_size = v;
        }
        if let Some(v) = fallback.preserve_system_messages {
            target.preserve_system_messages = v;
        }
        if let Some(ms) = fallback.fallback_timeout {
            target.fallback_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = fallback.history_limit {
            target.history_limit = v;
        }
    }

    if let Some(ref orchestrator) = config.orchestrator {
        let target = &mut result.orchestrator;
        if let Some(v) = orchestrator.max_sessions {
            target.max_sessions = v;
        }
        if let Some(ms) = orchestrator.cleanup_interval {
            target.cleanup_interval = Duration::from_millis(ms);
        }
        if let Some(v) = orchestrator.restore_limit {
            target.restore_limit = v;
        }
    }

    if let Some(ref monitor) = config.monitor {
        result.monitor = monitor.clone();
    }

    if let Some(ref thresholds) = config.thresholds {
        result.thresholds = thresholds.clone();
    }

    if let Some(ref logging) = config.logging {
        result.logging = logging.clone();
    }

    if let Some(ref flags) = config.rollout {
        for (name, pct) in flags {
            result.rollout.flags.insert(name.clone(), (*pct).min(100));
        }
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: &CliOptions) {
    if let Some(ref provider) = cli.provider {
        result.provider = provider.clone();
    }

    if cli.model.is_some() {
        result.model = cli.model.clone();
    }

    if cli.base_url.is_some() {
        result.base_url = cli.base_url.clone();
    }

    if cli.session.is_some() {
        result.default_session = cli.session.clone();
    }

    if let Some(ref text) = cli.system {
        result.system_instruction = Some(SystemInstruction::text(text.clone()));
    } else if let Some(ref preset) = cli.preset {
        result.system_instruction = Some(SystemInstruction::preset(preset.clone()));
    }

    if let Some(stream) = cli.stream {
        result.stream = stream;
    }

    if cli.database_path.is_some() {
        result.database_path = cli.database_path.clone();
    }
}

/// Check a resolved configuration for values the runtime cannot work with.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] naming the first offending field.
pub fn validate_config(config: &ResolvedConfig) -> Result<(), ConfigError> {
    if config.provider.trim().is_empty() {
        return Err(ConfigError::invalid("provider", "must not be empty"));
    }

    if let Some(t) = config.temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(ConfigError::invalid("temperature", "must be between 0 and 2"));
        }
    }

    let optimizer = &config.optimizer;
    if optimizer.max_context_tokens == 0 {
        return Err(ConfigError::invalid("optimizer.maxContextTokens", "must be greater than 0"));
    }
    if !(optimizer.summarization_threshold > 0.0 && optimizer.summarization_threshold <= 1.0) {
        return Err(ConfigError::invalid(
            "optimizer.summarizationThreshold",
            "must be in (0, 1]",
        ));
    }
    if optimizer.messages_to_keep_after_summary == 0 {
        return Err(ConfigError::invalid(
            "optimizer.messagesToKeepAfterSummary",
            "must be greater than 0",
        ));
    }

    let fallback = &config.fallback;
    if fallback.max_fallback_attempts == 0 {
        return Err(ConfigError::invalid("fallback.maxFallbackAttempts", "must be greater than 0"));
    }
    if fallback.simple_buffer_size == 0 {
        return Err(ConfigError::invalid("fallback.simpleBufferSize", "must be greater than 0"));
    }
    if fallback.basic_context_size == 0 || fallback.basic_context_size > fallback.simple_buffer_size {
        return Err(ConfigError::invalid(
            "fallback.basicContextSize",
            format!("must be between 1 and simpleBufferSize ({})", fallback.simple_buffer_size),
        ));
    }
    if fallback.fallback_timeout.is_zero() {
        return Err(ConfigError::invalid("fallback.fallbackTimeout", "must be greater than 0"));
    }

    if config.orchestrator.max_sessions == 0 {
        return Err(ConfigError::invalid("orchestrator.maxSessions", "must be greater than 0"));
    }

    if let Err(message) = config.logging.validate() {
        return Err(ConfigError::invalid("logging.filter", message));
    }

    if config.monitor.max_records == 0 {
        return Err(ConfigError::invalid("monitor.maxRecords", "must be greater than 0"));
    }

    let t = &config.thresholds;
    let pairs = [
        ("responseTime", t.response_time_warning_ms, t.response_time_critical_ms),
        ("errorRate", t.error_rate_warning, t.error_rate_critical),
        ("fallbackRate", t.fallback_rate_warning, t.fallback_rate_critical),
        ("memory", t.memory_warning_mb, t.memory_critical_mb),
        ("cpu", t.cpu_warning_percent, t.cpu_critical_percent),
    ];
    for (name, warning, critical) in pairs {
        if warning > critical {
            return Err(ConfigError::invalid(
                format!("thresholds.{}", name),
                "warning limit exceeds critical limit",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{FallbackConfigPartial, OptimizerConfigPartial, OrchestratorConfigPartial};
    use crate::telemetry::{HealthThresholds, LoggingConfig};

    #[test]
    fn test_default_config() {
        let config = default_config();
        assert_eq!(config.provider, "ollama");
        assert!(config.model.is_none());
        assert!(config.system_instruction.is_none());
        assert!(!config.stream);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_merge_precedence() {
        let global = ChatcoreConfig {
            provider: Some("openai".to_string()),
            model: Some("global-model".to_string()),
            ..Default::default()
        };
        let workspace = ChatcoreConfig {
            model: Some("workspace-model".to_string()),
            ..Default::default()
        };
        let local = ChatcoreConfig {
            base_url: Some("http://local:8080/v1".to_string()),
            ..Default::default()
        };
        let cli = CliOptions {
            model: Some("cli-model".to_string()),
            ..Default::default()
        };

        let result = merge_config(Some(global), Some(workspace), Some(local), cli);
        assert_eq!(result.provider, "openai");
        assert_eq!(result.model.as_deref(), Some("cli-model"));
        assert_eq!(result.base_url.as_deref(), Some("http://local:8080/v1"));
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let workspace = ChatcoreConfig {
            optimizer: Some(OptimizerConfigPartial {
                max_context_tokens: Some(16_000),
                ..Default::default()
            }),
            fallback: Some(FallbackConfigPartial {
                fallback_timeout: Some(750),
                ..Default::default()
            }),
            orchestrator: Some(OrchestratorConfigPartial {
                cleanup_interval: Some(60_000),
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = merge_config(None, Some(workspace), None, CliOptions::default());
        assert_eq!(result.optimizer.max_context_tokens, 16_000);
        assert_eq!(result.optimizer.summarization_threshold, 0.8);
        assert_eq!(result.fallback.fallback_timeout, Duration::from_millis(750));
        assert_eq!(result.fallback.max_fallback_attempts, 4);
        assert_eq!(result.orchestrator.cleanup_interval, Duration::from_secs(60));
        assert_eq!(result.orchestrator.max_sessions, 100);
    }

    #[test]
    fn test_rollout_flags_merge_per_key() {
        let mut global_flags = std::collections::HashMap::new();
        global_flags.insert("beta".to_string(), 10u8);
        let mut local_flags = std::collections::HashMap::new();
        local_flags.insert("context_optimization".to_string(), 30u8);

        let result = merge_config(
            Some(ChatcoreConfig {
                rollout: Some(global_flags),
                ..Default::default()
            }),
            None,
            Some(ChatcoreConfig {
                rollout: Some(local_flags),
                ..Default::default()
            }),
            CliOptions::default(),
        );

        assert_eq!(result.rollout.flags["beta"], 10);
        assert_eq!(result.rollout.flags["context_optimization"], 30);
    }

    #[test]
    fn test_system_instruction_layers() {
        let workspace = ChatcoreConfig {
            preset: Some("concise".to_string()),
            ..Default::default()
        };
        let result = merge_config(None, Some(workspace.clone()), None, CliOptions::default());
        assert_eq!(result.system_instruction, Some(SystemInstruction::preset("concise")));

        let both = ChatcoreConfig {
            system_instruction: Some("Be brief".to_string()),
            preset: Some("tutor".to_string()),
            ..Default::default()
        };
        let result = merge_config(None, Some(both), None, CliOptions::default());
        assert_eq!(result.system_instruction, Some(SystemInstruction::text("Be brief")));

        let cli = CliOptions {
            system: Some("From CLI".to_string()),
            ..Default::default()
        };
        let result = merge_config(None, Some(workspace), None, cli);
        assert_eq!(result.system_instruction, Some(SystemInstruction::text("From CLI")));
    }

    #[test]
    fn test_cli_session_and_database() {
        let cli = CliOptions {
            session: Some("work".to_string()),
            database_path: Some(PathBuf::from("/tmp/chat.db")),
            stream: Some(true),
            ..Default::default()
        };
        let result = merge_config(None, None, None, cli);
        assert_eq!(result.default_session.as_deref(), Some("work"));
        assert_eq!(result.database_path, Some(PathBuf::from("/tmp/chat.db")));
        assert!(result.stream);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = default_config();
        config.optimizer.summarization_threshold = 0.0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidValue { field, .. }) if field == "optimizer.summarizationThreshold"
        ));

        config.optimizer.summarization_threshold = 1.0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_basic_context_within_buffer() {
        let mut config = default_config();
        config.fallback.simple_buffer_size = 5;
        config.fallback.basic_context_size = 10;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidValue { field, .. }) if field == "fallback.basicContextSize"
        ));
    }

    #[test]
    fn test_validate_zero_sizes() {
        let mut config = default_config();
        config.orchestrator.max_sessions = 0;
        assert!(validate_config(&config).is_err());

        let mut config = default_config();
        config.fallback.max_fallback_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_threshold_ordering() {
        let mut config = default_config();
        config.thresholds = HealthThresholds {
            error_rate_warning: 0.5,
            error_rate_critical: 0.2,
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("thresholds.errorRate"));
    }

    #[test]
    fn test_logging_section_replaces_and_validates() {
        let workspace = ChatcoreConfig {
            logging: Some(LoggingConfig {
                filter: "chatcore=info".to_string(),
                ..LoggingConfig::default()
            }),
            ..Default::default()
        };
        let result = merge_config(None, Some(workspace), None, CliOptions::default());
        assert_eq!(result.logging.filter, "chatcore=info");
        assert!(validate_config(&result).is_ok());

        let mut config = default_config();
        config.logging.filter = "chatcore=loud".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidValue { field, .. }) if field == "logging.filter"
        ));
    }
}
