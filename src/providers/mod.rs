// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! AI provider implementations.
//!
//! This module provides implementations of the [`Provider`](crate::types::Provider)
//! trait, the remote AI call behind every chat session:
//!
//! - [`openai::OpenAIProvider`] - OpenAI, Ollama, and OpenAI-compatible APIs
//! - [`scripted::ScriptedProvider`] - offline replies (echo or a fixed script)
//!
//! # Quick Start
//!
//! ```bash
//! # For OpenAI
//! export OPENAI_API_KEY=your-key
//!
//! # For Ollama (no key needed, just have it running)
//! export CHATCORE_PROVIDER=ollama
//! ```
//!
//! ```rust,ignore
//! use chatcore::providers::create_provider_from_env;
//!
//! let provider = create_provider_from_env()?;
//! let response = provider.chat(&messages).await?;
//! ```

pub mod openai;
pub mod scripted;

use std::sync::Arc;

pub use openai::OpenAIProvider;
pub use scripted::{ScriptStep, ScriptedProvider};

use crate::config::ResolvedConfig;
use crate::error::ProviderError;
use crate::types::{ProviderConfig, SharedProvider};

/// Supported provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    /// OpenAI GPT models
    OpenAI,
    /// Ollama local models
    Ollama,
    /// Any OpenAI-compatible API
    OpenAICompatible,
    /// No network; echoes the last user message
    Offline,
}

impl ProviderType {
    /// Get the default model for this provider.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o",
            Self::Ollama => "llama3.2",
            Self::OpenAICompatible => "gpt-4o",
            Self::Offline => "echo",
        }
    }

    /// Get the default base URL for this provider.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some(openai::OPENAI_BASE_URL),
            Self::Ollama => Some(openai::OLLAMA_BASE_URL),
            Self::OpenAICompatible | Self::Offline => None,
        }
    }

    /// Environment variable conventionally holding the API key.
    pub fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAI | Self::OpenAICompatible => Some("OPENAI_API_KEY"),
            Self::Ollama | Self::Offline => None,
        }
    }

    /// Check if this provider requires an API key.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI)
    }
}

/// Error type for parsing a provider type from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseProviderTypeError;

impl std::fmt::Display for ParseProviderTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid provider type")
    }
}

impl std::error::Error for ParseProviderTypeError {}

impl std::str::FromStr for ProviderType {
    type Err = ParseProviderTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "gpt" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "openai-compatible" | "openai_compatible" => Ok(Self::OpenAICompatible),
            "offline" | "echo" | "scripted" => Ok(Self::Offline),
            _ => Err(ParseProviderTypeError),
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAI => write!(f, "OpenAI"),
            Self::Ollama => write!(f, "Ollama"),
            Self::OpenAICompatible => write!(f, "OpenAI-Compatible"),
            Self::Offline => write!(f, "Offline"),
        }
    }
}

/// Create a provider instance from type and configuration.
///
/// # Errors
///
/// Returns [`ProviderError::NotConfigured`] when OpenAI has no API key or an
/// OpenAI-compatible endpoint has no base URL.
pub fn create_provider(
    provider_type: ProviderType,
    config: ProviderConfig,
) -> Result<SharedProvider, ProviderError> {
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| provider_type.default_model().to_string());

    match provider_type {
        ProviderType::OpenAI => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| ProviderError::NotConfigured("API key required for OpenAI".to_string()))?;
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| openai::OPENAI_BASE_URL.to_string());

            Ok(Arc::new(OpenAIProvider::new(Some(api_key), model, base_url, config)?))
        }
        ProviderType::Ollama => {
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| openai::OLLAMA_BASE_URL.to_string());

            // Ollama doesn't need an API key
            Ok(Arc::new(OpenAIProvider::new(None, model, base_url, config)?))
        }
        ProviderType::OpenAICompatible => {
            let base_url = config
                .base_url
                .clone()
                .ok_or_else(|| ProviderError::NotConfigured("base_url required for OpenAI-Compatible".to_string()))?;

            Ok(Arc::new(OpenAIProvider::new(config.api_key.clone(), model, base_url, config)?))
        }
        ProviderType::Offline => Ok(Arc::new(ScriptedProvider::new().with_model(model))),
    }
}

/// Create a provider from environment variables.
///
/// # Environment Variables
///
/// | Variable | Description |
/// |----------|-------------|
/// | `CHATCORE_PROVIDER` | Override provider: `openai`, `ollama`, `openai-compatible`, `offline` |
/// | `CHATCORE_MODEL` | Override default model |
/// | `OPENAI_API_KEY` | OpenAI API key |
/// | `OPENAI_BASE_URL` | Custom OpenAI or compatible base URL |
/// | `OLLAMA_BASE_URL` | Custom Ollama URL (default: localhost:11434) |
///
/// Without `CHATCORE_PROVIDER`, OpenAI is used when `OPENAI_API_KEY` is set
/// and Ollama otherwise.
pub fn create_provider_from_env() -> Result<SharedProvider, ProviderError> {
    let provider_type = match std::env::var("CHATCORE_PROVIDER") {
        Ok(p) => p
            .parse()
            .map_err(|_| ProviderError::NotConfigured(format!("Unknown provider: {}", p)))?,
        Err(_) if std::env::var("OPENAI_API_KEY").is_ok() => ProviderType::OpenAI,
        Err(_) => ProviderType::Ollama,
    };

    let base_url_env = match provider_type {
        ProviderType::Ollama => "OLLAMA_BASE_URL",
        _ => "OPENAI_BASE_URL",
    };

    let config = ProviderConfig {
        api_key: provider_type
            .default_api_key_env()
            .and_then(|var| std::env::var(var).ok()),
        model: std::env::var("CHATCORE_MODEL").ok(),
        base_url: std::env::var(base_url_env).ok(),
        ..Default::default()
    };

    create_provider(provider_type, config)
}

/// Create a provider from a resolved configuration.
///
/// The API key is read from the environment variable named by
/// `api_key_env`, or the provider's conventional one.
pub fn create_provider_from_config(config: &ResolvedConfig) -> Result<SharedProvider, ProviderError> {
    let provider_type: ProviderType = config.provider.parse().map_err(|_| {
        ProviderError::NotConfigured(format!("Unknown provider: {}", config.provider))
    })?;

    let api_key_env = config
        .api_key_env
        .as_deref()
        .or_else(|| provider_type.default_api_key_env());

    let provider_config = ProviderConfig {
        api_key: api_key_env.and_then(|var| std::env::var(var).ok()),
        base_url: config.base_url.clone(),
        model: config.model.clone(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        timeout_ms: config.timeout_ms,
    };

    create_provider(provider_type, provider_config)
}
