// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the chat core.
//!
//! This module provides strongly-typed errors for the different layers of the
//! crate, using `thiserror` for the definitions. Errors raised by the remote
//! AI call are remapped into [`ChatError`] through a data-driven table (see
//! [`map_provider_error`]); [`map_ai_error`] does the same for `anyhow`
//! errors coming out of runtime setup.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("API error: {message}")]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        /// Seconds the service asked us to wait, if it said so.
        retry_after: Option<u64>,
    },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Context window exceeded: {used} tokens used, {limit} available")]
    ContextWindowExceeded { used: u32, limit: u32 },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response parsing error: {0}")]
    ParseError(String),

    #[error("Streaming error: {0}")]
    StreamError(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

/// Discriminant of a [`ProviderError`], used as the key of the mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Auth,
    Api,
    RateLimited,
    ModelNotFound,
    ContextWindow,
    Network,
    Parse,
    Stream,
    NotConfigured,
    Timeout,
}

impl ProviderError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create an API error without status code.
    pub fn api_message(message: impl Into<String>) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a rate limit error.
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    /// The kind of this error.
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::AuthError(_) => ProviderErrorKind::Auth,
            Self::ApiError { .. } => ProviderErrorKind::Api,
            Self::RateLimited { .. } => ProviderErrorKind::RateLimited,
            Self::ModelNotFound(_) => ProviderErrorKind::ModelNotFound,
            Self::ContextWindowExceeded { .. } => ProviderErrorKind::ContextWindow,
            Self::NetworkError(_) => ProviderErrorKind::Network,
            Self::ParseError(_) => ProviderErrorKind::Parse,
            Self::StreamError(_) => ProviderErrorKind::Stream,
            Self::NotConfigured(_) => ProviderErrorKind::NotConfigured,
            Self::Timeout(_) => ProviderErrorKind::Timeout,
        }
    }

    /// Seconds to wait before retrying, when the service provided one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::NetworkError(_) | Self::Timeout(_)
        )
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl ConfigError {
    /// Create an invalid-value error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Stable error codes for AI service failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiErrorCode {
    RateLimitExceeded,
    QuotaExceeded,
    AuthenticationFailed,
    ModelNotFound,
    ContextLengthExceeded,
    ContentFiltered,
    Timeout,
    NetworkError,
    InvalidResponse,
    NotConfigured,
    IntegrationError,
    ServiceError,
}

impl AiErrorCode {
    /// The code as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::ModelNotFound => "MODEL_NOT_FOUND",
            Self::ContextLengthExceeded => "CONTEXT_LENGTH_EXCEEDED",
            Self::ContentFiltered => "CONTENT_FILTERED",
            Self::Timeout => "TIMEOUT",
            Self::NetworkError => "NETWORK_ERROR",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::NotConfigured => "NOT_CONFIGURED",
            Self::IntegrationError => "INTEGRATION_ERROR",
            Self::ServiceError => "AI_SERVICE_ERROR",
        }
    }
}

impl std::fmt::Display for AiErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an AI service error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    /// A recognized error raised by the provider integration layer.
    Integration,
    /// Anything else that failed while talking to the model.
    Unrecognized,
}

/// A failed remote AI call, remapped into domain terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AiServiceError {
    pub code: AiErrorCode,
    /// Original error message, never rewritten.
    pub message: String,
    /// Seconds to wait before retrying.
    pub retry_after: Option<u64>,
    pub origin: ErrorOrigin,
}

impl std::fmt::Display for AiServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(secs) = self.retry_after {
            write!(f, " (retry after {}s)", secs)?;
        }
        Ok(())
    }
}

/// Errors surfaced by chat sessions and the session orchestrator.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("AI service error: {0}")]
    AiService(AiServiceError),

    #[error("Session memory exhausted during '{operation}' after {attempts} attempts: {last_error}")]
    SessionMemory {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Context optimization failed: {0}")]
    ContextOptimization(String),

    #[error("Summarization failed: {0}")]
    Summarization(String),

    #[error("Model initialization failed: {0}")]
    ModelInitialization(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ChatError {
    /// Seconds to wait before retrying, for AI service errors that carry one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::AiService(err) => err.retry_after,
            _ => None,
        }
    }

    /// Check if this error leaves the session usable for another attempt.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Cancelled => true,
            Self::AiService(err) => matches!(
                err.code,
                AiErrorCode::RateLimitExceeded | AiErrorCode::Timeout | AiErrorCode::NetworkError
            ),
            _ => false,
        }
    }

    /// Short type name used as the error bucket in operation monitoring.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::AiService(_) => "ai_service",
            Self::SessionMemory { .. } => "session_memory",
            Self::ContextOptimization(_) => "context_optimization",
            Self::Summarization(_) => "summarization",
            Self::ModelInitialization(_) => "model_initialization",
            Self::Cancelled => "cancelled",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
        }
    }
}

impl From<ProviderError> for ChatError {
    fn from(err: ProviderError) -> Self {
        map_provider_error(&err)
    }
}

/// One row of the provider error mapping table.
struct ErrorMapping {
    kind: ProviderErrorKind,
    /// Optional pattern the error message must match for this row to apply.
    pattern: Option<Regex>,
    code: AiErrorCode,
}

impl ErrorMapping {
    fn new(kind: ProviderErrorKind, pattern: Option<&str>, code: AiErrorCode) -> Self {
        Self {
            kind,
            // Patterns are literals in this file.
            pattern: pattern.and_then(|p| Regex::new(p).ok()),
            code,
        }
    }

    fn matches(&self, err: &ProviderError, message: &str) -> bool {
        self.kind == err.kind()
            && self
                .pattern
                .as_ref()
                .map_or(true, |re| re.is_match(message))
    }
}

/// First matching row wins, so message-specific rows precede the catch-all
/// row of the same kind.
static ERROR_MAPPINGS: Lazy<Vec<ErrorMapping>> = Lazy::new(|| {
    use AiErrorCode as C;
    use ProviderErrorKind as K;
    vec![
        ErrorMapping::new(K::RateLimited, Some(r"(?i)quota|billing"), C::QuotaExceeded),
        ErrorMapping::new(K::RateLimited, None, C::RateLimitExceeded),
        ErrorMapping::new(K::Api, Some(r"(?i)rate.?limit|too many requests"), C::RateLimitExceeded),
        ErrorMapping::new(K::Api, Some(r"(?i)quota|insufficient.?credit|billing"), C::QuotaExceeded),
        ErrorMapping::new(K::Api, Some(r"(?i)content.?(filter|policy)|safety"), C::ContentFiltered),
        ErrorMapping::new(K::Api, Some(r"(?i)context.?length|maximum context|too many tokens"), C::ContextLengthExceeded),
        ErrorMapping::new(K::Api, Some(r"(?i)timed? ?out"), C::Timeout),
        ErrorMapping::new(K::Api, None, C::IntegrationError),
        ErrorMapping::new(K::Auth, None, C::AuthenticationFailed),
        ErrorMapping::new(K::ModelNotFound, None, C::ModelNotFound),
        ErrorMapping::new(K::ContextWindow, None, C::ContextLengthExceeded),
        ErrorMapping::new(K::Network, Some(r"(?i)timed? ?out"), C::Timeout),
        ErrorMapping::new(K::Network, None, C::NetworkError),
        ErrorMapping::new(K::Timeout, None, C::Timeout),
        ErrorMapping::new(K::Parse, None, C::InvalidResponse),
        ErrorMapping::new(K::Stream, None, C::InvalidResponse),
        ErrorMapping::new(K::NotConfigured, None, C::NotConfigured),
    ]
});

/// Map a recognized provider error into a [`ChatError::AiService`].
pub fn map_provider_error(err: &ProviderError) -> ChatError {
    let message = err.to_string();
    let code = ERROR_MAPPINGS
        .iter()
        .find(|row| row.matches(err, &message))
        .map(|row| row.code)
        .unwrap_or(AiErrorCode::IntegrationError);

    ChatError::AiService(AiServiceError {
        code,
        message,
        retry_after: err.retry_after(),
        origin: ErrorOrigin::Integration,
    })
}

/// Map any error raised while calling the model.
///
/// Provider errors go through the mapping table; errors that are already a
/// [`ChatError`] pass through; anything else becomes a generic AI service
/// error carrying the original message.
pub fn map_ai_error(err: anyhow::Error) -> ChatError {
    if let Some(provider_err) = err.downcast_ref::<ProviderError>() {
        return map_provider_error(provider_err);
    }
    match err.downcast::<ChatError>() {
        Ok(chat_err) => chat_err,
        Err(other) => ChatError::AiService(AiServiceError {
            code: AiErrorCode::ServiceError,
            message: other.to_string(),
            retry_after: None,
            origin: ErrorOrigin::Unrecognized,
        }),
    }
}
