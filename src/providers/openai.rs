// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI and any OpenAI-compatible Chat Completions endpoint
//! (Ollama, Azure OpenAI, Together, Groq, DeepSeek, ...).
//!
//! # API Reference
//!
//! See [OpenAI Chat Completions API](https://platform.openai.com/docs/api-reference/chat)

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::types::{
    Message, Provider, ProviderConfig, ProviderResponse, StopReason, StreamEvent, TokenUsage,
};

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Ollama API base URL.
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Default max tokens if not specified.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// OpenAI-compatible provider.
pub struct OpenAIProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
    timeout_ms: u64,
    provider_name: String,
}

impl OpenAIProvider {
    /// Create a new provider.
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        config: ProviderConfig,
    ) -> Result<Self, ProviderError> {
        let timeout = config
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("failed to build HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        let provider_name = Self::detect_provider_name(&base_url);

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url,
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: config.temperature,
            timeout_ms: timeout.as_millis() as u64,
            provider_name,
        })
    }

    /// Create a provider for OpenAI.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(Some(api_key.into()), model, OPENAI_BASE_URL, ProviderConfig::default())
    }

    /// Create a provider for Ollama (no API key needed).
    pub fn ollama(model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(None, model, OLLAMA_BASE_URL, ProviderConfig::default())
    }

    /// Detect provider name from base URL.
    fn detect_provider_name(base_url: &str) -> String {
        if base_url.contains("openai.com") {
            "OpenAI".to_string()
        } else if base_url.contains("localhost:11434") || base_url.contains("ollama") {
            "Ollama".to_string()
        } else if base_url.contains("azure") {
            "Azure OpenAI".to_string()
        } else if base_url.contains("together") {
            "Together".to_string()
        } else if base_url.contains("groq") {
            "Groq".to_string()
        } else if base_url.contains("deepseek") {
            "DeepSeek".to_string()
        } else {
            "OpenAI-Compatible".to_string()
        }
    }

    fn build_request(&self, messages: &[Message], stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: messages.iter().map(ChatMessage::from).collect(),
            max_tokens: Some(self.max_tokens),
            temperature: self.temperature,
            stream: Some(stream),
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
        }
    }

    /// Get context window size for a model.
    fn get_context_window(model: &str) -> u32 {
        if model.contains("gpt-4o") || model.contains("gpt-4-turbo") || model.contains("gpt-4.1") {
            128_000
        } else if model.contains("gpt-4-32k") {
            32_768
        } else if model.contains("gpt-4") {
            8_192
        } else if model.contains("gpt-3.5-turbo-16k") {
            16_384
        } else if model.contains("gpt-3.5") {
            4_096
        } else if model.contains("o1") || model.contains("o3") {
            200_000
        } else {
            8_192
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, ProviderError> {
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("content-type", "application/json");

        if let Some(ref api_key) = self.api_key {
            req = req.header("authorization", format!("Bearer {}", api_key));
        }

        let response = req.json(request).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout_ms)
            } else {
                ProviderError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.handle_error_response(status.as_u16(), retry_after, &error_text));
        }
        Ok(response)
    }

    /// Handle an error response from the API.
    fn handle_error_response(&self, status_code: u16, retry_after: Option<u64>, body: &str) -> ProviderError {
        let (message, error_type) = match serde_json::from_str::<ApiError>(body) {
            Ok(error) => (error.error.message, error.error.error_type.or(error.error.code)),
            Err(_) => (body.to_string(), None),
        };

        match error_type.as_deref() {
            Some("authentication_error") | Some("invalid_api_key") => ProviderError::AuthError(message),
            Some("rate_limit_error") | Some("rate_limit_exceeded") | Some("insufficient_quota") => {
                ProviderError::rate_limited(message, retry_after)
            }
            Some("model_not_found") => ProviderError::ModelNotFound(message),
            Some("context_length_exceeded") => ProviderError::ContextWindowExceeded {
                used: 0,
                limit: self.context_window(),
            },
            _ => match status_code {
                401 | 403 => ProviderError::AuthError(message),
                429 => ProviderError::rate_limited(message, retry_after),
                _ => ProviderError::api(message, status_code),
            },
        }
    }
}

/// Seconds from a `Retry-After` header (delta-seconds or HTTP date).
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(secs);
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let secs = (date.with_timezone(&chrono::Utc) - chrono::Utc::now()).num_seconds();
    Some(secs.max(0) as u64)
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn chat(&self, messages: &[Message]) -> Result<ProviderResponse, ProviderError> {
        let request = self.build_request(messages, false);
        debug!(model = %self.model, messages = messages.len(), "Sending chat request");

        let response = self.send(&request).await?;
        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(api_response.into())
    }

    async fn stream_chat(
        &self,
        messages: &[Message],
        on_event: Box<dyn Fn(StreamEvent) + Send + Sync>,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = self.build_request(messages, true);
        debug!(model = %self.model, messages = messages.len(), "Sending streaming chat request");

        let response = self.send(&request).await?;
        let mut state = StreamState::default();
        let mut pending = String::new();
        let mut bytes = response.bytes_stream();

        'outer: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| ProviderError::StreamError(e.to_string()))?;
            pending.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = pending.find('\n') {
                let line: String = pending.drain(..=newline).collect();
                match parse_sse_line(line.trim_end()) {
                    SseLine::Done => break 'outer,
                    SseLine::Chunk(chunk) => state.apply(&chunk, on_event.as_ref()),
                    SseLine::Skip => {}
                }
            }
        }
        if let SseLine::Chunk(chunk) = parse_sse_line(pending.trim_end()) {
            state.apply(&chunk, on_event.as_ref());
        }

        let response = state.into_response();
        if let Some(ref usage) = response.usage {
            on_event(StreamEvent::Usage(usage.clone()));
        }
        on_event(StreamEvent::Done(response.stop_reason));
        Ok(response)
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn context_window(&self) -> u32 {
        Self::get_context_window(&self.model)
    }
}

enum SseLine {
    Chunk(ChatStreamChunk),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<ChatStreamChunk>(data) {
        Ok(chunk) => SseLine::Chunk(chunk),
        Err(e) => {
            debug!("Skipping unparseable stream chunk: {}", e);
            SseLine::Skip
        }
    }
}

fn map_finish_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("length") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    }
}

/// State accumulated during streaming.
#[derive(Default)]
struct StreamState {
    text_content: String,
    stop_reason: Option<StopReason>,
    usage: Option<TokenUsage>,
}

impl StreamState {
    fn apply(&mut self, chunk: &ChatStreamChunk, on_event: &(dyn Fn(StreamEvent) + Send + Sync)) {
        if let Some(usage) = &chunk.usage {
            self.usage = Some(TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        for choice in &chunk.choices {
            if let Some(ref finish_reason) = choice.finish_reason {
                self.stop_reason = Some(map_finish_reason(Some(finish_reason)));
            }
            if let Some(ref content) = choice.delta.content {
                if !content.is_empty() {
                    self.text_content.push_str(content);
                    on_event(StreamEvent::TextDelta(content.clone()));
                }
            }
        }
    }

    fn into_response(self) -> ProviderResponse {
        ProviderResponse {
            content: self.text_content,
            stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
            usage: self.usage,
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

/// Request body for Chat Completions API.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

/// Chat message format.
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: Some(msg.content.clone()),
        }
    }
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChoice {
    delta: ChatStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl From<ChatResponse> for ProviderResponse {
    fn from(response: ChatResponse) -> Self {
        let (content, stop_reason) = match response.choices.into_iter().next() {
            Some(choice) => (
                choice.message.content.unwrap_or_default(),
                map_finish_reason(choice.finish_reason.as_deref()),
            ),
            None => (String::new(), StopReason::EndTurn),
        };

        Self {
            content,
            stop_reason,
            usage: response.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::sync::{Arc, Mutex};

    fn provider(model: &str) -> OpenAIProvider {
        OpenAIProvider::new(Some("key".into()), model, OPENAI_BASE_URL, ProviderConfig::default()).unwrap()
    }

    #[test]
    fn test_openai_provider_creation() {
        let provider = provider("gpt-4o");
        assert_eq!(provider.name(), "OpenAI");
        assert_eq!(provider.model(), "gpt-4o");
        assert_eq!(provider.context_window(), 128_000);
    }

    #[test]
    fn test_ollama_provider_creation() {
        let provider = OpenAIProvider::ollama("llama3.2").unwrap();
        assert_eq!(provider.name(), "Ollama");
        assert!(provider.api_key.is_none());
    }

    #[test]
    fn test_provider_name_detection() {
        assert_eq!(OpenAIProvider::detect_provider_name("https://api.groq.com/openai/v1"), "Groq");
        assert_eq!(OpenAIProvider::detect_provider_name("http://my-proxy:8080/v1"), "OpenAI-Compatible");
    }

    #[test]
    fn test_request_includes_system_messages_in_order() {
        let provider = provider("gpt-4o");
        let request = provider.build_request(&[Message::system("S"), Message::user("hi")], true);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["stream"], true);
        assert_eq!(json["stream_options"]["include_usage"], true);
    }

    #[test]
    fn test_rate_limit_with_retry_after() {
        let provider = provider("gpt-4o");
        let body = r#"{"error":{"message":"Rate limit reached","type":"rate_limit_exceeded"}}"#;
        let err = provider.handle_error_response(429, Some(30), body);
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(30));
    }

    #[test]
    fn test_status_fallbacks() {
        let provider = provider("gpt-4o");
        assert!(matches!(
            provider.handle_error_response(401, None, "nope"),
            ProviderError::AuthError(_)
        ));
        assert!(matches!(
            provider.handle_error_response(429, Some(5), "slow down"),
            ProviderError::RateLimited { retry_after: Some(5), .. }
        ));
        assert!(matches!(
            provider.handle_error_response(500, None, "boom"),
            ProviderError::ApiError { status_code: Some(500), .. }
        ));
    }

    #[test]
    fn test_error_code_field() {
        let provider = provider("gpt-4o");
        let body = r#"{"error":{"message":"model gone","type":null,"code":"model_not_found"}}"#;
        assert!(matches!(
            provider.handle_error_response(404, None, body),
            ProviderError::ModelNotFound(_)
        ));
    }

    #[test]
    fn test_parse_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(parse_retry_after(&headers), Some(30));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), Some(0));
    }

    #[test]
    fn test_parse_sse_lines() {
        assert!(matches!(parse_sse_line(""), SseLine::Skip));
        assert!(matches!(parse_sse_line(": keep-alive"), SseLine::Skip));
        assert!(matches!(parse_sse_line("data: [DONE]"), SseLine::Done));
        assert!(matches!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#),
            SseLine::Chunk(_)
        ));
    }

    #[test]
    fn test_stream_state_accumulates() {
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        let on_event = move |event: StreamEvent| {
            if let StreamEvent::TextDelta(text) = event {
                sink.lock().unwrap().push_str(&text);
            }
        };

        let mut state = StreamState::default();
        for data in [
            r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":7,"completion_tokens":2}}"#,
        ] {
            let chunk: ChatStreamChunk = serde_json::from_str(data).unwrap();
            state.apply(&chunk, &on_event);
        }

        let response = state.into_response();
        assert_eq!(response.content, "Hello");
        assert_eq!(*seen.lock().unwrap(), "Hello");
        assert_eq!(response.usage.map(|u| u.total()), Some(9));
    }

    #[test]
    fn test_response_conversion() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"Hi!"},"finish_reason":"length"}],
                       "usage":{"prompt_tokens":3,"completion_tokens":1}}"#;
        let response: ProviderResponse = serde_json::from_str::<ChatResponse>(json).unwrap().into();
        assert_eq!(response.content, "Hi!");
        assert_eq!(response.stop_reason, StopReason::MaxTokens);
    }
}
