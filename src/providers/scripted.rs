// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Offline provider that replays scripted replies.
//!
//! Each call pops the next [`ScriptStep`]. With an empty script the provider
//! echoes the last user message, which makes it usable as an offline backend
//! for the CLI as well as a test double. Every context it receives is kept for
//! inspection.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{Message, Provider, ProviderResponse, Role, StopReason, StreamEvent, TokenUsage};

/// One scripted provider call.
#[derive(Debug)]
pub enum ScriptStep {
    /// Reply with the text (streamed as whitespace-separated chunks).
    Reply(String),
    /// Stream exactly these chunks.
    Chunks(Vec<String>),
    /// Fail before producing anything.
    Fail(ProviderError),
    /// Stream the chunks, then fail.
    FailMidStream(Vec<String>, ProviderError),
    /// Wait, then run the inner step.
    Delay(Duration, Box<ScriptStep>),
}

/// Provider replaying a script of steps.
#[derive(Debug)]
pub struct ScriptedProvider {
    model: String,
    context_window: u32,
    script: Mutex<VecDeque<ScriptStep>>,
    received: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            model: "scripted".to_string(),
            context_window: 8_192,
            script: Mutex::new(VecDeque::new()),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_context_window(mut self, tokens: u32) -> Self {
        self.context_window = tokens;
        self
    }

    /// Append a step.
    pub fn push(&self, step: ScriptStep) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
    }

    pub fn then(self, step: ScriptStep) -> Self {
        self.push(step);
        self
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.then(ScriptStep::Reply(text.into()))
    }

    pub fn fail(self, err: ProviderError) -> Self {
        self.then(ScriptStep::Fail(err))
    }

    /// Contexts received so far, one per call.
    pub fn received(&self) -> Vec<Vec<Message>> {
        self.received.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.received.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn next_step(&self, messages: &[Message]) -> ScriptStep {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());

        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| ScriptStep::Reply(echo(messages)))
    }

    async fn run(
        &self,
        step: ScriptStep,
        messages: &[Message],
        on_event: Option<&(dyn Fn(StreamEvent) + Send + Sync)>,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut step = step;
        let (chunks, failure) = loop {
            match step {
                ScriptStep::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    step = *inner;
                }
                ScriptStep::Reply(text) => break (split_chunks(&text), None),
                ScriptStep::Chunks(chunks) => break (chunks, None),
                ScriptStep::Fail(err) => return Err(err),
                ScriptStep::FailMidStream(chunks, err) => break (chunks, Some(err)),
            }
        };

        let mut content = String::new();
        for chunk in chunks {
            if let Some(emit) = on_event {
                emit(StreamEvent::TextDelta(chunk.clone()));
                tokio::task::yield_now().await;
            }
            content.push_str(&chunk);
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let usage = TokenUsage {
            input_tokens: crate::memory::estimate_messages_tokens(messages) as u32,
            output_tokens: crate::memory::estimate_text_tokens(&content) as u32,
        };
        if let Some(emit) = on_event {
            emit(StreamEvent::Usage(usage.clone()));
            emit(StreamEvent::Done(StopReason::EndTurn));
        }
        Ok(ProviderResponse::text(content).with_usage(usage))
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn echo(messages: &[Message]) -> String {
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("");
    format!("echo: {}", last_user)
}

/// Split text into word chunks that concatenate back to the original.
fn split_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if c == ' ' {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(&self, messages: &[Message]) -> Result<ProviderResponse, ProviderError> {
        let step = self.next_step(messages);
        self.run(step, messages, None).await
    }

    async fn stream_chat(
        &self,
        messages: &[Message],
        on_event: Box<dyn Fn(StreamEvent) + Send + Sync>,
    ) -> Result<ProviderResponse, ProviderError> {
        let step = self.next_step(messages);
        self.run(step, messages, Some(on_event.as_ref())).await
    }

    fn name(&self) -> &str {
        "Scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn context_window(&self) -> u32 {
        self.context_window
    }
}
