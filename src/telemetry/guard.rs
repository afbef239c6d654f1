// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Scoped operation monitoring.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info_span, Span};

use super::monitor::{OperationCompletion, OperationId, OperationKind, OperationMonitor};
use crate::error::ChatError;

/// RAII guard for one monitored operation.
///
/// The operation is started when the guard is created. Finish it with
/// [`success`](Self::success), [`finish`](Self::finish) or
/// [`fail`](Self::fail); a guard dropped without any of these (early return,
/// `?`, cancelled future) records the operation as an error.
pub struct OperationGuard {
    monitor: Arc<OperationMonitor>,
    id: OperationId,
    start: Instant,
    span: Span,
    finished: bool,
}

impl OperationGuard {
    pub(crate) fn start(
        monitor: Arc<OperationMonitor>,
        kind: OperationKind,
        session_id: Option<&str>,
    ) -> Self {
        let span = info_span!(
            "operation",
            op = %kind,
            session = session_id.unwrap_or("-"),
            duration_ms = tracing::field::Empty,
            success = tracing::field::Empty,
        );
        let id = monitor.start_operation(kind, session_id);

        Self {
            monitor,
            id,
            start: Instant::now(),
            span,
            finished: false,
        }
    }

    /// The monitored operation's id.
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Get the underlying span.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Get elapsed time so far.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Finish as a plain success.
    pub fn success(self) {
        self.finish(OperationCompletion::success());
    }

    /// Finish with completion details.
    pub fn finish(mut self, completion: OperationCompletion) {
        self.finished = true;
        self.record_span(true);
        self.monitor.complete_operation(self.id, completion);
    }

    /// Finish as failed with a chat error. Memory exhaustion counts as a
    /// fallback.
    pub fn fail(self, err: &ChatError) {
        let exhausted = matches!(err, ChatError::SessionMemory { .. });
        self.fail_with_fallback(err, exhausted);
    }

    /// Finish as failed, recording whether memory fell back first.
    pub fn fail_with_fallback(mut self, err: &ChatError, fallback_used: bool) {
        let fallback_used = fallback_used || matches!(err, ChatError::SessionMemory { .. });
        self.finished = true;
        self.record_span(false);
        self.monitor
            .record_failure(self.id, err.error_type(), &err.to_string(), fallback_used);
    }

    /// Finish as failed with an explicit error type.
    pub fn fail_with(mut self, error_type: &str, message: &str) {
        self.finished = true;
        self.record_span(false);
        self.monitor.record_error(self.id, error_type, message);
    }

    fn record_span(&self, success: bool) {
        self.span
            .record("duration_ms", self.start.elapsed().as_secs_f64() * 1000.0);
        self.span.record("success", success);
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.record_span(false);
            self.monitor
                .record_error(self.id, "dropped", "operation dropped before completion");
        }
    }
}
