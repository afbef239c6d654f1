// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Operation monitoring for the chat core.
//!
//! Every unit of work (a send, a restore, a memory operation) is started,
//! then completed or failed, against an [`OperationMonitor`]. The monitor keeps
//! a bounded buffer of recent [`OperationRecord`]s and rolling aggregates that
//! the health checks read. It is constructed explicitly and shared through an
//! `Arc`; there is no global instance.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::guard::OperationGuard;

/// Default number of finished operation records kept.
pub const DEFAULT_MAX_RECORDS: usize = 1000;

/// Identifier pairing `start_operation` with its completion.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Generate a new random operation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get a short representation (first 8 characters).
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationId({})", self.short())
    }
}

impl Serialize for OperationId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

/// Kind of monitored operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    SendMessage,
    StreamMessage,
    RestoreContext,
    ClearHistory,
    OptimizeContext,
    SessionCreate,
    SessionSync,
    SessionCleanup,
    Custom(String),
}

impl OperationKind {
    /// Stable name used as the aggregation key.
    pub fn as_str(&self) -> &str {
        match self {
            Self::SendMessage => "send_message",
            Self::StreamMessage => "stream_message",
            Self::RestoreContext => "restore_context",
            Self::ClearHistory => "clear_history",
            Self::OptimizeContext => "optimize_context",
            Self::SessionCreate => "session_create",
            Self::SessionSync => "session_sync",
            Self::SessionCleanup => "session_cleanup",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Success,
    Error,
    Warning,
    Fallback,
}

/// A single monitored operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    pub id: OperationId,
    pub kind: OperationKind,
    pub session_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub duration: Option<Duration>,
    /// `None` while the operation is in flight.
    pub status: Option<OperationStatus>,
    pub tokens_used: u64,
    pub messages_count: usize,
    pub fallback_used: bool,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl OperationRecord {
    /// Duration in milliseconds, if finished.
    pub fn duration_ms(&self) -> Option<f64> {
        self.duration.map(|d| d.as_secs_f64() * 1000.0)
    }
}

/// Outcome details supplied when completing an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationCompletion {
    pub status: OperationStatus,
    pub tokens_used: u64,
    pub messages_count: usize,
    pub fallback_used: bool,
    pub tokens_saved: u64,
}

impl OperationCompletion {
    /// A plain successful completion.
    pub fn success() -> Self {
        Self::with_status(OperationStatus::Success)
    }

    /// A completion with the given status.
    pub fn with_status(status: OperationStatus) -> Self {
        Self {
            status,
            tokens_used: 0,
            messages_count: 0,
            fallback_used: false,
            tokens_saved: 0,
        }
    }

    pub fn tokens(mut self, tokens_used: u64) -> Self {
        self.tokens_used = tokens_used;
        self
    }

    pub fn messages(mut self, messages_count: usize) -> Self {
        self.messages_count = messages_count;
        self
    }

    /// Mark that a degraded memory strategy served this operation.
    /// A successful operation served by a fallback is recorded as `Fallback`.
    pub fn fallback(mut self, used: bool) -> Self {
        self.fallback_used = used;
        if used && self.status == OperationStatus::Success {
            self.status = OperationStatus::Fallback;
        }
        self
    }

    pub fn saved(mut self, tokens_saved: u64) -> Self {
        self.tokens_saved = tokens_saved;
        self
    }
}

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    /// Maximum number of finished records retained (oldest evicted first).
    pub max_records: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

/// Rolling duration statistics for one operation kind.
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    /// Number of operations.
    pub count: u64,

    /// Number of operations that ended in error.
    pub errors: u64,

    /// Total duration.
    pub total_duration: Duration,

    /// Minimum duration.
    pub min_duration: Duration,

    /// Maximum duration.
    pub max_duration: Duration,

    /// Histogram buckets for latency distribution.
    pub histogram: Histogram,
}

impl OperationMetrics {
    /// Create new operation metrics.
    pub fn new() -> Self {
        Self {
            count: 0,
            errors: 0,
            total_duration: Duration::ZERO,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
            histogram: Histogram::default(),
        }
    }

    /// Record an operation.
    pub fn record(&mut self, duration: Duration, is_error: bool) {
        self.count += 1;
        if is_error {
            self.errors += 1;
        }
        self.total_duration += duration;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
        self.histogram.record(duration);
    }

    /// Calculate average duration.
    pub fn avg_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }

    /// Minimum duration, or zero when nothing was recorded.
    pub fn min(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.min_duration
        }
    }
}

impl Default for OperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Simple histogram with fixed buckets for latency tracking.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Bucket boundaries in microseconds.
    buckets: Vec<u64>,

    /// Count per bucket (last one is the overflow bucket).
    counts: Vec<u64>,
}

impl Histogram {
    /// Create a histogram with custom bucket boundaries (in microseconds).
    pub fn with_buckets(buckets: Vec<u64>) -> Self {
        let counts = vec![0; buckets.len() + 1];
        Self { buckets, counts }
    }

    /// Record a duration value.
    pub fn record(&mut self, duration: Duration) {
        let micros = duration.as_micros() as u64;
        let bucket_idx = self
            .buckets
            .iter()
            .position(|&b| micros <= b)
            .unwrap_or(self.buckets.len());
        self.counts[bucket_idx] += 1;
    }

    /// Get counts for each bucket.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Calculate approximate percentile (p50, p90, p99, etc.).
    pub fn percentile(&self, p: f64) -> Duration {
        let total: u64 = self.counts.iter().sum();
        if total == 0 {
            return Duration::ZERO;
        }

        let target = (total as f64 * p / 100.0).ceil() as u64;
        let mut cumulative = 0u64;

        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                let micros = if i < self.buckets.len() {
                    self.buckets[i]
                } else {
                    self.buckets.last().copied().unwrap_or(0) * 10
                };
                return Duration::from_micros(micros);
            }
        }

        Duration::ZERO
    }

    /// Get p99 latency.
    pub fn p99(&self) -> Duration {
        self.percentile(99.0)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        // 100us, 1ms, 10ms, 100ms, 1s, 10s
        Self::with_buckets(vec![100, 1_000, 10_000, 100_000, 1_000_000, 10_000_000])
    }
}

struct ActiveOperation {
    record: OperationRecord,
    start: Instant,
}

/// Collects operation records and aggregates.
pub struct OperationMonitor {
    config: MonitorConfig,
    active: Mutex<HashMap<OperationId, ActiveOperation>>,
    records: Mutex<VecDeque<OperationRecord>>,
    operations: RwLock<HashMap<String, OperationMetrics>>,
    /// Error counts keyed by (operation kind, error type).
    errors: RwLock<HashMap<(String, String), u64>>,
    total_operations: AtomicU64,
    total_errors: AtomicU64,
    total_fallbacks: AtomicU64,
    tokens_used: AtomicU64,
    tokens_saved: AtomicU64,
    start_time: Instant,
}

impl fmt::Debug for OperationMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationMonitor")
            .field("config", &self.config)
            .field("total_operations", &self.total_operations.load(Ordering::Relaxed))
            .finish()
    }
}

impl OperationMonitor {
    /// Create a monitor with default configuration.
    pub fn new() -> Self {
        Self::with_config(MonitorConfig::default())
    }

    /// Create a monitor with custom configuration.
    pub fn with_config(config: MonitorConfig) -> Self {
        Self {
            config,
            active: Mutex::new(HashMap::new()),
            records: Mutex::new(VecDeque::new()),
            operations: RwLock::new(HashMap::new()),
            errors: RwLock::new(HashMap::new()),
            total_operations: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            total_fallbacks: AtomicU64::new(0),
            tokens_used: AtomicU64::new(0),
            tokens_saved: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Create a shareable monitor.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Begin tracking an operation.
    pub fn start_operation(&self, kind: OperationKind, session_id: Option<&str>) -> OperationId {
        let id = OperationId::new();
        let record = OperationRecord {
            id,
            kind,
            session_id: session_id.map(str::to_string),
            started_at: Utc::now(),
            ended_at: None,
            duration: None,
            status: None,
            tokens_used: 0,
            messages_count: 0,
            fallback_used: false,
            error_type: None,
            error_message: None,
        };
        lock(&self.active).insert(
            id,
            ActiveOperation {
                record,
                start: Instant::now(),
            },
        );
        id
    }

    /// Finish an operation. Returns the finished record, or `None` if the id
    /// is unknown or already finished.
    pub fn complete_operation(
        &self,
        id: OperationId,
        completion: OperationCompletion,
    ) -> Option<OperationRecord> {
        let active = lock(&self.active).remove(&id)?;
        let mut record = active.record;
        record.status = Some(completion.status);
        record.tokens_used = completion.tokens_used;
        record.messages_count = completion.messages_count;
        record.fallback_used = completion.fallback_used;

        if completion.tokens_saved > 0 {
            self.tokens_saved
                .fetch_add(completion.tokens_saved, Ordering::Relaxed);
        }
        Some(self.finalize(record, active.start))
    }

    /// Finish an operation as failed.
    pub fn record_error(
        &self,
        id: OperationId,
        error_type: &str,
        message: &str,
    ) -> Option<OperationRecord> {
        self.record_failure(id, error_type, message, false)
    }

    /// Finish an operation as failed, noting whether memory ran degraded
    /// before it failed.
    pub fn record_failure(
        &self,
        id: OperationId,
        error_type: &str,
        message: &str,
        fallback_used: bool,
    ) -> Option<OperationRecord> {
        let active = lock(&self.active).remove(&id)?;
        let mut record = active.record;
        record.status = Some(OperationStatus::Error);
        record.fallback_used = fallback_used;
        record.error_type = Some(error_type.to_string());
        record.error_message = Some(message.to_string());

        *write(&self.errors)
            .entry((record.kind.as_str().to_string(), error_type.to_string()))
            .or_insert(0) += 1;

        tracing::debug!(
            operation = %record.kind,
            op_id = %id.short(),
            error_type,
            "Operation failed: {}",
            message
        );
        Some(self.finalize(record, active.start))
    }

    /// Start an operation and return a guard that records its completion on
    /// every exit path.
    pub fn monitor_operation(
        self: &Arc<Self>,
        kind: OperationKind,
        session_id: Option<&str>,
    ) -> OperationGuard {
        OperationGuard::start(Arc::clone(self), kind, session_id)
    }

    /// Run a fallible future under a guard, recording its outcome and handing
    /// the error back to the caller unchanged.
    pub async fn track<T, F>(
        self: &Arc<Self>,
        kind: OperationKind,
        session_id: Option<&str>,
        future: F,
    ) -> Result<T, crate::error::ChatError>
    where
        F: std::future::Future<Output = Result<T, crate::error::ChatError>>,
    {
        let guard = self.monitor_operation(kind, session_id);
        match future.await {
            Ok(value) => {
                guard.success();
                Ok(value)
            }
            Err(err) => {
                guard.fail(&err);
                Err(err)
            }
        }
    }

    fn finalize(&self, mut record: OperationRecord, start: Instant) -> OperationRecord {
        let duration = start.elapsed();
        record.duration = Some(duration);
        record.ended_at = Some(Utc::now());

        let is_error = record.status == Some(OperationStatus::Error);
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }
        if record.fallback_used || record.status == Some(OperationStatus::Fallback) {
            self.total_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
        if record.tokens_used > 0 {
            self.tokens_used
                .fetch_add(record.tokens_used, Ordering::Relaxed);
        }

        write(&self.operations)
            .entry(record.kind.as_str().to_string())
            .or_insert_with(OperationMetrics::new)
            .record(duration, is_error);

        let mut records = lock(&self.records);
        while records.len() >= self.config.max_records.max(1) {
            records.pop_front();
        }
        records.push_back(record.clone());
        record
    }

    /// Metrics for one operation kind.
    pub fn operation_metrics(&self, kind: &str) -> Option<OperationMetrics> {
        read(&self.operations).get(kind).cloned()
    }

    /// Number of errors recorded for a kind and error type.
    pub fn error_count(&self, kind: &str, error_type: &str) -> u64 {
        read(&self.errors)
            .get(&(kind.to_string(), error_type.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Most recent finished records, newest last.
    pub fn recent_records(&self, limit: usize) -> Vec<OperationRecord> {
        let records = lock(&self.records);
        let skip = records.len().saturating_sub(limit);
        records.iter().skip(skip).cloned().collect()
    }

    /// Finished records belonging to one session.
    pub fn records_for_session(&self, session_id: &str) -> Vec<OperationRecord> {
        lock(&self.records)
            .iter()
            .filter(|r| r.session_id.as_deref() == Some(session_id))
            .cloned()
            .collect()
    }

    /// Number of operations currently in flight.
    pub fn active_operations(&self) -> usize {
        lock(&self.active).len()
    }

    /// Get uptime since the monitor was created.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Take a snapshot of all aggregates.
    pub fn snapshot(&self) -> MonitorSnapshot {
        let operations = read(&self.operations).clone();
        let error_counts = read(&self.errors)
            .iter()
            .map(|((kind, error_type), count)| ErrorCount {
                kind: kind.clone(),
                error_type: error_type.clone(),
                count: *count,
            })
            .collect();

        MonitorSnapshot {
            operations,
            error_counts,
            total_operations: self.total_operations.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            total_fallbacks: self.total_fallbacks.load(Ordering::Relaxed),
            total_tokens_used: self.tokens_used.load(Ordering::Relaxed),
            total_tokens_saved: self.tokens_saved.load(Ordering::Relaxed),
            active_operations: self.active_operations(),
            retained_records: lock(&self.records).len(),
            uptime: self.uptime(),
        }
    }

    /// Reset all aggregates and records. In-flight operations are kept.
    pub fn reset(&self) {
        lock(&self.records).clear();
        write(&self.operations).clear();
        write(&self.errors).clear();
        for counter in [
            &self.total_operations,
            &self.total_errors,
            &self.total_fallbacks,
            &self.tokens_used,
            &self.tokens_saved,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for OperationMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Error count for one (kind, error type) bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorCount {
    pub kind: String,
    pub error_type: String,
    pub count: u64,
}

/// A snapshot of all monitor aggregates at a point in time.
#[derive(Debug, Clone)]
pub struct MonitorSnapshot {
    /// Duration statistics by operation kind.
    pub operations: HashMap<String, OperationMetrics>,
    pub error_counts: Vec<ErrorCount>,
    pub total_operations: u64,
    pub total_errors: u64,
    pub total_fallbacks: u64,
    pub total_tokens_used: u64,
    pub total_tokens_saved: u64,
    pub active_operations: usize,
    pub retained_records: usize,
    pub uptime: Duration,
}

impl MonitorSnapshot {
    /// Share of finished operations that failed (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        ratio(self.total_errors, self.total_operations)
    }

    /// Share of finished operations served by a fallback (0.0 to 1.0).
    pub fn fallback_rate(&self) -> f64 {
        ratio(self.total_fallbacks, self.total_operations)
    }

    /// Average duration across all operation kinds.
    pub fn avg_response_time(&self) -> Duration {
        let (total, count) = self
            .operations
            .values()
            .fold((Duration::ZERO, 0u64), |(total, count), m| {
                (total + m.total_duration, count + m.count)
            });
        if count == 0 {
            Duration::ZERO
        } else {
            total / count as u32
        }
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

// Poisoned locks only mean another thread panicked mid-update; the counters
// are still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_complete() {
        let monitor = OperationMonitor::new();
        let id = monitor.start_operation(OperationKind::SendMessage, Some("s1"));
        assert_eq!(monitor.active_operations(), 1);

        let record = monitor
            .complete_operation(id, OperationCompletion::success().tokens(42).messages(3))
            .unwrap();
        assert_eq!(record.status, Some(OperationStatus::Success));
        assert_eq!(record.tokens_used, 42);
        assert_eq!(record.session_id.as_deref(), Some("s1"));
        assert!(record.duration.is_some());
        assert_eq!(monitor.active_operations(), 0);

        // Second completion of the same id is ignored
        assert!(monitor.complete_operation(id, OperationCompletion::success()).is_none());
        assert_eq!(monitor.snapshot().total_operations, 1);
    }

    #[test]
    fn test_record_error_counts_by_kind_and_type() {
        let monitor = OperationMonitor::new();
        for _ in 0..2 {
            let id = monitor.start_operation(OperationKind::SendMessage, None);
            monitor.record_error(id, "ai_service", "rate limited");
        }
        let id = monitor.start_operation(OperationKind::RestoreContext, None);
        monitor.record_error(id, "session_memory", "exhausted");

        assert_eq!(monitor.error_count("send_message", "ai_service"), 2);
        assert_eq!(monitor.error_count("restore_context", "session_memory"), 1);
        assert_eq!(monitor.error_count("send_message", "session_memory"), 0);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.total_errors, 3);
        assert!((snapshot.error_rate() - 1.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.operations["send_message"].errors, 2);
    }

    #[test]
    fn test_records_are_bounded_oldest_first() {
        let monitor = OperationMonitor::with_config(MonitorConfig { max_records: 3 });
        let mut ids = Vec::new();
        for i in 0..5 {
            let id = monitor.start_operation(OperationKind::Custom(format!("op{}", i)), None);
            monitor.complete_operation(id, OperationCompletion::success());
            ids.push(id);
        }

        let recent = monitor.recent_records(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, ids[2]);
        assert_eq!(recent[2].id, ids[4]);
        // Aggregates are not bounded by the record buffer
        assert_eq!(monitor.snapshot().total_operations, 5);
    }

    #[test]
    fn test_fallback_and_tokens_saved_totals() {
        let monitor = OperationMonitor::new();
        let id = monitor.start_operation(OperationKind::OptimizeContext, None);
        monitor.complete_operation(id, OperationCompletion::success().saved(120));
        let id = monitor.start_operation(OperationKind::ClearHistory, None);
        let record = monitor
            .complete_operation(id, OperationCompletion::success().fallback(true))
            .unwrap();
        assert_eq!(record.status, Some(OperationStatus::Fallback));

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.total_tokens_saved, 120);
        assert_eq!(snapshot.total_fallbacks, 1);
        assert!((snapshot.fallback_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_records_for_session() {
        let monitor = OperationMonitor::new();
        for session in ["a", "b", "a"] {
            let id = monitor.start_operation(OperationKind::SendMessage, Some(session));
            monitor.complete_operation(id, OperationCompletion::success());
        }
        assert_eq!(monitor.records_for_session("a").len(), 2);
        assert_eq!(monitor.records_for_session("c").len(), 0);
    }

    #[test]
    fn test_operation_metrics() {
        let mut metrics = OperationMetrics::new();
        assert_eq!(metrics.min(), Duration::ZERO);
        metrics.record(Duration::from_millis(10), false);
        metrics.record(Duration::from_millis(20), false);
        metrics.record(Duration::from_millis(30), true);

        assert_eq!(metrics.count, 3);
        assert_eq!(metrics.errors, 1);
        assert_eq!(metrics.avg_duration(), Duration::from_millis(20));
        assert_eq!(metrics.min(), Duration::from_millis(10));
        assert_eq!(metrics.max_duration, Duration::from_millis(30));
    }

    #[test]
    fn test_histogram_percentiles() {
        let mut hist = Histogram::default();
        for _ in 0..100 {
            hist.record(Duration::from_micros(500));
        }
        assert_eq!(hist.counts()[1], 100);
        assert_eq!(hist.p99(), Duration::from_micros(1_000));
    }

    #[test]
    fn test_reset() {
        let monitor = OperationMonitor::new();
        let id = monitor.start_operation(OperationKind::SendMessage, None);
        monitor.complete_operation(id, OperationCompletion::success().tokens(10));
        monitor.reset();

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.total_operations, 0);
        assert_eq!(snapshot.total_tokens_used, 0);
        assert!(monitor.operation_metrics("send_message").is_none());
    }

    #[test]
    fn test_operation_id_short() {
        let id = OperationId::new();
        assert_eq!(id.short().len(), 8);
        assert!(format!("{:?}", id).starts_with("OperationId("));
    }
}
