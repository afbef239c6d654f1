// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Health classification over monitor aggregates.
//!
//! [`PerformanceMonitor`] reads a [`MonitorSnapshot`] plus a sample of process
//! resource usage and classifies each signal against [`HealthThresholds`].
//! Apart from alert bookkeeping it holds no state.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::monitor::MonitorSnapshot;

/// Default number of alerts kept in the history.
pub const DEFAULT_ALERT_HISTORY: usize = 100;

/// Overall or per-signal health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warning and critical limits per signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthThresholds {
    pub response_time_warning_ms: f64,
    pub response_time_critical_ms: f64,
    pub error_rate_warning: f64,
    pub error_rate_critical: f64,
    pub fallback_rate_warning: f64,
    pub fallback_rate_critical: f64,
    pub memory_warning_mb: f64,
    pub memory_critical_mb: f64,
    pub cpu_warning_percent: f64,
    pub cpu_critical_percent: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            response_time_warning_ms: 2_000.0,
            response_time_critical_ms: 5_000.0,
            error_rate_warning: 0.05,
            error_rate_critical: 0.15,
            fallback_rate_warning: 0.10,
            fallback_rate_critical: 0.30,
            memory_warning_mb: 512.0,
            memory_critical_mb: 1_024.0,
            cpu_warning_percent: 70.0,
            cpu_critical_percent: 90.0,
        }
    }
}

/// Process resource usage at check time. Unknown values are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceUsage {
    pub memory_mb: Option<f64>,
    pub cpu_percent: Option<f64>,
}

impl ResourceUsage {
    /// Sample resident memory of the current process.
    ///
    /// Reads `/proc/self/status` on Linux; elsewhere returns an empty sample.
    pub fn sample() -> Self {
        Self {
            memory_mb: resident_memory_mb(),
            cpu_percent: None,
        }
    }
}

fn resident_memory_mb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024.0)
}

/// Health signal being classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    ResponseTime,
    ErrorRate,
    FallbackRate,
    Memory,
    Cpu,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResponseTime => "response_time",
            Self::ErrorRate => "error_rate",
            Self::FallbackRate => "fallback_rate",
            Self::Memory => "memory",
            Self::Cpu => "cpu",
        }
    }
}

/// Classification of one signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheck {
    pub signal: Signal,
    pub value: f64,
    pub status: HealthStatus,
}

/// A raised alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub signal: Signal,
    pub severity: HealthStatus,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Result of a health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: Vec<HealthCheck>,
    /// Alerts active after this check.
    pub alerts: Vec<Alert>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Default)]
struct AlertBook {
    active: Vec<Alert>,
    history: VecDeque<Alert>,
}

/// Derives health from monitor aggregates.
pub struct PerformanceMonitor {
    thresholds: HealthThresholds,
    max_history: usize,
    alerts: Mutex<AlertBook>,
}

impl PerformanceMonitor {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            max_history: DEFAULT_ALERT_HISTORY,
            alerts: Mutex::new(AlertBook::default()),
        }
    }

    /// Set the alert history capacity.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.max_history = limit.max(1);
        self
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Classify every signal and update alert bookkeeping.
    pub fn check_health(&self, snapshot: &MonitorSnapshot, resources: ResourceUsage) -> HealthReport {
        let t = &self.thresholds;
        let avg_ms = snapshot.avg_response_time().as_secs_f64() * 1000.0;

        let mut checks = vec![
            classify(Signal::ResponseTime, avg_ms, t.response_time_warning_ms, t.response_time_critical_ms),
            classify(Signal::ErrorRate, snapshot.error_rate(), t.error_rate_warning, t.error_rate_critical),
            classify(
                Signal::FallbackRate,
                snapshot.fallback_rate(),
                t.fallback_rate_warning,
                t.fallback_rate_critical,
            ),
        ];
        if let Some(mb) = resources.memory_mb {
            checks.push(classify(Signal::Memory, mb, t.memory_warning_mb, t.memory_critical_mb));
        }
        if let Some(cpu) = resources.cpu_percent {
            checks.push(classify(Signal::Cpu, cpu, t.cpu_warning_percent, t.cpu_critical_percent));
        }

        let status = overall_status(&checks);
        let alerts = self.update_alerts(&checks);

        if status >= HealthStatus::Degraded {
            tracing::warn!(status = %status, alerts = alerts.len(), "Health check");
        } else {
            tracing::debug!(status = %status, "Health check");
        }

        HealthReport {
            status,
            checks,
            alerts,
            checked_at: Utc::now(),
        }
    }

    fn update_alerts(&self, checks: &[HealthCheck]) -> Vec<Alert> {
        let mut book = self.alerts.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        let mut active = Vec::new();

        for check in checks.iter().filter(|c| c.status != HealthStatus::Healthy) {
            let already_active = book
                .active
                .iter()
                .any(|a| a.signal == check.signal && a.severity == check.status);
            let alert = Alert {
                signal: check.signal,
                severity: check.status,
                message: format!("{} is {} ({:.3})", check.signal.as_str(), check.status, check.value),
                raised_at: now,
            };
            if !already_active {
                if book.history.len() >= self.max_history {
                    book.history.pop_front();
                }
                book.history.push_back(alert.clone());
            }
            active.push(alert);
        }

        book.active = active.clone();
        active
    }

    /// Alerts raised by the most recent check.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active
            .clone()
    }

    /// Every distinct alert raised, oldest first.
    pub fn alert_history(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .history
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(HealthThresholds::default())
    }
}

fn classify(signal: Signal, value: f64, warning: f64, critical: f64) -> HealthCheck {
    let status = if value >= critical {
        HealthStatus::Critical
    } else if value >= warning {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    };
    HealthCheck { signal, value, status }
}

/// Worst signal wins; two or more warnings escalate to degraded.
pub fn overall_status(checks: &[HealthCheck]) -> HealthStatus {
    if checks.iter().any(|c| c.status == HealthStatus::Critical) {
        return HealthStatus::Critical;
    }
    match checks.iter().filter(|c| c.status == HealthStatus::Warning).count() {
        0 => HealthStatus::Healthy,
        1 => HealthStatus::Warning,
        _ => HealthStatus::Degraded,
    }
}
