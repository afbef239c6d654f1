// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Read-only dashboard over monitor aggregates.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::health::{Alert, HealthStatus, PerformanceMonitor, ResourceUsage};
use super::monitor::OperationMonitor;
use crate::orchestrator::SessionStats;
use crate::rollout::RolloutPolicy;

/// Per-kind row of the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct OperationRow {
    pub kind: String,
    pub count: u64,
    pub errors: u64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p99_ms: f64,
}

/// Crate-wide totals.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub operations: u64,
    pub errors: u64,
    pub fallbacks: u64,
    pub tokens_used: u64,
    pub tokens_saved: u64,
    pub error_rate: f64,
    pub fallback_rate: f64,
    pub avg_response_ms: f64,
}

/// Serializable dashboard summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub generated_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub health: HealthStatus,
    pub totals: Totals,
    pub operations: Vec<OperationRow>,
    pub alerts: Vec<Alert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<SessionStats>,
    /// Rollout percentages by flag.
    pub rollout: BTreeMap<String, u8>,
}

/// Builds summaries from an [`OperationMonitor`] and a [`PerformanceMonitor`].
pub struct Dashboard {
    monitor: Arc<OperationMonitor>,
    performance: Arc<PerformanceMonitor>,
}

impl Dashboard {
    pub fn new(monitor: Arc<OperationMonitor>, performance: Arc<PerformanceMonitor>) -> Self {
        Self {
            monitor,
            performance,
        }
    }

    /// Take a snapshot, run a health check and assemble the summary.
    pub fn summary(
        &self,
        sessions: Option<SessionStats>,
        rollout: Option<&RolloutPolicy>,
        resources: ResourceUsage,
    ) -> DashboardSummary {
        let snapshot = self.monitor.snapshot();
        let report = self.performance.check_health(&snapshot, resources);

        let mut operations: Vec<OperationRow> = snapshot
            .operations
            .iter()
            .map(|(kind, m)| OperationRow {
                kind: kind.clone(),
                count: m.count,
                errors: m.errors,
                avg_ms: millis(m.avg_duration()),
                min_ms: millis(m.min()),
                max_ms: millis(m.max_duration),
                p99_ms: millis(m.histogram.p99()),
            })
            .collect();
        operations.sort_by(|a, b| a.kind.cmp(&b.kind));

        DashboardSummary {
            generated_at: Utc::now(),
            uptime_secs: snapshot.uptime.as_secs(),
            health: report.status,
            totals: Totals {
                operations: snapshot.total_operations,
                errors: snapshot.total_errors,
                fallbacks: snapshot.total_fallbacks,
                tokens_used: snapshot.total_tokens_used,
                tokens_saved: snapshot.total_tokens_saved,
                error_rate: snapshot.error_rate(),
                fallback_rate: snapshot.fallback_rate(),
                avg_response_ms: millis(snapshot.avg_response_time()),
            },
            operations,
            alerts: report.alerts,
            sessions,
            rollout: rollout
                .map(|policy| policy.flags().clone().into_iter().collect())
                .unwrap_or_default(),
        }
    }
}

fn millis(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Render a summary as plain text.
pub fn format_report(summary: &DashboardSummary) -> String {
    let mut out = String::new();
    let t = &summary.totals;

    let _ = writeln!(out, "Health: {} (uptime {}s)", summary.health, summary.uptime_secs);
    let _ = writeln!(
        out,
        "Operations: {} total, {} errors ({:.1}%), {} fallbacks ({:.1}%)",
        t.operations,
        t.errors,
        t.error_rate * 100.0,
        t.fallbacks,
        t.fallback_rate * 100.0
    );
    let _ = writeln!(
        out,
        "Tokens: {} used, {} saved by optimization; avg response {:.1}ms",
        t.tokens_used, t.tokens_saved, t.avg_response_ms
    );

    if let Some(sessions) = &summary.sessions {
        let _ = writeln!(
            out,
            "Sessions: {} active, {} created, {} cleaned",
            sessions.active_sessions, sessions.sessions_created, sessions.sessions_cleaned
        );
    }

    if !summary.operations.is_empty() {
        let _ = writeln!(
            out,
            "\n{:<20} {:>7} {:>7} {:>10} {:>10} {:>10}",
            "operation", "count", "errors", "avg ms", "max ms", "p99 ms"
        );
        for row in &summary.operations {
            let _ = writeln!(
                out,
                "{:<20} {:>7} {:>7} {:>10.1} {:>10.1} {:>10.1}",
                row.kind, row.count, row.errors, row.avg_ms, row.max_ms, row.p99_ms
            );
        }
    }

    if !summary.rollout.is_empty() {
        let _ = writeln!(out, "\nRollout:");
        for (flag, pct) in &summary.rollout {
            let _ = writeln!(out, "  {}: {}%", flag, pct);
        }
    }

    if !summary.alerts.is_empty() {
        let _ = writeln!(out, "\nAlerts:");
        for alert in &summary.alerts {
            let _ = writeln!(out, "  [{}] {}", alert.severity, alert.message);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollout::RolloutConfig;
    use crate::telemetry::monitor::{OperationCompletion, OperationKind};

    fn dashboard() -> (Arc<OperationMonitor>, Dashboard) {
        let monitor = OperationMonitor::shared();
        let dash = Dashboard::new(Arc::clone(&monitor), Arc::new(PerformanceMonitor::default()));
        (monitor, dash)
    }

    #[test]
    fn test_summary_totals_and_rows() {
        let (monitor, dash) = dashboard();
        for _ in 0..3 {
            let id = monitor.start_operation(OperationKind::SendMessage, Some("s"));
            monitor.complete_operation(id, OperationCompletion::success().tokens(10));
        }
        let id = monitor.start_operation(OperationKind::ClearHistory, Some("s"));
        monitor.complete_operation(id, OperationCompletion::success());

        let summary = dash.summary(None, None, ResourceUsage::default());
        assert_eq!(summary.totals.operations, 4);
        assert_eq!(summary.totals.tokens_used, 30);
        assert_eq!(summary.operations.len(), 2);
        assert_eq!(summary.operations[0].kind, "clear_history");
        assert_eq!(summary.operations[1].count, 3);
        assert_eq!(summary.health, HealthStatus::Healthy);
    }

    #[test]
    fn test_summary_serializes() {
        let (_monitor, dash) = dashboard();
        let stats = SessionStats {
            active_sessions: 2,
            sessions_created: 5,
            sessions_cleaned: 3,
        };
        let policy = RolloutPolicy::new(RolloutConfig::default().with_flag("context_optimization", 50));
        let summary = dash.summary(Some(stats), Some(&policy), ResourceUsage::default());

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["health"], "healthy");
        assert_eq!(json["sessions"]["activeSessions"], 2);
        assert_eq!(json["rollout"]["context_optimization"], 50);
    }

    #[test]
    fn test_format_report() {
        let (monitor, dash) = dashboard();
        let id = monitor.start_operation(OperationKind::SendMessage, None);
        monitor.record_error(id, "ai_service", "down");

        let report = format_report(&dash.summary(None, None, ResourceUsage::default()));
        assert!(report.contains("Health: critical"));
        assert!(report.contains("send_message"));
        assert!(report.contains("Alerts:"));
    }
}
