// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Observability for chat sessions.
//!
//! - **Tracing**: structured logging through `tracing`, configured by
//!   [`init_telemetry`]
//! - **Operation monitoring**: [`OperationMonitor`] records every session
//!   operation; [`OperationGuard`] guarantees each one is finished
//! - **Health**: [`PerformanceMonitor`] classifies the aggregates and
//!   [`Dashboard`] renders them
//!
//! The monitor is an ordinary value. Build one, wrap it in an `Arc` and hand
//! it to the sessions that should report to it:
//!
//! ```rust,ignore
//! use chatcore::telemetry::{OperationKind, OperationMonitor};
//!
//! let monitor = OperationMonitor::shared();
//! let guard = monitor.monitor_operation(OperationKind::SendMessage, Some("session-1"));
//! // ... do the work ...
//! guard.success();
//! ```

pub mod dashboard;
mod guard;
pub mod health;
mod init;
pub mod monitor;

pub use dashboard::{format_report, Dashboard, DashboardSummary};
pub use guard::OperationGuard;
pub use health::{
    Alert, HealthReport, HealthStatus, HealthThresholds, PerformanceMonitor, ResourceUsage,
};
pub use init::{init_telemetry, LogFormat, LoggingConfig, TelemetryGuard};
pub use monitor::{
    Histogram, MonitorConfig, MonitorSnapshot, OperationCompletion, OperationId, OperationKind,
    OperationMetrics, OperationMonitor, OperationRecord, OperationStatus,
};
