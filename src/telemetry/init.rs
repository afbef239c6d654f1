// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Log output for the chatcore binary.
//!
//! Logs go to stderr so they never interleave with replies on stdout.
//! `RUST_LOG`, when set, replaces the configured filter.

use std::io;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Filter applied when the configured one cannot be parsed.
const FALLBACK_FILTER: &str = "warn";

/// Line layout for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

/// The `logging` section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `warn` or `chatcore::memory=debug`.
    pub filter: String,
    pub format: LogFormat,
    /// Log each operation span as it closes, with its duration.
    pub span_timings: bool,
    /// Source file and line on every event.
    pub file_line: bool,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: FALLBACK_FILTER.to_string(),
            format: LogFormat::Compact,
            span_timings: false,
            file_line: false,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Settings behind `--debug`: crate debug logs, span timings, pretty lines.
    pub fn debug(self) -> Self {
        Self {
            filter: format!("chatcore=debug,{}", FALLBACK_FILTER),
            format: LogFormat::Pretty,
            span_timings: true,
            file_line: true,
            ..self
        }
    }

    /// Check that `filter` parses as a directive.
    pub fn validate(&self) -> Result<(), String> {
        EnvFilter::try_new(&self.filter)
            .map(|_| ())
            .map_err(|e| format!("invalid filter '{}': {}", self.filter, e))
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER))
        })
    }
}

/// Keep this alive for the duration of the program.
pub struct TelemetryGuard {
    _private: (),
}

/// Install the global subscriber. Call once, before the first session is
/// created.
pub fn init_telemetry(config: &LoggingConfig) -> io::Result<TelemetryGuard> {
    let span_events = if config.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi)
        .with_file(config.file_line)
        .with_line_number(config.file_line)
        .with_span_events(span_events);

    let registry = tracing_subscriber::registry().with(config.env_filter());
    let installed = match config.format {
        LogFormat::Compact => registry.with(fmt_layer.compact()).try_init(),
        LogFormat::Pretty => registry.with(fmt_layer.pretty()).try_init(),
    };
    installed.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(TelemetryGuard { _private: () })
}
