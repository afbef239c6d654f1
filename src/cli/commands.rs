// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Slash command parsing for the chat REPL.

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Plain text to send to the model.
    Message(String),
    Help,
    Exit,
    /// Print the active session's history.
    History,
    /// Drop the active session's history.
    Clear,
    /// Memory health of the active session.
    Health,
    /// Orchestrator cache counters.
    Stats,
    /// Full monitoring dashboard.
    Dashboard,
    /// List cached and persisted sessions.
    Sessions,
    /// Switch to (or create) another session.
    Switch(String),
    /// Toggle streaming.
    Stream,
    /// Unknown command or bad arguments.
    Invalid(String),
}

/// Check if arguments contain a help flag (-h, --help, ?)
fn has_help_flag(args: &str) -> bool {
    matches!(args.trim(), "-h" | "--help" | "?" | "help")
}

/// Parse one line of input. Returns `None` for blank input.
pub fn parse_command(input: &str) -> Option<ReplCommand> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.starts_with('/') {
        return Some(ReplCommand::Message(trimmed.to_string()));
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default().to_lowercase();
    let args = parts.next().unwrap_or("").trim();

    if has_help_flag(args) {
        return Some(ReplCommand::Help);
    }

    let parsed = match command.as_str() {
        "/help" | "/h" | "/?" => ReplCommand::Help,
        "/exit" | "/quit" | "/q" => ReplCommand::Exit,
        "/history" => ReplCommand::History,
        "/clear" | "/c" => ReplCommand::Clear,
        "/health" => ReplCommand::Health,
        "/stats" => ReplCommand::Stats,
        "/dashboard" | "/dash" => ReplCommand::Dashboard,
        "/sessions" => ReplCommand::Sessions,
        "/stream" => ReplCommand::Stream,
        "/session" | "/switch" => {
            if args.is_empty() {
                ReplCommand::Invalid("Usage: /session <id>".to_string())
            } else {
                ReplCommand::Switch(args.to_string())
            }
        }
        other => ReplCommand::Invalid(format!("Unknown command: {} (try /help)", other)),
    };
    Some(parsed)
}

/// Help text listing every command.
pub fn help_text() -> &'static str {
    "Commands:
  /history          show the conversation so far
  /clear            forget the conversation
  /health           memory health of this session
  /stats            session cache counters
  /dashboard        operation metrics and alerts
  /sessions         list known sessions
  /session <id>     switch to another session
  /stream           toggle streaming replies
  /exit             quit"
}
