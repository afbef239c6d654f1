// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Interactive chat loop.

use std::io::{self, Write};
use std::sync::Arc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::watch;

use crate::chat::ChunkCallback;
use crate::error::ChatError;
use crate::orchestrator::SendOutcome;
use crate::types::Role;

use super::commands::{help_text, parse_command, ReplCommand};
use super::ChatRuntime;

/// Send one prompt and return the reply.
pub async fn ask_once(
    runtime: &ChatRuntime,
    session_id: &str,
    prompt: &str,
    stream: bool,
) -> Result<SendOutcome, ChatError> {
    open_session(runtime, session_id).await?;
    send(runtime, session_id, prompt, stream).await
}

async fn open_session(runtime: &ChatRuntime, session_id: &str) -> Result<(), ChatError> {
    runtime
        .orchestrator
        .load_session(session_id, runtime.system_instruction.clone())
        .await
        .map(|_| ())
}

/// Send a message, streaming to stdout when asked. Ctrl-C cancels a
/// streaming reply.
async fn send(
    runtime: &ChatRuntime,
    session_id: &str,
    text: &str,
    stream: bool,
) -> Result<SendOutcome, ChatError> {
    if !stream {
        return runtime.orchestrator.send_message(session_id, text).await;
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let on_chunk: ChunkCallback = Arc::new(|chunk: &str| {
        print!("{}", chunk);
        let _ = io::stdout().flush();
    });

    let send = runtime
        .orchestrator
        .send_message_stream(session_id, text, on_chunk, Some(cancel_rx));
    tokio::pin!(send);

    loop {
        tokio::select! {
            result = &mut send => {
                println!();
                return result;
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = cancel_tx.send(true);
            }
        }
    }
}

fn print_error(err: &ChatError) {
    eprintln!("{} {}", "error:".red().bold(), err);
    if let Some(secs) = err.retry_after() {
        eprintln!("{}", format!("Try again in {}s.", secs).yellow());
    } else if !err.is_recoverable() {
        eprintln!("{}", "Retrying will not help until the cause is fixed.".dimmed());
    }
}

/// Run the interactive REPL until `/exit` or end of input.
pub async fn run_repl(runtime: ChatRuntime, session_id: String, stream: bool) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut session_id = session_id;
    let mut stream = stream;

    open_session(&runtime, &session_id).await?;
    println!(
        "{} session {} ({})",
        "chatcore".bright_cyan().bold(),
        session_id.bright_white(),
        crate::VERSION
    );
    println!("{}", "Type /help for commands.".dimmed());

    loop {
        let prompt = format!("{}> ", session_id);
        let line = tokio::task::block_in_place(|| editor.readline(&prompt));
        let line = match line {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };

        let Some(command) = parse_command(&line) else {
            continue;
        };
        let _ = editor.add_history_entry(line.as_str());

        match command {
            ReplCommand::Message(text) => {
                if stream {
                    print!("{} ", "assistant:".green());
                    let _ = io::stdout().flush();
                }
                match send(&runtime, &session_id, &text, stream).await {
                    Ok(outcome) if !stream => {
                        println!("{} {}", "assistant:".green(), outcome.assistant_text);
                    }
                    Ok(_) => {}
                    Err(err) => print_error(&err),
                }
            }
            ReplCommand::Help => println!("{}", help_text()),
            ReplCommand::Exit => break,
            ReplCommand::History => print_history(&runtime, &session_id).await,
            ReplCommand::Clear => {
                if let Some(handle) = runtime.orchestrator.session(&session_id) {
                    match handle.lock().await.clear_history() {
                        Ok(()) => println!("{}", "History cleared.".dimmed()),
                        Err(err) => print_error(&err),
                    }
                }
            }
            ReplCommand::Health => match runtime.orchestrator.get_memory_health_status(&session_id).await {
                Some(health) => {
                    let status = if health.is_healthy() {
                        "healthy".green()
                    } else {
                        "degraded".yellow()
                    };
                    println!("Memory: {} (level {})", status, health.fallback_level);
                    println!(
                        "Fallback attempts: {}/{}, buffer {} messages, context ~{} tokens",
                        health.fallback_attempts,
                        health.max_fallback_attempts,
                        health.buffer_len,
                        health.context_tokens
                    );
                    println!(
                        "Optimization: {}, {} runs, {} tokens saved",
                        if health.optimization_enabled { "on" } else { "off" },
                        health.optimizer_stats.optimizations_performed,
                        health.optimizer_stats.total_tokens_saved
                    );
                }
                None => println!("{}", "Session not cached.".yellow()),
            },
            ReplCommand::Stats => {
                let stats = runtime.orchestrator.get_session_stats();
                println!(
                    "Active sessions: {}, created: {}, evicted: {}",
                    stats.active_sessions, stats.sessions_created, stats.sessions_cleaned
                );
            }
            ReplCommand::Dashboard => print!("{}", runtime.dashboard_report()),
            ReplCommand::Sessions => print_sessions(&runtime, &session_id).await,
            ReplCommand::Switch(id) => match open_session(&runtime, &id).await {
                Ok(()) => {
                    session_id = id;
                    println!("{} {}", "Switched to".dimmed(), session_id.bright_white());
                }
                Err(err) => print_error(&err),
            },
            ReplCommand::Stream => {
                stream = !stream;
                println!("Streaming {}", if stream { "on" } else { "off" });
            }
            ReplCommand::Invalid(msg) => println!("{}", msg.yellow()),
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn print_history(runtime: &ChatRuntime, session_id: &str) {
    let Some(handle) = runtime.orchestrator.session(session_id) else {
        println!("{}", "Session not cached.".yellow());
        return;
    };
    let history = handle.lock().await.get_history();
    if history.is_empty() {
        println!("{}", "No messages yet.".dimmed());
    }
    for entry in history {
        let label = match entry.role {
            Role::System => "system:".magenta(),
            Role::User => "you:".cyan(),
            Role::Assistant => "assistant:".green(),
        };
        println!("{} {}", label, entry.content);
    }
}

async fn print_sessions(runtime: &ChatRuntime, current: &str) {
    let mut ids = runtime.orchestrator.session_ids();
    if let Some(store) = &runtime.store {
        match store.list_sessions().await {
            Ok(persisted) => ids.extend(persisted),
            Err(err) => print_error(&err),
        }
    }
    ids.sort();
    ids.dedup();
    for id in ids {
        let marker = if id == current { "*" } else { " " };
        println!("{} {}", marker, id);
    }
}
