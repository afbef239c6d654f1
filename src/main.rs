// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! chatcore main entry point - CLI, commands, and REPL.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use chatcore::cli::{ask_once, error_json, run_repl, ChatRuntime};
use chatcore::config::{self, CliOptions};
use chatcore::ChatError;
use chatcore::telemetry::init_telemetry;

/// Session used when none is given.
const DEFAULT_SESSION: &str = "default";

/// chatcore - session-based chat with memory that degrades gracefully.
#[derive(Parser)]
#[command(name = "chatcore")]
#[command(author, version, about = "Session-based chat with context optimization", long_about = None)]
struct Cli {
    /// AI provider to use (openai, ollama, openai-compatible, offline)
    #[arg(short, long, env = "CHATCORE_PROVIDER")]
    provider: Option<String>,

    /// Model to use
    #[arg(short, long, env = "CHATCORE_MODEL")]
    model: Option<String>,

    /// Base URL for the API
    #[arg(long, env = "CHATCORE_BASE_URL")]
    base_url: Option<String>,

    /// Session to open
    #[arg(short, long)]
    session: Option<String>,

    /// Literal system instruction for new sessions
    #[arg(long, conflicts_with = "preset")]
    system: Option<String>,

    /// Named system instruction preset
    #[arg(long)]
    preset: Option<String>,

    /// Stream replies as they arrive
    #[arg(long)]
    stream: bool,

    /// SQLite database for persisted messages
    #[arg(long, env = "CHATCORE_DB")]
    db: Option<PathBuf>,

    /// Do not persist messages
    #[arg(long)]
    ephemeral: bool,

    /// Show debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Output format for non-interactive mode.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Subcommands for chatcore.
#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat (default)
    Chat,

    /// Send a single prompt and exit
    Ask {
        /// The prompt to send
        prompt: String,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

/// Config subcommand actions.
#[derive(Subcommand)]
enum ConfigAction {
    /// Show the resolved configuration
    Show,
    /// Write an example .chatcore.json in the current directory
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let workspace_root = std::env::current_dir()?;

    if let Some(Commands::Config {
        action: Some(ConfigAction::Init),
    }) = &cli.command
    {
        let path = config::init_config(&workspace_root, None)?;
        println!("Created config file: {}", path.display());
        return Ok(());
    }

    let cli_options = CliOptions {
        provider: cli.provider,
        model: cli.model,
        base_url: cli.base_url,
        session: cli.session,
        system: cli.system,
        preset: cli.preset,
        stream: if cli.stream { Some(true) } else { None },
        database_path: cli.db,
    };
    let resolved = config::load_config(&workspace_root, cli_options)?;

    let logging = if cli.debug {
        resolved.logging.clone().debug()
    } else {
        resolved.logging.clone()
    };
    let _telemetry = init_telemetry(&logging)?;

    let session_id = resolved
        .default_session
        .clone()
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());

    match cli.command {
        Some(Commands::Config { .. }) => {
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
        Some(Commands::Ask { prompt, format }) => {
            let runtime = match ChatRuntime::connect(&resolved, !cli.ephemeral) {
                Ok(runtime) => runtime,
                Err(err) => return report_error(format, &err),
            };
            let stream = resolved.stream && matches!(format, OutputFormat::Text);
            handle_prompt(&runtime, &session_id, &prompt, format, stream).await?;
        }
        Some(Commands::Chat) | None => {
            let runtime = ChatRuntime::connect(&resolved, !cli.ephemeral)?;
            run_repl(runtime, session_id, resolved.stream).await?;
        }
    }

    Ok(())
}

async fn handle_prompt(
    runtime: &ChatRuntime,
    session_id: &str,
    prompt: &str,
    format: OutputFormat,
    stream: bool,
) -> anyhow::Result<()> {
    let result = ask_once(runtime, session_id, prompt, stream).await;

    match (format, result) {
        (OutputFormat::Text, Ok(outcome)) => {
            if !stream {
                println!("{}", outcome.assistant_text);
            }
        }
        (format, Err(err)) => return report_error(format, &err),
        (OutputFormat::Json, Ok(outcome)) => {
            let response = serde_json::json!({
                "success": true,
                "response": outcome.assistant_text,
                "session": outcome.session_info,
            });
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

/// Print a prompt failure in the requested format and exit with status 1.
fn report_error(format: OutputFormat, err: &ChatError) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => eprintln!("{} {}", "error:".red().bold(), err),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&error_json(err))?),
    }
    std::process::exit(1);
}
