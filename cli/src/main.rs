// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Gradeflow CLI
//!
//! The `gradeflow` binary drives the grading core from the command line.
//!
//! ## Commands
//!
//! - `gradeflow providers list|add|remove|set-default|health` - Provider registry
//! - `gradeflow grade --answer-key F --submission F ...` - Full correction run
//! - `gradeflow config show|validate|generate` - Configuration management
//!
//! Results are printed as JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use gradeflow_cli::commands::{self, ConfigCommand, GradeArgs, ProvidersCommand};
use gradeflow_core::domain::config::{GradeflowConfig, LogFormat};

/// Gradeflow - LLM-assisted exam correction
#[derive(Parser)]
#[command(name = "gradeflow")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "GRADEFLOW_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage registered LLM providers
    #[command(name = "providers")]
    Providers {
        #[command(subcommand)]
        command: ProvidersCommand,
    },

    /// Grade one student's exam against an answer key
    #[command(name = "grade")]
    Grade(GradeArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = GradeflowConfig::load_or_default(cli.config.clone())
        .context("Failed to load configuration")?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_logging(&level, config.logging.format)?;

    match cli.command {
        Some(Commands::Providers { command }) => {
            commands::providers::handle_command(command, &config).await
        }
        Some(Commands::Grade(args)) => commands::grade::execute(args, &config).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config, &config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging. `RUST_LOG` wins over `level`.
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
