// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! plock - project lock administration

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::command::CommandLockCommand;
use commands::locks::LocksCommand;
use commands::outputs::OutputsCommand;
use commands::pulls::PullsCommand;
use commands::Context;
use config::Config;
use output::OutputFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "plock",
    version,
    about = "plock - Project lock administration"
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Embedded store directory, overriding the configuration file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Project locks
    Locks {
        #[command(subcommand)]
        command: LocksCommand,
    },
    /// Global command locks
    Command {
        #[command(subcommand)]
        command: CommandLockCommand,
    },
    /// Run history
    Outputs {
        #[command(subcommand)]
        command: OutputsCommand,
    },
    /// Pull requests
    Pulls {
        #[command(subcommand)]
        command: PullsCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.store.data_dir = dir;
    }

    let store = plock_storage::open(&config.store).await?;
    let ctx = Context {
        store,
        config,
        format: cli.output,
    };

    match cli.command {
        Commands::Locks { command } => commands::locks::handle(command, &ctx).await,
        Commands::Command { command } => commands::command::handle(command, &ctx).await,
        Commands::Outputs { command } => commands::outputs::handle(command, &ctx).await,
        Commands::Pulls { command } => commands::pulls::handle(command, &ctx).await,
    }
}

/// Log to stderr, filtered by `PLOCK_LOG` (default `warn`)
fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_env("PLOCK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
