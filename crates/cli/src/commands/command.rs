// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global command lock commands

use super::Context;
use crate::output;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use plock_core::CommandName;
use serde::Serialize;
use std::fmt;

#[derive(Subcommand)]
pub enum CommandLockCommand {
    /// Disable a command for every repository
    Lock {
        /// Command name (apply, plan, policy_check, ...)
        name: CommandName,
    },
    /// Re-enable a disabled command
    Unlock { name: CommandName },
    /// Show whether a command is disabled
    Status { name: CommandName },
}

#[derive(Serialize)]
struct CommandStatus {
    command: CommandName,
    locked: bool,
    locked_at: Option<DateTime<Utc>>,
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.locked_at {
            Some(at) => write!(f, "{}: locked since {}", self.command, at.to_rfc3339()),
            None => write!(f, "{}: unlocked", self.command),
        }
    }
}

pub async fn handle(command: CommandLockCommand, ctx: &Context) -> anyhow::Result<()> {
    match command {
        CommandLockCommand::Lock { name } => {
            let lock = ctx.store.lock_command(name, Utc::now()).await?;
            println!("Locked {} at {}", name, lock.locked_at().to_rfc3339());
        }
        CommandLockCommand::Unlock { name } => {
            ctx.store.unlock_command(name).await?;
            println!("Unlocked {}", name);
        }
        CommandLockCommand::Status { name } => {
            let locked_at = ctx
                .store
                .check_command_lock(name)
                .await?
                .filter(|lock| lock.is_locked())
                .map(|lock| lock.locked_at());
            let status = CommandStatus {
                command: name,
                locked: locked_at.is_some(),
                locked_at,
            };
            output::print(&status, ctx.format)?;
        }
    }
    Ok(())
}
