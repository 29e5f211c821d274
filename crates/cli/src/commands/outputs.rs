// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run history commands

use super::Context;
use crate::output;
use clap::Subcommand;
use plock_core::{OutputStatus, ProjectOutput};
use serde::Serialize;
use std::fmt;

#[derive(Subcommand)]
pub enum OutputsCommand {
    /// Latest run of each project in a pull request
    List { repo: String, pull: u64 },
    /// Mark runs left running by a crashed server as interrupted
    MarkInterrupted,
    /// Delete a pull request's run history
    Delete { repo: String, pull: u64 },
}

#[derive(Serialize)]
struct OutputInfo {
    path: String,
    workspace: String,
    project: String,
    command: String,
    status: OutputStatus,
    job_id: String,
    policy_passed: bool,
}

impl From<ProjectOutput> for OutputInfo {
    fn from(output: ProjectOutput) -> Self {
        Self {
            path: output.path,
            workspace: output.workspace,
            project: output.project_name,
            command: output.command_name,
            status: output.status,
            job_id: output.job_id,
            policy_passed: output.policy_passed,
        }
    }
}

const HEADER: &str = "PATH                 WORKSPACE    PROJECT      COMMAND        STATUS       JOB";

impl fmt::Display for OutputInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let project = if self.project.is_empty() { "-" } else { &self.project };
        let job = if self.job_id.is_empty() { "-" } else { &self.job_id };
        write!(
            f,
            "{:<20} {:<12} {:<12} {:<14} {:<12} {}",
            self.path,
            self.workspace,
            project,
            self.command,
            self.status.to_string(),
            job
        )
    }
}

pub async fn handle(command: OutputsCommand, ctx: &Context) -> anyhow::Result<()> {
    match command {
        OutputsCommand::List { repo, pull } => {
            let outputs: Vec<OutputInfo> = ctx
                .store
                .get_project_outputs_by_pull(&repo, pull)
                .await?
                .into_iter()
                .map(OutputInfo::from)
                .collect();
            output::print_list(&outputs, HEADER, "No outputs", ctx.format)?;
        }
        OutputsCommand::MarkInterrupted => {
            let marked = ctx.store.mark_interrupted_outputs().await?;
            println!("Marked {} running output(s) as interrupted", marked);
        }
        OutputsCommand::Delete { repo, pull } => {
            ctx.store.delete_project_outputs_by_pull(&repo, pull).await?;
            println!("Deleted outputs for {}#{}", repo, pull);
        }
    }
    Ok(())
}
