// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pull request commands

use super::Context;
use crate::output;
use clap::Subcommand;
use plock_core::PullRequest;
use serde::Serialize;
use std::fmt;

#[derive(Subcommand)]
pub enum PullsCommand {
    /// Pull requests that still have stored runs
    Active,
}

#[derive(Serialize)]
struct PullInfo {
    repo: String,
    num: u64,
    title: String,
    url: String,
}

impl fmt::Display for PullInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pull = format!("{}#{}", self.repo, self.num);
        write!(f, "{:<32} {}", pull, self.title)
    }
}

pub async fn handle(command: PullsCommand, ctx: &Context) -> anyhow::Result<()> {
    match command {
        PullsCommand::Active => {
            let mut pulls: Vec<PullInfo> = ctx
                .store
                .get_active_pull_requests()
                .await?
                .into_iter()
                .map(|pull: PullRequest| PullInfo {
                    repo: pull.base_repo.full_name,
                    num: pull.num,
                    title: pull.title,
                    url: pull.url,
                })
                .collect();
            pulls.sort_by(|a, b| (&a.repo, a.num).cmp(&(&b.repo, b.num)));
            output::print_list(&pulls, "PULL                             TITLE", "No active pulls", ctx.format)?;
        }
    }
    Ok(())
}
