// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project lock commands

use super::Context;
use crate::output;
use anyhow::bail;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use plock_core::{
    lock_key, EnhancedLockRequest, Priority, Project, ProjectLock, PullRequest, Repo,
    ResourceIdentifier, User,
};
use plock_engine::{Acquisition, CoordinatorConfig, LockCoordinator};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Subcommand)]
pub enum LocksCommand {
    /// List held project locks
    List,
    /// Lock a project for a pull request
    Acquire {
        /// Repository full name (owner/repo)
        repo: String,
        /// Repo-relative project directory
        path: String,
        workspace: String,
        /// Pull request number
        #[arg(long)]
        pull: u64,
        /// User taking the lock
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "")]
        project: String,
        /// low, normal, high or critical
        #[arg(long, default_value = "normal")]
        priority: Priority,
        /// VCS hostname of the repository
        #[arg(long, default_value = "github.com")]
        host: String,
    },
    /// Release a project lock
    Unlock {
        repo: String,
        path: String,
        workspace: String,
        #[arg(long, default_value = "")]
        project: String,
    },
    /// Release every lock held by a pull request
    UnlockPull {
        repo: String,
        pull: u64,
    },
}

#[derive(Serialize)]
struct LockInfo {
    repo: String,
    path: String,
    workspace: String,
    project: String,
    pull: u64,
    user: String,
    locked_at: DateTime<Utc>,
}

impl From<ProjectLock> for LockInfo {
    fn from(lock: ProjectLock) -> Self {
        Self {
            repo: lock.project.repo_full_name,
            path: lock.project.path,
            workspace: lock.workspace,
            project: lock.project.project_name,
            pull: lock.pull.num,
            user: lock.user.username,
            locked_at: lock.time,
        }
    }
}

const HEADER: &str = "REPO                     PATH                 WORKSPACE    PROJECT      PULL    USER         LOCKED";

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let project = if self.project.is_empty() { "-" } else { &self.project };
        write!(
            f,
            "{:<24} {:<20} {:<12} {:<12} #{:<6} {:<12} {}",
            self.repo,
            self.path,
            self.workspace,
            project,
            self.pull,
            self.user,
            self.locked_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

pub async fn handle(command: LocksCommand, ctx: &Context) -> anyhow::Result<()> {
    match command {
        LocksCommand::List => list_locks(ctx).await,
        LocksCommand::Acquire {
            repo,
            path,
            workspace,
            pull,
            user,
            project,
            priority,
            host,
        } => {
            let project = Project::new(repo.as_str(), &path, project);
            let pull = PullRequest {
                num: pull,
                base_repo: Repo::new(repo, host),
                ..Default::default()
            };
            let user = User {
                username: user,
                teams: Vec::new(),
            };
            acquire_lock(ctx, project, workspace, pull, user, priority).await
        }
        LocksCommand::Unlock {
            repo,
            path,
            workspace,
            project,
        } => unlock(ctx, Project::new(repo, &path, project), workspace).await,
        LocksCommand::UnlockPull { repo, pull } => unlock_pull(ctx, repo, pull).await,
    }
}

async fn list_locks(ctx: &Context) -> anyhow::Result<()> {
    let mut locks: Vec<LockInfo> = ctx.store.list().await?.into_iter().map(LockInfo::from).collect();
    locks.sort_by(|a, b| (&a.repo, &a.path, &a.workspace).cmp(&(&b.repo, &b.path, &b.workspace)));
    output::print_list(&locks, HEADER, "No locks", ctx.format)
}

async fn acquire_lock(
    ctx: &Context,
    project: Project,
    workspace: String,
    pull: PullRequest,
    user: User,
    priority: Priority,
) -> anyhow::Result<()> {
    let coordinator = LockCoordinator::new(
        Arc::clone(&ctx.store),
        CoordinatorConfig {
            queue: ctx.config.queue.clone(),
            retry: ctx.config.retry.clone(),
        },
    )?;
    let resource = ResourceIdentifier::from_project(&project, &workspace);
    let num = pull.num;
    // Nothing outlives this process to expire the lock
    let request = EnhancedLockRequest::new(resource, user, pull, priority, Duration::ZERO);

    match coordinator.acquire(request, &CancellationToken::new()).await? {
        Acquisition::Acquired(_) => println!("Locked {} for pull #{}", lock_key(&project, &workspace), num),
        Acquisition::AlreadyHeld(lock) => {
            println!("Already locked by pull #{}", lock.pull.num)
        }
        Acquisition::Queued { .. } => {
            let holder = ctx.store.get_lock(&project, &workspace).await?;
            match holder {
                Some(lock) => bail!(
                    "{} is locked by pull #{} ({})",
                    lock_key(&project, &workspace),
                    lock.pull.num,
                    lock.user.username
                ),
                None => bail!("{} is locked by another pull", lock_key(&project, &workspace)),
            }
        }
    }
    Ok(())
}

async fn unlock(ctx: &Context, project: Project, workspace: String) -> anyhow::Result<()> {
    match ctx.store.unlock(&project, &workspace).await? {
        Some(lock) => println!("Unlocked {} (pull #{})", lock.key(), lock.pull.num),
        None => println!("No lock held on {}", lock_key(&project, &workspace)),
    }
    Ok(())
}

async fn unlock_pull(ctx: &Context, repo: String, pull: u64) -> anyhow::Result<()> {
    let released = ctx.store.unlock_by_pull(&repo, pull).await?;
    println!("Released {} lock(s) for {}#{}", released.len(), repo, pull);
    Ok(())
}
