// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The lock store contract implemented by every backend

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plock_core::{
    project_history_key, CommandLock, CommandName, Project, ProjectLock, ProjectOutput,
    ProjectPlanStatus, ProjectResult, PullRequest, PullStatus,
};

/// Result of [`LockStore::try_lock`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockAttempt {
    pub acquired: bool,
    /// The requested lock when acquired, otherwise the lock in the way
    pub lock: ProjectLock,
}

/// One project's runs within a pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputScope {
    pub repo_full_name: String,
    pub pull_num: u64,
    pub path: String,
    pub workspace: String,
    pub project_name: String,
}

impl OutputScope {
    pub fn new(
        repo_full_name: impl Into<String>,
        pull_num: u64,
        path: impl Into<String>,
        workspace: impl Into<String>,
        project_name: impl Into<String>,
    ) -> Self {
        Self {
            repo_full_name: repo_full_name.into(),
            pull_num,
            path: path.into(),
            workspace: workspace.into(),
            project_name: project_name.into(),
        }
    }

    pub fn key(&self) -> String {
        project_history_key(
            &self.repo_full_name,
            self.pull_num,
            &self.path,
            &self.workspace,
            &self.project_name,
        )
    }

    /// Prefix of every run key in this scope
    pub fn prefix(&self) -> String {
        format!("{}::", self.key())
    }
}

impl From<&ProjectOutput> for OutputScope {
    fn from(output: &ProjectOutput) -> Self {
        Self::new(
            output.repo_full_name.clone(),
            output.pull_num,
            output.path.clone(),
            output.workspace.clone(),
            output.project_name.clone(),
        )
    }
}

/// Durable store for project locks, command locks, pull statuses and run
/// history.
///
/// Missing records are `None` or empty, never errors.
#[async_trait]
pub trait LockStore: Send + Sync + 'static {
    /// Take the lock for `lock`'s project and workspace unless one is held
    async fn try_lock(&self, lock: ProjectLock) -> Result<LockAttempt, StoreError>;

    /// Release a lock, returning it if one was held
    async fn unlock(
        &self,
        project: &Project,
        workspace: &str,
    ) -> Result<Option<ProjectLock>, StoreError>;

    async fn list(&self) -> Result<Vec<ProjectLock>, StoreError>;

    async fn get_lock(
        &self,
        project: &Project,
        workspace: &str,
    ) -> Result<Option<ProjectLock>, StoreError>;

    /// Release every lock held by one pull, across all paths and workspaces
    async fn unlock_by_pull(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<Vec<ProjectLock>, StoreError>;

    /// Fails with [`StoreError::CommandLocked`] when already locked
    async fn lock_command(
        &self,
        command: CommandName,
        at: DateTime<Utc>,
    ) -> Result<CommandLock, StoreError>;

    /// Fails with [`StoreError::CommandNotLocked`] when not locked
    async fn unlock_command(&self, command: CommandName) -> Result<(), StoreError>;

    async fn check_command_lock(
        &self,
        command: CommandName,
    ) -> Result<Option<CommandLock>, StoreError>;

    async fn update_pull_with_results(
        &self,
        pull: &PullRequest,
        results: &[ProjectResult],
    ) -> Result<PullStatus, StoreError>;

    async fn get_pull_status(&self, pull: &PullRequest) -> Result<Option<PullStatus>, StoreError>;

    async fn delete_pull_status(&self, pull: &PullRequest) -> Result<(), StoreError>;

    async fn update_project_status(
        &self,
        pull: &PullRequest,
        workspace: &str,
        repo_rel_dir: &str,
        status: ProjectPlanStatus,
    ) -> Result<(), StoreError>;

    /// Save a run. A non-empty job id replaces any earlier record with the
    /// same job id.
    async fn save_project_output(&self, output: &ProjectOutput) -> Result<(), StoreError>;

    async fn get_project_output_run(
        &self,
        scope: &OutputScope,
        command_name: &str,
        run_timestamp: i64,
    ) -> Result<Option<ProjectOutput>, StoreError>;

    /// Every run in `scope`, newest first
    async fn get_project_output_history(
        &self,
        scope: &OutputScope,
    ) -> Result<Vec<ProjectOutput>, StoreError>;

    /// Latest run per project, with policy checks folded in
    async fn get_project_outputs_by_pull(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<Vec<ProjectOutput>, StoreError>;

    async fn get_project_output_by_job_id(
        &self,
        job_id: &str,
    ) -> Result<Option<ProjectOutput>, StoreError>;

    /// Flip every running record to interrupted, returning how many changed
    async fn mark_interrupted_outputs(&self) -> Result<usize, StoreError>;

    async fn delete_project_outputs_by_pull(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<(), StoreError>;

    /// Pulls that still have stored runs
    async fn get_active_pull_requests(&self) -> Result<Vec<PullRequest>, StoreError>;
}
