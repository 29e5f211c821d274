// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced store wrapper for consistent observability

use crate::error::StoreError;
use crate::store::{LockAttempt, LockStore, OutputScope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plock_core::{
    CommandLock, CommandName, Project, ProjectLock, ProjectOutput, ProjectPlanStatus,
    ProjectResult, PullRequest, PullStatus,
};
use std::future::Future;
use tracing::Instrument;

/// Wrapper that adds tracing to any LockStore
pub struct TracedLockStore<S> {
    inner: S,
}

impl<S> TracedLockStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

/// Time `fut` and log its failure with the error code
async fn timed<T>(
    fut: impl Future<Output = Result<T, StoreError>>,
) -> (Result<T, StoreError>, u64) {
    let start = std::time::Instant::now();
    let result = fut.await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    if let Err(e) = &result {
        let code = e.code();
        tracing::error!(elapsed_ms, %code, error = %e, "store call failed");
    }
    (result, elapsed_ms)
}

#[async_trait]
impl<S: LockStore> LockStore for TracedLockStore<S> {
    async fn try_lock(&self, lock: ProjectLock) -> Result<LockAttempt, StoreError> {
        let span = tracing::info_span!(
            "store.try_lock",
            repo = %lock.project.repo_full_name,
            path = %lock.project.path,
            workspace = %lock.workspace,
            pull = lock.pull.num,
        );
        let (result, elapsed_ms) = timed(self.inner.try_lock(lock))
            .instrument(span.clone())
            .await;
        if let Ok(attempt) = &result {
            span.in_scope(|| {
                if attempt.acquired {
                    tracing::info!(elapsed_ms, "lock acquired");
                } else {
                    tracing::info!(elapsed_ms, holder = attempt.lock.pull.num, "lock held");
                }
            });
        }
        result
    }

    async fn unlock(
        &self,
        project: &Project,
        workspace: &str,
    ) -> Result<Option<ProjectLock>, StoreError> {
        let span = tracing::info_span!(
            "store.unlock",
            repo = %project.repo_full_name,
            path = %project.path,
            workspace,
        );
        let (result, elapsed_ms) = timed(self.inner.unlock(project, workspace))
            .instrument(span.clone())
            .await;
        if let Ok(released) = &result {
            span.in_scope(|| tracing::info!(elapsed_ms, released = released.is_some(), "unlocked"));
        }
        result
    }

    async fn list(&self) -> Result<Vec<ProjectLock>, StoreError> {
        let span = tracing::debug_span!("store.list");
        let (result, elapsed_ms) = timed(self.inner.list()).instrument(span.clone()).await;
        if let Ok(locks) = &result {
            span.in_scope(|| tracing::debug!(elapsed_ms, count = locks.len(), "listed"));
        }
        result
    }

    async fn get_lock(
        &self,
        project: &Project,
        workspace: &str,
    ) -> Result<Option<ProjectLock>, StoreError> {
        let (result, _) = timed(self.inner.get_lock(project, workspace)).await;
        result
    }

    async fn unlock_by_pull(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<Vec<ProjectLock>, StoreError> {
        let span = tracing::info_span!("store.unlock_by_pull", repo = repo_full_name, pull = pull_num);
        let (result, elapsed_ms) = timed(self.inner.unlock_by_pull(repo_full_name, pull_num))
            .instrument(span.clone())
            .await;
        if let Ok(released) = &result {
            span.in_scope(|| tracing::info!(elapsed_ms, released = released.len(), "pull unlocked"));
        }
        result
    }

    async fn lock_command(
        &self,
        command: CommandName,
        at: DateTime<Utc>,
    ) -> Result<CommandLock, StoreError> {
        let span = tracing::info_span!("store.lock_command", %command);
        let (result, elapsed_ms) = timed(self.inner.lock_command(command, at))
            .instrument(span.clone())
            .await;
        if result.is_ok() {
            span.in_scope(|| tracing::info!(elapsed_ms, "command locked"));
        }
        result
    }

    async fn unlock_command(&self, command: CommandName) -> Result<(), StoreError> {
        let span = tracing::info_span!("store.unlock_command", %command);
        let (result, elapsed_ms) = timed(self.inner.unlock_command(command))
            .instrument(span.clone())
            .await;
        if result.is_ok() {
            span.in_scope(|| tracing::info!(elapsed_ms, "command unlocked"));
        }
        result
    }

    async fn check_command_lock(
        &self,
        command: CommandName,
    ) -> Result<Option<CommandLock>, StoreError> {
        let (result, _) = timed(self.inner.check_command_lock(command)).await;
        result
    }

    async fn update_pull_with_results(
        &self,
        pull: &PullRequest,
        results: &[ProjectResult],
    ) -> Result<PullStatus, StoreError> {
        let span = tracing::info_span!(
            "store.update_pull",
            repo = %pull.base_repo.full_name,
            pull = pull.num,
            results = results.len(),
        );
        let (result, elapsed_ms) = timed(self.inner.update_pull_with_results(pull, results))
            .instrument(span.clone())
            .await;
        if let Ok(status) = &result {
            span.in_scope(|| {
                tracing::info!(elapsed_ms, projects = status.projects.len(), "pull status saved")
            });
        }
        result
    }

    async fn get_pull_status(&self, pull: &PullRequest) -> Result<Option<PullStatus>, StoreError> {
        let (result, _) = timed(self.inner.get_pull_status(pull)).await;
        result
    }

    async fn delete_pull_status(&self, pull: &PullRequest) -> Result<(), StoreError> {
        let span = tracing::info_span!(
            "store.delete_pull_status",
            repo = %pull.base_repo.full_name,
            pull = pull.num,
        );
        let (result, elapsed_ms) = timed(self.inner.delete_pull_status(pull))
            .instrument(span.clone())
            .await;
        if result.is_ok() {
            span.in_scope(|| tracing::info!(elapsed_ms, "pull status deleted"));
        }
        result
    }

    async fn update_project_status(
        &self,
        pull: &PullRequest,
        workspace: &str,
        repo_rel_dir: &str,
        status: ProjectPlanStatus,
    ) -> Result<(), StoreError> {
        let span = tracing::debug_span!(
            "store.update_project_status",
            pull = pull.num,
            workspace,
            dir = repo_rel_dir,
            ?status,
        );
        let (result, elapsed_ms) =
            timed(self.inner.update_project_status(pull, workspace, repo_rel_dir, status))
                .instrument(span.clone())
                .await;
        if result.is_ok() {
            span.in_scope(|| tracing::debug!(elapsed_ms, "project status updated"));
        }
        result
    }

    async fn save_project_output(&self, output: &ProjectOutput) -> Result<(), StoreError> {
        let span = tracing::debug_span!(
            "store.save_output",
            repo = %output.repo_full_name,
            pull = output.pull_num,
            command = %output.command_name,
            job_id = %output.job_id,
        );
        let (result, elapsed_ms) = timed(self.inner.save_project_output(output))
            .instrument(span.clone())
            .await;
        if result.is_ok() {
            span.in_scope(|| tracing::debug!(elapsed_ms, status = %output.status, "output saved"));
        }
        result
    }

    async fn get_project_output_run(
        &self,
        scope: &OutputScope,
        command_name: &str,
        run_timestamp: i64,
    ) -> Result<Option<ProjectOutput>, StoreError> {
        let (result, _) =
            timed(self.inner.get_project_output_run(scope, command_name, run_timestamp)).await;
        result
    }

    async fn get_project_output_history(
        &self,
        scope: &OutputScope,
    ) -> Result<Vec<ProjectOutput>, StoreError> {
        let (result, _) = timed(self.inner.get_project_output_history(scope)).await;
        result
    }

    async fn get_project_outputs_by_pull(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<Vec<ProjectOutput>, StoreError> {
        let (result, _) = timed(self.inner.get_project_outputs_by_pull(repo_full_name, pull_num)).await;
        result
    }

    async fn get_project_output_by_job_id(
        &self,
        job_id: &str,
    ) -> Result<Option<ProjectOutput>, StoreError> {
        let (result, _) = timed(self.inner.get_project_output_by_job_id(job_id)).await;
        result
    }

    async fn mark_interrupted_outputs(&self) -> Result<usize, StoreError> {
        let span = tracing::info_span!("store.mark_interrupted");
        let (result, elapsed_ms) = timed(self.inner.mark_interrupted_outputs())
            .instrument(span.clone())
            .await;
        if let Ok(marked) = &result {
            span.in_scope(|| tracing::info!(elapsed_ms, marked, "interrupted outputs marked"));
        }
        result
    }

    async fn delete_project_outputs_by_pull(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<(), StoreError> {
        let span = tracing::info_span!("store.delete_outputs", repo = repo_full_name, pull = pull_num);
        let (result, elapsed_ms) =
            timed(self.inner.delete_project_outputs_by_pull(repo_full_name, pull_num))
                .instrument(span.clone())
                .await;
        if result.is_ok() {
            span.in_scope(|| tracing::info!(elapsed_ms, "outputs deleted"));
        }
        result
    }

    async fn get_active_pull_requests(&self) -> Result<Vec<PullRequest>, StoreError> {
        let (result, _) = timed(self.inner.get_active_pull_requests()).await;
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
