// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded single-process store on sled
//!
//! One tree per concern. Every write is a single compare-and-swap or
//! transaction, so concurrent `try_lock` callers see exactly one winner.

use crate::error::StoreError;
use crate::keys::{command_lock_key, pull_index_key, pull_key, pull_runs_prefix};
use crate::outputs::{latest_per_project, merge_active_pull, sort_newest_first};
use crate::pull_status::{merge_results, update_project};
use crate::store::{LockAttempt, LockStore, OutputScope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plock_core::{
    lock_key, run_key, CommandLock, CommandName, OutputStatus, Project, ProjectLock,
    ProjectOutput, ProjectPlanStatus, ProjectResult, PullRequest, PullStatus,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, Transactional};
use sled::Tree;
use std::path::Path;

/// Database file inside the data directory
pub const DB_FILE: &str = "plock.db";

const LOCKS_TREE: &str = "runLocks";
const COMMAND_LOCKS_TREE: &str = "globalLocks";
const PULLS_TREE: &str = "pulls";
const OUTPUTS_TREE: &str = "projectOutputs";
const JOB_INDEX_TREE: &str = "jobIdIndex";
const PULL_INDEX_TREE: &str = "pullIndex";

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn abort(e: StoreError) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(e)
}

pub struct EmbeddedStore {
    db: sled::Db,
    locks: Tree,
    command_locks: Tree,
    pulls: Tree,
    outputs: Tree,
    job_index: Tree,
    pull_index: Tree,
}

impl EmbeddedStore {
    /// Open (or create) the store under `data_dir`, migrating legacy lock
    /// keys
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir).map_err(|e| {
            StoreError::Backend(format!("creating {}: {e}", data_dir.display()))
        })?;
        let path = data_dir.join(DB_FILE);
        let db = sled::open(&path)
            .map_err(|e| StoreError::Backend(format!("opening {}: {e}", path.display())))?;
        Self::with_db(db)
    }

    pub fn with_db(db: sled::Db) -> Result<Self, StoreError> {
        let store = Self {
            locks: db.open_tree(LOCKS_TREE)?,
            command_locks: db.open_tree(COMMAND_LOCKS_TREE)?,
            pulls: db.open_tree(PULLS_TREE)?,
            outputs: db.open_tree(OUTPUTS_TREE)?,
            job_index: db.open_tree(JOB_INDEX_TREE)?,
            pull_index: db.open_tree(PULL_INDEX_TREE)?,
            db,
        };
        let migrated = store.migrate_legacy_locks()?;
        if migrated > 0 {
            tracing::info!(migrated, "migrated legacy lock keys");
        }
        Ok(store)
    }

    /// Rewrite every lock stored under a key other than the one derived from
    /// its payload. Returns the number of rewritten locks; a second run
    /// returns zero.
    pub fn migrate_legacy_locks(&self) -> Result<usize, StoreError> {
        let mut migrated = 0;
        for item in self.locks.iter() {
            let (key, value) = item?;
            let lock: ProjectLock = decode(&value)?;
            let current = lock.key();
            if &*key == current.as_bytes() {
                continue;
            }
            self.locks.transaction(|tx| {
                if tx.get(current.as_bytes())?.is_none() {
                    tx.insert(current.as_bytes(), value.clone())?;
                }
                tx.remove(key.clone())?;
                Ok::<_, ConflictableTransactionError<StoreError>>(())
            })?;
            tracing::warn!(
                from = %String::from_utf8_lossy(&key),
                to = %current,
                "rewrote legacy lock key"
            );
            migrated += 1;
        }
        Ok(migrated)
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn get_decoded<T: DeserializeOwned>(tree: &Tree, key: &str) -> Result<Option<T>, StoreError> {
        tree.get(key.as_bytes())?
            .map(|value| decode(&value))
            .transpose()
    }

    fn scan_outputs(&self, prefix: &str) -> Result<Vec<ProjectOutput>, StoreError> {
        self.outputs
            .scan_prefix(prefix.as_bytes())
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }
}

#[async_trait]
impl LockStore for EmbeddedStore {
    async fn try_lock(&self, lock: ProjectLock) -> Result<LockAttempt, StoreError> {
        let key = lock.key();
        let value = encode(&lock)?;
        match self
            .locks
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(value))?
        {
            Ok(()) => Ok(LockAttempt {
                acquired: true,
                lock,
            }),
            Err(conflict) => {
                let current = conflict.current.ok_or_else(|| {
                    StoreError::Backend(format!("lock at {key} vanished during acquisition"))
                })?;
                Ok(LockAttempt {
                    acquired: false,
                    lock: decode(&current)?,
                })
            }
        }
    }

    async fn unlock(
        &self,
        project: &Project,
        workspace: &str,
    ) -> Result<Option<ProjectLock>, StoreError> {
        let key = lock_key(project, workspace);
        self.locks
            .remove(key.as_bytes())?
            .map(|value| decode(&value))
            .transpose()
    }

    async fn list(&self) -> Result<Vec<ProjectLock>, StoreError> {
        self.locks
            .iter()
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    async fn get_lock(
        &self,
        project: &Project,
        workspace: &str,
    ) -> Result<Option<ProjectLock>, StoreError> {
        Self::get_decoded(&self.locks, &lock_key(project, workspace))
    }

    async fn unlock_by_pull(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<Vec<ProjectLock>, StoreError> {
        let mut released = Vec::new();
        for item in self.locks.scan_prefix(format!("{repo_full_name}/").as_bytes()) {
            let (key, value) = item?;
            let lock: ProjectLock = decode(&value)?;
            if lock.project.repo_full_name != repo_full_name || lock.pull.num != pull_num {
                continue;
            }
            // Only release if nobody replaced the lock since it was read
            if self
                .locks
                .compare_and_swap(&key, Some(&value), None::<&[u8]>)?
                .is_ok()
            {
                released.push(lock);
            }
        }
        Ok(released)
    }

    async fn lock_command(
        &self,
        command: CommandName,
        at: DateTime<Utc>,
    ) -> Result<CommandLock, StoreError> {
        let key = command_lock_key(command);
        let lock = CommandLock::new(command, at);
        let value = encode(&lock)?;
        let stored = match self
            .command_locks
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(value.clone()))?
        {
            Ok(()) => true,
            Err(conflict) => match conflict.current {
                // An unlocked record may be overwritten
                Some(current) if !decode::<CommandLock>(&current)?.is_locked() => self
                    .command_locks
                    .compare_and_swap(key.as_bytes(), Some(current), Some(value))?
                    .is_ok(),
                _ => false,
            },
        };
        if !stored {
            return Err(StoreError::CommandLocked);
        }
        Ok(lock)
    }

    async fn unlock_command(&self, command: CommandName) -> Result<(), StoreError> {
        let key = command_lock_key(command);
        match self.command_locks.remove(key.as_bytes())? {
            Some(value) if decode::<CommandLock>(&value)?.is_locked() => Ok(()),
            _ => Err(StoreError::CommandNotLocked),
        }
    }

    async fn check_command_lock(
        &self,
        command: CommandName,
    ) -> Result<Option<CommandLock>, StoreError> {
        let lock: Option<CommandLock> =
            Self::get_decoded(&self.command_locks, &command_lock_key(command))?;
        Ok(lock.filter(CommandLock::is_locked))
    }

    async fn update_pull_with_results(
        &self,
        pull: &PullRequest,
        results: &[ProjectResult],
    ) -> Result<PullStatus, StoreError> {
        let key = pull_key(pull)?;
        let status = self.pulls.transaction(|tx| {
            let existing = match tx.get(key.as_bytes())? {
                Some(value) => Some(decode(&value).map_err(abort)?),
                None => None,
            };
            let status = merge_results(existing, pull, results);
            tx.insert(key.as_bytes(), encode(&status).map_err(abort)?)?;
            Ok(status)
        })?;
        Ok(status)
    }

    async fn get_pull_status(&self, pull: &PullRequest) -> Result<Option<PullStatus>, StoreError> {
        Self::get_decoded(&self.pulls, &pull_key(pull)?)
    }

    async fn delete_pull_status(&self, pull: &PullRequest) -> Result<(), StoreError> {
        self.pulls.remove(pull_key(pull)?.as_bytes())?;
        Ok(())
    }

    async fn update_project_status(
        &self,
        pull: &PullRequest,
        workspace: &str,
        repo_rel_dir: &str,
        status: ProjectPlanStatus,
    ) -> Result<(), StoreError> {
        let key = pull_key(pull)?;
        self.pulls.transaction(|tx| {
            let Some(value) = tx.get(key.as_bytes())? else {
                return Ok(());
            };
            let mut current: PullStatus = decode(&value).map_err(abort)?;
            if update_project(&mut current, workspace, repo_rel_dir, status) {
                tx.insert(key.as_bytes(), encode(&current).map_err(abort)?)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    async fn save_project_output(&self, output: &ProjectOutput) -> Result<(), StoreError> {
        let key = output.key();
        let value = encode(output)?;
        let index_key = pull_index_key(&output.repo_full_name, output.pull_num);

        (&self.outputs, &self.job_index, &self.pull_index).transaction(
            |(outputs, jobs, pulls)| {
                if !output.job_id.is_empty() {
                    if let Some(previous) = jobs.get(output.job_id.as_bytes())? {
                        if &*previous != key.as_bytes() {
                            outputs.remove(previous)?;
                        }
                    }
                    jobs.insert(output.job_id.as_bytes(), key.as_bytes())?;
                }
                outputs.insert(key.as_bytes(), value.clone())?;

                let existing = match pulls.get(index_key.as_bytes())? {
                    Some(current) => Some(decode(&current).map_err(abort)?),
                    None => None,
                };
                let active = merge_active_pull(existing, output);
                pulls.insert(index_key.as_bytes(), encode(&active).map_err(abort)?)?;
                Ok(())
            },
        )?;
        Ok(())
    }

    async fn get_project_output_run(
        &self,
        scope: &OutputScope,
        command_name: &str,
        run_timestamp: i64,
    ) -> Result<Option<ProjectOutput>, StoreError> {
        let key = run_key(
            &scope.repo_full_name,
            scope.pull_num,
            &scope.path,
            &scope.workspace,
            &scope.project_name,
            command_name,
            run_timestamp,
        );
        Self::get_decoded(&self.outputs, &key)
    }

    async fn get_project_output_history(
        &self,
        scope: &OutputScope,
    ) -> Result<Vec<ProjectOutput>, StoreError> {
        let mut history = self.scan_outputs(&scope.prefix())?;
        sort_newest_first(&mut history);
        Ok(history)
    }

    async fn get_project_outputs_by_pull(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<Vec<ProjectOutput>, StoreError> {
        let runs = self.scan_outputs(&pull_runs_prefix(repo_full_name, pull_num))?;
        Ok(latest_per_project(runs))
    }

    async fn get_project_output_by_job_id(
        &self,
        job_id: &str,
    ) -> Result<Option<ProjectOutput>, StoreError> {
        if let Some(key) = self.job_index.get(job_id.as_bytes())? {
            if let Some(value) = self.outputs.get(key)? {
                return Ok(Some(decode(&value)?));
            }
        }
        // Records saved before the index existed
        for item in self.outputs.iter() {
            let (_, value) = item?;
            let output: ProjectOutput = decode(&value)?;
            if output.job_id == job_id {
                return Ok(Some(output));
            }
        }
        Ok(None)
    }

    async fn mark_interrupted_outputs(&self) -> Result<usize, StoreError> {
        let mut marked = 0;
        for item in self.outputs.iter() {
            let (key, value) = item?;
            let mut output: ProjectOutput = decode(&value)?;
            if output.status != OutputStatus::Running {
                continue;
            }
            output.status = OutputStatus::Interrupted;
            // A record rewritten concurrently keeps its newer status
            if self
                .outputs
                .compare_and_swap(&key, Some(&value), Some(encode(&output)?))?
                .is_ok()
            {
                marked += 1;
            }
        }
        if marked > 0 {
            tracing::info!(marked, "marked running outputs interrupted");
        }
        Ok(marked)
    }

    async fn delete_project_outputs_by_pull(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<(), StoreError> {
        let runs: Vec<(String, String)> = self
            .scan_outputs(&pull_runs_prefix(repo_full_name, pull_num))?
            .into_iter()
            .map(|output| (output.key(), output.job_id))
            .collect();
        let index_key = pull_index_key(repo_full_name, pull_num);

        (&self.outputs, &self.job_index, &self.pull_index).transaction(
            |(outputs, jobs, pulls)| {
                for (key, job_id) in &runs {
                    outputs.remove(key.as_bytes())?;
                    if job_id.is_empty() {
                        continue;
                    }
                    let indexed = jobs.get(job_id.as_bytes())?;
                    if indexed.is_some_and(|k| &*k == key.as_bytes()) {
                        jobs.remove(job_id.as_bytes())?;
                    }
                }
                pulls.remove(index_key.as_bytes())?;
                Ok::<_, ConflictableTransactionError<StoreError>>(())
            },
        )?;
        Ok(())
    }

    async fn get_active_pull_requests(&self) -> Result<Vec<PullRequest>, StoreError> {
        self.pull_index
            .iter()
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "embedded_tests.rs"]
mod tests;
