// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store on a shared remote key-value service
//!
//! Key layout:
//! - `pr/{repo}/{path}/{workspace}/{project}`: project locks
//! - `global/{command}/lock`: command locks
//! - `{host}::{repo}::{num}`: pull statuses
//! - `output/{run key}`: run records
//! - `pull-outputs/{repo}::{num}`: set of run keys per pull
//! - `job-id-index/{job id}`: run key for a job
//! - `active-pulls/{repo}::{num}`: pull metadata while runs are stored
//!
//! Lock acquisition and release are single atomic commands. Job-id upserts
//! and interrupted marking are conditional on the value they read. Pull-status
//! merges are read-modify-write and last writer wins.

use crate::error::StoreError;
use crate::keys::{
    pull_key, remote_active_pull_key, remote_command_lock_key, remote_job_index_key,
    remote_lock_key, remote_output_key, remote_pull_outputs_key, ACTIVE_PULL_PREFIX,
    LOCK_PREFIX, OUTPUT_PREFIX,
};
use crate::outputs::{latest_per_project, merge_active_pull, sort_newest_first};
use crate::pull_status::{merge_results, update_project};
use crate::store::{LockAttempt, LockStore, OutputScope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plock_adapters::{KvWrite, RemoteKv};
use plock_core::{
    run_key, CommandLock, CommandName, OutputStatus, Project, ProjectLock, ProjectOutput,
    ProjectPlanStatus, ProjectResult, PullRequest, PullStatus,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Times `try_lock` retries when the holder releases between the failed
/// write and the read
const LOCK_READ_ATTEMPTS: u32 = 3;

/// Times a job-id upsert re-reads the index after losing a race
const UPSERT_ATTEMPTS: u32 = 5;

fn encode<T: Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

fn decode<T: DeserializeOwned>(value: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_str(value)?)
}

#[derive(Clone)]
pub struct RemoteStore<K: RemoteKv> {
    kv: K,
}

impl<K: RemoteKv> RemoteStore<K> {
    /// Check the service is reachable, then migrate legacy lock keys
    pub async fn connect(kv: K) -> Result<Self, StoreError> {
        kv.ping().await?;
        let store = Self { kv };
        let migrated = store.migrate_legacy_locks().await?;
        if migrated > 0 {
            tracing::info!(migrated, "migrated legacy lock keys");
        }
        Ok(store)
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    /// Move every lock stored under a key other than the one derived from
    /// its payload. An existing lock at the current key wins.
    pub async fn migrate_legacy_locks(&self) -> Result<usize, StoreError> {
        let mut migrated = 0;
        for key in self.kv.scan(&format!("{LOCK_PREFIX}*")).await? {
            let Some(value) = self.kv.get(&key).await? else {
                continue;
            };
            let lock: ProjectLock = decode(&value)?;
            let current = remote_lock_key(&lock.project, &lock.workspace);
            if key == current {
                continue;
            }
            self.kv.set_if_absent(&current, &value).await?;
            self.kv.delete_if_equals(&key, &value).await?;
            tracing::warn!(from = %key, to = %current, "rewrote legacy lock key");
            migrated += 1;
        }
        Ok(migrated)
    }

    async fn get_decoded<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.kv.get(key).await?.map(|v| decode(&v)).transpose()
    }

    /// Fetch many records, skipping keys deleted since they were listed
    async fn get_all<T: DeserializeOwned>(&self, keys: &[String]) -> Result<Vec<T>, StoreError> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get_decoded(key).await? {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Record, pull-set membership and active-pull writes for one run
    async fn output_writes(&self, output: &ProjectOutput) -> Result<Vec<KvWrite>, StoreError> {
        let run = output.key();
        let active_key = remote_active_pull_key(&output.repo_full_name, output.pull_num);
        let active = merge_active_pull(self.get_decoded(&active_key).await?, output);
        Ok(vec![
            KvWrite::set(remote_output_key(&run), encode(output)?),
            KvWrite::set_add(
                remote_pull_outputs_key(&output.repo_full_name, output.pull_num),
                run,
            ),
            KvWrite::set(active_key, encode(&active)?),
        ])
    }

    async fn pull_outputs(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<Vec<ProjectOutput>, StoreError> {
        let members = self
            .kv
            .set_members(&remote_pull_outputs_key(repo_full_name, pull_num))
            .await?;
        let keys: Vec<String> = members.iter().map(|k| remote_output_key(k)).collect();
        self.get_all(&keys).await
    }
}

#[async_trait]
impl<K: RemoteKv> LockStore for RemoteStore<K> {
    async fn try_lock(&self, lock: ProjectLock) -> Result<LockAttempt, StoreError> {
        let key = remote_lock_key(&lock.project, &lock.workspace);
        let value = encode(&lock)?;
        for _ in 0..LOCK_READ_ATTEMPTS {
            if self.kv.set_if_absent(&key, &value).await? {
                return Ok(LockAttempt {
                    acquired: true,
                    lock,
                });
            }
            if let Some(current) = self.get_decoded(&key).await? {
                return Ok(LockAttempt {
                    acquired: false,
                    lock: current,
                });
            }
        }
        Err(StoreError::Backend(format!("lock at {key} kept changing during acquisition")))
    }

    async fn unlock(
        &self,
        project: &Project,
        workspace: &str,
    ) -> Result<Option<ProjectLock>, StoreError> {
        let key = remote_lock_key(project, workspace);
        self.kv.take(&key).await?.map(|v| decode(&v)).transpose()
    }

    async fn list(&self) -> Result<Vec<ProjectLock>, StoreError> {
        let keys = self.kv.scan(&format!("{LOCK_PREFIX}*")).await?;
        self.get_all(&keys).await
    }

    async fn get_lock(
        &self,
        project: &Project,
        workspace: &str,
    ) -> Result<Option<ProjectLock>, StoreError> {
        self.get_decoded(&remote_lock_key(project, workspace)).await
    }

    async fn unlock_by_pull(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<Vec<ProjectLock>, StoreError> {
        let mut released = Vec::new();
        let pattern = format!("{LOCK_PREFIX}{repo_full_name}/*");
        for key in self.kv.scan(&pattern).await? {
            let Some(value) = self.kv.get(&key).await? else {
                continue;
            };
            let lock: ProjectLock = decode(&value)?;
            if lock.project.repo_full_name != repo_full_name || lock.pull.num != pull_num {
                continue;
            }
            if self.kv.delete_if_equals(&key, &value).await? {
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
        let key = remote_command_lock_key(command);
        let lock = CommandLock::new(command, at);
        let value = encode(&lock)?;
        if self.kv.set_if_absent(&key, &value).await? {
            return Ok(lock);
        }
        // An unlocked record may be replaced
        if let Some(current) = self.kv.get(&key).await? {
            if !decode::<CommandLock>(&current)?.is_locked()
                && self.kv.delete_if_equals(&key, &current).await?
                && self.kv.set_if_absent(&key, &value).await?
            {
                return Ok(lock);
            }
        }
        Err(StoreError::CommandLocked)
    }

    async fn unlock_command(&self, command: CommandName) -> Result<(), StoreError> {
        let key = remote_command_lock_key(command);
        match self.kv.take(&key).await? {
            Some(value) if decode::<CommandLock>(&value)?.is_locked() => Ok(()),
            _ => Err(StoreError::CommandNotLocked),
        }
    }

    async fn check_command_lock(
        &self,
        command: CommandName,
    ) -> Result<Option<CommandLock>, StoreError> {
        let lock: Option<CommandLock> =
            self.get_decoded(&remote_command_lock_key(command)).await?;
        Ok(lock.filter(CommandLock::is_locked))
    }

    async fn update_pull_with_results(
        &self,
        pull: &PullRequest,
        results: &[ProjectResult],
    ) -> Result<PullStatus, StoreError> {
        let key = pull_key(pull)?;
        let existing = self.get_decoded(&key).await?;
        let status = merge_results(existing, pull, results);
        self.kv.set(&key, &encode(&status)?).await?;
        Ok(status)
    }

    async fn get_pull_status(&self, pull: &PullRequest) -> Result<Option<PullStatus>, StoreError> {
        self.get_decoded(&pull_key(pull)?).await
    }

    async fn delete_pull_status(&self, pull: &PullRequest) -> Result<(), StoreError> {
        self.kv.delete(&pull_key(pull)?).await?;
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
        let Some(mut current) = self.get_decoded::<PullStatus>(&key).await? else {
            return Ok(());
        };
        if update_project(&mut current, workspace, repo_rel_dir, status) {
            self.kv.set(&key, &encode(&current)?).await?;
        }
        Ok(())
    }

    async fn save_project_output(&self, output: &ProjectOutput) -> Result<(), StoreError> {
        if output.job_id.is_empty() {
            let writes = self.output_writes(output).await?;
            self.kv.apply(writes).await?;
            return Ok(());
        }

        // The batch only lands while the job index still names the run read
        // here, so two saves of one job cannot both keep a record.
        let run = output.key();
        let index_key = remote_job_index_key(&output.job_id);
        for _ in 0..UPSERT_ATTEMPTS {
            let previous = self.kv.get(&index_key).await?;
            let mut writes = Vec::new();
            if let Some(previous) = previous.as_deref().filter(|p| *p != run) {
                let old_key = remote_output_key(previous);
                if let Some(old) = self.get_decoded::<ProjectOutput>(&old_key).await? {
                    writes.push(KvWrite::set_remove(
                        remote_pull_outputs_key(&old.repo_full_name, old.pull_num),
                        previous,
                    ));
                }
                writes.push(KvWrite::delete(old_key));
            }
            writes.push(KvWrite::set(index_key.clone(), run.clone()));
            writes.extend(self.output_writes(output).await?);

            if self.kv.apply_if(&index_key, previous.as_deref(), writes).await? {
                return Ok(());
            }
            tracing::debug!(job_id = %output.job_id, "job index moved, retrying save");
        }
        Err(StoreError::Backend(format!("job index {index_key} kept changing during save")))
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
        self.get_decoded(&remote_output_key(&key)).await
    }

    async fn get_project_output_history(
        &self,
        scope: &OutputScope,
    ) -> Result<Vec<ProjectOutput>, StoreError> {
        let prefix = scope.prefix();
        let members = self
            .kv
            .set_members(&remote_pull_outputs_key(&scope.repo_full_name, scope.pull_num))
            .await?;
        let keys: Vec<String> = members
            .iter()
            .filter(|k| k.starts_with(&prefix))
            .map(|k| remote_output_key(k))
            .collect();
        let mut history = self.get_all(&keys).await?;
        sort_newest_first(&mut history);
        Ok(history)
    }

    async fn get_project_outputs_by_pull(
        &self,
        repo_full_name: &str,
        pull_num: u64,
    ) -> Result<Vec<ProjectOutput>, StoreError> {
        let runs = self.pull_outputs(repo_full_name, pull_num).await?;
        Ok(latest_per_project(runs))
    }

    async fn get_project_output_by_job_id(
        &self,
        job_id: &str,
    ) -> Result<Option<ProjectOutput>, StoreError> {
        if let Some(run) = self.kv.get(&remote_job_index_key(job_id)).await? {
            if let Some(output) = self.get_decoded(&remote_output_key(&run)).await? {
                return Ok(Some(output));
            }
        }
        // Records saved before the index existed
        for key in self.kv.scan(&format!("{OUTPUT_PREFIX}*")).await? {
            let Some(output) = self.get_decoded::<ProjectOutput>(&key).await? else {
                continue;
            };
            if output.job_id == job_id {
                return Ok(Some(output));
            }
        }
        Ok(None)
    }

    async fn mark_interrupted_outputs(&self) -> Result<usize, StoreError> {
        let mut marked = 0;
        for key in self.kv.scan(&format!("{OUTPUT_PREFIX}*")).await? {
            let Some(current) = self.kv.get(&key).await? else {
                continue;
            };
            let mut output: ProjectOutput = decode(&current)?;
            if output.status != OutputStatus::Running {
                continue;
            }
            output.status = OutputStatus::Interrupted;
            // A run that finished since the read keeps its status
            if self.kv.set_if_equals(&key, &current, &encode(&output)?).await? {
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
        let set_key = remote_pull_outputs_key(repo_full_name, pull_num);
        let mut writes = Vec::new();
        for run in self.kv.set_members(&set_key).await? {
            let output_key = remote_output_key(&run);
            if let Some(output) = self.get_decoded::<ProjectOutput>(&output_key).await? {
                if !output.job_id.is_empty() {
                    let index_key = remote_job_index_key(&output.job_id);
                    if self.kv.get(&index_key).await?.as_deref() == Some(run.as_str()) {
                        writes.push(KvWrite::delete(index_key));
                    }
                }
            }
            writes.push(KvWrite::delete(output_key));
        }
        writes.push(KvWrite::delete(set_key));
        writes.push(KvWrite::delete(remote_active_pull_key(repo_full_name, pull_num)));
        self.kv.apply(writes).await?;
        Ok(())
    }

    async fn get_active_pull_requests(&self) -> Result<Vec<PullRequest>, StoreError> {
        let keys = self.kv.scan(&format!("{ACTIVE_PULL_PREFIX}*")).await?;
        self.get_all(&keys).await
    }
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
