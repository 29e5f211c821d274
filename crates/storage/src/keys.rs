// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage key layout shared by both backends
//!
//! Lock keys use `/` separators, pull and run keys use `::`. A hostname or
//! repository name containing `::` cannot be encoded and is rejected.

use crate::error::StoreError;
use plock_core::{lock_key, CommandName, Project, PullRequest};

pub const PULL_KEY_SEPARATOR: &str = "::";

/// Remote lock keys live under this prefix
pub const LOCK_PREFIX: &str = "pr/";
pub const OUTPUT_PREFIX: &str = "output/";
pub const PULL_OUTPUTS_PREFIX: &str = "pull-outputs/";
pub const JOB_INDEX_PREFIX: &str = "job-id-index/";
pub const ACTIVE_PULL_PREFIX: &str = "active-pulls/";

/// Pull status key: `hostname::repo::num`
pub fn pull_key(pull: &PullRequest) -> Result<String, StoreError> {
    let hostname = &pull.base_repo.vcs_host.hostname;
    let repo = &pull.base_repo.full_name;
    if hostname.contains(PULL_KEY_SEPARATOR) {
        return Err(StoreError::InvalidKey(format!(
            "hostname {hostname:?} contains reserved separator {PULL_KEY_SEPARATOR:?}"
        )));
    }
    if repo.contains(PULL_KEY_SEPARATOR) {
        return Err(StoreError::InvalidKey(format!(
            "repo name {repo:?} contains reserved separator {PULL_KEY_SEPARATOR:?}"
        )));
    }
    Ok(format!("{hostname}::{repo}::{}", pull.num))
}

/// Key of the command lock entry
pub fn command_lock_key(command: CommandName) -> String {
    format!("{command}/lock")
}

/// Prefix shared by every run record of one pull
pub fn pull_runs_prefix(repo_full_name: &str, pull_num: u64) -> String {
    format!("{repo_full_name}::{pull_num}::")
}

/// Index key of one pull: `repo::num`
pub fn pull_index_key(repo_full_name: &str, pull_num: u64) -> String {
    format!("{repo_full_name}::{pull_num}")
}

/// Split an index key back into repo and pull number
pub fn parse_pull_index_key(key: &str) -> Option<(&str, u64)> {
    let (repo, num) = key.rsplit_once(PULL_KEY_SEPARATOR)?;
    Some((repo, num.parse().ok()?))
}

pub fn remote_lock_key(project: &Project, workspace: &str) -> String {
    format!("{LOCK_PREFIX}{}", lock_key(project, workspace))
}

pub fn remote_command_lock_key(command: CommandName) -> String {
    format!("global/{}", command_lock_key(command))
}

pub fn remote_output_key(run_key: &str) -> String {
    format!("{OUTPUT_PREFIX}{run_key}")
}

pub fn remote_pull_outputs_key(repo_full_name: &str, pull_num: u64) -> String {
    format!("{PULL_OUTPUTS_PREFIX}{}", pull_index_key(repo_full_name, pull_num))
}

pub fn remote_job_index_key(job_id: &str) -> String {
    format!("{JOB_INDEX_PREFIX}{job_id}")
}

pub fn remote_active_pull_key(repo_full_name: &str, pull_num: u64) -> String {
    format!("{ACTIVE_PULL_PREFIX}{}", pull_index_key(repo_full_name, pull_num))
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
