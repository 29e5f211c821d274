// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-history views shared by both backends

use plock_core::{CommandName, ProjectOutput, PullRequest, Repo};
use std::collections::BTreeMap;

/// Latest run per project of a pull, ordered by project key.
///
/// `policy_check` runs are not listed on their own: the latest one is
/// folded into the project's latest other run when it is at least as
/// recent. A project with only policy checks is omitted.
pub fn latest_per_project(outputs: impl IntoIterator<Item = ProjectOutput>) -> Vec<ProjectOutput> {
    let policy_check = CommandName::PolicyCheck.as_str();
    let mut runs: BTreeMap<String, ProjectOutput> = BTreeMap::new();
    let mut checks: BTreeMap<String, ProjectOutput> = BTreeMap::new();

    for output in outputs {
        let latest = if output.command_name == policy_check {
            &mut checks
        } else {
            &mut runs
        };
        let key = output.project_key();
        match latest.get(&key) {
            Some(current) if current.run_timestamp >= output.run_timestamp => {}
            _ => {
                latest.insert(key, output);
            }
        }
    }

    runs.into_iter()
        .map(|(key, mut run)| {
            if let Some(check) = checks.get(&key) {
                if check.run_timestamp >= run.run_timestamp {
                    run.policy_passed = check.policy_passed;
                    run.policy_output = check.policy_output.clone();
                }
            }
            run
        })
        .collect()
}

/// Newest run first
pub fn sort_newest_first(outputs: &mut [ProjectOutput]) {
    outputs.sort_by(|a, b| b.run_timestamp.cmp(&a.run_timestamp));
}

/// Active-pull entry after saving `output`: keeps the previous URL and
/// title unless the new run carries non-empty ones.
pub fn merge_active_pull(existing: Option<PullRequest>, output: &ProjectOutput) -> PullRequest {
    let mut pull = existing.unwrap_or_else(|| PullRequest {
        num: output.pull_num,
        base_repo: Repo {
            full_name: output.repo_full_name.clone(),
            ..Default::default()
        },
        ..Default::default()
    });
    if !output.pull_url.is_empty() {
        pull.url = output.pull_url.clone();
    }
    if !output.pull_title.is_empty() {
        pull.title = output.pull_title.clone();
    }
    pull
}

#[cfg(test)]
#[path = "outputs_tests.rs"]
mod tests;
