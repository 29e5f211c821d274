// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pull status merge rules shared by both backends

use plock_core::{
    PolicySetStatus, ProjectPlanStatus, ProjectResult, ProjectStatus, PullRequest, PullStatus,
};

/// Fold `results` into the stored status of `pull`.
///
/// A missing status, or one recorded at a different head commit, is replaced
/// outright. At the same commit, results update matching projects in place
/// and unseen projects are appended.
pub fn merge_results(
    existing: Option<PullStatus>,
    pull: &PullRequest,
    results: &[ProjectResult],
) -> PullStatus {
    let mut status = match existing {
        Some(status) if status.pull.head_commit == pull.head_commit => status,
        _ => {
            return PullStatus {
                projects: results.iter().map(ProjectStatus::from).collect(),
                pull: pull.clone(),
            }
        }
    };

    for result in results {
        match status.projects.iter_mut().find(|p| p.matches(result)) {
            Some(project) => {
                project.status = result.status;
                merge_policy_sets(&mut project.policy_status, &result.policy_status);
            }
            None => status.projects.push(ProjectStatus::from(result)),
        }
    }
    status.pull = pull.clone();
    status
}

fn merge_policy_sets(stored: &mut Vec<PolicySetStatus>, incoming: &[PolicySetStatus]) {
    if stored.is_empty() {
        stored.extend_from_slice(incoming);
        return;
    }
    for policy in incoming {
        match stored
            .iter_mut()
            .find(|p| p.policy_set_name == policy.policy_set_name)
        {
            Some(existing) => *existing = policy.clone(),
            None => stored.push(policy.clone()),
        }
    }
}

/// Set the status of the first project at (`workspace`, `repo_rel_dir`).
/// Returns whether a project matched.
pub fn update_project(
    status: &mut PullStatus,
    workspace: &str,
    repo_rel_dir: &str,
    new_status: ProjectPlanStatus,
) -> bool {
    match status
        .projects
        .iter_mut()
        .find(|p| p.workspace == workspace && p.repo_rel_dir == repo_rel_dir)
    {
        Some(project) => {
            project.status = new_status;
            true
        }
        None => false,
    }
}

#[cfg(test)]
#[path = "pull_status_tests.rs"]
mod tests;
