// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use plock_core::Repo;
use similar_asserts::assert_eq;

fn pull(head_commit: &str) -> PullRequest {
    PullRequest {
        num: 1,
        head_commit: head_commit.to_string(),
        url: "url".to_string(),
        author: "lkysow".to_string(),
        base_repo: Repo::new("runatlantis/atlantis", "github.com"),
        ..Default::default()
    }
}

fn result(dir: &str, project_name: &str, status: ProjectPlanStatus) -> ProjectResult {
    ProjectResult {
        workspace: "default".to_string(),
        repo_rel_dir: dir.to_string(),
        project_name: project_name.to_string(),
        status,
        policy_status: Vec::new(),
    }
}

fn policy(name: &str, passed: bool, approvals: u32) -> PolicySetStatus {
    PolicySetStatus {
        policy_set_name: name.to_string(),
        passed,
        approvals,
    }
}

fn summary(status: &PullStatus) -> Vec<(&str, &str, ProjectPlanStatus)> {
    status
        .projects
        .iter()
        .map(|p| (p.repo_rel_dir.as_str(), p.project_name.as_str(), p.status))
        .collect()
}

#[test]
fn first_update_creates_status() {
    let status = merge_results(
        None,
        &pull("sha"),
        &[result(".", "", ProjectPlanStatus::ErroredPlan)],
    );
    assert_eq!(status.pull, pull("sha"));
    assert_eq!(summary(&status), vec![(".", "", ProjectPlanStatus::ErroredPlan)]);
}

#[test]
fn same_commit_merges_and_appends() {
    let first = merge_results(
        None,
        &pull("sha"),
        &[
            result("mergeme", "", ProjectPlanStatus::ErroredPlan),
            result("projectname", "projectname", ProjectPlanStatus::ErroredPlan),
            result("staythesame", "", ProjectPlanStatus::Planned),
        ],
    );

    let merged = merge_results(
        Some(first),
        &pull("sha"),
        &[
            result("mergeme", "", ProjectPlanStatus::Applied),
            result("projectname", "projectname", ProjectPlanStatus::ErroredApply),
            result("newresult", "", ProjectPlanStatus::Applied),
        ],
    );

    assert_eq!(
        summary(&merged),
        vec![
            ("mergeme", "", ProjectPlanStatus::Applied),
            ("projectname", "projectname", ProjectPlanStatus::ErroredApply),
            ("staythesame", "", ProjectPlanStatus::Planned),
            ("newresult", "", ProjectPlanStatus::Applied),
        ]
    );
}

#[test]
fn new_commit_replaces_projects() {
    let first = merge_results(
        None,
        &pull("sha"),
        &[result(".", "", ProjectPlanStatus::ErroredPlan)],
    );
    let mut staging = result(".", "", ProjectPlanStatus::Applied);
    staging.workspace = "staging".to_string();

    let replaced = merge_results(Some(first), &pull("newsha"), &[staging]);

    assert_eq!(replaced.pull.head_commit, "newsha");
    assert_eq!(replaced.projects.len(), 1);
    assert_eq!(replaced.projects[0].workspace, "staging");
}

#[test]
fn project_name_distinguishes_entries() {
    let first = merge_results(
        None,
        &pull("sha"),
        &[result("dir", "a", ProjectPlanStatus::Planned)],
    );
    let merged = merge_results(
        Some(first),
        &pull("sha"),
        &[result("dir", "b", ProjectPlanStatus::Planned)],
    );
    assert_eq!(merged.projects.len(), 2);
}

#[test]
fn approvals_update_only_named_policy_sets() {
    let mut checked = result("mergeme", "", ProjectPlanStatus::ErroredPolicyCheck);
    checked.policy_status = vec![policy("policy1", false, 0), policy("policy2", true, 0)];
    let first = merge_results(None, &pull("sha"), &[checked]);

    let mut approved = result("mergeme", "", ProjectPlanStatus::PassedPolicyCheck);
    approved.policy_status = vec![policy("policy1", true, 1)];
    let merged = merge_results(Some(first), &pull("sha"), &[approved]);

    let project = &merged.projects[0];
    assert_eq!(project.status, ProjectPlanStatus::PassedPolicyCheck);
    assert_eq!(
        project.policy_status,
        vec![policy("policy1", true, 1), policy("policy2", true, 0)]
    );
}

#[test]
fn policy_sets_taken_whole_when_none_stored() {
    let first = merge_results(
        None,
        &pull("sha"),
        &[result(".", "", ProjectPlanStatus::Planned)],
    );
    let mut checked = result(".", "", ProjectPlanStatus::PassedPolicyCheck);
    checked.policy_status = vec![policy("p", true, 0)];

    let merged = merge_results(Some(first), &pull("sha"), &[checked]);
    assert_eq!(merged.projects[0].policy_status, vec![policy("p", true, 0)]);
}

#[test]
fn update_project_sets_first_match() {
    let mut staging = result(".", "", ProjectPlanStatus::Applied);
    staging.workspace = "staging".to_string();
    let mut status = merge_results(
        None,
        &pull("sha"),
        &[result(".", "", ProjectPlanStatus::ErroredPlan), staging],
    );

    assert!(update_project(&mut status, "default", ".", ProjectPlanStatus::Discarded));
    assert!(!update_project(&mut status, "default", "missing", ProjectPlanStatus::Discarded));

    assert_eq!(status.projects[0].status, ProjectPlanStatus::Discarded);
    assert_eq!(status.projects[1].status, ProjectPlanStatus::Applied);
}
