// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock, pull-status and run-history records
//!
//! These are the values every store backend persists. They serialize as JSON
//! and are treated as immutable once written, except where a store operation
//! explicitly rewrites them (pull-status merges, output upserts).

use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A project inside a repository, addressed by its repo-relative path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Project {
    /// Empty when the project has no configured name
    #[serde(default)]
    pub project_name: String,
    pub repo_full_name: String,
    pub path: String,
}

impl Project {
    /// Create a project, normalizing `path` (`""` and `"/"` become `"."`)
    pub fn new(
        repo_full_name: impl Into<String>,
        path: &str,
        project_name: impl Into<String>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            repo_full_name: repo_full_name.into(),
            path: clean_path(path),
        }
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "repofullname={} path={}", self.repo_full_name, self.path)
    }
}

/// Lexically normalize a slash-separated relative path
fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub teams: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsHost {
    pub hostname: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub full_name: String,
    #[serde(default)]
    pub vcs_host: VcsHost,
}

impl Repo {
    pub fn new(full_name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            vcs_host: VcsHost {
                hostname: hostname.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub num: u64,
    #[serde(default)]
    pub head_commit: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub base_repo: Repo,
}

/// A held project lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectLock {
    pub project: Project,
    pub pull: PullRequest,
    pub user: User,
    pub workspace: String,
    pub time: DateTime<Utc>,
}

impl ProjectLock {
    /// Current-format storage key for this lock
    pub fn key(&self) -> String {
        lock_key(&self.project, &self.workspace)
    }
}

/// Current-format lock key: `repo/path/workspace/projectName`
pub fn lock_key(project: &Project, workspace: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        project.repo_full_name, project.path, workspace, project.project_name
    )
}

/// Commands that can be globally locked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    Apply,
    Plan,
    PolicyCheck,
    ApprovePolicies,
    Unlock,
    Version,
    Import,
    State,
}

impl CommandName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::Apply => "apply",
            CommandName::Plan => "plan",
            CommandName::PolicyCheck => "policy_check",
            CommandName::ApprovePolicies => "approve_policies",
            CommandName::Unlock => "unlock",
            CommandName::Version => "version",
            CommandName::Import => "import",
            CommandName::State => "state",
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apply" => Ok(CommandName::Apply),
            "plan" => Ok(CommandName::Plan),
            "policy_check" => Ok(CommandName::PolicyCheck),
            "approve_policies" => Ok(CommandName::ApprovePolicies),
            "unlock" => Ok(CommandName::Unlock),
            "version" => Ok(CommandName::Version),
            "import" => Ok(CommandName::Import),
            "state" => Ok(CommandName::State),
            other => Err(ConfigError::UnknownCommand(other.to_string())),
        }
    }
}

/// Global lock for one command kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLock {
    pub command: CommandName,
    /// Seconds since the unix epoch; zero means unlocked
    pub unix_time: i64,
}

impl CommandLock {
    pub fn new(command: CommandName, at: DateTime<Utc>) -> Self {
        Self {
            command,
            unix_time: at.timestamp(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.unix_time != 0
    }

    pub fn locked_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.unix_time, 0).unwrap_or_default()
    }
}

/// Where a project is in its plan/apply cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectPlanStatus {
    #[serde(rename = "plan_errored")]
    ErroredPlan,
    #[serde(rename = "planned")]
    Planned,
    #[serde(rename = "planned_no_changes")]
    PlannedNoChanges,
    #[serde(rename = "apply_errored")]
    ErroredApply,
    #[serde(rename = "applied")]
    Applied,
    #[serde(rename = "plan_discarded")]
    Discarded,
    #[serde(rename = "policy_check_errored")]
    ErroredPolicyCheck,
    #[serde(rename = "policy_check_passed")]
    PassedPolicyCheck,
}

impl ProjectPlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectPlanStatus::ErroredPlan => "plan_errored",
            ProjectPlanStatus::Planned => "planned",
            ProjectPlanStatus::PlannedNoChanges => "planned_no_changes",
            ProjectPlanStatus::ErroredApply => "apply_errored",
            ProjectPlanStatus::Applied => "applied",
            ProjectPlanStatus::Discarded => "plan_discarded",
            ProjectPlanStatus::ErroredPolicyCheck => "policy_check_errored",
            ProjectPlanStatus::PassedPolicyCheck => "policy_check_passed",
        }
    }
}

impl fmt::Display for ProjectPlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySetStatus {
    pub policy_set_name: String,
    pub passed: bool,
    #[serde(default)]
    pub approvals: u32,
}

/// Status of one project within a pull
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub workspace: String,
    pub repo_rel_dir: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub policy_status: Vec<PolicySetStatus>,
    pub status: ProjectPlanStatus,
}

impl ProjectStatus {
    /// Whether this entry and `result` describe the same project
    pub fn matches(&self, result: &ProjectResult) -> bool {
        self.workspace == result.workspace
            && self.repo_rel_dir == result.repo_rel_dir
            && self.project_name == result.project_name
    }
}

impl From<&ProjectResult> for ProjectStatus {
    fn from(result: &ProjectResult) -> Self {
        Self {
            workspace: result.workspace.clone(),
            repo_rel_dir: result.repo_rel_dir.clone(),
            project_name: result.project_name.clone(),
            policy_status: result.policy_status.clone(),
            status: result.status,
        }
    }
}

/// Aggregate status of a pull at one head commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullStatus {
    pub projects: Vec<ProjectStatus>,
    pub pull: PullRequest,
}

impl PullStatus {
    /// Number of projects currently in `status`
    pub fn status_count(&self, status: ProjectPlanStatus) -> usize {
        self.projects.iter().filter(|p| p.status == status).count()
    }
}

/// Outcome of running a command against one project, as reported by the
/// command layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectResult {
    pub workspace: String,
    pub repo_rel_dir: String,
    #[serde(default)]
    pub project_name: String,
    pub status: ProjectPlanStatus,
    #[serde(default)]
    pub policy_status: Vec<PolicySetStatus>,
}

/// Lifecycle of a single command run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStatus {
    #[default]
    Running,
    Success,
    Failed,
    Interrupted,
}

impl fmt::Display for OutputStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputStatus::Running => "running",
            OutputStatus::Success => "success",
            OutputStatus::Failed => "failed",
            OutputStatus::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// Resource change counters parsed from a plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStats {
    #[serde(default)]
    pub import: u32,
    #[serde(default)]
    pub add: u32,
    #[serde(default)]
    pub change: u32,
    #[serde(default)]
    pub destroy: u32,
}

/// One recorded command run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectOutput {
    pub repo_full_name: String,
    pub pull_num: u64,
    pub project_name: String,
    pub workspace: String,
    pub path: String,
    pub command_name: String,
    pub job_id: String,
    /// Milliseconds since the unix epoch
    pub run_timestamp: i64,
    pub output: String,
    pub status: OutputStatus,
    pub resource_stats: ResourceStats,
    pub triggered_by: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pull_url: String,
    pub pull_title: String,
    pub policy_passed: bool,
    pub policy_output: String,
}

impl ProjectOutput {
    /// Unique record key: `repo::pull::path::workspace::project::command::timestamp`
    pub fn key(&self) -> String {
        run_key(
            &self.repo_full_name,
            self.pull_num,
            &self.path,
            &self.workspace,
            &self.project_name,
            &self.command_name,
            self.run_timestamp,
        )
    }

    /// Key shared by every run of the same project in a pull
    pub fn project_key(&self) -> String {
        project_history_key(
            &self.repo_full_name,
            self.pull_num,
            &self.path,
            &self.workspace,
            &self.project_name,
        )
    }
}

/// Prefix of every run key for one project in a pull
pub fn project_history_key(
    repo_full_name: &str,
    pull_num: u64,
    path: &str,
    workspace: &str,
    project_name: &str,
) -> String {
    format!("{repo_full_name}::{pull_num}::{path}::{workspace}::{project_name}")
}

/// Composite key of a single run
pub fn run_key(
    repo_full_name: &str,
    pull_num: u64,
    path: &str,
    workspace: &str,
    project_name: &str,
    command_name: &str,
    run_timestamp: i64,
) -> String {
    format!(
        "{}::{command_name}::{run_timestamp}",
        project_history_key(repo_full_name, pull_num, path, workspace, project_name)
    )
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
