//! Argument error specs

use crate::prelude::*;

#[test]
fn missing_subcommand_fails() {
    let temp = Project::empty();
    temp.plock().fails().stderr_has("Usage");
}

#[test]
fn unknown_command_name_is_rejected() {
    let temp = Project::empty();
    temp.plock()
        .args(&["command", "lock", "deploy"])
        .fails()
        .stderr_has("unknown command: \"deploy\"");
}

#[test]
fn unknown_priority_is_rejected() {
    let temp = Project::empty();
    temp.plock()
        .args(&[
            "locks", "acquire", "owner/repo", "infra", "default", "--pull", "1", "--user",
            "alice", "--priority", "urgent",
        ])
        .fails()
        .stderr_has("unknown priority");
}

#[test]
fn non_numeric_pull_is_rejected() {
    let temp = Project::empty();
    temp.plock()
        .args(&["locks", "unlock-pull", "owner/repo", "twelve"])
        .fails()
        .stderr_has("invalid value");
}
