//! Run history specs
//!
//! The CLI never writes runs, so these cover the empty-store paths.

use crate::prelude::*;

#[test]
fn list_of_unknown_pull_is_empty() {
    let temp = Project::empty();
    temp.plock()
        .args(&["outputs", "list", "owner/repo", "12"])
        .passes()
        .stdout_eq("No outputs\n");
}

#[test]
fn mark_interrupted_on_empty_store() {
    let temp = Project::empty();
    temp.plock()
        .args(&["outputs", "mark-interrupted"])
        .passes()
        .stdout_eq("Marked 0 running output(s) as interrupted\n");
}

#[test]
fn delete_of_unknown_pull_succeeds() {
    let temp = Project::empty();
    temp.plock()
        .args(&["outputs", "delete", "owner/repo", "12"])
        .passes()
        .stdout_eq("Deleted outputs for owner/repo#12\n");
}

#[test]
fn no_active_pulls_on_empty_store() {
    let temp = Project::empty();
    temp.plock()
        .args(&["pulls", "active"])
        .passes()
        .stdout_eq("No active pulls\n");
}
