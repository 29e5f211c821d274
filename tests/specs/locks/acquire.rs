//! Lock acquisition specs

use crate::prelude::*;

fn acquire(temp: &Project, path: &str, pull: &str, user: &str) -> Cli {
    temp.plock().args(&[
        "locks", "acquire", "owner/repo", path, "default", "--pull", pull, "--user", user,
    ])
}

#[test]
fn list_is_empty_on_a_fresh_store() {
    let temp = Project::empty();
    temp.plock()
        .args(&["locks", "list"])
        .passes()
        .stdout_eq("No locks\n");
}

#[test]
fn acquired_lock_is_listed() {
    let temp = Project::empty();
    acquire(&temp, "infra", "12", "alice")
        .passes()
        .stdout_eq("Locked owner/repo/infra/default/ for pull #12\n");

    temp.plock()
        .args(&["locks", "list"])
        .passes()
        .stdout_has("REPO")
        .stdout_has("owner/repo")
        .stdout_has("infra")
        .stdout_has("#12")
        .stdout_has("alice");
}

#[test]
fn same_pull_is_told_it_already_holds_the_lock() {
    let temp = Project::empty();
    acquire(&temp, "infra", "12", "alice").passes();

    acquire(&temp, "infra", "12", "alice")
        .passes()
        .stdout_eq("Already locked by pull #12\n");
}

#[test]
fn other_pull_is_refused_with_holder() {
    let temp = Project::empty();
    acquire(&temp, "infra", "12", "alice").passes();

    acquire(&temp, "infra", "13", "bob")
        .fails()
        .stderr_has("locked by pull #12 (alice)");
}

#[test]
fn locks_on_different_paths_are_independent() {
    let temp = Project::empty();
    acquire(&temp, "infra", "12", "alice").passes();
    acquire(&temp, "network", "13", "bob").passes();

    temp.plock()
        .args(&["locks", "list"])
        .passes()
        .stdout_has("#12")
        .stdout_has("#13");
}

#[test]
fn json_list_is_machine_readable() {
    let temp = Project::empty();
    acquire(&temp, "infra", "12", "alice").passes();

    let stdout = temp
        .plock()
        .args(&["--output", "json", "locks", "list"])
        .passes()
        .stdout();

    assert!(stdout.trim_start().starts_with('['));
    assert!(stdout.contains("\"pull\": 12"));
    assert!(stdout.contains("\"user\": \"alice\""));
}
