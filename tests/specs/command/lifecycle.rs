//! Global command lock specs

use crate::prelude::*;

#[test]
fn status_of_unlocked_command() {
    let temp = Project::empty();
    temp.plock()
        .args(&["command", "status", "apply"])
        .passes()
        .stdout_eq("apply: unlocked\n");
}

#[test]
fn lock_then_status_shows_locked() {
    let temp = Project::empty();
    temp.plock()
        .args(&["command", "lock", "apply"])
        .passes()
        .stdout_has("Locked apply at");

    temp.plock()
        .args(&["command", "status", "apply"])
        .passes()
        .stdout_has("apply: locked since");
}

#[test]
fn locking_twice_fails() {
    let temp = Project::empty();
    temp.plock().args(&["command", "lock", "apply"]).passes();

    temp.plock()
        .args(&["command", "lock", "apply"])
        .fails()
        .stderr_has("db transaction failed: lock already exists");
}

#[test]
fn unlock_reenables_command() {
    let temp = Project::empty();
    temp.plock().args(&["command", "lock", "apply"]).passes();

    temp.plock()
        .args(&["command", "unlock", "apply"])
        .passes()
        .stdout_eq("Unlocked apply\n");
    temp.plock()
        .args(&["command", "status", "apply"])
        .passes()
        .stdout_eq("apply: unlocked\n");
    temp.plock().args(&["command", "lock", "apply"]).passes();
}

#[test]
fn unlocking_unlocked_command_fails() {
    let temp = Project::empty();
    temp.plock()
        .args(&["command", "unlock", "plan"])
        .fails()
        .stderr_has("db transaction failed: no lock exists");
}

#[test]
fn json_status() {
    let temp = Project::empty();
    temp.plock()
        .args(&["--output", "json", "command", "status", "policy_check"])
        .passes()
        .stdout_has("\"command\": \"policy_check\"")
        .stdout_has("\"locked\": false");
}
