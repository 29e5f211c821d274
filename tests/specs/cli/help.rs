//! Help output specs

use crate::prelude::*;

#[test]
fn help_lists_command_groups() {
    let temp = Project::empty();
    temp.plock_bare()
        .args(&["--help"])
        .passes()
        .stdout_has("locks")
        .stdout_has("command")
        .stdout_has("outputs")
        .stdout_has("pulls");
}

#[test]
fn locks_help_lists_subcommands() {
    let temp = Project::empty();
    temp.plock_bare()
        .args(&["locks", "--help"])
        .passes()
        .stdout_has("list")
        .stdout_has("acquire")
        .stdout_has("unlock")
        .stdout_has("unlock-pull");
}

#[test]
fn version_prints_package_version() {
    let temp = Project::empty();
    temp.plock_bare()
        .args(&["--version"])
        .passes()
        .stdout_has("plock");
}
