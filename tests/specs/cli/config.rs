//! Configuration file specs

use crate::prelude::*;

#[test]
fn config_file_selects_data_dir() {
    let temp = Project::empty();
    let data_dir = temp.path().join("from-config");
    temp.file(
        "plock.toml",
        &format!("[store]\ndata_dir = {:?}\n", data_dir.display().to_string()),
    );

    temp.plock_bare()
        .args(&["--config", "plock.toml", "command", "lock", "apply"])
        .passes();

    assert!(data_dir.is_dir());
    temp.plock_bare()
        .args(&["--config", "plock.toml", "command", "status", "apply"])
        .passes()
        .stdout_has("apply: locked since");
}

#[test]
fn data_dir_flag_overrides_config_file() {
    let temp = Project::empty();
    let configured = temp.path().join("from-config");
    temp.file(
        "plock.toml",
        &format!("[store]\ndata_dir = {:?}\n", configured.display().to_string()),
    );

    temp.plock()
        .args(&["--config", "plock.toml", "command", "lock", "plan"])
        .passes();

    assert!(temp.data_dir().is_dir());
    assert!(!configured.exists());
}

#[test]
fn missing_config_file_fails() {
    let temp = Project::empty();
    temp.plock()
        .args(&["--config", "nope.toml", "locks", "list"])
        .fails()
        .stderr_has("failed to read")
        .stderr_has("nope.toml");
}

#[test]
fn invalid_config_is_rejected() {
    let temp = Project::empty();
    temp.file("plock.toml", "[retry]\nmax_attempts = 0\n");

    temp.plock()
        .args(&["--config", "plock.toml", "locks", "list"])
        .fails()
        .stderr_has("invalid max_attempts");
}

#[test]
fn unknown_backend_is_rejected() {
    let temp = Project::empty();
    temp.file("plock.toml", "[store]\nbackend = \"etcd\"\n");

    temp.plock()
        .args(&["--config", "plock.toml", "locks", "list"])
        .fails()
        .stderr_has("failed to parse");
}
