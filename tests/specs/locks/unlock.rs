//! Lock release specs

use crate::prelude::*;

fn acquire(temp: &Project, path: &str, pull: &str) {
    temp.plock()
        .args(&[
            "locks", "acquire", "owner/repo", path, "default", "--pull", pull, "--user", "alice",
        ])
        .passes();
}

#[test]
fn unlock_releases_lock() {
    let temp = Project::empty();
    acquire(&temp, "infra", "12");

    temp.plock()
        .args(&["locks", "unlock", "owner/repo", "infra", "default"])
        .passes()
        .stdout_eq("Unlocked owner/repo/infra/default/ (pull #12)\n");

    temp.plock()
        .args(&["locks", "list"])
        .passes()
        .stdout_eq("No locks\n");
}

#[test]
fn unlock_without_lock_reports_nothing_held() {
    let temp = Project::empty();
    temp.plock()
        .args(&["locks", "unlock", "owner/repo", "infra", "default"])
        .passes()
        .stdout_eq("No lock held on owner/repo/infra/default/\n");
}

#[test]
fn released_lock_can_be_taken_by_another_pull() {
    let temp = Project::empty();
    acquire(&temp, "infra", "12");
    temp.plock()
        .args(&["locks", "unlock", "owner/repo", "infra", "default"])
        .passes();

    acquire(&temp, "infra", "13");
    temp.plock()
        .args(&["locks", "list"])
        .passes()
        .stdout_has("#13")
        .stdout_lacks("#12");
}

#[test]
fn unlock_pull_releases_every_lock_of_that_pull() {
    let temp = Project::empty();
    acquire(&temp, "infra", "12");
    acquire(&temp, "network", "12");
    acquire(&temp, "dns", "13");

    temp.plock()
        .args(&["locks", "unlock-pull", "owner/repo", "12"])
        .passes()
        .stdout_eq("Released 2 lock(s) for owner/repo#12\n");

    temp.plock()
        .args(&["locks", "list"])
        .passes()
        .stdout_has("dns")
        .stdout_lacks("#12");
}
