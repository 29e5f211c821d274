// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::contract_tests::{self, lock, lock_for, lock_store_contract, output};
use similar_asserts::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    store: EmbeddedStore,
    _dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = EmbeddedStore::open(dir.path()).unwrap();
        Self { store, _dir: dir }
    }
}

lock_store_contract!(Fixture::new());

#[tokio::test]
async fn open_creates_missing_data_dir() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a/b/c");
    EmbeddedStore::open(&nested).unwrap();
    assert!(nested.join(DB_FILE).exists());
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = EmbeddedStore::open(dir.path()).unwrap();
        store.try_lock(lock()).await.unwrap();
        store.save_project_output(&output("p", "job-1", 1)).await.unwrap();
        store.flush().await.unwrap();
    }

    let store = EmbeddedStore::open(dir.path()).unwrap();
    assert_eq!(store.list().await.unwrap(), vec![lock()]);
    assert!(store.get_project_output_by_job_id("job-1").await.unwrap().is_some());
}

#[tokio::test]
async fn concurrent_try_lock_has_one_winner() {
    let fixture = Fixture::new();
    let store = Arc::new(fixture.store);
    let mut tasks = Vec::new();
    for pull in 1..=16 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            let lock = lock_for(contract_tests::project(), "default", pull);
            store.try_lock(lock).await.unwrap().acquired
        }));
    }

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(store.list().await.unwrap().len(), 1);
}

fn write_legacy_lock(dir: &Path, legacy_key: &str, lock: &ProjectLock) {
    let db = sled::open(dir.join(DB_FILE)).unwrap();
    let tree = db.open_tree(LOCKS_TREE).unwrap();
    tree.insert(legacy_key, serde_json::to_vec(lock).unwrap())
        .unwrap();
    db.flush().unwrap();
}

#[tokio::test]
async fn legacy_lock_keys_are_migrated_on_open() {
    let dir = TempDir::new().unwrap();
    let named = Project::new("owner/repo", "path", "myproject");
    let legacy = lock_for(named.clone(), "default", 1);
    // Keys written before project names were part of the key
    write_legacy_lock(dir.path(), "owner/repo/path/default", &legacy);

    let store = EmbeddedStore::open(dir.path()).unwrap();
    assert_eq!(store.list().await.unwrap(), vec![legacy.clone()]);
    assert_eq!(
        store.get_lock(&named, "default").await.unwrap(),
        Some(legacy.clone())
    );

    assert_eq!(store.migrate_legacy_locks().unwrap(), 0);
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn migration_keeps_existing_current_lock() {
    let dir = TempDir::new().unwrap();
    let named = Project::new("owner/repo", "path", "myproject");
    let current = lock_for(named.clone(), "default", 2);
    {
        let store = EmbeddedStore::open(dir.path()).unwrap();
        store.try_lock(current.clone()).await.unwrap();
        store.flush().await.unwrap();
    }
    write_legacy_lock(
        dir.path(),
        "owner/repo/path/default",
        &lock_for(named.clone(), "default", 1),
    );

    let store = EmbeddedStore::open(dir.path()).unwrap();
    assert_eq!(store.list().await.unwrap(), vec![current]);
}

#[tokio::test]
async fn undecodable_lock_fails_open() {
    let dir = TempDir::new().unwrap();
    {
        let db = sled::open(dir.path().join(DB_FILE)).unwrap();
        db.open_tree(LOCKS_TREE)
            .unwrap()
            .insert("owner/repo/./default/", &b"not json"[..])
            .unwrap();
        db.flush().unwrap();
    }

    let err = EmbeddedStore::open(dir.path()).err().unwrap();
    assert!(matches!(err, StoreError::Serialization(_)));
}

#[tokio::test]
async fn job_index_points_at_upserted_record() {
    let fixture = Fixture::new();
    let store = &fixture.store;
    store.save_project_output(&output("p", "job-1", 1)).await.unwrap();
    store.save_project_output(&output("p", "job-1", 2)).await.unwrap();

    let indexed = store.job_index.get("job-1").unwrap().unwrap();
    assert_eq!(&*indexed, output("p", "job-1", 2).key().as_bytes());
    assert_eq!(store.outputs.len(), 1);
}

#[tokio::test]
async fn unindexed_output_found_by_scan() {
    let fixture = Fixture::new();
    let store = &fixture.store;
    let saved = output("p", "job-legacy", 1);
    store
        .outputs
        .insert(saved.key().as_bytes(), serde_json::to_vec(&saved).unwrap())
        .unwrap();

    assert_eq!(
        store.get_project_output_by_job_id("job-legacy").await.unwrap(),
        Some(saved)
    );
}

#[tokio::test]
async fn unlocked_command_record_may_be_relocked() {
    let fixture = Fixture::new();
    let store = &fixture.store;
    let released = CommandLock {
        unix_time: 0,
        ..CommandLock::new(CommandName::Apply, Utc::now())
    };
    store
        .command_locks
        .insert(
            command_lock_key(CommandName::Apply).as_bytes(),
            serde_json::to_vec(&released).unwrap(),
        )
        .unwrap();

    assert_eq!(store.check_command_lock(CommandName::Apply).await.unwrap(), None);
    assert!(matches!(
        store.unlock_command(CommandName::Apply).await,
        Err(StoreError::CommandNotLocked)
    ));

    store
        .command_locks
        .insert(
            command_lock_key(CommandName::Apply).as_bytes(),
            serde_json::to_vec(&released).unwrap(),
        )
        .unwrap();
    let lock = store.lock_command(CommandName::Apply, Utc::now()).await.unwrap();
    assert!(lock.is_locked());
}
