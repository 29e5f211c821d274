// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::contract_tests::{lock, lock_for, lock_store_contract, output};
use plock_adapters::{FakeRemoteKv, KvCall, KvError};
use similar_asserts::assert_eq;

struct Fixture {
    store: RemoteStore<FakeRemoteKv>,
}

impl Fixture {
    async fn new() -> Self {
        let store = RemoteStore::connect(FakeRemoteKv::new()).await.unwrap();
        Self { store }
    }
}

lock_store_contract!(Fixture::new().await);

#[tokio::test]
async fn try_lock_is_a_single_conditional_write() {
    let kv = FakeRemoteKv::new();
    let store = RemoteStore::connect(kv.clone()).await.unwrap();
    let before = kv.calls().len();

    assert!(store.try_lock(lock()).await.unwrap().acquired);

    let key = "pr/owner/repo/parent/child/default/".to_string();
    assert_eq!(kv.calls()[before..].to_vec(), vec![KvCall::SetIfAbsent(key.clone())]);
    assert!(kv.value(&key).is_some());
}

#[tokio::test]
async fn command_lock_lives_under_global_prefix() {
    let kv = FakeRemoteKv::new();
    let store = RemoteStore::connect(kv.clone()).await.unwrap();
    store.lock_command(CommandName::Apply, Utc::now()).await.unwrap();
    assert!(kv.value("global/apply/lock").is_some());
}

#[tokio::test]
async fn save_writes_one_batch() {
    let kv = FakeRemoteKv::new();
    let store = RemoteStore::connect(kv.clone()).await.unwrap();
    let saved = output("p", "job-1", 1);
    store.save_project_output(&saved).await.unwrap();

    // job index, record, pull set, active pull
    assert!(kv
        .calls()
        .contains(&KvCall::ApplyIf("job-id-index/job-1".to_string(), 4)));
    assert_eq!(
        kv.value("job-id-index/job-1"),
        Some(saved.key())
    );
    assert!(kv.value(&format!("output/{}", saved.key())).is_some());
    assert_eq!(kv.set_keys(), vec!["pull-outputs/owner/repo::123".to_string()]);
    assert!(kv.value("active-pulls/owner/repo::123").is_some());
}

#[tokio::test]
async fn delete_by_pull_leaves_no_keys_behind() {
    let fixture = Fixture::new().await;
    let store = &fixture.store;
    store.save_project_output(&output("p", "job-1", 1)).await.unwrap();
    store.save_project_output(&output("q", "job-2", 2)).await.unwrap();

    store.delete_project_outputs_by_pull("owner/repo", 123).await.unwrap();

    assert!(store.kv().keys().is_empty());
    assert!(store.kv().set_keys().is_empty());
}

#[tokio::test]
async fn upsert_into_another_pull_moves_set_membership() {
    let fixture = Fixture::new().await;
    let store = &fixture.store;
    store.save_project_output(&output("p", "job-1", 1)).await.unwrap();
    let mut moved = output("p", "job-1", 2);
    moved.pull_num = 124;
    store.save_project_output(&moved).await.unwrap();

    assert!(store
        .get_project_outputs_by_pull("owner/repo", 123)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        store.get_project_outputs_by_pull("owner/repo", 124).await.unwrap(),
        vec![moved]
    );
}

#[tokio::test]
async fn legacy_lock_keys_are_migrated_on_connect() {
    let kv = FakeRemoteKv::new();
    let named = Project::new("owner/repo", "path", "myproject");
    let legacy = lock_for(named.clone(), "default", 1);
    kv.insert(
        "pr/owner/repo/path/default",
        &serde_json::to_string(&legacy).unwrap(),
    );

    let store = RemoteStore::connect(kv.clone()).await.unwrap();
    assert_eq!(store.list().await.unwrap(), vec![legacy.clone()]);
    assert_eq!(store.get_lock(&named, "default").await.unwrap(), Some(legacy));
    assert_eq!(kv.keys(), vec!["pr/owner/repo/path/default/myproject".to_string()]);

    assert_eq!(store.migrate_legacy_locks().await.unwrap(), 0);
}

#[tokio::test]
async fn migration_keeps_existing_current_lock() {
    let kv = FakeRemoteKv::new();
    let named = Project::new("owner/repo", "path", "myproject");
    let current = lock_for(named.clone(), "default", 2);
    kv.insert(
        "pr/owner/repo/path/default/myproject",
        &serde_json::to_string(&current).unwrap(),
    );
    kv.insert(
        "pr/owner/repo/path/default",
        &serde_json::to_string(&lock_for(named, "default", 1)).unwrap(),
    );

    let store = RemoteStore::connect(kv).await.unwrap();
    assert_eq!(store.list().await.unwrap(), vec![current]);
}

#[tokio::test]
async fn unreachable_service_fails_connect() {
    let kv = FakeRemoteKv::new();
    kv.fail_next(1);
    let err = RemoteStore::connect(kv).await.err().unwrap();
    assert!(matches!(err, StoreError::Backend(_)));
    assert!(err.to_string().contains("injected failure"));
}

#[tokio::test]
async fn service_errors_surface_as_backend_errors() {
    let fixture = Fixture::new().await;
    fixture.store.kv().fail_next(1);
    let err = fixture.store.try_lock(lock()).await.unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)));
    assert_eq!(err.code(), plock_core::ErrorCode::BackendError);

    assert!(fixture.store.try_lock(lock()).await.unwrap().acquired);
}

#[tokio::test]
async fn corrupt_record_is_a_serialization_error() {
    let fixture = Fixture::new().await;
    fixture
        .store
        .kv()
        .insert("pr/owner/repo/parent/child/default/", "{not json");
    let err = fixture.store.list().await.unwrap_err();
    assert!(matches!(err, StoreError::Serialization(_)));
}

// =============================================================================
// Concurrent callers
// =============================================================================

/// Hands control back to the scheduler after reads of matching keys, so
/// concurrent callers interleave between a read and the write that follows.
#[derive(Clone)]
struct YieldingKv {
    inner: FakeRemoteKv,
    prefix: &'static str,
    yields: u32,
}

impl YieldingKv {
    fn new(prefix: &'static str, yields: u32) -> Self {
        Self {
            inner: FakeRemoteKv::new(),
            prefix,
            yields,
        }
    }
}

#[async_trait]
impl RemoteKv for YieldingKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let value = self.inner.get(key).await;
        if key.starts_with(self.prefix) {
            for _ in 0..self.yields {
                tokio::task::yield_now().await;
            }
        }
        value
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.inner.set(key, value).await
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, KvError> {
        self.inner.set_if_absent(key, value).await
    }

    async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        self.inner.take(key).await
    }

    async fn delete_if_equals(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<bool, KvError> {
        self.inner.delete_if_equals(key, expected).await
    }

    async fn set_if_equals(
        &self,
        key: &str,
        expected: &str,
        value: &str,
    ) -> Result<bool, KvError> {
        self.inner.set_if_equals(key, expected, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.inner.delete(key).await
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        self.inner.scan(pattern).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError> {
        self.inner.set_members(key).await
    }

    async fn apply(&self, writes: Vec<KvWrite>) -> Result<(), KvError> {
        self.inner.apply(writes).await
    }

    async fn apply_if(
        &self,
        guard: &str,
        expected: Option<&str>,
        writes: Vec<KvWrite>,
    ) -> Result<bool, KvError> {
        self.inner.apply_if(guard, expected, writes).await
    }

    async fn ping(&self) -> Result<(), KvError> {
        self.inner.ping().await
    }
}

async fn yielding_store(prefix: &'static str, yields: u32) -> RemoteStore<YieldingKv> {
    RemoteStore::connect(YieldingKv::new(prefix, yields))
        .await
        .unwrap()
}

fn history_scope() -> OutputScope {
    OutputScope::new("owner/repo", 123, "terraform/staging", "default", "p")
}

#[tokio::test]
async fn concurrent_try_lock_has_one_winner() {
    let store = yielding_store("", 1).await;
    let mut tasks = tokio::task::JoinSet::new();
    for pull in 1..=8 {
        let store = store.clone();
        tasks.spawn(async move {
            store
                .try_lock(lock_for(crate::contract_tests::project(), "default", pull))
                .await
                .unwrap()
        });
    }

    let mut attempts = Vec::new();
    while let Some(attempt) = tasks.join_next().await {
        attempts.push(attempt.unwrap());
    }
    let winners: Vec<_> = attempts.iter().filter(|a| a.acquired).collect();
    assert_eq!(winners.len(), 1);
    let holder = winners[0].lock.pull.num;
    assert!(attempts.iter().all(|a| a.lock.pull.num == holder));
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_command_locks_have_one_winner() {
    let store = yielding_store("global/", 1).await;
    let released = CommandLock {
        command: CommandName::Apply,
        unix_time: 0,
    };
    store
        .kv()
        .inner
        .insert("global/apply/lock", &serde_json::to_string(&released).unwrap());

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..6 {
        let store = store.clone();
        tasks.spawn(async move { store.lock_command(CommandName::Apply, Utc::now()).await });
    }

    let mut won = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => won += 1,
            Err(e) => assert!(matches!(e, StoreError::CommandLocked)),
        }
    }
    assert_eq!(won, 1);
    assert!(store
        .check_command_lock(CommandName::Apply)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn concurrent_saves_of_one_job_keep_one_record() {
    let store = yielding_store("", 1).await;
    let first = output("p", "job-1", 1000);
    let second = output("p", "job-1", 2000);

    let (a, b) = tokio::join!(
        store.save_project_output(&first),
        store.save_project_output(&second)
    );
    a.unwrap();
    b.unwrap();

    let history = store.get_project_output_history(&history_scope()).await.unwrap();
    assert_eq!(history.len(), 1);
    let kept = store
        .get_project_output_by_job_id("job-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(history[0], kept);
    assert_eq!(
        store.kv().inner.value("job-id-index/job-1"),
        Some(kept.key())
    );
    let records: Vec<String> = store
        .kv()
        .inner
        .keys()
        .into_iter()
        .filter(|k| k.starts_with(OUTPUT_PREFIX))
        .collect();
    assert_eq!(records, vec![format!("output/{}", kept.key())]);
}

#[tokio::test]
async fn many_concurrent_saves_of_one_job_keep_one_record() {
    let store = yielding_store("", 1).await;
    let mut tasks = tokio::task::JoinSet::new();
    for at in 1..=4 {
        let store = store.clone();
        tasks.spawn(async move { store.save_project_output(&output("p", "job-1", at)).await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let history = store.get_project_output_history(&history_scope()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        store.kv().inner.set_keys(),
        vec!["pull-outputs/owner/repo::123".to_string()]
    );
}

#[tokio::test]
async fn interrupted_marking_keeps_a_run_that_finished_meanwhile() {
    let store = yielding_store(OUTPUT_PREFIX, 8).await;
    let mut running = output("p", "job-1", 1000);
    running.status = OutputStatus::Running;
    store.save_project_output(&running).await.unwrap();

    let mut finished = running.clone();
    finished.status = OutputStatus::Success;
    let (marked, saved) = tokio::join!(
        store.mark_interrupted_outputs(),
        store.save_project_output(&finished)
    );
    saved.unwrap();

    assert_eq!(marked.unwrap(), 0);
    let stored = store
        .get_project_output_by_job_id("job-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OutputStatus::Success);
}

#[tokio::test]
async fn interrupted_marking_without_contention_marks_running_runs() {
    let store = yielding_store(OUTPUT_PREFIX, 1).await;
    let mut running = output("p", "job-1", 1000);
    running.status = OutputStatus::Running;
    store.save_project_output(&running).await.unwrap();
    store.save_project_output(&output("q", "job-2", 1000)).await.unwrap();

    assert_eq!(store.mark_interrupted_outputs().await.unwrap(), 1);
    let stored = store
        .get_project_output_by_job_id("job-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OutputStatus::Interrupted);
    assert!(store
        .kv()
        .inner
        .calls()
        .iter()
        .any(|c| matches!(c, KvCall::SetIfEquals(_))));
}
