// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::kv::{KvError, KvWrite, RemoteKv};
use async_trait::async_trait;
use std::future::Future;
use tracing::Instrument;

/// Wrapper that adds tracing to any RemoteKv
#[derive(Clone)]
pub struct TracedRemoteKv<K> {
    inner: K,
}

impl<K> TracedRemoteKv<K> {
    pub fn new(inner: K) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &K {
        &self.inner
    }
}

/// Time `fut` and log its failure. Successes are logged by the caller.
async fn timed<T>(
    fut: impl Future<Output = Result<T, KvError>>,
) -> (Result<T, KvError>, u64) {
    let start = std::time::Instant::now();
    let result = fut.await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    if let Err(e) = &result {
        tracing::error!(elapsed_ms, error = %e, "kv call failed");
    }
    (result, elapsed_ms)
}

#[async_trait]
impl<K: RemoteKv> RemoteKv for TracedRemoteKv<K> {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let span = tracing::debug_span!("kv.get", key);
        let (result, elapsed_ms) = timed(self.inner.get(key)).instrument(span.clone()).await;
        if let Ok(value) = &result {
            span.in_scope(|| tracing::trace!(elapsed_ms, found = value.is_some(), "read"));
        }
        result
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let span = tracing::debug_span!("kv.set", key);
        let (result, elapsed_ms) = timed(self.inner.set(key, value))
            .instrument(span.clone())
            .await;
        if result.is_ok() {
            span.in_scope(|| tracing::debug!(elapsed_ms, value_len = value.len(), "written"));
        }
        result
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, KvError> {
        let span = tracing::info_span!("kv.set_if_absent", key);
        let (result, elapsed_ms) = timed(self.inner.set_if_absent(key, value))
            .instrument(span.clone())
            .await;
        if let Ok(stored) = &result {
            span.in_scope(|| tracing::info!(elapsed_ms, stored, "conditional write"));
        }
        result
    }

    async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        let span = tracing::info_span!("kv.take", key);
        let (result, elapsed_ms) = timed(self.inner.take(key)).instrument(span.clone()).await;
        if let Ok(value) = &result {
            span.in_scope(|| tracing::info!(elapsed_ms, found = value.is_some(), "taken"));
        }
        result
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, KvError> {
        let span = tracing::info_span!("kv.delete_if_equals", key);
        let (result, elapsed_ms) = timed(self.inner.delete_if_equals(key, expected))
            .instrument(span.clone())
            .await;
        if let Ok(deleted) = &result {
            span.in_scope(|| tracing::info!(elapsed_ms, deleted, "conditional delete"));
        }
        result
    }

    async fn set_if_equals(
        &self,
        key: &str,
        expected: &str,
        value: &str,
    ) -> Result<bool, KvError> {
        let span = tracing::info_span!("kv.set_if_equals", key);
        let (result, elapsed_ms) = timed(self.inner.set_if_equals(key, expected, value))
            .instrument(span.clone())
            .await;
        if let Ok(replaced) = &result {
            span.in_scope(|| tracing::info!(elapsed_ms, replaced, "conditional replace"));
        }
        result
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let span = tracing::info_span!("kv.delete", key);
        let (result, elapsed_ms) = timed(self.inner.delete(key)).instrument(span.clone()).await;
        if let Ok(deleted) = &result {
            span.in_scope(|| tracing::info!(elapsed_ms, deleted, "deleted"));
        }
        result
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let span = tracing::debug_span!("kv.scan", pattern);
        let (result, elapsed_ms) = timed(self.inner.scan(pattern))
            .instrument(span.clone())
            .await;
        if let Ok(keys) = &result {
            span.in_scope(|| tracing::debug!(elapsed_ms, matched = keys.len(), "scanned"));
        }
        result
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError> {
        let result = self.inner.set_members(key).await;
        tracing::trace!(key, members = ?result.as_ref().map(Vec::len).ok(), "set members");
        result
    }

    async fn apply(&self, writes: Vec<KvWrite>) -> Result<(), KvError> {
        let span = tracing::info_span!("kv.apply", writes = writes.len());
        let (result, elapsed_ms) = timed(self.inner.apply(writes))
            .instrument(span.clone())
            .await;
        if result.is_ok() {
            span.in_scope(|| tracing::info!(elapsed_ms, "batch committed"));
        }
        result
    }

    async fn apply_if(
        &self,
        guard: &str,
        expected: Option<&str>,
        writes: Vec<KvWrite>,
    ) -> Result<bool, KvError> {
        let span = tracing::info_span!("kv.apply_if", guard, writes = writes.len());
        let (result, elapsed_ms) = timed(self.inner.apply_if(guard, expected, writes))
            .instrument(span.clone())
            .await;
        if let Ok(applied) = &result {
            span.in_scope(|| tracing::info!(elapsed_ms, applied, "guarded batch"));
        }
        result
    }

    async fn ping(&self) -> Result<(), KvError> {
        let span = tracing::info_span!("kv.ping");
        let (result, elapsed_ms) = timed(self.inner.ping()).instrument(span.clone()).await;
        if result.is_ok() {
            span.in_scope(|| tracing::info!(elapsed_ms, "pong"));
        }
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
