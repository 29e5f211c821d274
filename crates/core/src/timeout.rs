// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-lock expiry timers
//!
//! Each lock id owns at most one timer. A timer that fires removes its own
//! table entry before invoking the expiry callback, and only if the entry
//! still belongs to it, so a timer that was replaced, extended or cleared
//! never calls back.

use crate::enhanced::ResourceIdentifier;
use crate::error::LockError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Called with the lock id and resource when a timer fires
pub type ExpiryCallback = Arc<dyn Fn(&str, &ResourceIdentifier) + Send + Sync>;

#[derive(Debug)]
struct TimerEntry {
    generation: u64,
    resource: ResourceIdentifier,
    deadline: Instant,
    handle: AbortHandle,
}

/// Read access to the live timers, keyed by lock id
pub trait TimerStore: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, lock_id: &str) -> bool;

    /// Time left before `lock_id` expires
    fn remaining(&self, lock_id: &str) -> Option<Duration>;
}

/// Concurrent map of live timers keyed by lock id
#[derive(Debug, Default)]
pub struct TimerTable {
    timers: DashMap<String, TimerEntry>,
}

impl TimerStore for TimerTable {
    fn len(&self) -> usize {
        self.timers.len()
    }

    fn contains(&self, lock_id: &str) -> bool {
        self.timers.contains_key(lock_id)
    }

    fn remaining(&self, lock_id: &str) -> Option<Duration> {
        self.timers
            .get(lock_id)
            .map(|entry| entry.deadline.saturating_duration_since(Instant::now()))
    }
}

impl TimerTable {
    fn take_if_current(&self, lock_id: &str, generation: u64) -> Option<TimerEntry> {
        self.timers
            .remove_if(lock_id, |_, entry| entry.generation == generation)
            .map(|(_, entry)| entry)
    }
}

/// Schedules and cancels lock expiry timers.
///
/// Timers run as tokio tasks, so scheduling must happen inside a runtime.
pub struct TimeoutManager {
    table: Arc<TimerTable>,
    next_generation: AtomicU64,
    on_expire: ExpiryCallback,
}

impl TimeoutManager {
    pub fn new(on_expire: ExpiryCallback) -> Self {
        Self {
            table: Arc::new(TimerTable::default()),
            next_generation: AtomicU64::new(0),
            on_expire,
        }
    }

    /// Arm a timer for `lock_id`, replacing any existing one
    pub fn set_timeout(&self, lock_id: &str, resource: ResourceIdentifier, after: Duration) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + after;

        match self.table.timers.entry(lock_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                occupied.get().handle.abort();
                let handle = self.spawn_timer(lock_id, generation, deadline);
                occupied.insert(TimerEntry {
                    generation,
                    resource,
                    deadline,
                    handle,
                });
                tracing::debug!(lock_id, ?after, "replaced lock timeout");
            }
            Entry::Vacant(vacant) => {
                let handle = self.spawn_timer(lock_id, generation, deadline);
                vacant.insert(TimerEntry {
                    generation,
                    resource,
                    deadline,
                    handle,
                });
                tracing::debug!(lock_id, ?after, "armed lock timeout");
            }
        }
    }

    /// Re-arm an existing timer to fire `after` from now.
    ///
    /// Fails with `LOCK_NOT_FOUND` if no timer is active, including when the
    /// old timer has already fired, and with `INVALID_REQUEST` if the new
    /// deadline is earlier than the current one.
    pub fn extend_timeout(&self, lock_id: &str, after: Duration) -> Result<(), LockError> {
        let mut entry = self
            .table
            .timers
            .get_mut(lock_id)
            .ok_or_else(|| LockError::lock_not_found(format!("no timeout for lock {lock_id}")))?;

        let deadline = Instant::now() + after;
        if deadline < entry.deadline {
            let left = entry.deadline.saturating_duration_since(Instant::now());
            return Err(LockError::invalid_request(format!(
                "lock {lock_id} has {left:?} left, extension to {after:?} would shorten it"
            )));
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        entry.handle.abort();
        entry.handle = self.spawn_timer(lock_id, generation, deadline);
        entry.generation = generation;
        entry.deadline = deadline;
        tracing::debug!(lock_id, ?after, "extended lock timeout");
        Ok(())
    }

    /// Cancel a timer before it fires.
    ///
    /// Returns false when there was nothing to stop, either because no timer
    /// was set or because it already fired.
    pub fn clear_timeout(&self, lock_id: &str) -> bool {
        match self.table.timers.remove(lock_id) {
            Some((_, entry)) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every timer
    pub fn clear_all(&self) {
        self.table.timers.retain(|_, entry| {
            entry.handle.abort();
            false
        });
    }

    pub fn active_count(&self) -> usize {
        self.table.len()
    }

    pub fn remaining(&self, lock_id: &str) -> Option<Duration> {
        self.table.remaining(lock_id)
    }

    pub fn table(&self) -> &dyn TimerStore {
        self.table.as_ref()
    }

    fn spawn_timer(&self, lock_id: &str, generation: u64, deadline: Instant) -> AbortHandle {
        let table = Arc::clone(&self.table);
        let on_expire = Arc::clone(&self.on_expire);
        let lock_id = lock_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(entry) = table.take_if_current(&lock_id, generation) {
                tracing::info!(lock_id, resource = %entry.resource, "lock timeout expired");
                on_expire(&lock_id, &entry.resource);
            }
        })
        .abort_handle()
    }
}

impl Drop for TimeoutManager {
    fn drop(&mut self) {
        self.clear_all();
    }
}

#[cfg(test)]
#[path = "timeout_tests.rs"]
mod tests;
