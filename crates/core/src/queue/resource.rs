// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One priority queue per resource key

use super::priority::{PriorityQueue, QueueItem, QueueStats};
use super::QueueConfig;
use crate::enhanced::EnhancedLockRequest;
use crate::error::LockError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Resource-partitioned admission queue.
///
/// Queues are created on first enqueue. Callers waiting on a resource whose
/// queue does not exist yet park on a per-key creation signal and are woken
/// when the queue appears.
#[derive(Debug)]
pub struct ResourceQueue {
    queues: RwLock<HashMap<String, Arc<PriorityQueue>>>,
    created: Mutex<HashMap<String, Arc<Notify>>>,
    max_queue_size: usize,
}

impl ResourceQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            created: Mutex::new(HashMap::new()),
            max_queue_size: config.max_queue_size,
        }
    }

    /// Queue `request` under its resource key
    pub fn enqueue(&self, request: EnhancedLockRequest) -> Result<(), LockError> {
        let key = request.resource.key();
        self.get_or_create(&key).enqueue(request)
    }

    pub fn dequeue(&self, key: &str) -> Option<QueueItem> {
        self.get(key)?.dequeue()
    }

    /// Wait for a request on `key`, including for the queue itself to appear.
    pub async fn dequeue_with_timeout(
        &self,
        key: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<QueueItem, LockError> {
        let deadline = Instant::now() + timeout;
        let queue = self.wait_for_queue(key, deadline, cancel).await?;
        queue.dequeue_until(deadline, cancel).await
    }

    async fn wait_for_queue(
        &self,
        key: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Arc<PriorityQueue>, LockError> {
        loop {
            let signal = self.creation_signal(key);
            let notified = signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(queue) = self.get(key) {
                return Ok(queue);
            }

            tokio::select! {
                biased;
                _ = &mut notified => {}
                _ = cancel.cancelled() => {
                    return Err(LockError::cancelled(format!("wait for queue {key} cancelled")));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(LockError::timeout(format!("no queue for {key} before deadline")));
                }
            }
        }
    }

    fn creation_signal(&self, key: &str) -> Arc<Notify> {
        let mut created = self.created.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(created.entry(key.to_string()).or_default())
    }

    pub fn get(&self, key: &str) -> Option<Arc<PriorityQueue>> {
        let queues = self.queues.read().unwrap_or_else(|e| e.into_inner());
        queues.get(key).cloned()
    }

    fn get_or_create(&self, key: &str) -> Arc<PriorityQueue> {
        if let Some(queue) = self.get(key) {
            return queue;
        }
        let queue = {
            let mut queues = self.queues.write().unwrap_or_else(|e| e.into_inner());
            if let Some(queue) = queues.get(key) {
                return Arc::clone(queue);
            }
            let queue = Arc::new(PriorityQueue::new(self.max_queue_size));
            queues.insert(key.to_string(), Arc::clone(&queue));
            queue
        };

        tracing::debug!(resource = key, "created resource queue");
        let signal = {
            let mut created = self.created.lock().unwrap_or_else(|e| e.into_inner());
            created.remove(key)
        };
        if let Some(signal) = signal {
            signal.notify_waiters();
        }
        queue
    }

    /// Drop a queued request for `key`
    pub fn remove(&self, key: &str, id: &str) -> Option<QueueItem> {
        self.get(key)?.remove(id)
    }

    pub fn position(&self, key: &str, id: &str) -> Option<usize> {
        self.get(key)?.position(id)
    }

    pub fn peek(&self, key: &str) -> Option<QueueItem> {
        self.get(key)?.peek()
    }

    pub fn len(&self, key: &str) -> usize {
        self.get(key).map_or(0, |queue| queue.len())
    }

    pub fn stats(&self, key: &str) -> Option<QueueStats> {
        self.get(key).map(|queue| queue.stats())
    }

    /// Number of live per-resource queues
    pub fn resource_count(&self) -> usize {
        let queues = self.queues.read().unwrap_or_else(|e| e.into_inner());
        queues.len()
    }

    /// Requests waiting across all resources
    pub fn total_len(&self) -> usize {
        let queues = self.queues.read().unwrap_or_else(|e| e.into_inner());
        queues.values().map(|queue| queue.len()).sum()
    }

    /// Drop empty queues idle for at least `idle_for` that no caller holds.
    ///
    /// Returns the number of queues reclaimed.
    pub fn reclaim_idle(&self, idle_for: Duration) -> usize {
        let reclaimed = {
            let mut queues = self.queues.write().unwrap_or_else(|e| e.into_inner());
            let before = queues.len();
            queues.retain(|_, queue| {
                Arc::strong_count(queue) > 1 || !queue.is_empty() || queue.idle_for() < idle_for
            });
            before - queues.len()
        };

        // Signals nobody is parked on are leftovers from waiters that found
        // their queue on the recheck.
        let mut created = self.created.lock().unwrap_or_else(|e| e.into_inner());
        created.retain(|_, signal| Arc::strong_count(signal) > 1);

        if reclaimed > 0 {
            tracing::debug!(reclaimed, "reclaimed idle resource queues");
        }
        reclaimed
    }
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
