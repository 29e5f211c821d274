// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded max-heap of lock requests

use crate::enhanced::{EnhancedLockRequest, Priority};
use crate::error::LockError;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A waiting request plus its heap bookkeeping
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub request: EnhancedLockRequest,
    /// Enqueue order; breaks ties between identical timestamps
    seq: u64,
}

impl QueueItem {
    pub fn id(&self) -> &str {
        &self.request.id
    }

    pub fn priority(&self) -> Priority {
        self.request.priority
    }
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Greater = served first: higher priority, then earlier request, then earlier enqueue.
impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| other.request.requested_at.cmp(&self.request.requested_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Snapshot of queue counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub len: usize,
    pub by_priority: BTreeMap<Priority, usize>,
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub total_removed: u64,
    pub total_rejected: u64,
}

#[derive(Debug)]
struct QueueState {
    heap: BinaryHeap<QueueItem>,
    next_seq: u64,
    total_enqueued: u64,
    total_dequeued: u64,
    total_removed: u64,
    total_rejected: u64,
    last_activity: Instant,
}

/// Priority-ordered, bounded admission queue
#[derive(Debug)]
pub struct PriorityQueue {
    state: RwLock<QueueState>,
    signal: Notify,
    max_size: usize,
}

impl PriorityQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: RwLock::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
                total_enqueued: 0,
                total_dequeued: 0,
                total_removed: 0,
                total_rejected: 0,
                last_activity: Instant::now(),
            }),
            signal: Notify::new(),
            max_size,
        }
    }

    /// Add a request; fails with `QUEUE_FULL` at capacity
    pub fn enqueue(&self, request: EnhancedLockRequest) -> Result<(), LockError> {
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if state.heap.len() >= self.max_size {
                state.total_rejected += 1;
                return Err(LockError::queue_full(format!(
                    "queue is at capacity ({})",
                    self.max_size
                )));
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.total_enqueued += 1;
            state.last_activity = Instant::now();
            state.heap.push(QueueItem { request, seq });
        }
        self.signal.notify_one();
        Ok(())
    }

    /// Pop the highest-priority request, if any
    pub fn dequeue(&self) -> Option<QueueItem> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let item = state.heap.pop()?;
        state.total_dequeued += 1;
        state.last_activity = Instant::now();
        Some(item)
    }

    /// Wait for a request until `timeout` elapses or `cancel` fires.
    pub async fn dequeue_with_timeout(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<QueueItem, LockError> {
        self.dequeue_until(Instant::now() + timeout, cancel).await
    }

    pub(crate) async fn dequeue_until(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<QueueItem, LockError> {
        loop {
            let notified = self.signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.dequeue() {
                return Ok(item);
            }

            tokio::select! {
                biased;
                _ = &mut notified => {}
                _ = cancel.cancelled() => {
                    self.pass_wakeup();
                    return Err(LockError::cancelled("dequeue cancelled"));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.pass_wakeup();
                    return Err(LockError::timeout("timed out waiting for queued request"));
                }
            }
        }
    }

    // A waiter leaving may have consumed the wakeup meant for an item still queued.
    fn pass_wakeup(&self) {
        if !self.is_empty() {
            self.signal.notify_one();
        }
    }

    /// Drop a still-queued request by id
    pub fn remove(&self, id: &str) -> Option<QueueItem> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let mut items = std::mem::take(&mut state.heap).into_vec();
        let removed = items
            .iter()
            .position(|item| item.id() == id)
            .map(|idx| items.swap_remove(idx));
        state.heap = BinaryHeap::from(items);
        if removed.is_some() {
            state.total_removed += 1;
            state.last_activity = Instant::now();
        }
        removed
    }

    pub fn peek(&self) -> Option<QueueItem> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.heap.peek().cloned()
    }

    /// Zero-based service position of a queued request
    pub fn position(&self, id: &str) -> Option<usize> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let target = state.heap.iter().find(|item| item.id() == id)?;
        Some(state.heap.iter().filter(|item| *item > target).count())
    }

    pub fn len(&self) -> usize {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Time since the last enqueue, dequeue or removal
    pub fn idle_for(&self) -> Duration {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.last_activity.elapsed()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let mut by_priority = BTreeMap::new();
        for item in state.heap.iter() {
            *by_priority.entry(item.priority()).or_insert(0) += 1;
        }
        QueueStats {
            len: state.heap.len(),
            by_priority,
            total_enqueued: state.total_enqueued,
            total_dequeued: state.total_dequeued,
            total_removed: state.total_removed,
            total_rejected: state.total_rejected,
        }
    }
}

#[cfg(test)]
#[path = "priority_tests.rs"]
mod tests;
