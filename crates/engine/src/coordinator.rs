// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock coordinator
//!
//! Store calls go through the retry manager (and with it the circuit
//! breaker and rate limiter). A contended request waits in its resource's
//! queue; when the holder releases or its lock expires, the next queued
//! request is granted the lock directly. A request that would wait on a pull
//! already waiting on the requester, directly or through others, is refused
//! with `DEADLOCK`.

use crate::deadlock::WaitForGraph;
use crate::error::CoordinatorError;
use plock_core::{
    Clock, ConfigError, EnhancedLock, EnhancedLockRequest, EnhancedLockState, ErrorCode,
    LockError, ProjectLock, PullRequest, QueueConfig, ResourceIdentifier, ResourceQueue,
    SystemClock, TimeoutManager,
};
use plock_resilience::{EnhancedRetryManager, RetryMetrics, RetryPolicy};
use plock_storage::{LockAttempt, LockStore, StoreError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    pub queue: QueueConfig,
    pub retry: RetryPolicy,
}

/// Outcome of a lock request
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Acquired(EnhancedLock),
    /// The requesting pull already holds the resource
    AlreadyHeld(ProjectLock),
    /// Waiting behind the current holder; 1 is next in line
    Queued { position: usize },
}

#[derive(Debug)]
struct Expiry {
    lock_id: String,
    resource: ResourceIdentifier,
}

/// A caller parked in `acquire_and_wait`
enum Waiter {
    Waiting(oneshot::Sender<Result<EnhancedLock, LockError>>),
    /// Gave up while a hand-off was already granting it the lock
    Abandoned,
}

pub struct LockCoordinator<C: Clock = SystemClock> {
    store: Arc<dyn LockStore>,
    queue: ResourceQueue,
    timeouts: TimeoutManager,
    retry: EnhancedRetryManager<C>,
    /// Locks granted through this coordinator, by lock id
    held: Mutex<HashMap<String, EnhancedLock>>,
    waiters: Mutex<HashMap<String, Waiter>>,
    waits_for: Mutex<WaitForGraph>,
    /// Ids of locks that expired, kept until the next idle reclaim
    expired: Mutex<HashMap<String, Instant>>,
    expiries: tokio::sync::Mutex<mpsc::UnboundedReceiver<Expiry>>,
    idle_reclaim_after: Duration,
}

impl LockCoordinator<SystemClock> {
    pub fn new(store: Arc<dyn LockStore>, config: CoordinatorConfig) -> Result<Self, CoordinatorError> {
        Self::with_clock(store, config, SystemClock)
    }
}

impl<C: Clock> LockCoordinator<C> {
    pub fn with_clock(
        store: Arc<dyn LockStore>,
        config: CoordinatorConfig,
        clock: C,
    ) -> Result<Self, CoordinatorError> {
        if config.queue.idle_reclaim_after.is_zero() {
            return Err(ConfigError::Invalid {
                field: "idle_reclaim_after",
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        let retry = EnhancedRetryManager::with_clock(config.retry, clock)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let timeouts = TimeoutManager::new(Arc::new(move |lock_id: &str, resource: &ResourceIdentifier| {
            let _ = tx.send(Expiry {
                lock_id: lock_id.to_string(),
                resource: resource.clone(),
            });
        }));
        Ok(Self {
            store,
            queue: ResourceQueue::new(&config.queue),
            timeouts,
            retry,
            held: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
            waits_for: Mutex::new(WaitForGraph::default()),
            expired: Mutex::new(HashMap::new()),
            expiries: tokio::sync::Mutex::new(rx),
            idle_reclaim_after: config.queue.idle_reclaim_after,
        })
    }

    /// Try to take the resource, queueing the request when another pull
    /// holds it.
    ///
    /// A queued request may later be granted without the caller asking
    /// again; [`Self::lock`] reports it once granted.
    pub async fn acquire(
        &self,
        request: EnhancedLockRequest,
        cancel: &CancellationToken,
    ) -> Result<Acquisition, CoordinatorError> {
        let key = request.resource.key();
        if self.queue.len(&key) > 0 {
            // Others are already waiting; only the holding pull skips the line
            let current = self.get_lock(&request.resource, cancel).await?;
            if let Some(current) = &current {
                if current.pull.num == request.pull.num {
                    return Ok(Acquisition::AlreadyHeld(current.clone()));
                }
            }
            return self.enqueue(request, current.as_ref(), cancel).await;
        }

        let attempt = self.try_lock(request.to_project_lock(), cancel).await?;
        if attempt.acquired {
            return Ok(Acquisition::Acquired(self.grant(&request)));
        }
        if attempt.lock.pull.num == request.pull.num {
            return Ok(Acquisition::AlreadyHeld(attempt.lock));
        }
        self.enqueue(request, Some(&attempt.lock), cancel).await
    }

    /// Like [`Self::acquire`], but wait up to `wait` for a queued request to
    /// be granted. Never returns [`Acquisition::Queued`].
    pub async fn acquire_and_wait(
        &self,
        request: EnhancedLockRequest,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Acquisition, CoordinatorError> {
        let id = request.id.clone();
        let key = request.resource.key();
        let (tx, rx) = oneshot::channel();
        self.waiters().insert(id.clone(), Waiter::Waiting(tx));

        let acquisition = match self.acquire(request, cancel).await {
            Ok(acquisition) => acquisition,
            Err(e) => {
                self.waiters().remove(&id);
                return Err(e);
            }
        };
        if !matches!(acquisition, Acquisition::Queued { .. }) {
            self.waiters().remove(&id);
            return Ok(acquisition);
        }
        self.wait_for_grant(&key, &id, rx, wait, cancel).await
    }

    async fn wait_for_grant(
        &self,
        key: &str,
        id: &str,
        mut rx: oneshot::Receiver<Result<EnhancedLock, LockError>>,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Acquisition, CoordinatorError> {
        let gave_up = tokio::select! {
            grant = &mut rx => {
                let lock = grant
                    .map_err(|_| LockError::cancelled(format!("request {id} was dropped")))??;
                return Ok(Acquisition::Acquired(lock));
            }
            _ = tokio::time::sleep(wait) => {
                LockError::timeout(format!("no grant for {key} within {wait:?}"))
            }
            _ = cancel.cancelled() => {
                LockError::cancelled(format!("wait for {key} cancelled"))
            }
        };

        let dequeued = self.queue.remove(key, id).is_none();
        self.waits_for().remove(id);
        let delivered = {
            let mut waiters = self.waiters();
            match waiters.remove(id) {
                None => true,
                Some(_) if dequeued => {
                    // A hand-off is granting this request right now
                    waiters.insert(id.to_string(), Waiter::Abandoned);
                    false
                }
                Some(_) => false,
            }
        };
        if delivered {
            if let Ok(Ok(lock)) = rx.await {
                return Ok(Acquisition::Acquired(lock));
            }
        }
        tracing::info!(resource = key, request_id = id, error = %gave_up, "stopped waiting for lock");
        Err(gave_up.into())
    }

    /// Withdraw a queued request. Returns whether it was still queued.
    pub fn cancel(&self, resource: &ResourceIdentifier, request_id: &str) -> bool {
        if self.queue.remove(&resource.key(), request_id).is_none() {
            return false;
        }
        self.waits_for().remove(request_id);
        if let Some(Waiter::Waiting(tx)) = self.waiters().remove(request_id) {
            let _ = tx.send(Err(LockError::cancelled(format!(
                "request {request_id} withdrawn"
            ))));
        }
        tracing::info!(%resource, request_id, "lock request withdrawn");
        true
    }

    /// Release a lock granted by this coordinator and hand the resource to
    /// the next queued request
    pub async fn release(&self, lock_id: &str) -> Result<Option<ProjectLock>, CoordinatorError> {
        let Some(mut lock) = self.held().remove(lock_id) else {
            return Err(self.not_held(lock_id).into());
        };
        self.timeouts.clear_timeout(lock_id);

        let released = match self.unlock(&lock.resource, &CancellationToken::new()).await {
            Ok(released) => released,
            Err(e) => {
                self.held().insert(lock_id.to_string(), lock);
                return Err(e);
            }
        };
        lock.transition(EnhancedLockState::Released);
        tracing::info!(lock_id, resource = %lock.resource, version = lock.version, "lock released");

        self.hand_off(&lock.resource).await;
        Ok(released)
    }

    /// Push a held lock's expiry out to `ttl` from now
    pub fn extend(&self, lock_id: &str, ttl: Duration) -> Result<EnhancedLock, CoordinatorError> {
        let mut held = self.held();
        let lock = held.get_mut(lock_id).ok_or_else(|| self.not_held(lock_id))?;
        match self.timeouts.extend_timeout(lock_id, ttl) {
            Ok(()) => {}
            // Granted without a timeout, or its timer fired and awaits the loop
            Err(e) if e.code == ErrorCode::LockNotFound => {
                self.timeouts.set_timeout(lock_id, lock.resource.clone(), ttl);
            }
            Err(e) => return Err(e.into()),
        }
        lock.extend(ttl);
        tracing::debug!(lock_id, ?ttl, "lock extended");
        Ok(lock.clone())
    }

    /// Handle lock expiries and reclaim idle queues until `cancel` fires
    pub async fn run_expiry_loop(&self, cancel: CancellationToken) {
        let mut expiries = self.expiries.lock().await;
        let mut reclaim = tokio::time::interval(self.idle_reclaim_after);
        reclaim.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(expiry) = expiries.recv() => {
                    if let Err(e) = self.expire(expiry).await {
                        tracing::error!(error = %e, "failed to release expired lock");
                    }
                }
                _ = reclaim.tick() => {
                    self.reclaim_idle();
                }
            }
        }
        tracing::debug!("expiry loop stopped");
    }

    async fn expire(&self, expiry: Expiry) -> Result<(), CoordinatorError> {
        // Extended after the timer fired
        if self.timeouts.table().contains(&expiry.lock_id) {
            tracing::debug!(lock_id = %expiry.lock_id, "ignoring stale expiry");
            return Ok(());
        }
        let Some(mut lock) = self.held().remove(&expiry.lock_id) else {
            return Ok(());
        };
        self.expired().insert(lock.id.clone(), Instant::now());
        lock.transition(EnhancedLockState::Expired);
        tracing::warn!(
            lock_id = %lock.id,
            resource = %expiry.resource,
            owner = %lock.owner,
            "lock expired, releasing"
        );
        self.unlock(&lock.resource, &CancellationToken::new()).await?;
        self.hand_off(&lock.resource).await;
        Ok(())
    }

    /// Drop idle resource queues and stale bookkeeping. Returns the number
    /// of queues dropped.
    pub fn reclaim_idle(&self) -> usize {
        let queues = self.queue.reclaim_idle(self.idle_reclaim_after);
        let operations = self.retry.cleanup();
        let expired = {
            let mut expired = self.expired();
            let before = expired.len();
            expired.retain(|_, at| at.elapsed() < self.idle_reclaim_after);
            before - expired.len()
        };
        let waits = {
            let mut graph = self.waits_for();
            let before = graph.len();
            graph.retain(|id, resource| self.queue.position(resource, id).is_some());
            before - graph.len()
        };
        if queues + operations + expired + waits > 0 {
            tracing::debug!(queues, operations, expired, waits, "reclaimed idle state");
        }
        queues
    }

    /// A lock granted through this coordinator, by lock (request) id
    pub fn lock(&self, lock_id: &str) -> Option<EnhancedLock> {
        self.held().get(lock_id).cloned()
    }

    pub fn held_locks(&self) -> Vec<EnhancedLock> {
        self.held().values().cloned().collect()
    }

    pub fn queue(&self) -> &ResourceQueue {
        &self.queue
    }

    pub fn retry_metrics(&self) -> RetryMetrics {
        self.retry.metrics()
    }

    async fn enqueue(
        &self,
        request: EnhancedLockRequest,
        holder: Option<&ProjectLock>,
        cancel: &CancellationToken,
    ) -> Result<Acquisition, CoordinatorError> {
        let resource = request.resource.clone();
        let id = request.id.clone();
        let priority = request.priority;
        if let Some(holder) = holder {
            self.wait_on(&request, holder)?;
        }
        if let Err(e) = self.queue.enqueue(request) {
            self.waits_for().remove(&id);
            return Err(e.into());
        }

        // The holder may have released between our attempt and the enqueue
        if self.get_lock(&resource, cancel).await?.is_none() {
            self.hand_off(&resource).await;
        }
        if let Some(lock) = self.lock(&id) {
            return Ok(Acquisition::Acquired(lock));
        }

        let position = self.queue.position(&resource.key(), &id).map_or(1, |p| p + 1);
        tracing::info!(%resource, request_id = %id, %priority, position, "lock contended, queued");
        Ok(Acquisition::Queued { position })
    }

    /// Record that `request` waits on `holder`, unless that closes a cycle
    fn wait_on(
        &self,
        request: &EnhancedLockRequest,
        holder: &ProjectLock,
    ) -> Result<(), LockError> {
        let waiter = party(&request.pull);
        let holder = party(&holder.pull);
        let mut graph = self.waits_for();
        if let Some(cycle) = graph.cycle_through(&waiter, &holder) {
            let cycle = cycle.join(" -> ");
            tracing::warn!(
                resource = %request.resource,
                request_id = %request.id,
                %cycle,
                "lock request would deadlock"
            );
            return Err(LockError::deadlock(format!(
                "waiting for {} would deadlock: {cycle}",
                request.resource
            )));
        }
        graph.add(&request.id, waiter, request.resource.key(), holder);
        Ok(())
    }

    /// Grant queued requests in order until one keeps the lock
    async fn hand_off(&self, resource: &ResourceIdentifier) {
        let key = resource.key();
        while let Some(item) = self.queue.dequeue(&key) {
            let request = item.request;
            let attempt = match self
                .try_lock(request.to_project_lock(), &CancellationToken::new())
                .await
            {
                Ok(attempt) => attempt,
                Err(e) => {
                    tracing::error!(%resource, error = %e, "hand-off failed, request stays queued");
                    self.requeue(request);
                    return;
                }
            };
            if !attempt.acquired {
                tracing::debug!(%resource, holder = attempt.lock.pull.num, "resource taken outside the queue");
                self.waits_for().retarget(&key, &party(&attempt.lock.pull));
                self.requeue(request);
                return;
            }

            let lock = self.grant(&request);
            self.waits_for().retarget(&key, &party(&request.pull));
            let waiter = self.waiters().remove(&request.id);
            match waiter {
                Some(Waiter::Waiting(tx)) => {
                    if tx.send(Ok(lock)).is_ok() {
                        return;
                    }
                }
                // Granted to a caller that will collect it with `lock`
                None => return,
                Some(Waiter::Abandoned) => {}
            }

            tracing::debug!(%resource, request_id = %request.id, "requester gone, passing lock on");
            if let Err(e) = self.drop_grant(&request.id).await {
                tracing::error!(%resource, error = %e, "failed to release abandoned grant");
                return;
            }
        }
    }

    fn requeue(&self, request: EnhancedLockRequest) {
        let id = request.id.clone();
        if let Err(e) = self.queue.enqueue(request) {
            tracing::warn!(request_id = %id, error = %e, "could not requeue request");
            self.waits_for().remove(&id);
            if let Some(Waiter::Waiting(tx)) = self.waiters().remove(&id) {
                let _ = tx.send(Err(e));
            }
        }
    }

    fn grant(&self, request: &EnhancedLockRequest) -> EnhancedLock {
        self.waits_for().remove(&request.id);
        let lock = EnhancedLock::acquired(request);
        if !request.timeout.is_zero() {
            self.timeouts
                .set_timeout(&lock.id, lock.resource.clone(), request.timeout);
        }
        self.held().insert(lock.id.clone(), lock.clone());
        tracing::info!(
            lock_id = %lock.id,
            resource = %lock.resource,
            priority = %lock.priority,
            owner = %lock.owner,
            "lock granted"
        );
        lock
    }

    async fn drop_grant(&self, lock_id: &str) -> Result<(), CoordinatorError> {
        self.timeouts.clear_timeout(lock_id);
        let Some(lock) = self.held().remove(lock_id) else {
            return Ok(());
        };
        self.unlock(&lock.resource, &CancellationToken::new()).await?;
        Ok(())
    }

    async fn try_lock(
        &self,
        lock: ProjectLock,
        cancel: &CancellationToken,
    ) -> Result<LockAttempt, CoordinatorError> {
        let store = &self.store;
        self.with_retry("store.try_lock", cancel, |_| store.try_lock(lock.clone()))
            .await
    }

    async fn unlock(
        &self,
        resource: &ResourceIdentifier,
        cancel: &CancellationToken,
    ) -> Result<Option<ProjectLock>, CoordinatorError> {
        let store = &self.store;
        let project = resource.to_project();
        let workspace = resource.workspace.as_str();
        self.with_retry("store.unlock", cancel, |_| store.unlock(&project, workspace))
            .await
    }

    async fn get_lock(
        &self,
        resource: &ResourceIdentifier,
        cancel: &CancellationToken,
    ) -> Result<Option<ProjectLock>, CoordinatorError> {
        let store = &self.store;
        let project = resource.to_project();
        let workspace = resource.workspace.as_str();
        self.with_retry("store.get_lock", cancel, |_| store.get_lock(&project, workspace))
            .await
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation_id: &str,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, CoordinatorError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        Ok(self.retry.execute(operation_id, cancel, operation).await?)
    }

    fn held(&self) -> MutexGuard<'_, HashMap<String, EnhancedLock>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn waiters(&self) -> MutexGuard<'_, HashMap<String, Waiter>> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn waits_for(&self) -> MutexGuard<'_, WaitForGraph> {
        self.waits_for.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn expired(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.expired.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `LOCK_EXPIRED` for a lock that timed out, `LOCK_NOT_FOUND` otherwise
    fn not_held(&self, lock_id: &str) -> LockError {
        if self.expired().contains_key(lock_id) {
            LockError::lock_expired(format!("lock {lock_id} expired"))
        } else {
            LockError::lock_not_found(format!("lock {lock_id} is not held"))
        }
    }
}

/// Wait-for graph node for a pull
fn party(pull: &PullRequest) -> String {
    format!("{}#{}", pull.base_repo.full_name, pull.num)
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
