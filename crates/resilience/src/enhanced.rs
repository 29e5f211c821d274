// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry manager composed with a circuit breaker, a rate limiter and
//! per-operation adaptive statistics

use crate::backoff::RetryStrategy;
use crate::breaker::CircuitBreaker;
use crate::classify::is_retryable;
use crate::error::RetryError;
use crate::limiter::RateLimiter;
use crate::policy::RetryPolicy;
use plock_core::{Clock, ConfigError, HasErrorCode, SystemClock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Outcomes kept per operation
pub const MAX_RECENT_OUTCOMES: usize = 50;

/// Age past which outcomes and idle operations are dropped
pub const ADAPTIVE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryMetrics {
    pub total_operations: u64,
    /// Operations that succeeded after at least one retry
    pub successful_retries: u64,
    /// Operations that ran out of attempts or failed terminally
    pub failed_operations: u64,
    /// Calls rejected because the circuit was open
    pub circuit_breaker_rejections: u64,
    pub rate_limited: u64,
    pub adaptive_adjustments: u64,
    pub strategy_distribution: BTreeMap<RetryStrategy, u64>,
    /// Running average wall time of failed operations
    pub average_failed_latency: Duration,
    pub max_attempts_used: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOutcome {
    pub attempt: u32,
    pub success: bool,
    pub latency: Duration,
    pub at: Instant,
}

/// Rolling statistics for one operation id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptiveRetryData {
    pub success_count: u64,
    pub failure_count: u64,
    pub average_latency: Duration,
    pub recent: VecDeque<RetryOutcome>,
    pub last_updated: Instant,
}

impl AdaptiveRetryData {
    fn new(now: Instant) -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            average_latency: Duration::ZERO,
            recent: VecDeque::with_capacity(MAX_RECENT_OUTCOMES),
            last_updated: now,
        }
    }

    /// Share of successes among the retained outcomes
    pub fn success_rate(&self) -> Option<f64> {
        if self.recent.is_empty() {
            return None;
        }
        let successes = self.recent.iter().filter(|o| o.success).count();
        Some(successes as f64 / self.recent.len() as f64)
    }

    fn record(&mut self, outcome: RetryOutcome) {
        if outcome.success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.average_latency = if self.average_latency.is_zero() {
            outcome.latency
        } else {
            (self.average_latency + outcome.latency) / 2
        };
        self.last_updated = outcome.at;
        self.recent.push_back(outcome);
        self.trim(outcome.at);
    }

    fn trim(&mut self, now: Instant) {
        while self.recent.len() > MAX_RECENT_OUTCOMES {
            self.recent.pop_front();
        }
        while self
            .recent
            .front()
            .is_some_and(|o| now.saturating_duration_since(o.at) >= ADAPTIVE_WINDOW)
        {
            self.recent.pop_front();
        }
    }
}

/// Retry manager with fail-fast guards and adaptive delays.
///
/// The rate limiter is consulted once per operation; the circuit breaker
/// before every attempt. Every attempt outcome feeds the breaker and the
/// operation's adaptive statistics.
pub struct EnhancedRetryManager<C: Clock = SystemClock> {
    policy: RetryPolicy,
    clock: C,
    breaker: Option<CircuitBreaker<C>>,
    limiter: Option<RateLimiter<C>>,
    metrics: Mutex<RetryMetrics>,
    adaptive: RwLock<HashMap<String, AdaptiveRetryData>>,
}

impl EnhancedRetryManager<SystemClock> {
    pub fn new(policy: RetryPolicy) -> Result<Self, ConfigError> {
        Self::with_clock(policy, SystemClock)
    }
}

impl<C: Clock> EnhancedRetryManager<C> {
    pub fn with_clock(policy: RetryPolicy, clock: C) -> Result<Self, ConfigError> {
        policy.validate()?;
        let breaker = policy
            .circuit_breaker
            .clone()
            .map(|config| CircuitBreaker::with_clock(config, clock.clone()));
        let limiter = policy
            .rate_limiter
            .clone()
            .map(|config| RateLimiter::with_clock(config, clock.clone()));
        Ok(Self {
            policy,
            clock,
            breaker,
            limiter,
            metrics: Mutex::new(RetryMetrics::default()),
            adaptive: RwLock::new(HashMap::new()),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn breaker(&self) -> Option<&CircuitBreaker<C>> {
        self.breaker.as_ref()
    }

    pub fn limiter(&self) -> Option<&RateLimiter<C>> {
        self.limiter.as_ref()
    }

    pub fn metrics(&self) -> RetryMetrics {
        self.metrics.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn adaptive_data(&self, operation_id: &str) -> Option<AdaptiveRetryData> {
        let adaptive = self.adaptive.read().unwrap_or_else(|e| e.into_inner());
        adaptive.get(operation_id).cloned()
    }

    /// Drop statistics for operations not seen within the adaptive window
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut adaptive = self.adaptive.write().unwrap_or_else(|e| e.into_inner());
        let before = adaptive.len();
        adaptive.retain(|_, data| {
            now.saturating_duration_since(data.last_updated) < ADAPTIVE_WINDOW
        });
        before - adaptive.len()
    }

    /// Run `operation` under the policy.
    ///
    /// `operation_id` keys the adaptive statistics; calls for the same
    /// logical operation should share it.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation_id: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: HasErrorCode + Display,
    {
        self.update(|m| {
            m.total_operations += 1;
            *m.strategy_distribution
                .entry(self.policy.backoff.strategy)
                .or_insert(0) += 1;
        });

        if let Some(limiter) = &self.limiter {
            if !limiter.allow() {
                self.update(|m| m.rate_limited += 1);
                tracing::warn!(operation_id, "retry rate limited");
                return Err(RetryError::RateLimited);
            }
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let started = self.clock.now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Some(breaker) = &self.breaker {
                if !breaker.allow() {
                    self.update(|m| m.circuit_breaker_rejections += 1);
                    tracing::warn!(operation_id, attempt, "circuit open, not attempting");
                    return Err(RetryError::CircuitOpen);
                }
            }
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let attempt_started = self.clock.now();
            let result = operation(attempt).await;
            let latency = self.clock.since(attempt_started);
            self.record_outcome(operation_id, attempt, result.is_ok(), latency);

            let error = match result {
                Ok(value) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_success();
                    }
                    if attempt > 1 {
                        self.update(|m| m.successful_retries += 1);
                        tracing::info!(operation_id, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };
            if let Some(breaker) = &self.breaker {
                breaker.record_failure();
            }

            match self.verdict(&error, attempt, max_attempts) {
                Verdict::Retry => {}
                Verdict::Stop => {
                    self.record_failed_operation(started, attempt);
                    tracing::info!(operation_id, attempt, error = %error, "not retryable");
                    return Err(RetryError::NonRetryable { attempt, error });
                }
                Verdict::Exhausted => {
                    self.record_failed_operation(started, attempt);
                    tracing::warn!(
                        operation_id,
                        attempts = attempt,
                        error = %error,
                        "retries exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        error,
                    });
                }
            }

            let delay = self.next_delay(operation_id, attempt);
            tracing::warn!(
                operation_id,
                attempt,
                max_attempts,
                ?delay,
                error = %error,
                "attempt failed, retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn verdict<E: HasErrorCode + Display>(
        &self,
        error: &E,
        attempt: u32,
        max_attempts: u32,
    ) -> Verdict {
        if !self.policy.conditions.is_empty() {
            let message = error.to_string();
            for condition in &self.policy.conditions {
                if condition.error_message != message {
                    continue;
                }
                if !condition.should_retry {
                    return Verdict::Stop;
                }
                if condition.max_attempts.is_some_and(|cap| attempt >= cap) {
                    return Verdict::Exhausted;
                }
            }
        }
        if !is_retryable(error) {
            return Verdict::Stop;
        }
        if attempt >= max_attempts {
            return Verdict::Exhausted;
        }
        Verdict::Retry
    }

    fn next_delay(&self, operation_id: &str, attempt: u32) -> Duration {
        let backoff = &self.policy.backoff;
        if backoff.strategy != RetryStrategy::AdaptiveBackoff {
            return backoff.delay(attempt, rand::random::<f64>());
        }

        let stats = {
            let adaptive = self.adaptive.read().unwrap_or_else(|e| e.into_inner());
            adaptive
                .get(operation_id)
                .and_then(|data| Some((data.success_rate()?, data.average_latency)))
        };
        match stats {
            Some((success_rate, average_latency)) => {
                let delay = backoff.adaptive(attempt, success_rate, average_latency);
                self.update(|m| m.adaptive_adjustments += 1);
                tracing::debug!(operation_id, attempt, success_rate, ?delay, "adaptive backoff");
                delay
            }
            None => backoff.exponential(attempt),
        }
    }

    fn record_outcome(&self, operation_id: &str, attempt: u32, success: bool, latency: Duration) {
        let now = self.clock.now();
        let mut adaptive = self.adaptive.write().unwrap_or_else(|e| e.into_inner());
        adaptive
            .entry(operation_id.to_string())
            .or_insert_with(|| AdaptiveRetryData::new(now))
            .record(RetryOutcome {
                attempt,
                success,
                latency,
                at: now,
            });
    }

    fn record_failed_operation(&self, started: Instant, attempts: u32) {
        let elapsed = self.clock.since(started);
        self.update(|m| {
            m.failed_operations += 1;
            m.max_attempts_used = m.max_attempts_used.max(attempts);
            m.average_failed_latency = if m.average_failed_latency.is_zero() {
                elapsed
            } else {
                (m.average_failed_latency + elapsed) / 2
            };
        });
    }

    fn update(&self, f: impl FnOnce(&mut RetryMetrics)) {
        let mut metrics = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut metrics);
    }
}

enum Verdict {
    Retry,
    Stop,
    Exhausted,
}

#[cfg(test)]
#[path = "enhanced_tests.rs"]
mod tests;
