// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::backoff::Backoff;
use crate::breaker::{CircuitBreakerConfig, CircuitState};
use crate::classify::OpaqueError;
use crate::limiter::RateLimiterConfig;
use crate::policy::RetryCondition;
use plock_core::{FakeClock, LockError};
use std::sync::atomic::{AtomicU32, Ordering};

fn policy(strategy: RetryStrategy, max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff: Backoff {
            strategy,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_percent: 0.0,
        },
        circuit_breaker: None,
        rate_limiter: None,
        conditions: Vec::new(),
    }
}

fn manager(policy: RetryPolicy) -> (EnhancedRetryManager<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    (EnhancedRetryManager::with_clock(policy, clock.clone()).unwrap(), clock)
}

async fn always_fail(
    manager: &EnhancedRetryManager<FakeClock>,
    calls: &AtomicU32,
) -> Result<(), RetryError<LockError>> {
    manager
        .execute("store.try_lock", &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LockError::backend("connection reset")) }
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn open_circuit_rejects_without_calling() {
    let mut p = policy(RetryStrategy::FixedDelay, 2);
    p.circuit_breaker = Some(CircuitBreakerConfig {
        failure_threshold: 2,
        success_threshold: 1,
        reset_timeout: Duration::from_secs(30),
    });
    let (manager, clock) = manager(p);
    let calls = AtomicU32::new(0);

    let first = always_fail(&manager, &calls).await;
    assert!(matches!(first, Err(RetryError::Exhausted { attempts: 2, .. })));
    assert_eq!(manager.breaker().unwrap().state(), CircuitState::Open);

    let second = always_fail(&manager, &calls).await;
    assert!(matches!(second, Err(RetryError::CircuitOpen)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(manager.metrics().circuit_breaker_rejections, 1);

    clock.advance(Duration::from_secs(30));
    let probe = manager
        .execute("store.try_lock", &CancellationToken::new(), |_| async {
            Ok::<_, LockError>(())
        })
        .await;
    assert!(probe.is_ok());
    assert_eq!(manager.breaker().unwrap().state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn rate_limiter_gates_operations() {
    let mut p = policy(RetryStrategy::FixedDelay, 1);
    p.rate_limiter = Some(RateLimiterConfig {
        max_tokens: 1.0,
        refill_rate: 1.0,
    });
    let (manager, clock) = manager(p);
    let ok = || async { Ok::<_, LockError>(()) };

    assert!(manager
        .execute("op", &CancellationToken::new(), |_| ok())
        .await
        .is_ok());
    let limited = manager
        .execute("op", &CancellationToken::new(), |_| ok())
        .await;
    assert!(matches!(limited, Err(RetryError::RateLimited)));
    assert_eq!(manager.metrics().rate_limited, 1);

    clock.advance(Duration::from_secs(1));
    assert!(manager
        .execute("op", &CancellationToken::new(), |_| ok())
        .await
        .is_ok());
}

#[tokio::test(start_paused = true)]
async fn condition_can_forbid_retry() {
    let p = policy(RetryStrategy::FixedDelay, 5).with_condition(RetryCondition {
        error_message: "quota exceeded".to_string(),
        should_retry: false,
        max_attempts: None,
    });
    let (manager, _) = manager(p);
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = manager
        .execute("vcs.comment", &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(OpaqueError::new("quota exceeded")) }
        })
        .await;

    assert!(matches!(result, Err(RetryError::NonRetryable { attempt: 1, .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn condition_can_cap_attempts() {
    let p = policy(RetryStrategy::FixedDelay, 5).with_condition(RetryCondition {
        error_message: "[TIMEOUT] slow".to_string(),
        should_retry: true,
        max_attempts: Some(2),
    });
    let (manager, _) = manager(p);
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = manager
        .execute("op", &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LockError::timeout("slow")) }
        })
        .await;

    assert!(matches!(result, Err(RetryError::Exhausted { attempts: 2, .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn metrics_track_retries_and_failures() {
    let (manager, _) = manager(policy(RetryStrategy::ExponentialBackoff, 3));
    let calls = AtomicU32::new(0);

    let value = manager
        .execute("op", &CancellationToken::new(), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 1 {
                    Err(LockError::timeout("slow"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();
    assert_eq!(value, 2);
    let _ = always_fail(&manager, &calls).await;

    let metrics = manager.metrics();
    assert_eq!(metrics.total_operations, 2);
    assert_eq!(metrics.successful_retries, 1);
    assert_eq!(metrics.failed_operations, 1);
    assert_eq!(metrics.max_attempts_used, 3);
    assert_eq!(
        metrics.strategy_distribution.get(&RetryStrategy::ExponentialBackoff),
        Some(&2)
    );
}

#[tokio::test(start_paused = true)]
async fn adaptive_strategy_uses_operation_history() {
    let (manager, _) = manager(policy(RetryStrategy::AdaptiveBackoff, 3));
    manager
        .execute("op", &CancellationToken::new(), |_| async {
            Ok::<_, LockError>(())
        })
        .await
        .unwrap();

    let start = tokio::time::Instant::now();
    let calls = AtomicU32::new(0);
    manager
        .execute("op", &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(LockError::backend("down")) }
        })
        .await
        .unwrap_err();

    // success rate 1/2 then 1/3: 100ms * 1.05, then 200ms * 1.133
    assert!(start.elapsed() >= Duration::from_millis(331));
    assert_eq!(manager.metrics().adaptive_adjustments, 2);

    let data = manager.adaptive_data("op").unwrap();
    assert_eq!(data.success_count, 1);
    assert_eq!(data.failure_count, 3);
    assert_eq!(data.recent.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn adaptive_without_history_uses_exponential() {
    let (manager, _) = manager(policy(RetryStrategy::AdaptiveBackoff, 2));
    assert_eq!(manager.next_delay("fresh", 2), Duration::from_millis(200));
    assert_eq!(manager.metrics().adaptive_adjustments, 0);
}

#[tokio::test(start_paused = true)]
async fn recent_outcomes_are_bounded() {
    let (manager, _) = manager(policy(RetryStrategy::FixedDelay, 1));
    for _ in 0..(MAX_RECENT_OUTCOMES + 10) {
        manager
            .execute("op", &CancellationToken::new(), |_| async {
                Ok::<_, LockError>(())
            })
            .await
            .unwrap();
    }
    let data = manager.adaptive_data("op").unwrap();
    assert_eq!(data.recent.len(), MAX_RECENT_OUTCOMES);
    assert_eq!(data.success_count, (MAX_RECENT_OUTCOMES + 10) as u64);
}

#[tokio::test(start_paused = true)]
async fn stale_outcomes_and_operations_are_evicted() {
    let (manager, clock) = manager(policy(RetryStrategy::FixedDelay, 1));
    let ok = || async { Ok::<_, LockError>(()) };
    manager
        .execute("old", &CancellationToken::new(), |_| ok())
        .await
        .unwrap();

    clock.advance(ADAPTIVE_WINDOW);
    manager
        .execute("old", &CancellationToken::new(), |_| ok())
        .await
        .unwrap();
    assert_eq!(manager.adaptive_data("old").unwrap().recent.len(), 1);

    manager
        .execute("idle", &CancellationToken::new(), |_| ok())
        .await
        .unwrap();
    clock.advance(ADAPTIVE_WINDOW + Duration::from_secs(1));

    assert_eq!(manager.cleanup(), 2);
    assert!(manager.adaptive_data("idle").is_none());
}

#[test]
fn presets_validate() {
    for policy in [
        RetryPolicy::default_policy(),
        RetryPolicy::aggressive(),
        RetryPolicy::conservative(),
    ] {
        policy.validate().unwrap();
    }
    assert_eq!(RetryPolicy::aggressive().backoff.strategy, RetryStrategy::AdaptiveBackoff);
    assert_eq!(RetryPolicy::conservative().max_attempts, 2);
    assert!(RetryPolicy::preset("reckless").is_err());
}
