// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use plock_core::FakeClock;
use std::sync::atomic::{AtomicU32, Ordering};

fn breaker(failures: u32, successes: u32) -> (CircuitBreaker<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    let config = CircuitBreakerConfig {
        failure_threshold: failures,
        success_threshold: successes,
        reset_timeout: Duration::from_secs(30),
    };
    (CircuitBreaker::with_clock(config, clock.clone()), clock)
}

async fn fail(calls: &AtomicU32) -> Result<(), &'static str> {
    calls.fetch_add(1, Ordering::SeqCst);
    Err("boom")
}

async fn succeed(calls: &AtomicU32) -> Result<(), &'static str> {
    calls.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

#[tokio::test]
async fn opens_after_threshold_and_short_circuits() {
    let (breaker, _) = breaker(2, 1);
    let calls = AtomicU32::new(0);

    assert!(matches!(breaker.execute(|| fail(&calls)).await, Err(BreakerError::Inner("boom"))));
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(matches!(breaker.execute(|| fail(&calls)).await, Err(BreakerError::Inner(_))));
    assert_eq!(breaker.state(), CircuitState::Open);

    let third = breaker.execute(|| succeed(&calls)).await;
    assert!(matches!(third, Err(BreakerError::Open)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(breaker.trips(), 1);
}

#[tokio::test]
async fn allows_probe_after_reset_timeout() {
    let (breaker, clock) = breaker(2, 1);
    let calls = AtomicU32::new(0);
    let _ = breaker.execute(|| fail(&calls)).await;
    let _ = breaker.execute(|| fail(&calls)).await;

    clock.advance(Duration::from_secs(29));
    assert_eq!(breaker.state(), CircuitState::Open);

    clock.advance(Duration::from_secs(1));
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.execute(|| succeed(&calls)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[test]
fn half_open_failure_reopens() {
    let (breaker, clock) = breaker(1, 2);
    breaker.record_failure();
    clock.advance(Duration::from_secs(30));
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    breaker.record_failure();

    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.trips(), 2);
}

#[test]
fn half_open_closes_after_success_threshold() {
    let (breaker, clock) = breaker(1, 3);
    breaker.record_failure();
    clock.advance(Duration::from_secs(31));

    breaker.record_success();
    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[test]
fn success_resets_consecutive_failures_when_closed() {
    let (breaker, _) = breaker(3, 1);
    breaker.record_failure();
    breaker.record_failure();
    breaker.record_success();
    breaker.record_failure();
    breaker.record_failure();

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures(), 2);
}

#[test]
fn reset_forces_closed() {
    let (breaker, _) = breaker(1, 1);
    breaker.record_failure();
    assert!(!breaker.allow());

    breaker.reset();
    assert!(breaker.allow());
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[test]
fn zero_thresholds_are_rejected() {
    let config = CircuitBreakerConfig {
        failure_threshold: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());
    assert!(CircuitBreakerConfig::default().validate().is_ok());
}
