// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! plock-resilience: fault tolerance for calls into unreliable dependencies
//!
//! Each piece works standalone or composed:
//! - [`RetryManager`]: bounded retries under a backoff schedule
//! - [`EnhancedRetryManager`]: retries gated by a [`CircuitBreaker`] and
//!   [`RateLimiter`], with adaptive per-operation delays
//! - [`CircuitBreaker`] and [`RateLimiter`] on their own

pub mod backoff;
pub mod breaker;
pub mod classify;
pub mod enhanced;
mod error;
pub mod limiter;
pub mod policy;
pub mod retry;

pub use backoff::{Backoff, RetryStrategy};
pub use breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use classify::{is_retryable, OpaqueError};
pub use enhanced::{AdaptiveRetryData, EnhancedRetryManager, RetryMetrics, RetryOutcome};
pub use error::RetryError;
pub use limiter::{RateLimiter, RateLimiterConfig};
pub use policy::{RetryCondition, RetryPolicy};
pub use retry::{RetryConfig, RetryManager, RetryStats};
