// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token-bucket rate limiter

use plock_core::{Clock, ConfigError, SystemClock};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Bucket capacity
    pub max_tokens: f64,
    /// Tokens added per second
    pub refill_rate: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_tokens: 10.0,
            refill_rate: 1.0,
        }
    }
}

impl RateLimiterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_tokens.is_finite() && self.max_tokens >= 1.0) {
            return Err(ConfigError::Invalid {
                field: "max_tokens",
                reason: format!("{} must be at least 1", self.max_tokens),
            });
        }
        if !(self.refill_rate.is_finite() && self.refill_rate >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "refill_rate",
                reason: format!("{} must be non-negative", self.refill_rate),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Admits calls while tokens remain; tokens refill continuously up to the cap.
/// The bucket starts full.
#[derive(Debug)]
pub struct RateLimiter<C: Clock = SystemClock> {
    config: RateLimiterConfig,
    clock: C,
    bucket: Mutex<Bucket>,
}

impl RateLimiter<SystemClock> {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(config: RateLimiterConfig, clock: C) -> Self {
        let bucket = Bucket {
            tokens: config.max_tokens,
            last_refill: clock.now(),
        };
        Self {
            config,
            clock,
            bucket: Mutex::new(bucket),
        }
    }

    /// Take one token if available
    pub fn allow(&self) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            tracing::debug!(tokens = bucket.tokens, "rate limited");
            false
        }
    }

    /// Tokens currently in the bucket
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        self.refill(&mut bucket);
        bucket.tokens
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let refilled = bucket.tokens + elapsed.as_secs_f64() * self.config.refill_rate;
        bucket.tokens = refilled.min(self.config.max_tokens);
        bucket.last_refill = now;
    }
}

#[cfg(test)]
#[path = "limiter_tests.rs"]
mod tests;
