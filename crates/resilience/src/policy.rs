// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry policy for the enhanced retry manager, with presets

use crate::backoff::{Backoff, RetryStrategy};
use crate::breaker::CircuitBreakerConfig;
use crate::limiter::RateLimiterConfig;
use crate::retry::RetryConfig;
use plock_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-error override of the default classification.
///
/// Matches when the error's message equals `error_message` exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCondition {
    pub error_message: String,
    pub should_retry: bool,
    /// Stop once this many attempts have been made for a matching error
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(flatten)]
    pub backoff: Backoff,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub rate_limiter: Option<RateLimiterConfig>,
    pub conditions: Vec<RetryCondition>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_policy()
    }
}

impl RetryPolicy {
    /// Three jittered attempts, guarded by a breaker and limiter
    pub fn default_policy() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff {
                strategy: RetryStrategy::JitteredExponential,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
                backoff_multiplier: 2.0,
                jitter_percent: 0.1,
            },
            circuit_breaker: Some(CircuitBreakerConfig {
                failure_threshold: 5,
                success_threshold: 3,
                reset_timeout: Duration::from_secs(60),
            }),
            rate_limiter: Some(RateLimiterConfig {
                max_tokens: 10.0,
                refill_rate: 1.0,
            }),
            conditions: Vec::new(),
        }
    }

    /// More attempts with adaptive delays, for critical operations
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff {
                strategy: RetryStrategy::AdaptiveBackoff,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(60),
                backoff_multiplier: 1.5,
                jitter_percent: 0.2,
            },
            circuit_breaker: Some(CircuitBreakerConfig {
                failure_threshold: 10,
                success_threshold: 5,
                reset_timeout: Duration::from_secs(120),
            }),
            rate_limiter: Some(RateLimiterConfig {
                max_tokens: 20.0,
                refill_rate: 2.0,
            }),
            conditions: Vec::new(),
        }
    }

    /// Few attempts with plain exponential delays
    pub fn conservative() -> Self {
        Self {
            max_attempts: 2,
            backoff: Backoff {
                strategy: RetryStrategy::ExponentialBackoff,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(15),
                backoff_multiplier: 2.0,
                jitter_percent: 0.05,
            },
            circuit_breaker: Some(CircuitBreakerConfig {
                failure_threshold: 3,
                success_threshold: 2,
                reset_timeout: Duration::from_secs(30),
            }),
            rate_limiter: Some(RateLimiterConfig {
                max_tokens: 5.0,
                refill_rate: 0.5,
            }),
            conditions: Vec::new(),
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "default" => Ok(Self::default_policy()),
            "aggressive" => Ok(Self::aggressive()),
            "conservative" => Ok(Self::conservative()),
            other => Err(ConfigError::Invalid {
                field: "preset",
                reason: format!("unknown retry preset {other:?}"),
            }),
        }
    }

    pub fn with_condition(mut self, condition: RetryCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// The plain retry settings, without breaker, limiter or conditions
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            backoff: self.backoff.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry_config().validate()?;
        if let Some(breaker) = &self.circuit_breaker {
            breaker.validate()?;
        }
        if let Some(limiter) = &self.rate_limiter {
            limiter.validate()?;
        }
        Ok(())
    }
}
