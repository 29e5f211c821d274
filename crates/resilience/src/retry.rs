// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attempt-bounded retry loop

use crate::backoff::Backoff;
use crate::classify::is_retryable;
use crate::error::RetryError;
use plock_core::{ConfigError, HasErrorCode};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(flatten)]
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        self.backoff.validate()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Operations that succeeded only after at least one retry
    pub retry_succeeded: u64,
}

/// Runs operations under a [`RetryConfig`]
#[derive(Debug)]
pub struct RetryManager {
    config: RetryConfig,
    stats: Mutex<RetryStats>,
}

impl RetryManager {
    pub fn new(config: RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            stats: Mutex::new(RetryStats::default()),
        })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn stats(&self) -> RetryStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `operation` until it succeeds, fails terminally, runs out of
    /// attempts, or `cancel` fires. The attempt number (1-based) is passed in.
    pub async fn execute<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: HasErrorCode + Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            self.update(|s| s.attempts += 1);

            let error = match operation(attempt).await {
                Ok(value) => {
                    self.update(|s| {
                        s.successes += 1;
                        if attempt > 1 {
                            s.retry_succeeded += 1;
                        }
                    });
                    return Ok(value);
                }
                Err(error) => error,
            };
            self.update(|s| s.failures += 1);

            if !is_retryable(&error) {
                return Err(RetryError::NonRetryable { attempt, error });
            }
            if attempt >= max_attempts {
                tracing::warn!(attempts = attempt, error = %error, "retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    error,
                });
            }

            let delay = self.config.backoff.delay(attempt, rand::random::<f64>());
            tracing::warn!(attempt, max_attempts, ?delay, error = %error, "attempt failed, retrying");
            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn update(&self, f: impl FnOnce(&mut RetryStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut stats);
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
