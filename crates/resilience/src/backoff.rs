// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delay schedules between retry attempts
//!
//! All functions here are pure. Randomness enters only through the `sample`
//! argument of [`Backoff::delay`], a uniform value in `[0, 1)`.

use plock_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    FixedDelay,
    ExponentialBackoff,
    LinearBackoff,
    JitteredExponential,
    AdaptiveBackoff,
}

impl RetryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryStrategy::FixedDelay => "fixed_delay",
            RetryStrategy::ExponentialBackoff => "exponential_backoff",
            RetryStrategy::LinearBackoff => "linear_backoff",
            RetryStrategy::JitteredExponential => "jittered_exponential",
            RetryStrategy::AdaptiveBackoff => "adaptive_backoff",
        }
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetryStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed_delay" => Ok(RetryStrategy::FixedDelay),
            "exponential_backoff" => Ok(RetryStrategy::ExponentialBackoff),
            "linear_backoff" => Ok(RetryStrategy::LinearBackoff),
            "jittered_exponential" => Ok(RetryStrategy::JitteredExponential),
            "adaptive_backoff" => Ok(RetryStrategy::AdaptiveBackoff),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Delay schedule parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backoff {
    pub strategy: RetryStrategy,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Jitter amplitude as a fraction of the exponential delay
    pub jitter_percent: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::JitteredExponential,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_percent: 0.1,
        }
    }
}

impl Backoff {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_delay > self.max_delay {
            return Err(ConfigError::Invalid {
                field: "base_delay",
                reason: format!(
                    "{:?} exceeds max_delay {:?}",
                    self.base_delay, self.max_delay
                ),
            });
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(ConfigError::Invalid {
                field: "backoff_multiplier",
                reason: format!("{} must be at least 1.0", self.backoff_multiplier),
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_percent) {
            return Err(ConfigError::Invalid {
                field: "jitter_percent",
                reason: format!("{} must be within [0, 1]", self.jitter_percent),
            });
        }
        Ok(())
    }

    /// Delay before the attempt following `attempt` (1-based).
    ///
    /// Adaptive delays need per-operation history; without it they fall back
    /// to the exponential schedule, as here.
    pub fn delay(&self, attempt: u32, sample: f64) -> Duration {
        match self.strategy {
            RetryStrategy::FixedDelay => self.base_delay,
            RetryStrategy::ExponentialBackoff | RetryStrategy::AdaptiveBackoff => {
                self.exponential(attempt)
            }
            RetryStrategy::LinearBackoff => self.linear(attempt),
            RetryStrategy::JitteredExponential => self.jittered(attempt, sample),
        }
    }

    /// `min(max_delay, base * multiplier^(attempt-1))`
    pub fn exponential(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        self.cap(scaled)
    }

    /// `min(max_delay, base * attempt)`
    pub fn linear(&self, attempt: u32) -> Duration {
        self.cap(self.base_delay.as_secs_f64() * f64::from(attempt))
    }

    /// Exponential delay plus up to `±jitter_percent` of itself.
    ///
    /// The result is clamped to `max_delay`; a negative result falls back to
    /// `base_delay`.
    pub fn jittered(&self, attempt: u32, sample: f64) -> Duration {
        let base = self.exponential(attempt).as_secs_f64();
        let max_jitter = base * self.jitter_percent.max(0.0);
        let jitter = (sample * 2.0 * max_jitter) - max_jitter;
        let delayed = base + jitter;
        if delayed < 0.0 {
            return self.base_delay;
        }
        self.cap(delayed)
    }

    /// Exponential delay scaled by recent outcomes of one operation.
    ///
    /// Success rates above 0.8 shrink the delay, below 0.3 grow it, and the
    /// band in between nudges it. Slow operations (average latency above the
    /// exponential delay) add another 20%. The result is clamped to
    /// `[base_delay, max_delay]`.
    pub fn adaptive(&self, attempt: u32, success_rate: f64, average_latency: Duration) -> Duration {
        let exponential = self.exponential(attempt);
        let mut factor = adaptive_factor(success_rate);
        if average_latency > exponential {
            factor *= 1.2;
        }
        let scaled = exponential.as_secs_f64() * factor;
        self.cap(scaled).max(self.base_delay)
    }

    fn cap(&self, secs: f64) -> Duration {
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(self.max_delay)
    }
}

/// Multiplier applied to the exponential delay for a given success rate
pub fn adaptive_factor(success_rate: f64) -> f64 {
    if success_rate > 0.8 {
        0.5 + success_rate * 0.5
    } else if success_rate < 0.3 {
        1.5 + (0.3 - success_rate) * 2.0
    } else {
        1.0 + (0.6 - success_rate) * 0.5
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
