// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use plock_core::{ErrorCode, HasErrorCode};
use thiserror::Error;

/// Why a retried operation gave up
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("rate limited")]
    RateLimited,
    #[error("retry cancelled")]
    Cancelled,
    #[error("operation not retryable (attempt {attempt}): {error}")]
    NonRetryable { attempt: u32, error: E },
    #[error("operation failed after {attempts} attempts: {error}")]
    Exhausted { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    /// The last error returned by the operation, if it ran at all
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::NonRetryable { error, .. } | RetryError::Exhausted { error, .. } => {
                Some(error)
            }
            RetryError::CircuitOpen | RetryError::RateLimited | RetryError::Cancelled => None,
        }
    }
}

impl<E: HasErrorCode> HasErrorCode for RetryError<E> {
    fn error_code(&self) -> Option<ErrorCode> {
        match self {
            RetryError::CircuitOpen | RetryError::RateLimited => Some(ErrorCode::BackendError),
            RetryError::Cancelled => Some(ErrorCode::Cancelled),
            RetryError::NonRetryable { error, .. } | RetryError::Exhausted { error, .. } => {
                error.error_code()
            }
        }
    }
}
