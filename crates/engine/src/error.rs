// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the lock coordinator

use plock_core::{ConfigError, ErrorCode, HasErrorCode, LockError};
use plock_resilience::RetryError;
use plock_storage::StoreError;
use thiserror::Error;

/// Errors that can occur while coordinating locks
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("store call failed: {0}")]
    Store(#[from] RetryError<StoreError>),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl CoordinatorError {
    pub fn code(&self) -> ErrorCode {
        self.error_code().unwrap_or(ErrorCode::BackendError)
    }
}

impl HasErrorCode for CoordinatorError {
    fn error_code(&self) -> Option<ErrorCode> {
        match self {
            CoordinatorError::Lock(e) => e.error_code(),
            CoordinatorError::Store(e) => e.error_code(),
            CoordinatorError::Config(_) => Some(ErrorCode::InvalidRequest),
        }
    }
}
