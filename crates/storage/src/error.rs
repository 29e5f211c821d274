// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store error types

use plock_adapters::KvError;
use plock_core::{ErrorCode, HasErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("db transaction failed: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("db transaction failed: lock already exists")]
    CommandLocked,
    #[error("db transaction failed: no lock exists")]
    CommandNotLocked,
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::Backend(_) | StoreError::Serialization(_) => ErrorCode::BackendError,
            StoreError::InvalidKey(_) => ErrorCode::InvalidRequest,
            StoreError::CommandLocked => ErrorCode::LockExists,
            StoreError::CommandNotLocked => ErrorCode::LockNotFound,
        }
    }
}

impl HasErrorCode for StoreError {
    fn error_code(&self) -> Option<ErrorCode> {
        Some(self.code())
    }
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<KvError> for StoreError {
    fn from(e: KvError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<sled::transaction::TransactionError<StoreError>> for StoreError {
    fn from(e: sled::transaction::TransactionError<StoreError>) -> Self {
        match e {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(e) => e.into(),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
