// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use plock_core::ErrorCode;
use yare::parameterized;

#[parameterized(
    backend = { StoreError::Backend("io".into()), ErrorCode::BackendError },
    invalid_key = { StoreError::InvalidKey("a::b".into()), ErrorCode::InvalidRequest },
    locked = { StoreError::CommandLocked, ErrorCode::LockExists },
    not_locked = { StoreError::CommandNotLocked, ErrorCode::LockNotFound },
)]
fn codes(error: StoreError, expected: ErrorCode) {
    assert_eq!(error.code(), expected);
    assert_eq!(error.error_code(), Some(expected));
}

#[test]
fn command_lock_messages() {
    assert_eq!(
        StoreError::CommandLocked.to_string(),
        "db transaction failed: lock already exists"
    );
    assert_eq!(
        StoreError::CommandNotLocked.to_string(),
        "db transaction failed: no lock exists"
    );
}

#[test]
fn kv_failures_are_retryable_backend_errors() {
    let error: StoreError = KvError::Connection("refused".into()).into();
    assert!(error.to_string().starts_with("db transaction failed: "));
    assert!(error.is_retryable());
}

#[test]
fn command_lock_conflicts_are_terminal() {
    assert!(!StoreError::CommandLocked.is_retryable());
}
