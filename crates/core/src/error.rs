// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed lock errors and their retry classification

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable failure code
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    LockExists,
    LockNotFound,
    LockExpired,
    Timeout,
    QueueFull,
    Deadlock,
    BackendError,
    InvalidRequest,
    PermissionDenied,
    /// The caller's cancellation token fired while waiting
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::LockExists => "LOCK_EXISTS",
            ErrorCode::LockNotFound => "LOCK_NOT_FOUND",
            ErrorCode::LockExpired => "LOCK_EXPIRED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::QueueFull => "QUEUE_FULL",
            ErrorCode::Deadlock => "DEADLOCK",
            ErrorCode::BackendError => "BACKEND_ERROR",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }

    /// Whether an operation failing with this code is worth another attempt.
    ///
    /// Timeouts and backend failures are transient. Contention outcomes,
    /// malformed requests and authorization failures will fail the same way
    /// again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ErrorCode::Timeout | ErrorCode::BackendError | ErrorCode::QueueFull => true,
            ErrorCode::LockExists
            | ErrorCode::LockNotFound
            | ErrorCode::LockExpired
            | ErrorCode::Deadlock
            | ErrorCode::InvalidRequest
            | ErrorCode::PermissionDenied
            | ErrorCode::Cancelled => false,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock subsystem error carrying a code and a human message
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct LockError {
    pub code: ErrorCode,
    pub message: String,
}

impl LockError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn lock_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::LockExists, message)
    }

    pub fn lock_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::LockNotFound, message)
    }

    pub fn lock_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::LockExpired, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn queue_full(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::QueueFull, message)
    }

    pub fn deadlock(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Deadlock, message)
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BackendError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Cancelled, message)
    }
}

/// Errors that can report a lock error code.
///
/// Retry and circuit-breaking code classify failures through this trait
/// instead of inspecting error types at run time. Errors with no code are
/// treated as retryable.
pub trait HasErrorCode {
    fn error_code(&self) -> Option<ErrorCode>;

    fn is_retryable(&self) -> bool {
        self.error_code().map_or(true, |code| code.is_retryable())
    }
}

impl HasErrorCode for LockError {
    fn error_code(&self) -> Option<ErrorCode> {
        Some(self.code)
    }
}

/// Malformed configuration or request inputs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown priority: {0:?} (expected low, normal, high or critical)")]
    UnknownPriority(String),
    #[error("unknown retry strategy: {0:?}")]
    UnknownStrategy(String),
    #[error("unknown store backend: {0:?}")]
    UnknownBackend(String),
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl HasErrorCode for ConfigError {
    fn error_code(&self) -> Option<ErrorCode> {
        Some(ErrorCode::InvalidRequest)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
