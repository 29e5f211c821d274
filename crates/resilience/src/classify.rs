// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry classification
//!
//! Errors that carry a lock error code are classified by that code. Errors
//! without one fall back to their message: wording that signals an
//! authorization or request-shape problem is terminal, anything else is
//! assumed transient.

use plock_core::{ErrorCode, HasErrorCode};
use std::fmt::Display;
use thiserror::Error;

const TERMINAL_MESSAGES: &[&str] = &[
    "permission denied",
    "unauthorized",
    "forbidden",
    "invalid request",
    "malformed",
    "bad request",
];

/// Whether a failed attempt should be retried
pub fn is_retryable<E: HasErrorCode + Display>(err: &E) -> bool {
    match err.error_code() {
        Some(code) => code.is_retryable(),
        None => {
            let message = err.to_string().to_lowercase();
            !TERMINAL_MESSAGES.iter().any(|pattern| message.contains(pattern))
        }
    }
}

/// An error known only by its message, for collaborators that do not
/// report lock error codes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct OpaqueError(pub String);

impl OpaqueError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl HasErrorCode for OpaqueError {
    fn error_code(&self) -> Option<ErrorCode> {
        None
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
