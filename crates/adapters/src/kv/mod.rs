// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote key-value service adapters

mod redis;

pub use self::redis::{RedisConfig, RedisKv};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRemoteKv, KvCall};

use async_trait::async_trait;
use plock_core::{ErrorCode, HasErrorCode};
use thiserror::Error;

/// Errors from remote key-value operations
#[derive(Debug, Error)]
pub enum KvError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("command failed: {0}")]
    Command(String),
}

impl HasErrorCode for KvError {
    fn error_code(&self) -> Option<ErrorCode> {
        Some(ErrorCode::BackendError)
    }
}

/// One write inside an atomic [`RemoteKv::apply`] batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvWrite {
    Set { key: String, value: String },
    Delete { key: String },
    SetAdd { key: String, member: String },
    SetRemove { key: String, member: String },
}

impl KvWrite {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    pub fn set_add(key: impl Into<String>, member: impl Into<String>) -> Self {
        Self::SetAdd {
            key: key.into(),
            member: member.into(),
        }
    }

    pub fn set_remove(key: impl Into<String>, member: impl Into<String>) -> Self {
        Self::SetRemove {
            key: key.into(),
            member: member.into(),
        }
    }
}

/// Adapter for a shared remote key-value service (string keys and values,
/// plus string sets).
///
/// Every single-key operation is atomic on the service. `apply` runs its
/// whole batch as one transaction.
#[async_trait]
pub trait RemoteKv: Clone + Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// Store `value` only when `key` is unset. Returns whether it was stored.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, KvError>;

    /// Delete `key`, returning the value it held
    async fn take(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Delete `key` only while it still holds `expected`
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, KvError>;

    /// Replace `key` only while it still holds `expected`
    async fn set_if_equals(&self, key: &str, expected: &str, value: &str) -> Result<bool, KvError>;

    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// Keys matching a glob pattern (`*` wildcard)
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError>;

    async fn apply(&self, writes: Vec<KvWrite>) -> Result<(), KvError>;

    /// Run `writes` as one transaction, but only while `guard` holds
    /// `expected` (`None` meaning unset). Returns whether the batch ran.
    async fn apply_if(
        &self,
        guard: &str,
        expected: Option<&str>,
        writes: Vec<KvWrite>,
    ) -> Result<bool, KvError>;

    async fn ping(&self) -> Result<(), KvError>;
}
