// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend selection

use crate::embedded::EmbeddedStore;
use crate::error::StoreError;
use crate::remote::RemoteStore;
use crate::store::LockStore;
use crate::traced::TracedLockStore;
use plock_adapters::{RedisConfig, RedisKv, TracedRemoteKv};
use plock_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Embedded,
    Redis,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Embedded => "embedded",
            BackendKind::Redis => "redis",
        })
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embedded" => Ok(BackendKind::Embedded),
            "redis" => Ok(BackendKind::Redis),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Directory holding the embedded database
    pub data_dir: PathBuf,
    pub redis: RedisConfig,
}

/// Open the configured backend, wrapped for tracing
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn LockStore>, StoreError> {
    tracing::debug!(backend = %config.backend, "opening store");
    match config.backend {
        BackendKind::Embedded => {
            let store = EmbeddedStore::open(&config.data_dir)?;
            Ok(Arc::new(TracedLockStore::new(store)))
        }
        BackendKind::Redis => {
            let kv = RedisKv::connect(&config.redis).await?;
            let store = RemoteStore::connect(TracedRemoteKv::new(kv)).await?;
            Ok(Arc::new(TracedLockStore::new(store)))
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
