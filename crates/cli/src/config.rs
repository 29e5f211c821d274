// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI configuration file
//!
//! One TOML file with `[store]`, `[queue]` and `[retry]` sections. Every
//! field is optional; missing fields take their defaults.

use plock_core::{ConfigError, QueueConfig};
use plock_resilience::RetryPolicy;
use plock_storage::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                data_dir: default_data_dir(),
                ..StoreConfig::default()
            },
            queue: QueueConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating. A `[store]` section without `data_dir`
    /// keeps the default directory.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(content)?;
        if config.store.data_dir.as_os_str().is_empty() {
            config.store.data_dir = default_data_dir();
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.max_queue_size == 0 {
            return Err(ConfigError::Invalid {
                field: "queue.max_queue_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.queue.idle_reclaim_after.is_zero() {
            return Err(ConfigError::Invalid {
                field: "queue.idle_reclaim_after",
                reason: "must be greater than zero".to_string(),
            });
        }
        self.retry.validate()
    }
}

/// `<platform data dir>/plock`, or `.plock` when the platform has none
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("plock"))
        .unwrap_or_else(|| PathBuf::from(".plock"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
