// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod command;
pub mod locks;
pub mod outputs;
pub mod pulls;

use crate::config::Config;
use crate::output::OutputFormat;
use plock_storage::LockStore;
use std::sync::Arc;

/// What every command runs against
pub struct Context {
    pub store: Arc<dyn LockStore>,
    pub config: Config,
    pub format: OutputFormat,
}
