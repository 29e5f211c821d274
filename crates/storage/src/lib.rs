// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! plock-storage: durable lock, pull-status and run-history stores
//!
//! Two interchangeable [`LockStore`] backends:
//! - [`EmbeddedStore`]: single-process sled database, every write one transaction
//! - [`RemoteStore`]: any [`plock_adapters::RemoteKv`] service, shared between processes

mod config;
mod embedded;
mod error;
pub mod keys;
mod outputs;
mod pull_status;
mod remote;
mod store;
mod traced;

pub use config::{open, BackendKind, StoreConfig};
pub use embedded::EmbeddedStore;
pub use error::StoreError;
pub use outputs::{latest_per_project, merge_active_pull};
pub use pull_status::{merge_results, update_project};
pub use remote::RemoteStore;
pub use store::{LockAttempt, LockStore, OutputScope};
pub use traced::TracedLockStore;
