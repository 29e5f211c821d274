// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! plock-engine: queued, fault-tolerant lock acquisition over a [`plock_storage::LockStore`]

mod coordinator;
mod deadlock;
mod error;

pub use coordinator::{Acquisition, CoordinatorConfig, LockCoordinator};
pub use error::CoordinatorError;
