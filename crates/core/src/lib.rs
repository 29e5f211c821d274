// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! plock-core: shared vocabulary for project lock coordination
//!
//! This crate provides:
//! - Lock, pull-status and run-history records shared by every store backend
//! - Typed error codes and their retry classification
//! - Priority and resource-partitioned admission queues for contended locks
//! - Per-lock expiry timers

pub mod clock;
pub mod enhanced;
pub mod error;
pub mod model;
pub mod queue;
pub mod timeout;

pub use clock::{Clock, FakeClock, SystemClock};
pub use enhanced::{
    EnhancedLock, EnhancedLockRequest, EnhancedLockState, Priority, ResourceIdentifier,
};
pub use error::{ConfigError, ErrorCode, HasErrorCode, LockError};
pub use model::{
    lock_key, project_history_key, run_key, CommandLock, CommandName, OutputStatus,
    PolicySetStatus, Project, ProjectLock, ProjectOutput, ProjectPlanStatus, ProjectResult,
    ProjectStatus, PullRequest, PullStatus, Repo, ResourceStats, User, VcsHost,
};
pub use queue::{PriorityQueue, QueueConfig, QueueItem, QueueStats, ResourceQueue};
pub use timeout::{ExpiryCallback, TimeoutManager, TimerStore, TimerTable};
