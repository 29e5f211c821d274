// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission queues for contended locks
//!
//! [`PriorityQueue`] orders waiting requests by priority, then by request
//! time. [`ResourceQueue`] keeps one such queue per resource so contention on
//! one resource never delays requests for another.

mod priority;
mod resource;

pub use priority::{PriorityQueue, QueueItem, QueueStats};
pub use resource::ResourceQueue;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum waiting requests per resource
    pub max_queue_size: usize,
    /// Empty per-resource queues idle this long are dropped
    #[serde(with = "humantime_serde")]
    pub idle_reclaim_after: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            idle_reclaim_after: Duration::from_secs(300),
        }
    }
}
