// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wait-for graph between pulls
//!
//! Each queued request contributes one edge, from the pull that asked to the
//! pull holding the resource. A request whose edge would close a cycle can
//! never be granted, so it is refused instead of queued.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Wait {
    waiter: String,
    resource: String,
    holder: String,
}

#[derive(Debug, Default)]
pub(crate) struct WaitForGraph {
    /// Outgoing edge per queued request id
    waits: HashMap<String, Wait>,
}

impl WaitForGraph {
    /// The path `waiter -> holder -> ... -> waiter` that waiting on `holder`
    /// would create, if any
    pub(crate) fn cycle_through(&self, waiter: &str, holder: &str) -> Option<Vec<String>> {
        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
        for wait in self.waits.values() {
            edges
                .entry(wait.waiter.as_str())
                .or_default()
                .push(wait.holder.as_str());
        }

        let mut seen = HashSet::new();
        let mut paths = vec![vec![waiter, holder]];
        while let Some(path) = paths.pop() {
            let Some(&last) = path.last() else {
                continue;
            };
            if last == waiter {
                return Some(path.into_iter().map(str::to_string).collect());
            }
            if !seen.insert(last) {
                continue;
            }
            for &next in edges.get(last).into_iter().flatten() {
                let mut longer = path.clone();
                longer.push(next);
                paths.push(longer);
            }
        }
        None
    }

    pub(crate) fn add(
        &mut self,
        request_id: &str,
        waiter: impl Into<String>,
        resource: impl Into<String>,
        holder: impl Into<String>,
    ) {
        self.waits.insert(
            request_id.to_string(),
            Wait {
                waiter: waiter.into(),
                resource: resource.into(),
                holder: holder.into(),
            },
        );
    }

    pub(crate) fn remove(&mut self, request_id: &str) -> bool {
        self.waits.remove(request_id).is_some()
    }

    /// Point every wait on `resource` at its new holder
    pub(crate) fn retarget(&mut self, resource: &str, holder: &str) {
        for wait in self.waits.values_mut().filter(|w| w.resource == resource) {
            wait.holder = holder.to_string();
        }
    }

    /// Keep the edges for which `keep(request_id, resource)` holds
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.waits.retain(|id, wait| keep(id, &wait.resource));
    }

    pub(crate) fn len(&self) -> usize {
        self.waits.len()
    }
}

#[cfg(test)]
#[path = "deadlock_tests.rs"]
mod tests;
