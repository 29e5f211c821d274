// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority-aware lock requests and the locks they produce

use crate::error::ConfigError;
use crate::model::{Project, ProjectLock, PullRequest, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Request priority; higher variants are served first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(ConfigError::UnknownPriority(s.to_string())),
        }
    }
}

/// The thing a lock is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    /// Repository full name
    pub namespace: String,
    /// Repo-relative path
    pub name: String,
    pub workspace: String,
    #[serde(default)]
    pub project_name: String,
}

impl ResourceIdentifier {
    pub fn from_project(project: &Project, workspace: &str) -> Self {
        Self {
            namespace: project.repo_full_name.clone(),
            name: project.path.clone(),
            workspace: workspace.to_string(),
            project_name: project.project_name.clone(),
        }
    }

    /// Queue partition key: `namespace/name/workspace`
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.name, self.workspace)
    }

    pub fn to_project(&self) -> Project {
        Project::new(&*self.namespace, &self.name, &*self.project_name)
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// A request to hold a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedLockRequest {
    pub id: String,
    pub resource: ResourceIdentifier,
    pub priority: Priority,
    /// How long the lock may be held once acquired
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub user: User,
    pub pull: PullRequest,
    pub requested_at: DateTime<Utc>,
}

impl EnhancedLockRequest {
    pub fn new(
        resource: ResourceIdentifier,
        user: User,
        pull: PullRequest,
        priority: Priority,
        timeout: Duration,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            resource,
            priority,
            timeout,
            metadata: HashMap::new(),
            user,
            pull,
            requested_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The store-level lock this request asks for
    pub fn to_project_lock(&self) -> ProjectLock {
        ProjectLock {
            project: self.resource.to_project(),
            pull: self.pull.clone(),
            user: self.user.clone(),
            workspace: self.resource.workspace.clone(),
            time: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhancedLockState {
    Pending,
    Acquired,
    Expired,
    Released,
}

/// A lock granted to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedLock {
    pub id: String,
    pub resource: ResourceIdentifier,
    pub state: EnhancedLockState,
    pub priority: Priority,
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Bumped on every state change
    pub version: u64,
}

impl EnhancedLock {
    pub fn acquired(request: &EnhancedLockRequest) -> Self {
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(request.timeout)
            .ok()
            .filter(|_| !request.timeout.is_zero())
            .and_then(|ttl| now.checked_add_signed(ttl));
        Self {
            id: request.id.clone(),
            resource: request.resource.clone(),
            state: EnhancedLockState::Acquired,
            priority: request.priority,
            owner: request.user.username.clone(),
            acquired_at: now,
            expires_at,
            metadata: request.metadata.clone(),
            version: 1,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == EnhancedLockState::Expired
            || self.expires_at.is_some_and(|at| now >= at)
    }

    /// Move to `state`, bumping the version
    pub fn transition(&mut self, state: EnhancedLockState) {
        self.state = state;
        self.version += 1;
    }

    /// Push the expiry out to `ttl` from now
    pub fn extend(&mut self, ttl: Duration) {
        self.expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        self.version += 1;
    }
}

#[cfg(test)]
#[path = "enhanced_tests.rs"]
mod tests;
