// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake remote key-value service for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{KvError, KvWrite, RemoteKv};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

/// Recorded key-value call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvCall {
    Get(String),
    Set(String),
    SetIfAbsent(String),
    Take(String),
    DeleteIfEquals(String),
    SetIfEquals(String),
    Delete(String),
    Scan(String),
    SetMembers(String),
    Apply(usize),
    ApplyIf(String, usize),
    Ping,
}

#[derive(Default)]
struct FakeState {
    strings: BTreeMap<String, String>,
    sets: BTreeMap<String, BTreeSet<String>>,
    /// Calls still to fail before the service "recovers"
    failures: u32,
}

impl FakeState {
    fn write_all(&mut self, writes: Vec<KvWrite>) {
        for write in writes {
            match write {
                KvWrite::Set { key, value } => {
                    self.strings.insert(key, value);
                }
                KvWrite::Delete { key } => {
                    self.strings.remove(&key);
                    self.sets.remove(&key);
                }
                KvWrite::SetAdd { key, member } => {
                    self.sets.entry(key).or_default().insert(member);
                }
                KvWrite::SetRemove { key, member } => {
                    if let Some(members) = self.sets.get_mut(&key) {
                        members.remove(&member);
                        if members.is_empty() {
                            self.sets.remove(&key);
                        }
                    }
                }
            }
        }
    }
}

/// In-memory remote key-value service
#[derive(Clone, Default)]
pub struct FakeRemoteKv {
    state: Arc<Mutex<FakeState>>,
    calls: Arc<Mutex<Vec<KvCall>>>,
}

impl FakeRemoteKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<KvCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Fail the next `count` calls with a connection error
    pub fn fail_next(&self, count: u32) {
        self.lock().failures = count;
    }

    /// Seed a value without recording a call
    pub fn insert(&self, key: &str, value: &str) {
        self.lock()
            .strings
            .insert(key.to_string(), value.to_string());
    }

    /// Read a value without recording a call
    pub fn value(&self, key: &str) -> Option<String> {
        self.lock().strings.get(key).cloned()
    }

    /// All string keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.lock().strings.keys().cloned().collect()
    }

    /// All set keys, sorted
    pub fn set_keys(&self) -> Vec<String> {
        self.lock().sets.keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `call`, then run `f` unless a failure is pending
    fn call<T>(&self, call: KvCall, f: impl FnOnce(&mut FakeState) -> T) -> Result<T, KvError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
        let mut state = self.lock();
        if state.failures > 0 {
            state.failures -= 1;
            return Err(KvError::Connection("injected failure".to_string()));
        }
        Ok(f(&mut state))
    }
}

/// Glob match supporting `*` only
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return text.is_empty();
    };
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

#[async_trait]
impl RemoteKv for FakeRemoteKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.call(KvCall::Get(key.to_string()), |s| s.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.call(KvCall::Set(key.to_string()), |s| {
            s.strings.insert(key.to_string(), value.to_string());
        })
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, KvError> {
        self.call(KvCall::SetIfAbsent(key.to_string()), |s| {
            if s.strings.contains_key(key) {
                return false;
            }
            s.strings.insert(key.to_string(), value.to_string());
            true
        })
    }

    async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        self.call(KvCall::Take(key.to_string()), |s| s.strings.remove(key))
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, KvError> {
        self.call(KvCall::DeleteIfEquals(key.to_string()), |s| {
            if s.strings.get(key).map(String::as_str) != Some(expected) {
                return false;
            }
            s.strings.remove(key);
            true
        })
    }

    async fn set_if_equals(
        &self,
        key: &str,
        expected: &str,
        value: &str,
    ) -> Result<bool, KvError> {
        self.call(KvCall::SetIfEquals(key.to_string()), |s| {
            if s.strings.get(key).map(String::as_str) != Some(expected) {
                return false;
            }
            s.strings.insert(key.to_string(), value.to_string());
            true
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.call(KvCall::Delete(key.to_string()), |s| {
            let removed = s.strings.remove(key).is_some();
            removed | s.sets.remove(key).is_some()
        })
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        self.call(KvCall::Scan(pattern.to_string()), |s| {
            s.strings
                .keys()
                .chain(s.sets.keys())
                .filter(|k| glob_match(pattern, k))
                .cloned()
                .collect()
        })
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError> {
        self.call(KvCall::SetMembers(key.to_string()), |s| {
            s.sets
                .get(key)
                .map(|m| m.iter().cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn apply(&self, writes: Vec<KvWrite>) -> Result<(), KvError> {
        self.call(KvCall::Apply(writes.len()), |s| s.write_all(writes))
    }

    async fn apply_if(
        &self,
        guard: &str,
        expected: Option<&str>,
        writes: Vec<KvWrite>,
    ) -> Result<bool, KvError> {
        self.call(KvCall::ApplyIf(guard.to_string(), writes.len()), |s| {
            if s.strings.get(guard).map(String::as_str) != expected {
                return false;
            }
            s.write_all(writes);
            true
        })
    }

    async fn ping(&self) -> Result<(), KvError> {
        self.call(KvCall::Ping, |_| ())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
