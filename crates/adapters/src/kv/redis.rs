// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed remote key-value adapter

use super::{KvError, KvWrite, RemoteKv};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, Script};
use serde::{Deserialize, Serialize};

const DELETE_IF_EQUALS: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

const SET_IF_EQUALS: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

/// ARGV[1] is "1" when the guard must equal ARGV[2], "0" when it must be
/// unset. The writes follow as (op, key, value) triples.
const APPLY_IF: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
    if current ~= ARGV[2] then
        return 0
    end
elseif current then
    return 0
end
for i = 3, #ARGV, 3 do
    local op, key, value = ARGV[i], ARGV[i + 1], ARGV[i + 2]
    if op == 'set' then
        redis.call('SET', key, value)
    elseif op == 'del' then
        redis.call('DEL', key)
    elseif op == 'sadd' then
        redis.call('SADD', key, value)
    elseif op == 'srem' then
        redis.call('SREM', key, value)
    end
end
return 1
"#;

/// Connection settings for a Redis server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub hostname: String,
    pub port: u16,
    pub password: String,
    pub tls: bool,
    pub insecure_skip_verify: bool,
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            tls: false,
            insecure_skip_verify: false,
            db: 0,
        }
    }
}

impl RedisConfig {
    fn connection_info(&self) -> ConnectionInfo {
        let addr = if self.tls {
            ConnectionAddr::TcpTls {
                host: self.hostname.clone(),
                port: self.port,
                insecure: self.insecure_skip_verify,
                tls_params: None,
            }
        } else {
            ConnectionAddr::Tcp(self.hostname.clone(), self.port)
        };
        let password = (!self.password.is_empty()).then(|| self.password.clone());
        ConnectionInfo {
            addr,
            redis: RedisConnectionInfo {
                db: self.db,
                password,
                ..Default::default()
            },
        }
    }
}

/// Remote key-value adapter over a multiplexed Redis connection
#[derive(Clone)]
pub struct RedisKv {
    conn: MultiplexedConnection,
}

impl RedisKv {
    /// Connect and verify the server answers
    pub async fn connect(config: &RedisConfig) -> Result<Self, KvError> {
        let target = format!("{}:{}", config.hostname, config.port);
        let client = redis::Client::open(config.connection_info())
            .map_err(|e| KvError::Connection(format!("{target}: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| KvError::Connection(format!("{target}: {e}")))?;
        let kv = Self { conn };
        kv.ping()
            .await
            .map_err(|e| KvError::Connection(format!("{target}: {e}")))?;
        Ok(kv)
    }
}

impl From<redis::RedisError> for KvError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
            KvError::Connection(e.to_string())
        } else {
            KvError::Command(e.to_string())
        }
    }
}

/// A write as an `APPLY_IF` (op, key, value) triple
fn script_args(write: &KvWrite) -> (&'static str, &str, &str) {
    match write {
        KvWrite::Set { key, value } => ("set", key.as_str(), value.as_str()),
        KvWrite::Delete { key } => ("del", key.as_str(), ""),
        KvWrite::SetAdd { key, member } => ("sadd", key.as_str(), member.as_str()),
        KvWrite::SetRemove { key, member } => ("srem", key.as_str(), member.as_str()),
    }
}

#[async_trait]
impl RemoteKv for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        Ok(conn.set_nx(key, value).await?)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn.clone();
        Ok(conn.get_del(key).await?)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = Script::new(DELETE_IF_EQUALS)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn set_if_equals(
        &self,
        key: &str,
        expected: &str,
        value: &str,
    ) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let replaced: i64 = Script::new(SET_IF_EQUALS)
            .key(key)
            .arg(expected)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(replaced > 0)
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut iter = conn.scan_match::<_, String>(pattern).await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(key).await?)
    }

    async fn apply(&self, writes: Vec<KvWrite>) -> Result<(), KvError> {
        if writes.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for write in &writes {
            match write {
                KvWrite::Set { key, value } => pipe.set(key, value).ignore(),
                KvWrite::Delete { key } => pipe.del(key).ignore(),
                KvWrite::SetAdd { key, member } => pipe.sadd(key, member).ignore(),
                KvWrite::SetRemove { key, member } => pipe.srem(key, member).ignore(),
            };
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn apply_if(
        &self,
        guard: &str,
        expected: Option<&str>,
        writes: Vec<KvWrite>,
    ) -> Result<bool, KvError> {
        let script = Script::new(APPLY_IF);
        let mut invocation = script.key(guard);
        match expected {
            Some(value) => invocation.arg("1").arg(value),
            None => invocation.arg("0").arg(""),
        };
        for write in &writes {
            let (op, key, value) = script_args(write);
            invocation.arg(op).arg(key).arg(value);
        }
        let mut conn = self.conn.clone();
        let applied: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(applied > 0)
    }

    async fn ping(&self) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "redis_tests.rs"]
mod tests;
