//! Redis-backed counter store.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, AsyncCommands, Client};
use std::collections::HashMap;

use super::{CounterError, CounterStore};
use crate::resilience::retry::{retry, retry_when, RetryConfig};

/// Connection-level failures worth another attempt. Command errors such as
/// `WRONGTYPE` are returned at once.
pub(crate) fn is_transient(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_timeout() || err.is_connection_dropped() || err.is_connection_refusal()
}

pub struct RedisCounterStore {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "resources:" → "resources:users:seq")
    prefix: String,
}

impl RedisCounterStore {
    pub async fn new(connection_string: &str) -> Result<Self, CounterError> {
        Self::with_prefix(connection_string, None).await
    }

    pub async fn with_prefix(connection_string: &str, prefix: Option<&str>) -> Result<Self, CounterError> {
        let client = Client::open(connection_string).map_err(|e| CounterError::Backend(e.to_string()))?;

        let connection = retry("redis_counter_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| CounterError::Backend(e.to_string()))?;

        Ok(Self::from_connection(connection, prefix))
    }

    /// Share an existing connection (e.g. with [`crate::events::RedisStreamSink`]).
    pub fn from_connection(connection: ConnectionManager, prefix: Option<&str>) -> Self {
        Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
        }
    }

    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, CounterError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);

        let raw: Option<String> = retry_when("redis_counter_get", &RetryConfig::query(), is_transient, || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move { conn.get(&key).await }
        })
        .await
        .map_err(|e: redis::RedisError| CounterError::Backend(e.to_string()))?;

        raw.map(|s| {
            s.trim()
                .parse::<i64>()
                .map_err(|_| CounterError::NotAnInteger { key: key.clone(), value: s.clone() })
        })
        .transpose()
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), CounterError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);

        retry_when("redis_counter_set", &RetryConfig::query(), is_transient, || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let _: () = conn.set(&key, value).await?;
                Ok(())
            }
        })
        .await
        .map_err(|e: redis::RedisError| CounterError::Backend(e.to_string()))
    }

    async fn incr(&self, key: &str) -> Result<i64, CounterError> {
        let mut conn = self.connection.clone();
        let key = self.prefixed_key(key);

        // No retry: INCR is not idempotent
        let value: i64 = conn
            .incr(&key, 1)
            .await
            .map_err(|e: redis::RedisError| CounterError::Backend(e.to_string()))?;
        Ok(value)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, CounterError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);

        retry_when("redis_counter_hgetall", &RetryConfig::query(), is_transient, || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move { conn.hgetall(&key).await }
        })
        .await
        .map_err(|e: redis::RedisError| CounterError::Backend(e.to_string()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CounterError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);

        retry_when("redis_counter_hset", &RetryConfig::query(), is_transient, || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let _: () = conn.hset(&key, field, value).await?;
                Ok(())
            }
        })
        .await
        .map_err(|e: redis::RedisError| CounterError::Backend(e.to_string()))
    }

    async fn time(&self) -> Result<i64, CounterError> {
        let conn = self.connection.clone();

        // TIME → [unix seconds, microseconds]
        let (seconds, micros): (i64, i64) = retry_when("redis_time", &RetryConfig::query(), is_transient, || {
            let mut conn = conn.clone();
            async move { cmd("TIME").query_async(&mut conn).await }
        })
        .await
        .map_err(|e: redis::RedisError| CounterError::Backend(e.to_string()))?;

        Ok(seconds * 1000 + micros / 1000)
    }
}
