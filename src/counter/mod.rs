// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! External counter / generator store.
//!
//! Backs the identity field strategies. The layout is:
//!
//! ```text
//! HSET {collection} {field} {strategy}     # strategy map per collection
//! SET  {collection}:{field} {n}            # counter per increment field
//! TIME                                     # server clock for timestamp fields
//! ```
//!
//! The store is shared and unguarded; see [`crate::identity`] for how the
//! read-then-increment race is handled.

mod memory;
pub(crate) mod redis;

pub use self::memory::InMemoryCounterStore;
pub use self::redis::RedisCounterStore;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    #[error("Counter backend error: {0}")]
    Backend(String),
    #[error("Counter value at '{key}' is not an integer: {value}")]
    NotAnInteger { key: String, value: String },
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<i64>, CounterError>;
    async fn set(&self, key: &str, value: i64) -> Result<(), CounterError>;
    /// Atomically add one and return the new value.
    async fn incr(&self, key: &str) -> Result<i64, CounterError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, CounterError>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CounterError>;
    /// Server time as epoch milliseconds.
    async fn time(&self) -> Result<i64, CounterError>;
}

/// Counter key for an increment field.
pub fn counter_key(collection: &str, field: &str) -> String {
    format!("{}:{}", collection, field)
}
