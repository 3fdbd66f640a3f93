use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{CounterError, CounterStore};

/// Process-local counter store for tests and single-node setups.
pub struct InMemoryCounterStore {
    values: DashMap<String, i64>,
    hashes: DashMap<String, HashMap<String, String>>,
}

impl InMemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
            hashes: DashMap::new(),
        }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, CounterError> {
        Ok(self.values.get(key).map(|v| *v))
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), CounterError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, CounterError> {
        let mut entry = self.values.entry(key.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, CounterError> {
        Ok(self.hashes.get(key).map(|h| h.clone()).unwrap_or_default())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CounterError> {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn time(&self) -> Result<i64, CounterError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CounterError::Backend(e.to_string()))?;
        Ok(now.as_millis() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = InMemoryCounterStore::new();
        assert_eq!(store.get("c:f").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_incr() {
        let store = InMemoryCounterStore::new();
        store.set("c:f", 10).await.unwrap();
        assert_eq!(store.incr("c:f").await.unwrap(), 11);
        assert_eq!(store.get("c:f").await.unwrap(), Some(11));
    }

    #[tokio::test]
    async fn test_incr_missing_starts_at_one() {
        let store = InMemoryCounterStore::new();
        assert_eq!(store.incr("fresh").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_hash_roundtrip() {
        let store = InMemoryCounterStore::new();
        store.hset("users", "id", "uuid").await.unwrap();
        store.hset("users", "seq", "increment").await.unwrap();
        let map = store.hgetall("users").await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["seq"], "increment");
        assert!(store.hgetall("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_time_is_epoch_millis() {
        let store = InMemoryCounterStore::new();
        // 2020-01-01 in ms
        assert!(store.time().await.unwrap() > 1_577_836_800_000);
    }
}
