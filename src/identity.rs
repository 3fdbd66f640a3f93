//! Identity and audit field generation for new documents.
//!
//! Strategies are registered once per collection in the counter store and
//! read back on every [`IdentityFieldGenerator::apply`], so several store
//! instances pointing at the same counter store agree on the field layout.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{CounterMode, Strategy, StrategyEntry};
use crate::counter::{counter_key, CounterStore};
use crate::document::{Document, Timestamp};
use crate::status::ResourceError;

pub const MISSING_OWNERSHIP: &str = "Object does not contain ownership information";

/// 32 lowercase hex characters.
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub struct IdentityFieldGenerator {
    counters: Arc<dyn CounterStore>,
    collection: String,
    mode: CounterMode,
}

impl IdentityFieldGenerator {
    pub fn new(counters: Arc<dyn CounterStore>, collection: &str, mode: CounterMode) -> Self {
        Self {
            counters,
            collection: collection.to_string(),
            mode,
        }
    }

    /// Write the strategy hash and seed increment counters that don't exist yet.
    pub async fn register(&self, strategies: &BTreeMap<String, StrategyEntry>) -> Result<(), ResourceError> {
        for (field, entry) in strategies {
            if entry.strategy == Strategy::Increment {
                let key = counter_key(&self.collection, field);
                if self.counters.get(&key).await?.is_none() {
                    let start = entry.starting_value.unwrap_or(0);
                    self.counters.set(&key, start).await?;
                    debug!(key = %key, start, "Seeded counter");
                }
            }
            self.counters
                .hset(&self.collection, field, entry.strategy.as_str())
                .await?;
        }
        Ok(())
    }

    /// Fill generated fields, `meta.created`, `meta.modified` and `id`.
    pub async fn apply(&self, doc: &mut Document) -> Result<(), ResourceError> {
        if !doc.has_meta() {
            return Err(ResourceError::invalid(MISSING_OWNERSHIP));
        }

        let strategies = self.counters.hgetall(&self.collection).await?;
        // HGETALL order is unspecified; keep field assignment stable
        let strategies: BTreeMap<String, String> = strategies.into_iter().collect();
        for (field, name) in &strategies {
            let Some(strategy) = Strategy::parse(name) else {
                warn!(collection = %self.collection, field = %field, strategy = %name, "Unknown field strategy");
                continue;
            };
            let value = match strategy {
                Strategy::Increment => Value::from(self.next_counter(field).await?),
                Strategy::Uuid | Strategy::Random => Value::String(generate_id()),
                Strategy::Timestamp => Value::from(self.counters.time().await?),
            };
            doc.set(field, value);
        }

        let now = chrono::Utc::now().timestamp_millis();
        if let Some(meta) = doc.meta.as_mut() {
            if meta.created.map_or(true, |c| c.is_zero()) {
                meta.created = Some(Timestamp::Millis(now));
            }
            meta.modified = Some(Timestamp::Millis(now));
        }
        if doc.id.is_empty() {
            doc.id = generate_id();
        }
        Ok(())
    }

    async fn next_counter(&self, field: &str) -> Result<i64, ResourceError> {
        let key = counter_key(&self.collection, field);
        let value = match self.mode {
            CounterMode::ReadThenIncrement => {
                let current = self.counters.get(&key).await?.unwrap_or(0);
                self.counters.incr(&key).await?;
                current
            }
            CounterMode::Atomic => self.counters.incr(&key).await? - 1,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::InMemoryCounterStore;
    use crate::document::{Attribute, Meta};

    fn owned(id: &str) -> Document {
        Document::new(id).with_meta(Meta {
            owner: vec![Attribute::new("owner", "org-1")],
            ..Default::default()
        })
    }

    fn strategies(entries: &[(&str, Strategy, Option<i64>)]) -> BTreeMap<String, StrategyEntry> {
        entries
            .iter()
            .map(|(f, s, start)| (f.to_string(), StrategyEntry { strategy: *s, starting_value: *start }))
            .collect()
    }

    #[tokio::test]
    async fn test_missing_meta_is_invalid() {
        let counters = Arc::new(InMemoryCounterStore::new());
        let generator = IdentityFieldGenerator::new(counters, "things", CounterMode::default());

        let mut doc = Document::new("a");
        let err = generator.apply(&mut doc).await.unwrap_err();
        assert_eq!(err, ResourceError::InvalidArgument(MISSING_OWNERSHIP.to_string()));

        let mut empty_meta = Document::new("a").with_meta(Meta::default());
        assert!(generator.apply(&mut empty_meta).await.is_err());
    }

    #[tokio::test]
    async fn test_generates_id_and_timestamps() {
        let counters = Arc::new(InMemoryCounterStore::new());
        let generator = IdentityFieldGenerator::new(counters, "things", CounterMode::default());

        let mut doc = owned("");
        generator.apply(&mut doc).await.unwrap();
        assert_eq!(doc.id.len(), 32);
        assert!(doc.id.chars().all(|c| c.is_ascii_hexdigit()));
        let meta = doc.meta.unwrap();
        assert!(meta.created.is_some());
        assert_eq!(meta.created, meta.modified);
    }

    #[tokio::test]
    async fn test_keeps_existing_id_and_created() {
        let counters = Arc::new(InMemoryCounterStore::new());
        let generator = IdentityFieldGenerator::new(counters, "things", CounterMode::default());

        let mut doc = owned("keep-me");
        if let Some(meta) = doc.meta.as_mut() {
            meta.created = Some(Timestamp::Millis(42));
        }
        generator.apply(&mut doc).await.unwrap();
        assert_eq!(doc.id, "keep-me");
        let meta = doc.meta.unwrap();
        assert_eq!(meta.created, Some(Timestamp::Millis(42)));
        assert!(meta.modified.unwrap().as_millis().unwrap() > 42);
    }

    #[tokio::test]
    async fn test_increment_assigns_then_increments() {
        let counters = Arc::new(InMemoryCounterStore::new());
        let generator = IdentityFieldGenerator::new(counters.clone(), "things", CounterMode::ReadThenIncrement);
        generator
            .register(&strategies(&[("seq", Strategy::Increment, Some(5))]))
            .await
            .unwrap();

        let mut values = Vec::new();
        for _ in 0..3 {
            let mut doc = owned("");
            generator.apply(&mut doc).await.unwrap();
            values.push(doc.fields["seq"].as_i64().unwrap());
        }
        assert_eq!(values, vec![5, 6, 7]);
        assert_eq!(counters.get("things:seq").await.unwrap(), Some(8));
    }

    #[tokio::test]
    async fn test_atomic_mode_matches_sequence() {
        let counters = Arc::new(InMemoryCounterStore::new());
        let generator = IdentityFieldGenerator::new(counters, "things", CounterMode::Atomic);
        generator
            .register(&strategies(&[("seq", Strategy::Increment, None)]))
            .await
            .unwrap();

        let mut a = owned("");
        let mut b = owned("");
        generator.apply(&mut a).await.unwrap();
        generator.apply(&mut b).await.unwrap();
        assert_eq!(a.fields["seq"], serde_json::json!(0));
        assert_eq!(b.fields["seq"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn test_register_does_not_reset_counter() {
        let counters = Arc::new(InMemoryCounterStore::new());
        counters.set("things:seq", 40).await.unwrap();
        let generator = IdentityFieldGenerator::new(counters.clone(), "things", CounterMode::default());
        generator
            .register(&strategies(&[("seq", Strategy::Increment, Some(1))]))
            .await
            .unwrap();
        assert_eq!(counters.get("things:seq").await.unwrap(), Some(40));
    }

    #[tokio::test]
    async fn test_uuid_and_timestamp_strategies() {
        let counters = Arc::new(InMemoryCounterStore::new());
        let generator = IdentityFieldGenerator::new(counters, "things", CounterMode::default());
        generator
            .register(&strategies(&[
                ("token", Strategy::Uuid, None),
                ("nonce", Strategy::Random, None),
                ("stamp", Strategy::Timestamp, None),
            ]))
            .await
            .unwrap();

        let mut doc = owned("x");
        generator.apply(&mut doc).await.unwrap();
        let token = doc.fields["token"].as_str().unwrap();
        assert_eq!(token.len(), 32);
        assert_ne!(doc.fields["token"], doc.fields["nonce"]);
        assert!(doc.fields["stamp"].as_i64().unwrap() > 1_600_000_000_000);
    }

    #[tokio::test]
    async fn test_id_strategy_sets_document_id() {
        let counters = Arc::new(InMemoryCounterStore::new());
        let generator = IdentityFieldGenerator::new(counters, "things", CounterMode::default());
        generator
            .register(&strategies(&[("id", Strategy::Increment, Some(100))]))
            .await
            .unwrap();

        let mut doc = owned("");
        generator.apply(&mut doc).await.unwrap();
        assert_eq!(doc.id, "100");
    }
}
