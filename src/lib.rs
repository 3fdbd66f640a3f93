//! # Resource Store
//!
//! A generic resource-access layer between a service endpoint and a
//! document/graph database.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Caller (RPC layer)                     │
//! │  • read / create / update / upsert / delete                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                ResourceStore (Plain | Graph)                │
//! │  • FilterCompiler: filter tree → Predicate                 │
//! │  • IdentityFieldGenerator: ids, counters, audit meta       │
//! │  • TimeFieldNormalizer: epoch-ms ⇄ {seconds, nanos}        │
//! │  • PayloadCodec: opaque field ⇄ {value: bytes}             │
//! │  • EdgeSynchronizer: reference fields → graph edges        │
//! └─────────────────────────────────────────────────────────────┘
//!          │                    │                    │
//!          ▼                    ▼                    ▼
//! ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐
//! │ DocumentBackend │  │  CounterStore   │  │    EventSink    │
//! │ / GraphBackend  │  │ (memory, Redis) │  │ (Redis Stream)  │
//! │ (memory, SQL)   │  │                 │  │                 │
//! └─────────────────┘  └─────────────────┘  └─────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use resource_store::{
//!     Attribute, Document, InMemoryCounterStore, InMemoryStore, Meta, ResourceApi,
//!     ResourceStore, ResourceStoreConfig,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ResourceStoreConfig::new("users");
//!     let store = ResourceStore::plain(
//!         config,
//!         Arc::new(InMemoryStore::new()),
//!         Arc::new(InMemoryCounterStore::new()),
//!     )
//!     .await
//!     .expect("Failed to build store");
//!
//!     let doc = Document::new("")
//!         .with("name", json!("Alice"))
//!         .with_meta(Meta { owner: vec![Attribute::new("urn:owner", "org-1")], ..Default::default() });
//!
//!     let response = store.create(vec![doc]).await.expect("Failed to create");
//!     for item in &response.items {
//!         println!("{} -> {}", item.status.id, item.status.code);
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`filter`]: filter trees, the compiler and predicate evaluation
//! - [`resource`]: [`ResourceStore`] and the per-document pipeline
//! - [`storage`]: backends (in-memory documents + graph, SQL documents)
//! - [`counter`]: counter stores backing identity strategies
//! - [`events`]: lifecycle event sinks
//! - [`edges`], [`identity`], [`time`], [`payload`], [`traversal`]: pipeline stages

pub mod config;
pub mod counter;
pub mod document;
pub mod edges;
pub mod events;
pub mod filter;
pub mod identity;
pub mod metrics;
pub mod payload;
pub mod resilience;
pub mod resource;
pub mod status;
pub mod storage;
pub mod time;
pub mod traversal;

pub use config::{CounterMode, Direction, EdgeSpec, ResourceStoreConfig, Strategy, StrategyEntry};
pub use counter::{CounterError, CounterStore, InMemoryCounterStore, RedisCounterStore};
pub use document::{Attribute, Document, Meta, Timestamp};
pub use edges::EdgeSynchronizer;
pub use events::{EventError, EventSink, NoopEventSink, RecordingEventSink, RedisStreamSink};
pub use filter::{Filter, FilterCompiler, FilterError, FilterGroup, FilterNode, FilterOperation, Operator, Predicate, ValueType};
pub use identity::IdentityFieldGenerator;
pub use payload::PayloadCodec;
pub use resilience::retry::RetryConfig;
pub use resource::{GraphStore, PlainStore, ReadRequest, ResourceApi, ResourceStore, Sort, SortDirection};
pub use status::{BulkResponse, DeleteResponse, ItemStatus, OperationStatus, ResourceError, ResponseItem};
pub use storage::memory::InMemoryStore;
pub use storage::sql::SqlStore;
pub use storage::traits::{DocumentBackend, GraphBackend, StorageError};
pub use time::{TimeError, TimeFieldNormalizer};
pub use traversal::TraversalEncoder;
pub use self::metrics::LatencyTimer;
