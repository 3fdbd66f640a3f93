// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resource stores: CRUD over one collection with generated identity
//! fields, timestamp and payload normalization, and (for graph stores)
//! edges kept in line with reference fields.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use resource_store::{
//!     Document, InMemoryCounterStore, InMemoryStore, ReadRequest, ResourceApi,
//!     ResourceStore, ResourceStoreConfig,
//! };
//!
//! # async fn example() -> Result<(), resource_store::ResourceError> {
//! let config = ResourceStoreConfig::from_json(r#"{"collection": "users", "required_fields": ["name"]}"#)?;
//! let store = ResourceStore::plain(
//!     config,
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(InMemoryCounterStore::new()),
//! ).await?;
//!
//! let response = store.read(ReadRequest::all().limit(10)).await?;
//! for doc in response.documents() {
//!     println!("{}", doc);
//! }
//! # Ok(())
//! # }
//! ```

mod graph;
mod pipeline;
mod plain;
mod request;

pub use graph::GraphStore;
pub use pipeline::ResourceCore;
pub use plain::PlainStore;
pub use request::{FieldFilter, ReadRequest, Sort, SortDirection};

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ResourceStoreConfig;
use crate::counter::CounterStore;
use crate::document::Document;
use crate::events::EventSink;
use crate::status::{BulkResponse, DeleteResponse, ResourceError};
use crate::storage::traits::{DocumentBackend, GraphBackend};

/// Caller-facing operations of a resource store.
///
/// Batch operations return one status per item; `Err` is reserved for
/// request-level failures.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn read(&self, request: ReadRequest) -> Result<BulkResponse, ResourceError>;
    async fn create(&self, docs: Vec<Document>) -> Result<BulkResponse, ResourceError>;
    async fn update(&self, docs: Vec<Document>) -> Result<BulkResponse, ResourceError>;
    /// Emits `<resource_name>Created` or `<resource_name>Modified` per document.
    async fn upsert(&self, docs: Vec<Document>, events: &dyn EventSink, resource_name: &str) -> Result<BulkResponse, ResourceError>;
    async fn delete(&self, ids: Vec<String>) -> Result<DeleteResponse, ResourceError>;
    /// Removes every document; returns their ids.
    async fn delete_collection(&self) -> Result<BulkResponse, ResourceError>;
}

/// A plain or graph store, chosen once at construction.
pub enum ResourceStore {
    Plain(PlainStore),
    Graph(GraphStore),
}

impl ResourceStore {
    pub async fn plain(
        config: ResourceStoreConfig,
        backend: Arc<dyn DocumentBackend>,
        counters: Arc<dyn CounterStore>,
    ) -> Result<Self, ResourceError> {
        Ok(Self::Plain(PlainStore::new(config, backend, counters).await?))
    }

    pub async fn graph(
        config: ResourceStoreConfig,
        backend: Arc<dyn GraphBackend>,
        counters: Arc<dyn CounterStore>,
    ) -> Result<Self, ResourceError> {
        Ok(Self::Graph(GraphStore::new(config, backend, counters).await?))
    }

    pub fn is_graph(&self) -> bool {
        matches!(self, Self::Graph(_))
    }

    fn api(&self) -> &dyn ResourceApi {
        match self {
            Self::Plain(store) => store,
            Self::Graph(store) => store,
        }
    }
}

#[async_trait]
impl ResourceApi for ResourceStore {
    async fn read(&self, request: ReadRequest) -> Result<BulkResponse, ResourceError> {
        self.api().read(request).await
    }

    async fn create(&self, docs: Vec<Document>) -> Result<BulkResponse, ResourceError> {
        self.api().create(docs).await
    }

    async fn update(&self, docs: Vec<Document>) -> Result<BulkResponse, ResourceError> {
        self.api().update(docs).await
    }

    async fn upsert(&self, docs: Vec<Document>, events: &dyn EventSink, resource_name: &str) -> Result<BulkResponse, ResourceError> {
        self.api().upsert(docs, events, resource_name).await
    }

    async fn delete(&self, ids: Vec<String>) -> Result<DeleteResponse, ResourceError> {
        self.api().delete(ids).await
    }

    async fn delete_collection(&self) -> Result<BulkResponse, ResourceError> {
        self.api().delete_collection().await
    }
}
