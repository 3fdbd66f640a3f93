use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::pipeline::{self, Persistence, ResourceCore};
use super::plain::single;
use super::request::ReadRequest;
use super::ResourceApi;
use crate::config::ResourceStoreConfig;
use crate::counter::CounterStore;
use crate::document::Document;
use crate::edges::EdgeSynchronizer;
use crate::events::EventSink;
use crate::filter::Predicate;
use crate::status::{BulkResponse, DeleteResponse, ResourceError};
use crate::storage::traits::{FindOptions, GraphBackend, StorageError};

/// A vertex collection whose reference fields are mirrored as edges.
///
/// Document and edge writes are separate backend calls. When the document
/// write succeeds but the edges fail, the item is reported as failed and the
/// document stays written.
pub struct GraphStore {
    core: ResourceCore,
    backend: Arc<dyn GraphBackend>,
    edges: EdgeSynchronizer,
}

impl GraphStore {
    pub async fn new(
        config: ResourceStoreConfig,
        backend: Arc<dyn GraphBackend>,
        counters: Arc<dyn CounterStore>,
    ) -> Result<Self, ResourceError> {
        let graph = config
            .graph_name
            .clone()
            .ok_or_else(|| ResourceError::invalid(format!("graph store for {} requires graph_name", config.collection)))?;
        let edges = EdgeSynchronizer::new(backend.clone(), &graph, &config.collection, config.edges.clone());
        let core = ResourceCore::new(config, counters).await?;
        Ok(Self { core, backend, edges })
    }

    pub fn edges(&self) -> &EdgeSynchronizer {
        &self.edges
    }
}

fn edge_failure(action: &str, id: &str, err: ResourceError) -> ResourceError {
    warn!(id = %id, error = %err, "Document {} but edges are out of sync", action);
    ResourceError::unknown(format!("document {} {} but edge sync failed: {}", id, action, err))
}

#[async_trait]
impl Persistence for GraphStore {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    async fn find(&self, predicate: &Predicate, options: &FindOptions) -> Result<Vec<Document>, StorageError> {
        self.backend.find(self.core.collection(), predicate, options).await
    }

    async fn load(&self, id: &str) -> Result<Option<Document>, StorageError> {
        self.backend.get(self.core.collection(), id).await
    }

    async fn prepare_batch(&self) -> Result<(), ResourceError> {
        Ok(self.edges.ensure_definitions().await?)
    }

    async fn insert_one(&self, doc: &Document) -> Result<Document, ResourceError> {
        let results = self
            .backend
            .create_vertex(self.core.collection(), std::slice::from_ref(doc))
            .await?;
        let stored = single(results)?;
        self.edges
            .create_edges(&stored)
            .await
            .map_err(|e| edge_failure("created", &stored.id, e))?;
        Ok(stored)
    }

    async fn update_one(&self, patch: &Document, stored: &Document) -> Result<Document, ResourceError> {
        let results = self
            .backend
            .update(self.core.collection(), std::slice::from_ref(patch))
            .await?;
        let merged = single(results)?;
        self.edges
            .sync(&merged, stored)
            .await
            .map_err(|e| edge_failure("updated", &merged.id, e))?;
        Ok(merged)
    }

    async fn remove(&self, ids: &[String]) -> Result<Vec<Result<(), StorageError>>, ResourceError> {
        Ok(self.backend.remove_vertex(self.core.collection(), ids).await?)
    }

    /// Truncation would leave edges behind, so every vertex is removed.
    async fn remove_all(&self, ids: &[String]) -> Result<(), ResourceError> {
        if ids.is_empty() {
            return Ok(());
        }
        for result in self.backend.remove_vertex(self.core.collection(), ids).await? {
            match result {
                // removed concurrently
                Ok(()) | Err(StorageError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceApi for GraphStore {
    async fn read(&self, request: ReadRequest) -> Result<BulkResponse, ResourceError> {
        pipeline::read(self, request).await
    }

    async fn create(&self, docs: Vec<Document>) -> Result<BulkResponse, ResourceError> {
        pipeline::create(self, docs).await
    }

    async fn update(&self, docs: Vec<Document>) -> Result<BulkResponse, ResourceError> {
        pipeline::update(self, docs).await
    }

    async fn upsert(&self, docs: Vec<Document>, events: &dyn EventSink, resource_name: &str) -> Result<BulkResponse, ResourceError> {
        pipeline::upsert(self, docs, events, resource_name).await
    }

    async fn delete(&self, ids: Vec<String>) -> Result<DeleteResponse, ResourceError> {
        pipeline::delete(self, ids).await
    }

    async fn delete_collection(&self) -> Result<BulkResponse, ResourceError> {
        pipeline::delete_collection(self).await
    }
}
