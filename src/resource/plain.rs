use async_trait::async_trait;
use std::sync::Arc;

use super::pipeline::{self, Persistence, ResourceCore};
use super::request::ReadRequest;
use super::ResourceApi;
use crate::config::ResourceStoreConfig;
use crate::counter::CounterStore;
use crate::document::Document;
use crate::events::EventSink;
use crate::filter::Predicate;
use crate::status::{BulkResponse, DeleteResponse, ResourceError};
use crate::storage::traits::{DocumentBackend, FindOptions, StorageError};

/// A collection without graph edges.
pub struct PlainStore {
    core: ResourceCore,
    backend: Arc<dyn DocumentBackend>,
}

impl PlainStore {
    pub async fn new(
        config: ResourceStoreConfig,
        backend: Arc<dyn DocumentBackend>,
        counters: Arc<dyn CounterStore>,
    ) -> Result<Self, ResourceError> {
        let core = ResourceCore::new(config, counters).await?;
        Ok(Self { core, backend })
    }
}

/// First result of a single-document batch call.
pub(super) fn single<T>(results: Vec<Result<T, StorageError>>) -> Result<T, ResourceError> {
    results
        .into_iter()
        .next()
        .ok_or_else(|| ResourceError::unknown("backend returned no result"))?
        .map_err(ResourceError::from)
}

#[async_trait]
impl Persistence for PlainStore {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    async fn find(&self, predicate: &Predicate, options: &FindOptions) -> Result<Vec<Document>, StorageError> {
        self.backend.find(self.core.collection(), predicate, options).await
    }

    async fn load(&self, id: &str) -> Result<Option<Document>, StorageError> {
        self.backend.get(self.core.collection(), id).await
    }

    async fn insert_one(&self, doc: &Document) -> Result<Document, ResourceError> {
        let results = self.backend.insert(self.core.collection(), std::slice::from_ref(doc)).await?;
        single(results)
    }

    async fn update_one(&self, patch: &Document, _stored: &Document) -> Result<Document, ResourceError> {
        let results = self.backend.update(self.core.collection(), std::slice::from_ref(patch)).await?;
        single(results)
    }

    /// A document removed since the lookup is written back instead of
    /// failing with not found.
    async fn upsert_one(&self, patch: &Document, _stored: &Document) -> Result<Document, ResourceError> {
        let results = self.backend.upsert(self.core.collection(), std::slice::from_ref(patch)).await?;
        single(results)
    }

    async fn remove(&self, ids: &[String]) -> Result<Vec<Result<(), StorageError>>, ResourceError> {
        Ok(self.backend.delete(self.core.collection(), ids).await?)
    }

    async fn remove_all(&self, _ids: &[String]) -> Result<(), ResourceError> {
        Ok(self.backend.truncate(self.core.collection()).await?)
    }
}

#[async_trait]
impl ResourceApi for PlainStore {
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
