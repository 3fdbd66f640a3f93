use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::document::Document;
use crate::filter::Predicate;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Item not found")]
    NotFound,
    #[error("{0}")]
    AlreadyExists(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Options for [`DocumentBackend::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub limit: Option<usize>,
    pub offset: usize,
    pub sort: Vec<(String, SortOrder)>,
    /// Field projection; an empty `include` keeps everything.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Names of backend-registered custom queries to apply.
    pub custom_queries: Vec<String>,
    pub custom_arguments: Option<Value>,
}

/// Result of a single-document write inside a batch.
pub type ItemResult = Result<Document, StorageError>;

/// Document collection operations.
///
/// Batch methods return one result per input, in input order; a failing
/// document never aborts its siblings.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn find(&self, collection: &str, predicate: &Predicate, options: &FindOptions) -> Result<Vec<Document>, StorageError>;
    async fn insert(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError>;
    /// Shallow-merge each document over the stored one with the same id.
    async fn update(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError>;
    async fn upsert(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError>;
    /// Per-id result: `Ok(())` or `Err(NotFound)`.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<Vec<Result<(), StorageError>>, StorageError>;
    async fn truncate(&self, collection: &str) -> Result<(), StorageError>;

    /// Convenience lookup by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StorageError> {
        let predicate = Predicate::field("id", crate::filter::FilterOperation::Eq, Value::String(id.to_string()));
        let options = FindOptions { limit: Some(1), ..Default::default() };
        Ok(self.find(collection, &predicate, &options).await?.into_iter().next())
    }
}

/// A stored edge between two vertices, addressed as `collection/id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    pub id: String,
    pub from: String,
    pub to: String,
}

/// Edge collection wiring between vertex collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeDefinition {
    pub collection: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
}

/// Graph operations on top of document storage. Removing a vertex removes
/// its incident edges.
#[async_trait]
pub trait GraphBackend: DocumentBackend {
    async fn create_graph(&self, graph: &str) -> Result<(), StorageError>;
    async fn add_vertex_collection(&self, graph: &str, collection: &str) -> Result<(), StorageError>;
    async fn add_edge_definition(&self, graph: &str, definition: &EdgeDefinition) -> Result<(), StorageError>;
    async fn create_vertex(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError>;
    async fn remove_vertex(&self, collection: &str, ids: &[String]) -> Result<Vec<Result<(), StorageError>>, StorageError>;
    async fn create_edge(&self, edge_collection: &str, from: &str, to: &str) -> Result<EdgeRecord, StorageError>;
    async fn remove_edge(&self, edge_collection: &str, edge_id: &str) -> Result<(), StorageError>;
    /// Edges whose `from` is `vertex` (`collection/id`).
    async fn get_out_edges(&self, edge_collection: &str, vertex: &str) -> Result<Vec<EdgeRecord>, StorageError>;
    /// Edges whose `to` is `vertex` (`collection/id`).
    async fn get_in_edges(&self, edge_collection: &str, vertex: &str) -> Result<Vec<EdgeRecord>, StorageError>;
}

/// `collection/id` vertex handle.
pub fn vertex_handle(collection: &str, id: &str) -> String {
    format!("{}/{}", collection, id)
}
