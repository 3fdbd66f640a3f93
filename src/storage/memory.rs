use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use super::traits::{
    vertex_handle, DocumentBackend, EdgeDefinition, EdgeRecord, FindOptions, GraphBackend, ItemResult, SortOrder,
    StorageError,
};
use crate::document::Document;
use crate::filter::{Predicate, PredicateMatcher};

/// A named filter the caller can reference from `custom_queries`.
/// Receives the document as JSON and the request's custom arguments.
pub type CustomQuery = Arc<dyn Fn(&Value, Option<&Value>) -> bool + Send + Sync>;

struct Stored {
    seq: u64,
    doc: Document,
}

struct StoredEdge {
    collection: String,
    record: EdgeRecord,
}

#[derive(Default, Clone)]
struct GraphMeta {
    vertex_collections: Vec<String>,
    edge_definitions: Vec<EdgeDefinition>,
}

pub struct InMemoryStore {
    docs: DashMap<(String, String), Stored>,
    edges: DashMap<String, StoredEdge>,
    graphs: DashMap<String, GraphMeta>,
    custom_queries: DashMap<String, CustomQuery>,
    seq: AtomicU64,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
            edges: DashMap::new(),
            graphs: DashMap::new(),
            custom_queries: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.docs.iter().filter(|e| e.key().0 == collection).count()
    }

    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// All edges of an edge collection, sorted by `(from, to)`.
    pub fn edges(&self, edge_collection: &str) -> Vec<EdgeRecord> {
        let mut out: Vec<EdgeRecord> = self
            .edges
            .iter()
            .filter(|e| e.value().collection == edge_collection)
            .map(|e| e.value().record.clone())
            .collect();
        out.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
        out
    }

    pub fn vertex_collections(&self, graph: &str) -> Vec<String> {
        self.graphs.get(graph).map(|g| g.vertex_collections.clone()).unwrap_or_default()
    }

    pub fn edge_definitions(&self, graph: &str) -> Vec<EdgeDefinition> {
        self.graphs.get(graph).map(|g| g.edge_definitions.clone()).unwrap_or_default()
    }

    pub fn register_custom_query(&self, name: &str, query: CustomQuery) {
        self.custom_queries.insert(name.to_string(), query);
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, AtomicOrdering::Relaxed)
    }

    fn key(collection: &str, id: &str) -> (String, String) {
        (collection.to_string(), id.to_string())
    }

    fn insert_one(&self, collection: &str, doc: &Document) -> ItemResult {
        if doc.id.is_empty() {
            return Err(StorageError::Backend("document id missing".to_string()));
        }
        match self.docs.entry(Self::key(collection, &doc.id)) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StorageError::AlreadyExists(format!(
                "unique constraint violated - in index primary of type primary over '_key'; conflicting key: {}",
                doc.id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Stored { seq: self.next_seq(), doc: doc.clone() });
                Ok(doc.clone())
            }
        }
    }

    fn update_one(&self, collection: &str, patch: &Document) -> ItemResult {
        let mut stored = self.docs.get_mut(&Self::key(collection, &patch.id)).ok_or(StorageError::NotFound)?;
        stored.doc.merge_fields(patch);
        if patch.meta.is_some() {
            stored.doc.meta = patch.meta.clone();
        }
        Ok(stored.doc.clone())
    }

    fn custom_filters(&self, names: &[String]) -> Result<Vec<CustomQuery>, StorageError> {
        names
            .iter()
            .map(|name| {
                self.custom_queries
                    .get(name)
                    .map(|q| q.value().clone())
                    .ok_or_else(|| StorageError::Backend(format!("custom query {} not found", name)))
            })
            .collect()
    }

    fn remove_incident_edges(&self, handle: &str) {
        self.edges.retain(|_, e| e.record.from != handle && e.record.to != handle);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn compare_field(a: &Value, b: &Value, field: &str) -> Ordering {
    let left = field.split('.').try_fold(a, |v, s| v.get(s));
    let right = field.split('.').try_fold(b, |v, s| v.get(s));
    match (left, right) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        // missing values sort last
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentBackend for InMemoryStore {
    async fn find(&self, collection: &str, predicate: &Predicate, options: &FindOptions) -> Result<Vec<Document>, StorageError> {
        let custom = self.custom_filters(&options.custom_queries)?;
        let args = options.custom_arguments.as_ref();

        let mut matched: Vec<(u64, Value, Document)> = Vec::new();
        for entry in self.docs.iter().filter(|e| e.key().0 == collection) {
            let value = entry.doc.to_value().map_err(|e| StorageError::Backend(e.to_string()))?;
            if PredicateMatcher::matches(predicate, &value) && custom.iter().all(|q| q(&value, args)) {
                matched.push((entry.seq, value, entry.doc.clone()));
            }
        }

        matched.sort_by(|a, b| {
            for (field, order) in &options.sort {
                let ord = compare_field(&a.1, &b.1, field);
                let ord = match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.0.cmp(&b.0)
        });

        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(options.offset)
            .take(limit)
            .map(|(_, _, doc)| doc.project(&options.include, &options.exclude))
            .collect())
    }

    async fn insert(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError> {
        Ok(docs.iter().map(|d| self.insert_one(collection, d)).collect())
    }

    async fn update(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError> {
        Ok(docs.iter().map(|d| self.update_one(collection, d)).collect())
    }

    async fn upsert(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError> {
        Ok(docs
            .iter()
            .map(|d| match self.update_one(collection, d) {
                Err(StorageError::NotFound) => self.insert_one(collection, d),
                other => other,
            })
            .collect())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<Vec<Result<(), StorageError>>, StorageError> {
        Ok(ids
            .iter()
            .map(|id| {
                self.docs
                    .remove(&Self::key(collection, id))
                    .map(|_| ())
                    .ok_or(StorageError::NotFound)
            })
            .collect())
    }

    async fn truncate(&self, collection: &str) -> Result<(), StorageError> {
        self.docs.retain(|(c, _), _| c != collection);
        Ok(())
    }
}

#[async_trait]
impl GraphBackend for InMemoryStore {
    async fn create_graph(&self, graph: &str) -> Result<(), StorageError> {
        self.graphs.entry(graph.to_string()).or_default();
        Ok(())
    }

    async fn add_vertex_collection(&self, graph: &str, collection: &str) -> Result<(), StorageError> {
        let mut meta = self.graphs.get_mut(graph).ok_or(StorageError::NotFound)?;
        if !meta.vertex_collections.iter().any(|c| c == collection) {
            meta.vertex_collections.push(collection.to_string());
        }
        Ok(())
    }

    async fn add_edge_definition(&self, graph: &str, definition: &EdgeDefinition) -> Result<(), StorageError> {
        let mut meta = self.graphs.get_mut(graph).ok_or(StorageError::NotFound)?;
        meta.edge_definitions.retain(|d| d.collection != definition.collection);
        meta.edge_definitions.push(definition.clone());
        Ok(())
    }

    async fn create_vertex(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError> {
        self.insert(collection, docs).await
    }

    async fn remove_vertex(&self, collection: &str, ids: &[String]) -> Result<Vec<Result<(), StorageError>>, StorageError> {
        let results = self.delete(collection, ids).await?;
        for (id, result) in ids.iter().zip(&results) {
            if result.is_ok() {
                self.remove_incident_edges(&vertex_handle(collection, id));
            }
        }
        Ok(results)
    }

    async fn create_edge(&self, edge_collection: &str, from: &str, to: &str) -> Result<EdgeRecord, StorageError> {
        let record = EdgeRecord {
            id: format!("{}/{}", edge_collection, uuid::Uuid::new_v4().simple()),
            from: from.to_string(),
            to: to.to_string(),
        };
        self.edges.insert(
            record.id.clone(),
            StoredEdge { collection: edge_collection.to_string(), record: record.clone() },
        );
        Ok(record)
    }

    async fn remove_edge(&self, _edge_collection: &str, edge_id: &str) -> Result<(), StorageError> {
        self.edges.remove(edge_id).map(|_| ()).ok_or(StorageError::NotFound)
    }

    async fn get_out_edges(&self, edge_collection: &str, vertex: &str) -> Result<Vec<EdgeRecord>, StorageError> {
        Ok(self
            .edges(edge_collection)
            .into_iter()
            .filter(|e| e.from == vertex)
            .collect())
    }

    async fn get_in_edges(&self, edge_collection: &str, vertex: &str) -> Result<Vec<EdgeRecord>, StorageError> {
        Ok(self
            .edges(edge_collection)
            .into_iter()
            .filter(|e| e.to == vertex)
            .collect())
    }
}
