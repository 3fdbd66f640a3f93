// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Graph edges derived from document reference fields.
//!
//! Each [`EdgeSpec`] names a source field (`from`, usually `id`) and a
//! reference field (`to`, a single id or a list). Every reference value
//! yields one edge:
//!
//! ```text
//! outbound:  {collection}/{from_id}       -> {to_vertice_name}/{to_id}
//! inbound:   {from_vertice_name}/{from_id} -> {collection}/{to_id}
//! ```
//!
//! Edges carry no identity comparable to a document id, so an update never
//! patches individual edges: when the (sorted) reference value changes, every
//! edge of that type incident to the document's vertex is removed and the
//! full set is recreated. Removal always completes before recreation.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::config::EdgeSpec;
use crate::document::Document;
use crate::metrics;
use crate::status::ResourceError;
use crate::storage::traits::{vertex_handle, EdgeDefinition, GraphBackend, StorageError};

pub struct EdgeSynchronizer {
    backend: Arc<dyn GraphBackend>,
    graph: String,
    collection: String,
    edges: Vec<EdgeSpec>,
}

impl EdgeSynchronizer {
    pub fn new(backend: Arc<dyn GraphBackend>, graph: &str, collection: &str, edges: Vec<EdgeSpec>) -> Self {
        Self {
            backend,
            graph: graph.to_string(),
            collection: collection.to_string(),
            edges,
        }
    }

    pub fn edges(&self) -> &[EdgeSpec] {
        &self.edges
    }

    /// Create the graph, register this collection as a vertex collection and
    /// add one edge definition per spec. Safe to call repeatedly.
    pub async fn ensure_definitions(&self) -> Result<(), StorageError> {
        self.backend.create_graph(&self.graph).await?;
        self.backend.add_vertex_collection(&self.graph, &self.collection).await?;
        for spec in &self.edges {
            let (from, to) = spec.vertex_collections(&self.collection);
            if from.is_empty() || to.is_empty() {
                continue;
            }
            let definition = EdgeDefinition {
                collection: spec.edge_name.clone(),
                from: vec![from],
                to: vec![to],
            };
            self.backend.add_edge_definition(&self.graph, &definition).await?;
        }
        Ok(())
    }

    /// Create every edge the document's reference fields describe.
    /// Returns the number of edges created.
    pub async fn create_edges(&self, doc: &Document) -> Result<usize, ResourceError> {
        let mut created = 0;
        for spec in &self.edges {
            created += self.create_for_spec(spec, doc).await?;
        }
        Ok(created)
    }

    /// Bring edges in line with `doc` after an update. `previous` is the
    /// stored document before the write. Returns the number of edge types
    /// that were rewritten.
    pub async fn sync(&self, doc: &Document, previous: &Document) -> Result<usize, ResourceError> {
        let mut rewritten = 0;
        for spec in &self.edges {
            let current = sorted_refs(doc.get(&spec.to));
            let before = sorted_refs(previous.get(&spec.to));
            if current == before {
                continue;
            }

            let vertex = vertex_handle(&self.collection, &previous.id);
            let outgoing = self.backend.get_out_edges(&spec.edge_name, &vertex).await?;
            for edge in &outgoing {
                self.backend.remove_edge(&spec.edge_name, &edge.id).await?;
            }
            let incoming = self.backend.get_in_edges(&spec.edge_name, &vertex).await?;
            for edge in &incoming {
                self.backend.remove_edge(&spec.edge_name, &edge.id).await?;
            }
            debug!(
                edge = %spec.edge_name,
                vertex = %vertex,
                removed = outgoing.len() + incoming.len(),
                "Rewriting edges"
            );

            self.create_for_spec(spec, doc).await?;
            metrics::record_edge_rewrite(&spec.edge_name);
            rewritten += 1;
        }
        Ok(rewritten)
    }

    async fn create_for_spec(&self, spec: &EdgeSpec, doc: &Document) -> Result<usize, ResourceError> {
        let Some(from_id) = doc.get(&spec.from).and_then(|v| ref_id(&v)) else {
            return Ok(0);
        };
        let targets: Vec<String> = match doc.get(&spec.to) {
            Some(Value::Array(items)) => items.iter().filter_map(ref_id).collect(),
            Some(value) => ref_id(&value).into_iter().collect(),
            None => Vec::new(),
        };

        let (from_collection, to_collection) = spec.vertex_collections(&self.collection);
        let from = vertex_handle(&from_collection, &from_id);
        for to_id in &targets {
            let to = vertex_handle(&to_collection, to_id);
            self.backend.create_edge(&spec.edge_name, &from, &to).await?;
        }
        Ok(targets.len())
    }
}

/// String form of a reference value; empty, null and `false` are no reference.
fn ref_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reference value in comparable form: arrays sorted, scalars as-is.
fn sorted_refs(value: Option<Value>) -> Option<Value> {
    match value {
        Some(Value::Array(mut items)) => {
            items.sort_by_key(|v| v.to_string());
            Some(Value::Array(items))
        }
        Some(Value::Null) | None => None,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;
    use serde_json::json;

    fn setup() -> (Arc<InMemoryStore>, EdgeSynchronizer) {
        let store = Arc::new(InMemoryStore::new());
        let sync = EdgeSynchronizer::new(
            store.clone(),
            "g",
            "users",
            vec![EdgeSpec::outbound("user_has_role", "id", "role_ids", "roles")],
        );
        (store, sync)
    }

    fn user(roles: Value) -> Document {
        Document::new("u1").with("role_ids", roles)
    }

    fn targets(store: &InMemoryStore) -> Vec<String> {
        let mut to: Vec<String> = store.edges("user_has_role").into_iter().map(|e| e.to).collect();
        to.sort();
        to
    }

    #[tokio::test]
    async fn test_ensure_definitions() {
        let (store, sync) = setup();
        sync.ensure_definitions().await.unwrap();
        sync.ensure_definitions().await.unwrap();
        assert_eq!(store.vertex_collections("g"), vec!["users"]);
        let defs = store.edge_definitions("g");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].from, vec!["users"]);
        assert_eq!(defs[0].to, vec!["roles"]);
    }

    #[tokio::test]
    async fn test_create_edges_for_array_reference() {
        let (store, sync) = setup();
        let created = sync.create_edges(&user(json!(["A", "B"]))).await.unwrap();
        assert_eq!(created, 2);
        assert_eq!(targets(&store), vec!["roles/A", "roles/B"]);
        assert!(store.edges("user_has_role").iter().all(|e| e.from == "users/u1"));
    }

    #[tokio::test]
    async fn test_missing_reference_creates_nothing() {
        let (store, sync) = setup();
        assert_eq!(sync.create_edges(&Document::new("u1")).await.unwrap(), 0);
        assert_eq!(sync.create_edges(&user(json!(""))).await.unwrap(), 0);
        assert!(store.edges("user_has_role").is_empty());
    }

    #[tokio::test]
    async fn test_reorder_is_noop() {
        let (store, sync) = setup();
        let previous = user(json!(["A", "B"]));
        sync.create_edges(&previous).await.unwrap();
        let before: Vec<String> = store.edges("user_has_role").into_iter().map(|e| e.id).collect();

        let rewritten = sync.sync(&user(json!(["B", "A"])), &previous).await.unwrap();
        assert_eq!(rewritten, 0);
        let after: Vec<String> = store.edges("user_has_role").into_iter().map(|e| e.id).collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_changed_reference_rewrites() {
        let (store, sync) = setup();
        let previous = user(json!(["A", "B"]));
        sync.create_edges(&previous).await.unwrap();

        let rewritten = sync.sync(&user(json!(["A", "C"])), &previous).await.unwrap();
        assert_eq!(rewritten, 1);
        assert_eq!(targets(&store), vec!["roles/A", "roles/C"]);
    }

    #[tokio::test]
    async fn test_inbound_swaps_vertex_names() {
        let store = Arc::new(InMemoryStore::new());
        let sync = EdgeSynchronizer::new(
            store.clone(),
            "g",
            "addresses",
            vec![EdgeSpec::inbound("org_has_address", "org_id", "id", "organizations")],
        );
        let doc = Document::new("addr1").with("org_id", json!("o1"));
        sync.create_edges(&doc).await.unwrap();
        let edges = store.edges("org_has_address");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from, "organizations/o1");
        assert_eq!(edges[0].to, "addresses/addr1");
    }
}
