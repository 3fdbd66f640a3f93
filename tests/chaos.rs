//! Chaos testing for resource stores.
//!
//! Failing wrappers inject errors into the document backend, the graph
//! backend, the counter store and the event sink, and the tests check
//! that failures stay contained to the item that hit them:
//! 1. **Per-item failures** - one bad document never aborts its siblings
//! 2. **Partial graph writes** - document written, edge sync failed
//! 3. **Best-effort events** - a dead sink never fails a write
//! 4. **Request-level failures** - backend down before any item runs
//!
//! # Running Chaos Tests
//! ```bash
//! cargo test --test chaos
//! RUST_LOG=resource_store=debug cargo test --test chaos -- --nocapture
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use resource_store::storage::traits::{EdgeDefinition, EdgeRecord, FindOptions, ItemResult};
use resource_store::{
    Attribute, CounterError, CounterStore, Document, DocumentBackend, EdgeSpec, EventError, EventSink,
    GraphBackend, InMemoryCounterStore, InMemoryStore, Meta, Predicate, ReadRequest, ResourceApi, ResourceStore,
    ResourceStoreConfig, StorageError, Strategy, StrategyEntry,
};

// =============================================================================
// Failing Wrappers - Precise Error Injection
// =============================================================================

/// Wraps the in-memory store and fails writes for chosen document ids,
/// edge creation towards chosen targets, or every call once `down` is set.
struct FailingBackend {
    inner: InMemoryStore,
    poisoned_ids: Vec<String>,
    poisoned_edge_targets: Vec<String>,
    down: AtomicBool,
    calls: AtomicU64,
}

impl FailingBackend {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            poisoned_ids: Vec::new(),
            poisoned_edge_targets: Vec::new(),
            down: AtomicBool::new(false),
            calls: AtomicU64::new(0),
        }
    }

    fn poison_ids(mut self, ids: &[&str]) -> Self {
        self.poisoned_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    fn poison_edges_to(mut self, targets: &[&str]) -> Self {
        self.poisoned_edge_targets = targets.iter().map(|s| s.to_string()).collect();
        self
    }

    fn take_down(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    fn maybe_fail(&self) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            Err(StorageError::Backend("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn poisoned(&self, doc: &Document) -> bool {
        self.poisoned_ids.iter().any(|id| *id == doc.id)
    }

    async fn write_each(&self, collection: &str, docs: &[Document], write: Write) -> Result<Vec<ItemResult>, StorageError> {
        self.maybe_fail()?;
        let mut results = Vec::with_capacity(docs.len());
        for doc in docs {
            if self.poisoned(doc) {
                results.push(Err(StorageError::Backend(format!("disk error writing {}", doc.id))));
                continue;
            }
            let one = std::slice::from_ref(doc);
            let written = match write {
                Write::Insert => self.inner.insert(collection, one).await?,
                Write::Update => self.inner.update(collection, one).await?,
                Write::Upsert => self.inner.upsert(collection, one).await?,
                Write::Vertex => self.inner.create_vertex(collection, one).await?,
            };
            results.extend(written);
        }
        Ok(results)
    }
}

#[derive(Clone, Copy)]
enum Write {
    Insert,
    Update,
    Upsert,
    Vertex,
}

#[async_trait]
impl DocumentBackend for FailingBackend {
    async fn find(&self, collection: &str, predicate: &Predicate, options: &FindOptions) -> Result<Vec<Document>, StorageError> {
        self.maybe_fail()?;
        self.inner.find(collection, predicate, options).await
    }

    async fn insert(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError> {
        self.write_each(collection, docs, Write::Insert).await
    }

    async fn update(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError> {
        self.write_each(collection, docs, Write::Update).await
    }

    async fn upsert(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError> {
        self.write_each(collection, docs, Write::Upsert).await
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<Vec<Result<(), StorageError>>, StorageError> {
        self.maybe_fail()?;
        self.inner.delete(collection, ids).await
    }

    async fn truncate(&self, collection: &str) -> Result<(), StorageError> {
        self.maybe_fail()?;
        self.inner.truncate(collection).await
    }
}

#[async_trait]
impl GraphBackend for FailingBackend {
    async fn create_graph(&self, graph: &str) -> Result<(), StorageError> {
        self.maybe_fail()?;
        self.inner.create_graph(graph).await
    }

    async fn add_vertex_collection(&self, graph: &str, collection: &str) -> Result<(), StorageError> {
        self.inner.add_vertex_collection(graph, collection).await
    }

    async fn add_edge_definition(&self, graph: &str, definition: &EdgeDefinition) -> Result<(), StorageError> {
        self.inner.add_edge_definition(graph, definition).await
    }

    async fn create_vertex(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError> {
        self.write_each(collection, docs, Write::Vertex).await
    }

    async fn remove_vertex(&self, collection: &str, ids: &[String]) -> Result<Vec<Result<(), StorageError>>, StorageError> {
        self.maybe_fail()?;
        self.inner.remove_vertex(collection, ids).await
    }

    async fn create_edge(&self, edge_collection: &str, from: &str, to: &str) -> Result<EdgeRecord, StorageError> {
        if self.poisoned_edge_targets.iter().any(|t| t == to) {
            return Err(StorageError::Backend(format!("edge collection {} unavailable", edge_collection)));
        }
        self.inner.create_edge(edge_collection, from, to).await
    }

    async fn remove_edge(&self, edge_collection: &str, edge_id: &str) -> Result<(), StorageError> {
        self.inner.remove_edge(edge_collection, edge_id).await
    }

    async fn get_out_edges(&self, edge_collection: &str, vertex: &str) -> Result<Vec<EdgeRecord>, StorageError> {
        self.inner.get_out_edges(edge_collection, vertex).await
    }

    async fn get_in_edges(&self, edge_collection: &str, vertex: &str) -> Result<Vec<EdgeRecord>, StorageError> {
        self.inner.get_in_edges(edge_collection, vertex).await
    }
}

/// Counter store whose `incr` starts failing after `healthy_incrs` calls.
struct FailingCounterStore {
    inner: InMemoryCounterStore,
    healthy_incrs: u64,
    incrs: AtomicU64,
}

impl FailingCounterStore {
    fn fail_after(healthy_incrs: u64) -> Self {
        Self {
            inner: InMemoryCounterStore::new(),
            healthy_incrs,
            incrs: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl CounterStore for FailingCounterStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, CounterError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), CounterError> {
        self.inner.set(key, value).await
    }

    async fn incr(&self, key: &str) -> Result<i64, CounterError> {
        if self.incrs.fetch_add(1, Ordering::SeqCst) >= self.healthy_incrs {
            return Err(CounterError::Backend("READONLY You can't write against a read only replica".to_string()));
        }
        self.inner.incr(key).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, CounterError> {
        self.inner.hgetall(key).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CounterError> {
        self.inner.hset(key, field, value).await
    }

    async fn time(&self) -> Result<i64, CounterError> {
        self.inner.time().await
    }
}

/// Counter store that is unreachable from the start.
struct DeadCounterStore;

#[async_trait]
impl CounterStore for DeadCounterStore {
    async fn get(&self, _key: &str) -> Result<Option<i64>, CounterError> {
        Err(CounterError::Backend("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: i64) -> Result<(), CounterError> {
        Err(CounterError::Backend("connection refused".to_string()))
    }

    async fn incr(&self, _key: &str) -> Result<i64, CounterError> {
        Err(CounterError::Backend("connection refused".to_string()))
    }

    async fn hgetall(&self, _key: &str) -> Result<HashMap<String, String>, CounterError> {
        Err(CounterError::Backend("connection refused".to_string()))
    }

    async fn hset(&self, _key: &str, _field: &str, _value: &str) -> Result<(), CounterError> {
        Err(CounterError::Backend("connection refused".to_string()))
    }

    async fn time(&self) -> Result<i64, CounterError> {
        Err(CounterError::Backend("connection refused".to_string()))
    }
}

/// Event sink that rejects everything but counts attempts.
#[derive(Default)]
struct FailingEventSink {
    attempts: AtomicU64,
}

#[async_trait]
impl EventSink for FailingEventSink {
    async fn emit(&self, _name: &str, _payload: &Document) -> Result<(), EventError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(EventError::Sink("stream unavailable".to_string()))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Surface the store's retry and item-error logs when `RUST_LOG` is set.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn owned(id: &str) -> Document {
    Document::new(id).with_meta(Meta {
        owner: vec![Attribute::new("urn:owner", "org-1")],
        ..Default::default()
    })
}

fn graph_config() -> ResourceStoreConfig {
    let mut config = ResourceStoreConfig::new("users");
    config.graph_name = Some("identity".to_string());
    config.edges = vec![EdgeSpec::outbound("has_role", "id", "role_ids", "roles")];
    config
}

// =============================================================================
// Per-item failures
// =============================================================================

#[tokio::test]
async fn chaos_poisoned_document_does_not_abort_batch() {
    init_tracing();
    let backend = Arc::new(FailingBackend::new().poison_ids(&["b"]));
    let store = ResourceStore::plain(
        ResourceStoreConfig::new("users"),
        backend.clone(),
        Arc::new(InMemoryCounterStore::new()),
    )
    .await
    .unwrap();

    let response = store.create(vec![owned("a"), owned("b"), owned("c")]).await.unwrap();

    assert_eq!(response.operation_status.code, 200);
    assert!(response.items[0].status.is_ok());
    assert_eq!(response.items[1].status.code, 500);
    assert_eq!(response.items[1].status.id, "b");
    assert!(response.items[1].payload.is_none());
    assert!(response.items[2].status.is_ok());
    assert_eq!(backend.inner.len("users"), 2);
}

#[tokio::test]
async fn chaos_counter_failure_fails_only_later_items() {
    init_tracing();
    let mut config = ResourceStoreConfig::new("orders");
    config.strategies.insert("number".to_string(), StrategyEntry::new(Strategy::Increment));
    let counters = Arc::new(FailingCounterStore::fail_after(1));
    let store = ResourceStore::plain(config, Arc::new(InMemoryStore::new()), counters)
        .await
        .unwrap();

    let first = store.create(vec![owned("o1")]).await.unwrap();
    assert!(first.items[0].status.is_ok());
    assert_eq!(first.documents()[0].fields["number"], json!(0));

    let second = store.create(vec![owned("o2")]).await.unwrap();
    assert_eq!(second.operation_status.code, 200);
    assert_eq!(second.items[0].status.code, 500);
    assert!(second.items[0].status.message.contains("read only replica"));
}

// =============================================================================
// Partial graph writes
// =============================================================================

#[tokio::test]
async fn chaos_edge_failure_reports_item_but_keeps_document() {
    init_tracing();
    let backend = Arc::new(FailingBackend::new().poison_edges_to(&["roles/broken"]));
    let store = ResourceStore::graph(graph_config(), backend.clone(), Arc::new(InMemoryCounterStore::new()))
        .await
        .unwrap();

    let response = store
        .create(vec![
            owned("u1").with("role_ids", json!(["ok"])),
            owned("u2").with("role_ids", json!(["broken"])),
        ])
        .await
        .unwrap();

    assert!(response.items[0].status.is_ok());
    assert_eq!(response.items[1].status.code, 500);
    assert!(response.items[1].status.message.contains("edge sync failed"));

    // the vertex write is not rolled back
    assert_eq!(backend.inner.len("users"), 2);
    let edges = backend.inner.edges("has_role");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].to, "roles/ok");
}

#[tokio::test]
async fn chaos_edge_failure_on_update_leaves_document_updated() {
    init_tracing();
    let backend = Arc::new(FailingBackend::new().poison_edges_to(&["roles/broken"]));
    let store = ResourceStore::graph(graph_config(), backend.clone(), Arc::new(InMemoryCounterStore::new()))
        .await
        .unwrap();
    store.create(vec![owned("u1").with("role_ids", json!(["ok"]))]).await.unwrap();

    let response = store
        .update(vec![owned("u1").with("role_ids", json!(["broken"]))])
        .await
        .unwrap();
    assert_eq!(response.items[0].status.code, 500);

    let stored = backend.inner.get("users", "u1").await.unwrap().unwrap();
    assert_eq!(stored.fields["role_ids"], json!(["broken"]));
    assert!(backend.inner.edges("has_role").is_empty());
}

// =============================================================================
// Best-effort events
// =============================================================================

#[tokio::test]
async fn chaos_dead_event_sink_never_fails_upsert() {
    init_tracing();
    let store = ResourceStore::plain(
        ResourceStoreConfig::new("users"),
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryCounterStore::new()),
    )
    .await
    .unwrap();
    let sink = FailingEventSink::default();

    let response = store
        .upsert(vec![owned("a"), owned("b")], &sink, "user")
        .await
        .unwrap();
    assert_eq!(response.failed_count(), 0);

    let response = store.upsert(vec![owned("a")], &sink, "user").await.unwrap();
    assert!(response.items[0].status.is_ok());
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
}

// =============================================================================
// Request-level failures
// =============================================================================

#[tokio::test]
async fn chaos_backend_down_fails_read_request() {
    init_tracing();
    let backend = Arc::new(FailingBackend::new());
    let store = ResourceStore::plain(
        ResourceStoreConfig::new("users"),
        backend.clone(),
        Arc::new(InMemoryCounterStore::new()),
    )
    .await
    .unwrap();
    store.create(vec![owned("a")]).await.unwrap();

    backend.take_down();
    let err = store.read(ReadRequest::all()).await.unwrap_err();
    assert_eq!(err.code(), 500);
    assert!(err.to_string().contains("connection refused"));
    assert!(backend.calls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn chaos_backend_down_fails_each_update_item() {
    init_tracing();
    let backend = Arc::new(FailingBackend::new());
    let store = ResourceStore::plain(
        ResourceStoreConfig::new("users"),
        backend.clone(),
        Arc::new(InMemoryCounterStore::new()),
    )
    .await
    .unwrap();
    store.create(vec![owned("a"), owned("b")]).await.unwrap();

    backend.take_down();
    let response = store.update(vec![owned("a"), owned("b")]).await.unwrap();
    assert_eq!(response.operation_status.code, 200);
    assert_eq!(response.failed_count(), 2);
    assert!(response.items.iter().all(|i| i.status.code == 500));
}

#[tokio::test]
async fn chaos_graph_unavailable_fails_create_request() {
    init_tracing();
    let backend = Arc::new(FailingBackend::new());
    let store = ResourceStore::graph(graph_config(), backend.clone(), Arc::new(InMemoryCounterStore::new()))
        .await
        .unwrap();

    backend.take_down();
    let err = store.create(vec![owned("u1")]).await.unwrap_err();
    assert_eq!(err.code(), 500);
}

#[tokio::test]
async fn chaos_dead_counter_store_fails_construction() {
    init_tracing();
    let mut config = ResourceStoreConfig::new("orders");
    config.strategies.insert("number".to_string(), StrategyEntry::new(Strategy::Increment));
    let result = ResourceStore::plain(config, Arc::new(InMemoryStore::new()), Arc::new(DeadCounterStore)).await;
    assert!(matches!(result, Err(ref e) if e.code() == 500));
}
