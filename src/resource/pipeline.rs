//! The per-document pipeline shared by plain and graph stores.
//!
//! ```text
//! create:  required fields → identity → to_millis → payload decode → insert
//! update:  load → merge meta → to_millis → payload decode → update
//! upsert:  exists? update path : create path, event emitted alongside
//! reads:   compile filters → find → payload encode → to_split
//! ```
//!
//! New documents are prepared in batch order, so identity counters advance
//! one document at a time. Persistence of the prepared documents then runs
//! concurrently. One item's failure is recorded on that item and never
//! aborts its siblings.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::request::ReadRequest;
use crate::config::ResourceStoreConfig;
use crate::counter::CounterStore;
use crate::document::{Document, Timestamp};
use crate::events::EventSink;
use crate::filter::{FilterCompiler, Predicate};
use crate::identity::IdentityFieldGenerator;
use crate::metrics;
use crate::payload::{decode_envelope, is_truthy, PayloadCodec};
use crate::status::{BulkResponse, DeleteResponse, ItemStatus, OperationStatus, ResourceError, ResponseItem};
use crate::storage::traits::{FindOptions, StorageError};
use crate::time::TimeFieldNormalizer;

/// Configuration-derived helpers every store variant uses.
pub struct ResourceCore {
    config: ResourceStoreConfig,
    identity: IdentityFieldGenerator,
    times: TimeFieldNormalizer,
    payload: PayloadCodec,
}

impl ResourceCore {
    /// Validate the config and register the identity strategies.
    pub async fn new(config: ResourceStoreConfig, counters: Arc<dyn CounterStore>) -> Result<Self, ResourceError> {
        config.validate()?;
        let identity = IdentityFieldGenerator::new(counters, &config.collection, config.counter_mode);
        identity.register(&config.strategies).await?;
        Ok(Self {
            times: TimeFieldNormalizer::new(&config.time_fields),
            payload: PayloadCodec::new(config.buffer_field.clone()),
            identity,
            config,
        })
    }

    pub fn config(&self) -> &ResourceStoreConfig {
        &self.config
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    fn check_required(&self, doc: &Document) -> Result<(), ResourceError> {
        for field in &self.config.required_fields {
            let missing = match doc.get(field) {
                None => true,
                Some(Value::Array(items)) => items.is_empty(),
                Some(value) => !is_truthy(&value),
            };
            if missing {
                return Err(ResourceError::invalid(format!(
                    "Field {} is necessary for {} for documentID {}",
                    field, self.config.resource_name, doc.id
                )));
            }
        }
        Ok(())
    }

    /// Incoming new document → storage form.
    pub async fn prepare_new(&self, mut doc: Document) -> Result<Document, ResourceError> {
        self.check_required(&doc)?;
        self.identity.apply(&mut doc).await?;
        self.to_storage(doc)
    }

    /// Incoming patch → storage form, with meta merged over `stored`.
    ///
    /// Owners are replaced only when the patch declares some; `modified_by`
    /// and `modified` are always refreshed.
    pub fn prepare_patch(&self, mut patch: Document, stored: &Document) -> Result<Document, ResourceError> {
        let incoming = match patch.meta.take() {
            Some(meta) if !meta.is_empty() => meta,
            _ => {
                return Err(ResourceError::invalid(format!(
                    "Update request holds no valid metadata for document {}",
                    patch.id
                )))
            }
        };
        let mut meta = stored.meta.clone().unwrap_or_default();
        if !incoming.owner.is_empty() {
            meta.owner = incoming.owner;
        }
        meta.modified_by = incoming.modified_by;
        meta.modified = Some(Timestamp::Millis(chrono::Utc::now().timestamp_millis()));
        patch.meta = Some(meta);
        self.to_storage(patch)
    }

    fn to_storage(&self, doc: Document) -> Result<Document, ResourceError> {
        let mut docs = [doc];
        self.times
            .to_millis(&mut docs)
            .map_err(|e| ResourceError::invalid(format!("invalid timestamp: {}", e)))?;
        let [mut doc] = docs;
        self.payload.decode_for_storage(&mut doc)?;
        Ok(doc)
    }

    /// Stored document → caller form.
    pub fn to_transport(&self, mut doc: Document) -> Result<Document, ResourceError> {
        self.payload.encode_for_transport(&mut doc)?;
        let mut docs = [doc];
        self.times
            .to_split(&mut docs)
            .map_err(|e| ResourceError::unknown(format!("stored timestamp unreadable: {}", e)))?;
        let [doc] = docs;
        Ok(doc)
    }

    /// Predicate and backend options for a read.
    pub fn plan_read(&self, request: &ReadRequest) -> Result<(Predicate, FindOptions), ResourceError> {
        let predicate = FilterCompiler::compile_all(&request.filters)?;
        let ceiling = self.config.read_limit;
        let limit = match request.limit {
            None | Some(0) => ceiling,
            Some(limit) => limit.min(ceiling),
        };
        let custom_arguments = match &request.custom_arguments {
            Some(envelope) => decode_envelope("custom_arguments", envelope)?,
            None => None,
        };
        let (include, exclude) = request.projection();
        let options = FindOptions {
            limit: Some(limit),
            offset: request.offset,
            sort: request.sort_orders(),
            include,
            exclude,
            custom_queries: request.custom_queries.clone(),
            custom_arguments,
        };
        Ok((predicate, options))
    }
}

/// Backend-specific steps of the pipeline.
#[async_trait]
pub(crate) trait Persistence: Send + Sync {
    fn core(&self) -> &ResourceCore;

    async fn find(&self, predicate: &Predicate, options: &FindOptions) -> Result<Vec<Document>, StorageError>;

    async fn load(&self, id: &str) -> Result<Option<Document>, StorageError>;

    /// Called once before a batch that may insert.
    async fn prepare_batch(&self) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Persist a new document (storage form); returns the stored document.
    async fn insert_one(&self, doc: &Document) -> Result<Document, ResourceError>;

    /// Persist a prepared patch; returns the merged stored document.
    async fn update_one(&self, patch: &Document, stored: &Document) -> Result<Document, ResourceError>;

    /// Update path of an upsert. Defaults to [`Persistence::update_one`].
    async fn upsert_one(&self, patch: &Document, stored: &Document) -> Result<Document, ResourceError> {
        self.update_one(patch, stored).await
    }

    async fn remove(&self, ids: &[String]) -> Result<Vec<Result<(), StorageError>>, ResourceError>;

    /// Remove every document of the collection; `ids` is the current content.
    async fn remove_all(&self, ids: &[String]) -> Result<(), ResourceError>;
}

fn respond(operation: &str, id: String, result: Result<Document, ResourceError>) -> ResponseItem {
    match result {
        Ok(doc) => ResponseItem::ok(doc),
        Err(err) => {
            debug!(operation, id = %id, code = err.code(), error = %err, "Item failed");
            metrics::record_item_error(operation, err.code());
            ResponseItem::failed(id, &err)
        }
    }
}

fn finish(collection: &str, operation: &str, response: BulkResponse) -> BulkResponse {
    let status = if response.failed_count() == 0 { "success" } else { "partial" };
    metrics::record_operation(collection, operation, status);
    response
}

#[tracing::instrument(skip_all, fields(collection = %store.core().collection()))]
pub(crate) async fn read<P: Persistence + ?Sized>(store: &P, request: ReadRequest) -> Result<BulkResponse, ResourceError> {
    let core = store.core();
    let _timer = crate::time_operation!(core.collection(), "read");
    let (predicate, options) = core.plan_read(&request)?;
    let docs = store.find(&predicate, &options).await?;
    debug!(count = docs.len(), "Read documents");

    let items = docs
        .into_iter()
        .map(|doc| core.to_transport(doc).map(ResponseItem::ok))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(finish(core.collection(), "read", BulkResponse::new(items)))
}

async fn create_one<P: Persistence + ?Sized>(
    store: &P,
    id: String,
    prepared: Result<Document, ResourceError>,
) -> ResponseItem {
    let result: Result<Document, ResourceError> = async {
        let stored = store.insert_one(&prepared?).await?;
        store.core().to_transport(stored)
    }
    .await;
    respond("create", id, result)
}

#[tracing::instrument(skip_all, fields(collection = %store.core().collection(), count = docs.len()))]
pub(crate) async fn create<P: Persistence + ?Sized>(store: &P, docs: Vec<Document>) -> Result<BulkResponse, ResourceError> {
    let core = store.core();
    let _timer = crate::time_operation!(core.collection(), "create");
    metrics::record_batch_size("create", docs.len());
    store.prepare_batch().await?;

    let mut prepared = Vec::with_capacity(docs.len());
    for doc in docs {
        let id = doc.id.clone();
        prepared.push((id, core.prepare_new(doc).await));
    }
    let items = join_all(prepared.into_iter().map(|(id, doc)| create_one(store, id, doc))).await;
    let response = BulkResponse::new(items);
    info!(created = response.items.len() - response.failed_count(), failed = response.failed_count(), "Create finished");
    Ok(finish(core.collection(), "create", response))
}

async fn update_one<P: Persistence + ?Sized>(store: &P, patch: Document) -> ResponseItem {
    let id = patch.id.clone();
    let result: Result<Document, ResourceError> = async {
        if patch.id.is_empty() {
            return Err(ResourceError::not_found());
        }
        let stored = store.load(&patch.id).await?.ok_or_else(ResourceError::not_found)?;
        let prepared = store.core().prepare_patch(patch, &stored)?;
        let merged = store.update_one(&prepared, &stored).await?;
        store.core().to_transport(merged)
    }
    .await;
    respond("update", id, result)
}

#[tracing::instrument(skip_all, fields(collection = %store.core().collection(), count = docs.len()))]
pub(crate) async fn update<P: Persistence + ?Sized>(store: &P, docs: Vec<Document>) -> Result<BulkResponse, ResourceError> {
    let core = store.core();
    let _timer = crate::time_operation!(core.collection(), "update");
    metrics::record_batch_size("update", docs.len());

    let items = join_all(docs.into_iter().map(|doc| update_one(store, doc))).await;
    Ok(finish(core.collection(), "update", BulkResponse::new(items)))
}

/// Best effort: failures are logged and counted, never returned.
async fn emit_event(events: &dyn EventSink, kind: &str, name: &str, doc: &Document) {
    match events.emit(name, doc).await {
        Ok(()) => metrics::record_event(kind, true),
        Err(e) => {
            warn!(event = %name, id = %doc.id, error = %e, "Event emission failed");
            metrics::record_event(kind, false);
        }
    }
}

/// An upsert item after lookup and preparation; `existing` is the stored
/// document when the item takes the update path.
struct PreparedUpsert {
    existing: Option<Document>,
    prepared: Document,
}

async fn prepare_upsert<P: Persistence + ?Sized>(store: &P, doc: Document) -> Result<PreparedUpsert, ResourceError> {
    let existing = if doc.id.is_empty() { None } else { store.load(&doc.id).await? };
    let prepared = match &existing {
        Some(stored) => store.core().prepare_patch(doc, stored)?,
        None => store.core().prepare_new(doc).await?,
    };
    Ok(PreparedUpsert { existing, prepared })
}

async fn upsert_one<P: Persistence + ?Sized>(
    store: &P,
    id: String,
    item: Result<PreparedUpsert, ResourceError>,
    events: &dyn EventSink,
    resource_name: &str,
) -> ResponseItem {
    let PreparedUpsert { existing, prepared } = match item {
        Ok(item) => item,
        Err(err) => return respond("upsert", id, Err(err)),
    };
    let kind = if existing.is_some() { "Modified" } else { "Created" };

    let event_name = format!("{}{}", resource_name, kind);
    let persist = async {
        match &existing {
            Some(stored) => store.upsert_one(&prepared, stored).await,
            None => store.insert_one(&prepared).await,
        }
    };
    let (result, ()) = tokio::join!(persist, emit_event(events, kind, &event_name, &prepared));
    let result = result.and_then(|stored| store.core().to_transport(stored));
    respond("upsert", prepared.id.clone(), result)
}

#[tracing::instrument(skip_all, fields(collection = %store.core().collection(), count = docs.len()))]
pub(crate) async fn upsert<P: Persistence + ?Sized>(
    store: &P,
    docs: Vec<Document>,
    events: &dyn EventSink,
    resource_name: &str,
) -> Result<BulkResponse, ResourceError> {
    let core = store.core();
    let _timer = crate::time_operation!(core.collection(), "upsert");
    metrics::record_batch_size("upsert", docs.len());
    store.prepare_batch().await?;

    let mut prepared = Vec::with_capacity(docs.len());
    for doc in docs {
        let id = doc.id.clone();
        prepared.push((id, prepare_upsert(store, doc).await));
    }
    let items = join_all(
        prepared
            .into_iter()
            .map(|(id, item)| upsert_one(store, id, item, events, resource_name)),
    )
    .await;
    Ok(finish(core.collection(), "upsert", BulkResponse::new(items)))
}

#[tracing::instrument(skip_all, fields(collection = %store.core().collection(), count = ids.len()))]
pub(crate) async fn delete<P: Persistence + ?Sized>(store: &P, ids: Vec<String>) -> Result<DeleteResponse, ResourceError> {
    if ids.is_empty() {
        return Err(ResourceError::invalid("No ids provided for delete"));
    }
    let core = store.core();
    let _timer = crate::time_operation!(core.collection(), "delete");

    let results = store.remove(&ids).await?;
    let status: Vec<ItemStatus> = ids
        .into_iter()
        .zip(results)
        .map(|(id, result)| match result {
            Ok(()) => ItemStatus::ok(id),
            Err(e) => {
                let err = ResourceError::from(e);
                metrics::record_item_error("delete", err.code());
                ItemStatus::from_error(id, &err)
            }
        })
        .collect();

    let failed = status.iter().filter(|s| !s.is_ok()).count();
    metrics::record_operation(core.collection(), "delete", if failed == 0 { "success" } else { "partial" });
    Ok(DeleteResponse { status, operation_status: OperationStatus::success() })
}

#[tracing::instrument(skip_all, fields(collection = %store.core().collection()))]
pub(crate) async fn delete_collection<P: Persistence + ?Sized>(store: &P) -> Result<BulkResponse, ResourceError> {
    let core = store.core();
    let _timer = crate::time_operation!(core.collection(), "delete_collection");

    let options = FindOptions { include: vec!["id".to_string()], ..Default::default() };
    let docs = store.find(&Predicate::empty(), &options).await?;
    let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
    store.remove_all(&ids).await?;
    info!(removed = ids.len(), "Collection cleared");

    let items = docs.into_iter().map(ResponseItem::ok).collect();
    Ok(finish(core.collection(), "delete_collection", BulkResponse::new(items)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Strategy, StrategyEntry};
    use crate::counter::{CounterError, InMemoryCounterStore};
    use crate::document::{Attribute, Meta};
    use crate::events::NoopEventSink;
    use crate::resource::plain::PlainStore;
    use crate::resource::ResourceApi;
    use crate::storage::memory::InMemoryStore;
    use std::collections::HashMap;

    /// Counter store that suspends on every call, like a networked client.
    struct YieldingCounters(InMemoryCounterStore);

    #[async_trait]
    impl CounterStore for YieldingCounters {
        async fn get(&self, key: &str) -> Result<Option<i64>, CounterError> {
            tokio::task::yield_now().await;
            self.0.get(key).await
        }
        async fn set(&self, key: &str, value: i64) -> Result<(), CounterError> {
            self.0.set(key, value).await
        }
        async fn incr(&self, key: &str) -> Result<i64, CounterError> {
            tokio::task::yield_now().await;
            self.0.incr(key).await
        }
        async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, CounterError> {
            self.0.hgetall(key).await
        }
        async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CounterError> {
            self.0.hset(key, field, value).await
        }
        async fn time(&self) -> Result<i64, CounterError> {
            self.0.time().await
        }
    }

    fn sequenced_config() -> ResourceStoreConfig {
        let mut config = ResourceStoreConfig::new("orders");
        config.strategies.insert("seq".to_string(), StrategyEntry::new(Strategy::Increment));
        config
    }

    fn owned() -> Document {
        Document::new("").with_meta(Meta {
            owner: vec![Attribute::new("urn:owner", "org-1")],
            ..Default::default()
        })
    }

    fn seqs(response: &BulkResponse) -> Vec<i64> {
        response
            .items
            .iter()
            .map(|item| item.payload.as_ref().unwrap().fields["seq"].as_i64().unwrap())
            .collect()
    }

    async fn yielding_store() -> PlainStore {
        let counters = Arc::new(YieldingCounters(InMemoryCounterStore::new()));
        PlainStore::new(sequenced_config(), Arc::new(InMemoryStore::new()), counters)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_batch_assigns_distinct_increments() {
        let store = yielding_store().await;
        let response = store.create(vec![owned(), owned(), owned()]).await.unwrap();
        assert_eq!(seqs(&response), vec![0, 1, 2]);

        let response = store.create(vec![owned(), owned()]).await.unwrap();
        assert_eq!(seqs(&response), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_upsert_batch_assigns_distinct_increments() {
        let store = yielding_store().await;
        let response = store
            .upsert(vec![owned(), owned(), owned()], &NoopEventSink, "order")
            .await
            .unwrap();
        assert_eq!(seqs(&response), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_read_limit_is_clamped_to_ceiling() {
        let core = ResourceCore::new(ResourceStoreConfig::new("users"), Arc::new(InMemoryCounterStore::new()))
            .await
            .unwrap();
        assert_eq!(core.config().read_limit, 1000);

        let (_, options) = core.plan_read(&ReadRequest::all().limit(5000)).unwrap();
        assert_eq!(options.limit, Some(1000));

        let (_, options) = core.plan_read(&ReadRequest::all().limit(25)).unwrap();
        assert_eq!(options.limit, Some(25));

        let (_, options) = core.plan_read(&ReadRequest::all()).unwrap();
        assert_eq!(options.limit, Some(1000));

        let (_, options) = core.plan_read(&ReadRequest::all().limit(0)).unwrap();
        assert_eq!(options.limit, Some(1000));
    }

    #[tokio::test]
    async fn test_out_of_range_timestamp_fails_only_its_item() {
        let store = yielding_store().await;
        let mut bad = owned();
        bad.meta.as_mut().unwrap().created = Some(Timestamp::Split { seconds: 9_000_000_000_000_000_000, nanos: 0 });

        let response = store.create(vec![owned(), bad, owned()]).await.unwrap();
        assert!(response.items[0].status.is_ok());
        assert_eq!(response.items[1].status.code, 400);
        assert!(response.items[1].status.message.contains("invalid timestamp"));
        assert!(response.items[2].status.is_ok());
    }
}
