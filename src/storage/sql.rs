// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL document backend.
//!
//! Every collection shares one table; documents are stored as JSON text so
//! predicates can be evaluated with `JSON_EXTRACT`:
//!
//! ```sql
//! CREATE TABLE documents (
//!   seq BIGINT AUTO_INCREMENT PRIMARY KEY,  -- insertion order
//!   collection VARCHAR(255) NOT NULL,
//!   id VARCHAR(255) NOT NULL,
//!   payload LONGTEXT NOT NULL,              -- full document JSON
//!   UNIQUE KEY uq_documents (collection, id)
//! )
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! We use TEXT instead of native JSON type because sqlx's `Any` driver
//! doesn't support MySQL's JSON type mapping, and reads LONGTEXT as bytes.
//!
//! ## Custom queries
//!
//! Named SQL fragments can be registered and referenced from a read's
//! `custom_queries`. Their `?` placeholders are bound, in order, from the
//! listed keys of the read's `custom_arguments` object:
//!
//! ```rust,no_run
//! # use resource_store::storage::sql::{SqlStore, CustomSql};
//! # async fn example(store: &SqlStore) {
//! store.register_custom_query("older_than", CustomSql::new(
//!     "json_extract(payload, '$.age') > ?",
//!     ["min_age"],
//! ));
//! # }
//! ```

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use sqlx::any::{AnyArguments, AnyPoolOptions};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Row};
use std::sync::Once;
use std::time::Duration;
use tracing::debug;

use super::traits::{DocumentBackend, FindOptions, ItemResult, SortOrder, StorageError};
use crate::document::Document;
use crate::filter::{Predicate, SqlDialect, SqlParam, SqlTranslator};
use crate::resilience::retry::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// A registered SQL fragment and the argument keys it binds.
#[derive(Debug, Clone)]
pub struct CustomSql {
    pub clause: String,
    pub args: Vec<String>,
}

impl CustomSql {
    pub fn new<I, S>(clause: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            clause: clause.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

pub struct SqlStore {
    pool: AnyPool,
    dialect: SqlDialect,
    custom_queries: DashMap<String, CustomSql>,
}

impl SqlStore {
    /// Create a new SQL store with startup-mode retry (fails fast if config is wrong).
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        install_drivers();

        let dialect = if connection_string.starts_with("sqlite:") {
            SqlDialect::Sqlite
        } else {
            SqlDialect::MySql
        };

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let store = Self { pool, dialect, custom_queries: DashMap::new() };

        if dialect == SqlDialect::Sqlite {
            store.enable_wal_mode().await?;
        }

        store.init_schema().await?;
        Ok(store)
    }

    /// Get a clone of the connection pool for sharing with other stores.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    pub fn register_custom_query(&self, name: &str, query: CustomSql) {
        self.custom_queries.insert(name.to_string(), query);
    }

    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let sql = match self.dialect {
            SqlDialect::Sqlite => {
                r#"
                CREATE TABLE IF NOT EXISTS documents (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    collection TEXT NOT NULL,
                    id TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    UNIQUE (collection, id)
                )
                "#
            }
            SqlDialect::MySql => {
                r#"
                CREATE TABLE IF NOT EXISTS documents (
                    seq BIGINT AUTO_INCREMENT PRIMARY KEY,
                    collection VARCHAR(255) NOT NULL,
                    id VARCHAR(255) NOT NULL,
                    payload LONGTEXT NOT NULL,
                    UNIQUE KEY uq_documents (collection, id)
                )
                "#
            }
        };

        retry("sql_init_schema", &RetryConfig::startup(), || async {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        Ok(())
    }

    fn payload_of(row: &sqlx::any::AnyRow) -> Result<Document, StorageError> {
        // Try reading payload as String first (SQLite TEXT), then as bytes (MySQL LONGTEXT)
        let payload: String = row
            .try_get::<String, _>("payload")
            .ok()
            .or_else(|| {
                row.try_get::<Vec<u8>, _>("payload")
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
            .ok_or_else(|| StorageError::Backend("No payload in row".to_string()))?;
        serde_json::from_str(&payload).map_err(|e| StorageError::Backend(format!("Invalid JSON payload: {}", e)))
    }

    async fn load(&self, collection: &str, id: &str) -> Result<Option<Document>, StorageError> {
        let row = sqlx::query("SELECT payload FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.as_ref().map(Self::payload_of).transpose()
    }

    async fn insert_one(&self, collection: &str, doc: &Document) -> ItemResult {
        if doc.id.is_empty() {
            return Err(StorageError::Backend("document id missing".to_string()));
        }
        let payload = serde_json::to_string(doc).map_err(|e| StorageError::Backend(e.to_string()))?;

        // No retry: a lost acknowledgement would turn into a false conflict
        sqlx::query("INSERT INTO documents (collection, id, payload) VALUES (?, ?, ?)")
            .bind(collection)
            .bind(&doc.id)
            .bind(&payload)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, &doc.id))?;
        Ok(doc.clone())
    }

    async fn update_one(&self, collection: &str, patch: &Document) -> ItemResult {
        let mut stored = self.load(collection, &patch.id).await?.ok_or(StorageError::NotFound)?;
        stored.merge_fields(patch);
        if patch.meta.is_some() {
            stored.meta = patch.meta.clone();
        }
        let payload = serde_json::to_string(&stored).map_err(|e| StorageError::Backend(e.to_string()))?;

        let result = sqlx::query("UPDATE documents SET payload = ? WHERE collection = ? AND id = ?")
            .bind(&payload)
            .bind(collection)
            .bind(&patch.id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(stored)
    }

    fn order_by(&self, sort: &[(String, SortOrder)], params: &mut Vec<SqlParam>) -> String {
        let extract = match self.dialect {
            SqlDialect::Sqlite => "json_extract(payload, ?)",
            SqlDialect::MySql => "JSON_EXTRACT(payload, ?)",
        };
        let mut parts: Vec<String> = sort
            .iter()
            .map(|(field, order)| {
                params.push(SqlParam::Text(format!("$.{}", field)));
                let dir = match order {
                    SortOrder::Ascending => "ASC",
                    SortOrder::Descending => "DESC",
                };
                format!("{} {}", extract, dir)
            })
            .collect();
        parts.push("seq ASC".to_string());
        parts.join(", ")
    }

    fn custom_clauses(&self, options: &FindOptions, params: &mut Vec<SqlParam>) -> Result<Vec<String>, StorageError> {
        let mut clauses = Vec::with_capacity(options.custom_queries.len());
        for name in &options.custom_queries {
            let query = self
                .custom_queries
                .get(name)
                .map(|q| q.value().clone())
                .ok_or_else(|| StorageError::Backend(format!("custom query {} not found", name)))?;
            for key in &query.args {
                let arg = options
                    .custom_arguments
                    .as_ref()
                    .and_then(|a| a.get(key))
                    .ok_or_else(|| StorageError::Backend(format!("custom query {} needs argument {}", name, key)))?;
                params.push(value_param(arg));
            }
            clauses.push(format!("({})", query.clause));
        }
        Ok(clauses)
    }
}

/// Map a write error, recognising unique-key violations.
fn classify(err: sqlx::Error, id: &str) -> StorageError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            StorageError::AlreadyExists(format!("unique constraint violated - {}; conflicting key: {}", db.message(), id))
        }
        _ => StorageError::Backend(err.to_string()),
    }
}

fn value_param(value: &Value) -> SqlParam {
    match value {
        Value::String(s) => SqlParam::Text(s.clone()),
        Value::Bool(b) => SqlParam::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlParam::Integer(i),
            None => SqlParam::Numeric(n.as_f64().unwrap_or_default()),
        },
        other => SqlParam::Text(other.to_string()),
    }
}

fn bind_param<'q>(query: Query<'q, Any, AnyArguments<'q>>, param: &SqlParam) -> Query<'q, Any, AnyArguments<'q>> {
    match param {
        SqlParam::Text(s) => query.bind(s.clone()),
        SqlParam::Integer(i) => query.bind(*i),
        SqlParam::Numeric(f) => query.bind(*f),
        SqlParam::Boolean(b) => query.bind(*b),
    }
}

#[async_trait]
impl DocumentBackend for SqlStore {
    async fn find(&self, collection: &str, predicate: &Predicate, options: &FindOptions) -> Result<Vec<Document>, StorageError> {
        let translated = SqlTranslator::new(self.dialect, "payload").translate(predicate);
        let mut params = translated.params;
        let mut conditions = vec![translated.clause];
        conditions.extend(self.custom_clauses(options, &mut params)?);
        let order_by = self.order_by(&options.sort, &mut params);

        let sql = format!(
            "SELECT payload FROM documents WHERE collection = ? AND {} ORDER BY {} LIMIT ? OFFSET ?",
            conditions.join(" AND "),
            order_by
        );
        let limit = options.limit.map(|l| l as i64).unwrap_or(i64::MAX);
        let offset = options.offset as i64;
        debug!(collection = %collection, sql = %sql, "SQL find");

        let rows = retry("sql_find", &RetryConfig::query(), || async {
            let mut query = sqlx::query(&sql).bind(collection.to_string());
            for param in &params {
                query = bind_param(query, param);
            }
            query
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        rows.iter()
            .map(|row| Self::payload_of(row).map(|doc| doc.project(&options.include, &options.exclude)))
            .collect()
    }

    async fn insert(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError> {
        let mut results = Vec::with_capacity(docs.len());
        for doc in docs {
            results.push(self.insert_one(collection, doc).await);
        }
        Ok(results)
    }

    async fn update(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError> {
        let mut results = Vec::with_capacity(docs.len());
        for doc in docs {
            results.push(self.update_one(collection, doc).await);
        }
        Ok(results)
    }

    async fn upsert(&self, collection: &str, docs: &[Document]) -> Result<Vec<ItemResult>, StorageError> {
        let mut results = Vec::with_capacity(docs.len());
        for doc in docs {
            let result = match self.update_one(collection, doc).await {
                Err(StorageError::NotFound) => self.insert_one(collection, doc).await,
                other => other,
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<Vec<Result<(), StorageError>>, StorageError> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            // No retry: a retried delete whose first acknowledgement was lost
            // affects no rows and would report a false NotFound
            let affected = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id.as_str())
                .execute(&self.pool)
                .await
                .map(|r| r.rows_affected())
                .map_err(|e| StorageError::Backend(e.to_string()));
            results.push(match affected {
                Ok(0) => Err(StorageError::NotFound),
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            });
        }
        Ok(results)
    }

    async fn truncate(&self, collection: &str) -> Result<(), StorageError> {
        retry("sql_truncate", &RetryConfig::query(), || async {
            sqlx::query("DELETE FROM documents WHERE collection = ?")
                .bind(collection)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StorageError> {
        self.load(collection, id).await
    }
}
