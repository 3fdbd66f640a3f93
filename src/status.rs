// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caller-facing error and status types.
//!
//! Every item of a batch carries its own [`ItemStatus`]; only request-level
//! problems (bad filters, empty id lists, backend setup failures) surface as
//! `Err(ResourceError)` from the store operations.
//!
//! Status codes follow HTTP conventions:
//!
//! | Error | Code |
//! |-------|------|
//! | `InvalidArgument` | 400 |
//! | `NotFound` | 404 |
//! | `AlreadyExists` | 409 |
//! | `Unknown` | caller supplied, 500 by default |

use serde::Serialize;
use thiserror::Error;

use crate::counter::CounterError;
use crate::document::Document;
use crate::events::EventError;
use crate::filter::FilterError;
use crate::storage::traits::StorageError;

pub const DOCUMENT_NOT_FOUND: &str = "document not found";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Unknown { code: u16, message: String },
}

impl ResourceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown { code: 500, message: message.into() }
    }

    pub fn not_found() -> Self {
        Self::NotFound(DOCUMENT_NOT_FOUND.to_string())
    }

    /// HTTP-style status code for this error.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) => 400,
            Self::NotFound(_) => 404,
            Self::AlreadyExists(_) => 409,
            Self::Unknown { code, .. } => *code,
        }
    }
}

impl From<StorageError> for ResourceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::not_found(),
            StorageError::AlreadyExists(msg) => Self::AlreadyExists(msg),
            StorageError::Backend(msg) => Self::unknown(msg),
        }
    }
}

impl From<CounterError> for ResourceError {
    fn from(err: CounterError) -> Self {
        Self::unknown(err.to_string())
    }
}

impl From<FilterError> for ResourceError {
    fn from(err: FilterError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<EventError> for ResourceError {
    fn from(err: EventError) -> Self {
        Self::unknown(err.to_string())
    }
}

/// Outcome of one item or of a whole request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemStatus {
    pub id: String,
    pub code: u16,
    pub message: String,
}

impl ItemStatus {
    pub fn ok(id: impl Into<String>) -> Self {
        Self { id: id.into(), code: 200, message: "success".to_string() }
    }

    pub fn from_error(id: impl Into<String>, err: &ResourceError) -> Self {
        Self { id: id.into(), code: err.code(), message: err.to_string() }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == 200
    }
}

/// Request-level status. Always 200 once the batch itself was processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationStatus {
    pub code: u16,
    pub message: String,
}

impl OperationStatus {
    pub fn success() -> Self {
        Self { code: 200, message: "success".to_string() }
    }
}

impl Default for OperationStatus {
    fn default() -> Self {
        Self::success()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseItem {
    /// The stored (or read) document; `None` when the item failed.
    pub payload: Option<Document>,
    pub status: ItemStatus,
}

impl ResponseItem {
    pub fn ok(doc: Document) -> Self {
        let status = ItemStatus::ok(doc.id.clone());
        Self { payload: Some(doc), status }
    }

    pub fn failed(id: impl Into<String>, err: &ResourceError) -> Self {
        Self { payload: None, status: ItemStatus::from_error(id, err) }
    }
}

/// Response of `read`, `create`, `update`, `upsert` and `delete_collection`.
#[derive(Debug, Clone, Serialize)]
pub struct BulkResponse {
    pub items: Vec<ResponseItem>,
    pub operation_status: OperationStatus,
}

impl BulkResponse {
    pub fn new(items: Vec<ResponseItem>) -> Self {
        Self { items, operation_status: OperationStatus::success() }
    }

    /// Documents of the successful items, in request order.
    pub fn documents(&self) -> Vec<&Document> {
        self.items.iter().filter_map(|i| i.payload.as_ref()).collect()
    }

    pub fn failed_count(&self) -> usize {
        self.items.iter().filter(|i| !i.status.is_ok()).count()
    }
}

/// Response of `delete`.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub status: Vec<ItemStatus>,
    pub operation_status: OperationStatus,
}
