// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Filter language and predicate compilation.
//!
//! Callers send nested filter trees; backends consume a canonical predicate.
//!
//! # Architecture
//!
//! ```text
//! FilterGroup / FilterNode (wire AST)
//!     ↓  ValueCoercer (raw string → typed value)
//!     ↓  FilterCompiler
//! Predicate ({"$and": [...]} / {"$or": [...]})
//!     ├─→ PredicateMatcher → in-memory evaluation
//!     └─→ SqlTranslator    → JSON_EXTRACT WHERE clause
//! ```
//!
//! # Example
//!
//! ```
//! use resource_store::filter::{FilterCompiler, FilterNode};
//! use serde_json::json;
//!
//! let tree: FilterNode = serde_json::from_value(json!({
//!     "filters": {
//!         "filter": [
//!             {"field": "device_id", "operation": "eq", "value": "12345"},
//!             {"field": "device_active", "operation": "eq", "value": "true", "type": "BOOLEAN"}
//!         ],
//!         "operator": "or"
//!     }
//! })).unwrap();
//!
//! let predicate = FilterCompiler::compile_node(&tree).unwrap();
//! assert_eq!(
//!     predicate.to_value(),
//!     json!({"$or": [{"device_id": "12345"}, {"device_active": true}]})
//! );
//! ```

mod ast;
mod coerce;
mod compiler;
mod matcher;
mod predicate;
mod sql_translator;

pub use ast::{Filter, FilterGroup, FilterNode, FilterOperation, NestedFilters, Operator, ValueType};
pub use coerce::ValueCoercer;
pub use compiler::FilterCompiler;
pub use matcher::PredicateMatcher;
pub use predicate::Predicate;
pub use sql_translator::{SqlDialect, SqlParam, SqlQuery, SqlTranslator};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter value '{value}' for field {field} is not a number")]
    InvalidNumber { field: String, value: String },
    #[error("filter value '{value}' for field {field} is not a date")]
    InvalidDate { field: String, value: String },
    #[error("unknown {kind} code {code}")]
    UnknownCode { kind: &'static str, code: i64 },
    #[error("malformed filter: {0}")]
    Malformed(String),
}
