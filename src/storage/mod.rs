// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage backends.
//!
//! - [`memory::InMemoryStore`]: DashMap-backed documents plus a simple graph
//!   (vertex and edge collections), evaluating predicates in process.
//! - [`sql::SqlStore`]: documents as JSON text in SQLite or MySQL via sqlx
//!   `Any`, predicates translated to `JSON_EXTRACT` clauses.

pub mod memory;
pub mod sql;
pub mod traits;
