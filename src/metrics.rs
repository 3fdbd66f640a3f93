// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for resource-store.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host service is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `resource_store_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `collection`: the store's collection
//! - `operation`: read, create, update, upsert, delete, delete_collection
//! - `status`: success, partial, error

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Record a completed store operation
pub fn record_operation(collection: &str, operation: &str, status: &str) {
    counter!(
        "resource_store_operations_total",
        "collection" => collection.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(collection: &str, operation: &str, duration: Duration) {
    histogram!(
        "resource_store_operation_seconds",
        "collection" => collection.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record the number of documents in a batch
pub fn record_batch_size(operation: &str, count: usize) {
    histogram!(
        "resource_store_batch_size",
        "operation" => operation.to_string()
    )
    .record(count as f64);
}

/// Record a failed batch item, labelled by status code
pub fn record_item_error(operation: &str, code: u16) {
    counter!(
        "resource_store_item_errors_total",
        "operation" => operation.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
}

/// Record an edge type being removed and recreated
pub fn record_edge_rewrite(edge: &str) {
    counter!(
        "resource_store_edge_rewrites_total",
        "edge" => edge.to_string()
    )
    .increment(1);
}

/// Record an emitted (or failed) resource event
pub fn record_event(kind: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "resource_store_events_total",
        "kind" => kind.to_string(),
        "status" => status
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    collection: String,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(collection: &str, operation: &'static str) -> Self {
        Self {
            collection: collection.to_string(),
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(&self.collection, self.operation, self.start.elapsed());
    }
}

/// Convenience macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($collection:expr, $op:expr) => {
        $crate::metrics::LatencyTimer::new($collection, $op)
    };
}
