// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Lifecycle event emission.
//!
//! `upsert` emits one `<resource>Created` or `<resource>Modified` event per
//! document. Emission is best-effort: failures are logged and never fail the
//! item that triggered them.

mod redis_stream;

pub use redis_stream::{event_stream_key, EventEntry, RedisStreamSink, EVENT_STREAM_SUFFIX};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::document::Document;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("Event sink error: {0}")]
    Sink(String),
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, name: &str, payload: &Document) -> Result<(), EventError>;
}

/// Keeps every emitted event in memory. Useful in tests and for wiring a
/// store without an event bus.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(String, Document)>>,
}

impl RecordingEventSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Document)> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, name: &str, payload: &Document) -> Result<(), EventError> {
        self.events.lock().push((name.to_string(), payload.clone()));
        Ok(())
    }
}

/// Drops every event.
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn emit(&self, _name: &str, _payload: &Document) -> Result<(), EventError> {
        Ok(())
    }
}
