//! Redis Stream event sink.
//!
//! Each event is appended to `{prefix}events`:
//!
//! ```text
//! XADD {prefix}events MAXLEN ~ 100000 *
//!   event  "userCreated"
//!   id     "6a1f..."
//!   data   '{"id":"6a1f...","name":"Alice",...}'
//! ```

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, Client};
use tracing::debug;

use super::{EventError, EventSink};
use crate::document::Document;
use crate::counter::redis::is_transient;
use crate::resilience::retry::{retry, retry_when, RetryConfig};

/// Stream key suffix (appended to the key prefix).
/// Convention: prefix includes trailing colon (e.g., "resources:").
pub const EVENT_STREAM_SUFFIX: &str = "events";

const DEFAULT_MAXLEN: usize = 100_000;

/// Build the full stream key from an optional prefix
pub fn event_stream_key(prefix: Option<&str>) -> String {
    match prefix {
        Some(p) => format!("{}{}", p, EVENT_STREAM_SUFFIX),
        None => EVENT_STREAM_SUFFIX.to_string(),
    }
}

/// A stream entry ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEntry {
    pub event: String,
    pub id: String,
    pub data: String,
}

impl EventEntry {
    pub fn new(event: &str, doc: &Document) -> Result<Self, EventError> {
        let data = serde_json::to_string(doc).map_err(|e| EventError::Sink(e.to_string()))?;
        Ok(Self {
            event: event.to_string(),
            id: doc.id.clone(),
            data,
        })
    }

    /// XADD field-value pairs.
    pub fn to_redis_fields(&self) -> Vec<(&'static str, &str)> {
        vec![("event", self.event.as_str()), ("id", self.id.as_str()), ("data", self.data.as_str())]
    }
}

pub struct RedisStreamSink {
    connection: ConnectionManager,
    stream_key: String,
    maxlen: usize,
}

impl RedisStreamSink {
    pub async fn new(connection_string: &str, prefix: Option<&str>) -> Result<Self, EventError> {
        let client = Client::open(connection_string).map_err(|e| EventError::Sink(e.to_string()))?;

        let connection = retry("redis_events_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| EventError::Sink(e.to_string()))?;

        Ok(Self::from_connection(connection, prefix))
    }

    pub fn from_connection(connection: ConnectionManager, prefix: Option<&str>) -> Self {
        Self {
            connection,
            stream_key: event_stream_key(prefix),
            maxlen: DEFAULT_MAXLEN,
        }
    }

    #[must_use]
    pub fn with_maxlen(mut self, maxlen: usize) -> Self {
        self.maxlen = maxlen;
        self
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }
}

#[async_trait]
impl EventSink for RedisStreamSink {
    async fn emit(&self, name: &str, payload: &Document) -> Result<(), EventError> {
        let entry = EventEntry::new(name, payload)?;
        let conn = self.connection.clone();

        let entry_id: String = retry_when("redis_xadd", &RetryConfig::query(), is_transient, || {
            let mut conn = conn.clone();
            let mut xadd = cmd("XADD");
            xadd.arg(&self.stream_key).arg("MAXLEN").arg("~").arg(self.maxlen).arg("*");
            for (field, value) in entry.to_redis_fields() {
                xadd.arg(field).arg(value);
            }
            async move { xadd.query_async(&mut conn).await }
        })
        .await
        .map_err(|e: redis::RedisError| EventError::Sink(e.to_string()))?;

        debug!(stream = %self.stream_key, event = %name, entry_id = %entry_id, "Event appended");
        Ok(())
    }
}
