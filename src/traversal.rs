//! Re-encoding of graph traversal result batches for streaming.
//!
//! A traversal yields batches of root vertices and batches of associations
//! (`{v: vertex, p: path}`). Before a batch goes on the wire the storage
//! bookkeeping keys are stripped, date fields of known entities become
//! ISO-8601 strings, and the whole list is wrapped in a `{value: bytes}`
//! envelope.

use serde_json::Value;
use std::collections::HashMap;

use crate::payload::encode_envelope;
use crate::status::ResourceError;
use crate::time::TimeFieldNormalizer;

const STRIPPED_KEYS: [&str; 2] = ["_key", "_rev"];

/// Envelopes produced for one association batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssociationChunk {
    pub data: Option<Value>,
    pub paths: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct TraversalEncoder {
    /// Entity (vertex collection) name → date-time paths.
    date_fields: HashMap<String, TimeFieldNormalizer>,
}

impl TraversalEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_date_fields<I, S>(mut self, entity: &str, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.date_fields.insert(entity.to_string(), TimeFieldNormalizer::new(paths));
        self
    }

    /// Root vertices: strip bookkeeping keys and wrap.
    pub fn encode_roots(&self, mut batch: Vec<Value>) -> Result<Value, ResourceError> {
        batch.iter_mut().for_each(strip);
        encode_envelope(&Value::Array(batch))
    }

    /// Associations: strip and convert each vertex, optionally collect paths.
    /// Empty lists produce no envelope.
    pub fn encode_associations(&self, batch: Vec<Value>, include_paths: bool) -> Result<AssociationChunk, ResourceError> {
        let mut vertices = Vec::with_capacity(batch.len());
        let mut paths = Vec::new();
        for mut entry in batch {
            let Some(mut vertex) = entry.get_mut("v").map(Value::take) else {
                continue;
            };
            strip(&mut vertex);
            if let Some(normalizer) = entity_of(&vertex).and_then(|e| self.date_fields.get(e)) {
                normalizer.to_iso_value(&mut vertex);
            }
            vertices.push(vertex);
            if include_paths {
                if let Some(path) = entry.get_mut("p").map(Value::take) {
                    paths.push(path);
                }
            }
        }

        let data = if vertices.is_empty() { None } else { Some(encode_envelope(&Value::Array(vertices))?) };
        let paths = if paths.is_empty() { None } else { Some(encode_envelope(&Value::Array(paths))?) };
        Ok(AssociationChunk { data, paths })
    }
}

fn strip(vertex: &mut Value) {
    if let Value::Object(map) = vertex {
        for key in STRIPPED_KEYS {
            map.remove(key);
        }
    }
}

/// Collection part of a `collection/key` vertex id.
fn entity_of(vertex: &Value) -> Option<&str> {
    vertex.get("_id")?.as_str()?.split('/').next()
}
