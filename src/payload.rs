//! Opaque payload field codec.
//!
//! One configured document field carries arbitrary structured content that
//! travels as a bytes envelope:
//!
//! ```text
//! transport:  {"data": {"value": "eyJrIjoxfQ=="}}     // base64 of {"k":1}
//! storage:    {"data": {"k": 1}}
//! ```
//!
//! On decode the envelope bytes may also be a JSON array of octets, which is
//! how `Buffer`-style clients serialize them. The two directions are not
//! paired automatically: the store decodes before persisting and encodes
//! before returning documents.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use crate::document::Document;
use crate::status::ResourceError;

#[derive(Debug, Clone)]
pub struct PayloadCodec {
    field: Option<String>,
}

impl PayloadCodec {
    pub fn new(field: Option<String>) -> Self {
        Self { field }
    }

    pub fn disabled() -> Self {
        Self { field: None }
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// `{value: bytes}` → parsed JSON. No-op when the field is absent or the
    /// envelope is empty.
    pub fn decode_for_storage(&self, doc: &mut Document) -> Result<(), ResourceError> {
        let Some(field) = self.field.as_deref() else {
            return Ok(());
        };
        let Some(envelope @ Value::Object(_)) = doc.fields.get(field) else {
            return Ok(());
        };
        let Some(parsed) = decode_envelope(field, envelope)? else {
            return Ok(());
        };
        doc.fields.insert(field.to_string(), parsed);
        Ok(())
    }

    /// Structured value → `{value: base64}`. No-op when the field is absent or
    /// falsy (`null`, `false`, `0`, `""`).
    pub fn encode_for_transport(&self, doc: &mut Document) -> Result<(), ResourceError> {
        let Some(field) = self.field.as_deref() else {
            return Ok(());
        };
        let Some(value) = doc.fields.get(field) else {
            return Ok(());
        };
        if !is_truthy(value) {
            return Ok(());
        }
        let envelope = encode_envelope(value)?;
        doc.fields.insert(field.to_string(), envelope);
        Ok(())
    }
}

/// Parse the JSON carried by a `{value: bytes}` envelope. `Ok(None)` when the
/// envelope is missing or empty. `label` names the field in error messages.
pub fn decode_envelope(label: &str, envelope: &Value) -> Result<Option<Value>, ResourceError> {
    let bytes = match envelope.get("value") {
        Some(Value::String(s)) if !s.is_empty() => STANDARD
            .decode(s)
            .map_err(|e| ResourceError::invalid(format!("field {} is not valid base64: {}", label, e)))?,
        Some(Value::Array(octets)) if !octets.is_empty() => octets_to_bytes(label, octets)?,
        _ => return Ok(None),
    };
    let text = String::from_utf8(bytes)
        .map_err(|e| ResourceError::invalid(format!("field {} is not valid UTF-8: {}", label, e)))?;
    let parsed = serde_json::from_str(&text)
        .map_err(|e| ResourceError::invalid(format!("field {} does not contain JSON: {}", label, e)))?;
    Ok(Some(parsed))
}

/// Serialize `value` into a `{value: base64}` envelope.
pub fn encode_envelope(value: &Value) -> Result<Value, ResourceError> {
    let bytes = serde_json::to_vec(value).map_err(|e| ResourceError::unknown(e.to_string()))?;
    Ok(json!({"value": STANDARD.encode(bytes)}))
}

fn octets_to_bytes(field: &str, octets: &[Value]) -> Result<Vec<u8>, ResourceError> {
    octets
        .iter()
        .map(|v| {
            v.as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| ResourceError::invalid(format!("field {} contains a non-octet byte value", field)))
        })
        .collect()
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
