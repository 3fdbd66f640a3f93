// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document model.
//!
//! A [`Document`] has a fixed typed core (`id`, `meta`) and an open extension
//! map holding every other field. On the wire it is a flat JSON object:
//!
//! ```json
//! {
//!   "id": "6a1f...",
//!   "meta": {"created": 1735776000000, "modified": 1735776000000, "owner": []},
//!   "name": "Alice",
//!   "orgs": ["org-1", "org-2"]
//! }
//! ```
//!
//! Numeric ids are accepted and stringified; `0` is treated as "no id" so the
//! identity generator assigns one.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A timestamp in either storage (epoch-millisecond) or transport
/// (`{seconds, nanos}`) form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Split {
        #[serde(default)]
        seconds: i64,
        #[serde(default)]
        nanos: i32,
    },
}

impl Timestamp {
    /// Epoch milliseconds, whatever the representation. `None` when a split
    /// value does not fit.
    #[must_use]
    pub fn as_millis(&self) -> Option<i64> {
        match *self {
            Timestamp::Millis(ms) => Some(ms),
            Timestamp::Split { seconds, nanos } => crate::time::split_to_millis(seconds, i64::from(nanos)),
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        match *self {
            Timestamp::Millis(ms) => ms == 0,
            Timestamp::Split { seconds, nanos } => seconds == 0 && nanos == 0,
        }
    }
}

/// Generic key/value attribute used for owners and ACL entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
}

impl Attribute {
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self { id: id.into(), value: value.into(), attributes: Vec::new() }
    }
}

/// Ownership and audit metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
    #[serde(default)]
    pub owner: Vec<Attribute>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acls: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Meta {
    /// True when the metadata carries nothing at all (an empty `{}` on the wire).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_none()
            && self.modified.is_none()
            && self.modified_by.is_none()
            && self.owner.is_empty()
            && self.acls.is_empty()
            && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, deserialize_with = "id_from_value")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

fn id_from_value<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) if n.as_f64() == Some(0.0) => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid document id: {}", other))),
    }
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with(mut self, field: &str, value: Value) -> Self {
        self.set(field, value);
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Look up a top-level field. `id` resolves to the typed core.
    pub fn get(&self, field: &str) -> Option<Value> {
        match field {
            "id" if self.id.is_empty() => None,
            "id" => Some(Value::String(self.id.clone())),
            "meta" => self.meta.as_ref().and_then(|m| serde_json::to_value(m).ok()),
            _ => self.fields.get(field).cloned(),
        }
    }

    pub fn set(&mut self, field: &str, value: Value) {
        match field {
            "id" => {
                self.id = match value {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
            }
            _ => {
                self.fields.insert(field.to_string(), value);
            }
        }
    }

    pub fn has_meta(&self) -> bool {
        self.meta.as_ref().map(|m| !m.is_empty()).unwrap_or(false)
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Shallow merge of `patch` over `self`. Null patch fields are ignored;
    /// `meta` is handled by the caller.
    pub fn merge_fields(&mut self, patch: &Document) {
        for (key, value) in &patch.fields {
            if !value.is_null() {
                self.fields.insert(key.clone(), value.clone());
            }
        }
    }

    /// Keep only the given fields (plus `id`). Used for field masks and for the
    /// id projection returned by collection deletes.
    #[must_use]
    pub fn project(&self, include: &[String], exclude: &[String]) -> Document {
        let mut out = self.clone();
        if !include.is_empty() {
            if !include.iter().any(|f| f == "meta") {
                out.meta = None;
            }
            out.fields.retain(|k, _| include.iter().any(|f| f == k));
        }
        for field in exclude {
            if field == "meta" {
                out.meta = None;
            } else {
                out.fields.remove(field);
            }
        }
        out
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Document({})", if self.id.is_empty() { "<new>" } else { &self.id })
    }
}
