// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Timestamp normalization between storage and transport forms.
//!
//! Documents are stored with epoch-millisecond timestamps and returned to
//! callers in split form:
//!
//! ```text
//! storage:    {"meta": {"created": 1735776000123}}
//! transport:  {"meta": {"created": {"seconds": 1735776000, "nanos": 123000000}}}
//! ```
//!
//! Paths are dotted (`meta.created`, `history.at`). When an intermediate
//! segment holds an array, the rest of the path is applied to every element.
//! A terminal value is converted only when present and non-null; absent
//! fields are never materialized.
//!
//! Conversion is lossy below one millisecond: `nanos` finer than 1ms are
//! dropped by [`TimeFieldNormalizer::to_millis`]. A split value whose
//! seconds do not fit in epoch milliseconds is rejected with
//! [`TimeError::OutOfRange`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::document::Document;

const NANOS_PER_MILLI: i64 = 1_000_000;

#[derive(Debug, Error)]
pub enum TimeError {
    #[error("timestamp at {path} is out of range")]
    OutOfRange { path: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Marker for a split value that overflows epoch milliseconds.
#[derive(Debug)]
struct OutOfRange;

/// Split epoch milliseconds into `(seconds, nanos)` with `0 <= nanos < 1e9`.
#[must_use]
pub fn millis_to_split(ms: i64) -> (i64, i32) {
    let seconds = ms.div_euclid(1000);
    let nanos = ms.rem_euclid(1000) * NANOS_PER_MILLI;
    (seconds, nanos as i32)
}

/// `None` when the result does not fit in an `i64`.
#[must_use]
pub fn split_to_millis(seconds: i64, nanos: i64) -> Option<i64> {
    seconds.checked_mul(1000)?.checked_add(nanos.div_euclid(NANOS_PER_MILLI))
}

/// ISO-8601 / RFC 3339 form with millisecond precision and a `Z` suffix.
#[must_use]
pub fn millis_to_iso(ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    ToSplit,
    ToMillis,
    ToIso,
}

/// One configured dotted path, pre-split into segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path.split('.').filter(|s| !s.is_empty()).map(String::from).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimeFieldNormalizer {
    paths: Vec<FieldPath>,
}

impl TimeFieldNormalizer {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            paths: paths.into_iter().map(|p| FieldPath::parse(p.as_ref())).collect(),
        }
    }

    pub fn paths(&self) -> &[FieldPath] {
        &self.paths
    }

    /// Epoch-ms → `{seconds, nanos}` for every configured path.
    pub fn to_split(&self, docs: &mut [Document]) -> Result<(), TimeError> {
        self.apply_docs(docs, Conversion::ToSplit)
    }

    /// `{seconds, nanos}` → epoch-ms for every configured path.
    pub fn to_millis(&self, docs: &mut [Document]) -> Result<(), TimeError> {
        self.apply_docs(docs, Conversion::ToMillis)
    }

    pub fn to_split_value(&self, value: &mut Value) -> Result<(), TimeError> {
        self.apply(value, Conversion::ToSplit)
    }

    pub fn to_millis_value(&self, value: &mut Value) -> Result<(), TimeError> {
        self.apply(value, Conversion::ToMillis)
    }

    /// Epoch-ms (or split) → ISO-8601 string. Used when re-encoding traversal
    /// results, which carry dates as strings.
    pub fn to_iso_value(&self, value: &mut Value) {
        // out-of-range values have no ISO form; they stay as they are
        let _ = self.apply(value, Conversion::ToIso);
    }

    fn apply_docs(&self, docs: &mut [Document], conversion: Conversion) -> Result<(), TimeError> {
        if self.paths.is_empty() {
            return Ok(());
        }
        for doc in docs.iter_mut() {
            let mut value = doc.to_value()?;
            self.apply(&mut value, conversion)?;
            *doc = Document::from_value(value)?;
        }
        Ok(())
    }

    fn apply(&self, value: &mut Value, conversion: Conversion) -> Result<(), TimeError> {
        for path in &self.paths {
            walk(value, path.segments(), conversion).map_err(|OutOfRange| TimeError::OutOfRange {
                path: path.segments().join("."),
            })?;
        }
        Ok(())
    }
}

fn walk(value: &mut Value, segments: &[String], conversion: Conversion) -> Result<(), OutOfRange> {
    match (value, segments) {
        (_, []) => Ok(()),
        // broadcast the remaining path over every element
        (Value::Array(items), _) => items.iter_mut().try_for_each(|item| walk(item, segments, conversion)),
        (Value::Object(map), [last]) => match map.get_mut(last.as_str()) {
            Some(target) => convert(target, conversion),
            None => Ok(()),
        },
        (Value::Object(map), [head, rest @ ..]) => match map.get_mut(head.as_str()) {
            Some(child) => walk(child, rest, conversion),
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

fn convert(value: &mut Value, conversion: Conversion) -> Result<(), OutOfRange> {
    if let Value::Array(items) = value {
        return items.iter_mut().try_for_each(|item| convert(item, conversion));
    }
    let converted = match conversion {
        Conversion::ToSplit => as_millis(value).map(|ms| {
            let (seconds, nanos) = millis_to_split(ms);
            json!({"seconds": seconds, "nanos": nanos})
        }),
        Conversion::ToMillis => split_millis(value)?.map(Value::from),
        Conversion::ToIso => {
            let ms = as_millis(value).or_else(|| split_millis(value).ok().flatten());
            ms.and_then(millis_to_iso).map(Value::String)
        }
    };
    if let Some(new_value) = converted {
        *value = new_value;
    }
    Ok(())
}

/// A bare epoch-ms number (integer or float).
fn as_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64)),
        _ => None,
    }
}

/// A split `{seconds, nanos}` object, or an RFC 3339 string, as epoch-ms.
/// Values of any other shape are `Ok(None)` and left alone.
fn split_millis(value: &Value) -> Result<Option<i64>, OutOfRange> {
    match value {
        Value::Object(map) if map.contains_key("seconds") || map.contains_key("nanos") => {
            match (int_field(map, "seconds"), int_field(map, "nanos")) {
                (Some(seconds), Some(nanos)) => split_to_millis(seconds, nanos).map(Some).ok_or(OutOfRange),
                _ => Ok(None),
            }
        }
        Value::String(s) => Ok(DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.timestamp_millis())),
        _ => Ok(None),
    }
}

fn int_field(map: &Map<String, Value>, key: &str) -> Option<i64> {
    match map.get(key) {
        None | Some(Value::Null) => Some(0),
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        // protobuf JSON renders int64 as a string
        Some(Value::String(s)) => s.parse().ok(),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Timestamp;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_split_helpers() {
        assert_eq!(millis_to_split(1_500), (1, 500_000_000));
        assert_eq!(millis_to_split(0), (0, 0));
        assert_eq!(millis_to_split(-1), (-1, 999_000_000));
        assert_eq!(split_to_millis(1, 500_999_999), Some(1_500));
        assert_eq!(split_to_millis(i64::MAX / 100, 0), None);
    }

    #[test]
    fn test_meta_to_split_and_back() {
        let normalizer = TimeFieldNormalizer::new(["meta.created", "meta.modified"]);
        let mut docs = vec![doc(json!({"id": "a", "meta": {"created": 1_735_776_000_123i64}}))];

        normalizer.to_split(&mut docs).unwrap();
        let meta = docs[0].meta.as_ref().unwrap();
        assert_eq!(meta.created, Some(Timestamp::Split { seconds: 1_735_776_000, nanos: 123_000_000 }));
        // absent field stays absent
        assert!(meta.modified.is_none());

        normalizer.to_millis(&mut docs).unwrap();
        assert_eq!(docs[0].meta.as_ref().unwrap().created, Some(Timestamp::Millis(1_735_776_000_123)));
    }

    #[test]
    fn test_array_broadcast() {
        let normalizer = TimeFieldNormalizer::new(["history.at"]);
        let mut value = json!({
            "history": [{"at": 1000}, {"at": 2500}, {"other": true}]
        });
        normalizer.to_split_value(&mut value).unwrap();
        assert_eq!(value["history"][0]["at"], json!({"seconds": 1, "nanos": 0}));
        assert_eq!(value["history"][1]["at"], json!({"seconds": 2, "nanos": 500_000_000}));
        assert!(value["history"][2].get("at").is_none());
    }

    #[test]
    fn test_nested_arrays() {
        let normalizer = TimeFieldNormalizer::new(["a.b.ts"]);
        let mut value = json!({"a": [{"b": [{"ts": 1}, {"ts": 2}]}, {"b": {"ts": 3}}]});
        normalizer.to_split_value(&mut value).unwrap();
        assert_eq!(value["a"][0]["b"][1]["ts"], json!({"seconds": 0, "nanos": 2_000_000}));
        assert_eq!(value["a"][1]["b"]["ts"], json!({"seconds": 0, "nanos": 3_000_000}));
    }

    #[test]
    fn test_null_and_missing_untouched() {
        let normalizer = TimeFieldNormalizer::new(["when", "missing.deep"]);
        let mut value = json!({"when": null});
        normalizer.to_split_value(&mut value).unwrap();
        assert_eq!(value, json!({"when": null}));
    }

    #[test]
    fn test_already_converted_left_alone() {
        let normalizer = TimeFieldNormalizer::new(["when"]);
        let mut value = json!({"when": {"seconds": 1, "nanos": 0}});
        normalizer.to_split_value(&mut value).unwrap();
        assert_eq!(value["when"], json!({"seconds": 1, "nanos": 0}));

        let mut value = json!({"when": 42});
        normalizer.to_millis_value(&mut value).unwrap();
        assert_eq!(value["when"], json!(42));
    }

    #[test]
    fn test_to_millis_accepts_string_seconds_and_rfc3339() {
        let normalizer = TimeFieldNormalizer::new(["a", "b"]);
        let mut value = json!({
            "a": {"seconds": "2", "nanos": 1_000_000},
            "b": "1970-01-01T00:00:01.250Z"
        });
        normalizer.to_millis_value(&mut value).unwrap();
        assert_eq!(value["a"], json!(2001));
        assert_eq!(value["b"], json!(1250));
    }

    #[test]
    fn test_to_iso() {
        let normalizer = TimeFieldNormalizer::new(["meta.created"]);
        let mut value = json!({"meta": {"created": 0}});
        normalizer.to_iso_value(&mut value);
        assert_eq!(value["meta"]["created"], json!("1970-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_sub_millisecond_precision_dropped() {
        let normalizer = TimeFieldNormalizer::new(["t"]);
        let mut value = json!({"t": {"seconds": 1, "nanos": 123_456_789}});
        normalizer.to_millis_value(&mut value).unwrap();
        assert_eq!(value["t"], json!(1123));
        normalizer.to_split_value(&mut value).unwrap();
        assert_eq!(value["t"], json!({"seconds": 1, "nanos": 123_000_000}));
    }

    #[test]
    fn test_out_of_range_split_is_rejected() {
        let normalizer = TimeFieldNormalizer::new(["meta.created"]);
        let mut docs = vec![doc(json!({
            "id": "a",
            "meta": {"created": {"seconds": 9_000_000_000_000_000_000i64, "nanos": 0}}
        }))];

        let err = normalizer.to_millis(&mut docs).unwrap_err();
        assert!(matches!(err, TimeError::OutOfRange { ref path } if path == "meta.created"));

        // ISO rendering skips the value instead of failing
        let mut value = json!({"meta": {"created": {"seconds": i64::MAX, "nanos": 0}}});
        normalizer.to_iso_value(&mut value);
        assert_eq!(value["meta"]["created"]["seconds"], json!(i64::MAX));
    }
}
