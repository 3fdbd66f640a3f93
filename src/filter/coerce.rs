//! Raw leaf value → typed JSON value.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Number, Value};

use super::ast::{Filter, ValueType};
use super::FilterError;

pub struct ValueCoercer;

impl ValueCoercer {
    /// Coerce `raw` according to the leaf's declared type.
    ///
    /// `BOOLEAN` accepts only the literals `true`/`false`; anything else yields
    /// `null` rather than an error. `ARRAY` falls back to the raw string when
    /// it is not valid JSON.
    pub fn coerce(filter: &Filter, raw: &str) -> Result<Value, FilterError> {
        match filter.value_type {
            ValueType::String => Ok(Value::String(raw.to_string())),
            ValueType::Number => Self::number(raw).ok_or_else(|| FilterError::InvalidNumber {
                field: filter.field.clone(),
                value: raw.to_string(),
            }),
            ValueType::Boolean => Ok(match raw {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::Null,
            }),
            ValueType::Array => match serde_json::from_str::<Value>(raw) {
                Ok(parsed) => Ok(parsed),
                Err(e) if e.is_syntax() || e.is_eof() => Ok(Value::String(raw.to_string())),
                Err(e) => Err(FilterError::Malformed(e.to_string())),
            },
            ValueType::Date => parse_date_millis(raw).map(Value::from).ok_or_else(|| FilterError::InvalidDate {
                field: filter.field.clone(),
                value: raw.to_string(),
            }),
        }
    }

    fn number(raw: &str) -> Option<Value> {
        let trimmed = raw.trim();
        if let Ok(int) = trimmed.parse::<i64>() {
            return Some(Value::from(int));
        }
        let float = trimmed.parse::<f64>().ok().filter(|f| f.is_finite())?;
        if float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
            Some(Value::from(float as i64))
        } else {
            Number::from_f64(float).map(Value::Number)
        }
    }
}

/// Parse a date string to epoch milliseconds.
///
/// Accepted: RFC 3339, RFC 2822, `YYYY-MM-DD`, `YYYY-MM-DD[T ]HH:MM:SS[.f]`
/// (read as UTC), `Mon Jan 01 2024 10:00:00 GMT+0100 (...)` and bare epoch
/// milliseconds.
pub(crate) fn parse_date_millis(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Some(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_millis());
    }
    // Date.prototype.toString(): drop the trailing "(zone name)"
    let without_zone_name = raw.split(" (").next().unwrap_or(raw);
    DateTime::parse_from_str(without_zone_name, "%a %b %d %Y %H:%M:%S GMT%z")
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(value_type: ValueType) -> Filter {
        Filter { field: "f".into(), operation: None, value: None, value_type }
    }

    #[test]
    fn test_string_passthrough() {
        assert_eq!(ValueCoercer::coerce(&leaf(ValueType::String), "12").unwrap(), json!("12"));
    }

    #[test]
    fn test_numbers() {
        let f = leaf(ValueType::Number);
        assert_eq!(ValueCoercer::coerce(&f, "42").unwrap(), json!(42));
        assert_eq!(ValueCoercer::coerce(&f, "2.5").unwrap(), json!(2.5));
        assert_eq!(ValueCoercer::coerce(&f, "1e3").unwrap(), json!(1000));
        assert!(matches!(
            ValueCoercer::coerce(&f, "abc"),
            Err(FilterError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_booleans() {
        let f = leaf(ValueType::Boolean);
        assert_eq!(ValueCoercer::coerce(&f, "true").unwrap(), json!(true));
        assert_eq!(ValueCoercer::coerce(&f, "false").unwrap(), json!(false));
        assert_eq!(ValueCoercer::coerce(&f, "yes").unwrap(), Value::Null);
        assert_eq!(ValueCoercer::coerce(&f, "TRUE").unwrap(), Value::Null);
    }

    #[test]
    fn test_arrays_with_fallback() {
        let f = leaf(ValueType::Array);
        assert_eq!(ValueCoercer::coerce(&f, r#"["BAD","GOOD"]"#).unwrap(), json!(["BAD", "GOOD"]));
        assert_eq!(ValueCoercer::coerce(&f, "plain text").unwrap(), json!("plain text"));
        assert_eq!(ValueCoercer::coerce(&f, "[1, 2").unwrap(), json!("[1, 2"));
    }

    #[test]
    fn test_dates() {
        let f = leaf(ValueType::Date);
        assert_eq!(ValueCoercer::coerce(&f, "1970-01-01T00:00:01Z").unwrap(), json!(1000));
        assert_eq!(ValueCoercer::coerce(&f, "1970-01-02").unwrap(), json!(86_400_000));
        assert_eq!(ValueCoercer::coerce(&f, "1970-01-01 00:00:02").unwrap(), json!(2000));
        assert_eq!(
            ValueCoercer::coerce(&f, "Thu Jan 01 1970 01:00:00 GMT+0100 (Central European Standard Time)").unwrap(),
            json!(0)
        );
        assert_eq!(ValueCoercer::coerce(&f, "Thu, 01 Jan 1970 00:00:03 +0000").unwrap(), json!(3000));
        assert_eq!(ValueCoercer::coerce(&f, "1700000000000").unwrap(), json!(1_700_000_000_000i64));
        assert!(matches!(
            ValueCoercer::coerce(&f, "not a date"),
            Err(FilterError::InvalidDate { .. })
        ));
    }
}
