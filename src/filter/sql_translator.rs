//! SQL Translator
//!
//! Translates a [`Predicate`] into a parameterized WHERE clause over the JSON
//! `payload` column of the documents table.
//!
//! # SQL Syntax Generated
//!
//! ```sql
//! JSON_UNQUOTE(JSON_EXTRACT(payload, ?)) = ?        -- text equality (MySQL)
//! json_extract(payload, ?) = ?                      -- equality (SQLite)
//! JSON_EXTRACT(payload, ?) > ?                      -- numeric comparison
//! LOWER(...) LIKE LOWER(?)                          -- iLike
//! ... IN (?, ?, ?)                                  -- in
//! ```
//!
//! JSON paths are bound as parameters too, so field names never reach the
//! SQL text.

use serde_json::Value;

use super::ast::{FilterOperation, Operator};
use super::predicate::Predicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Sqlite,
    MySql,
}

/// SQL query result with parameterized placeholders
#[derive(Debug, Clone)]
pub struct SqlQuery {
    /// The WHERE clause (without "WHERE" keyword)
    pub clause: String,
    /// The parameter values in order
    pub params: Vec<SqlParam>,
}

/// SQL parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
    Numeric(f64),
    Boolean(bool),
}

pub struct SqlTranslator {
    dialect: SqlDialect,
    json_column: String,
}

impl SqlTranslator {
    pub fn new(dialect: SqlDialect, json_column: impl Into<String>) -> Self {
        Self { dialect, json_column: json_column.into() }
    }

    pub fn translate(&self, predicate: &Predicate) -> SqlQuery {
        let mut params = Vec::new();
        let clause = self.translate_node(predicate, &mut params);
        SqlQuery { clause, params }
    }

    fn translate_node(&self, node: &Predicate, params: &mut Vec<SqlParam>) -> String {
        match node {
            Predicate::Group { children, .. } if children.is_empty() => "1=1".to_string(),
            Predicate::Group { operator, children } => {
                let joiner = match operator {
                    Operator::And => " AND ",
                    Operator::Or => " OR ",
                };
                let parts: Vec<String> = children.iter().map(|c| self.translate_node(c, params)).collect();
                if parts.len() == 1 {
                    parts[0].clone()
                } else {
                    format!("({})", parts.join(joiner))
                }
            }
            Predicate::Field { field, operation, value } => self.translate_field(field, operation, value, params),
        }
    }

    fn translate_field(&self, field: &str, operation: &FilterOperation, value: &Value, params: &mut Vec<SqlParam>) -> String {
        match operation {
            FilterOperation::Eq => self.equals(field, value, params),
            FilterOperation::Neq => {
                let missing = format!("{} IS NULL", self.raw(field, params));
                let eq = self.equals(field, value, params);
                format!("({} OR NOT ({}))", missing, eq)
            }
            FilterOperation::Lt => self.compare(field, "<", value, params),
            FilterOperation::Lte => self.compare(field, "<=", value, params),
            FilterOperation::Gt => self.compare(field, ">", value, params),
            FilterOperation::Gte => self.compare(field, ">=", value, params),
            FilterOperation::In => match value {
                Value::Array(options) if options.is_empty() => "1=0".to_string(),
                Value::Array(options) => {
                    let expr = self.text(field, params);
                    let placeholders: Vec<&str> = options
                        .iter()
                        .map(|o| {
                            params.push(text_param(o));
                            "?"
                        })
                        .collect();
                    format!("{} IN ({})", expr, placeholders.join(", "))
                }
                needle => self.array_contains(field, needle, params),
            },
            FilterOperation::ILike => {
                let expr = self.text(field, params);
                params.push(text_param(value));
                format!("LOWER({}) LIKE LOWER(?)", expr)
            }
            FilterOperation::IsEmpty => {
                let empty = self.is_empty(field, params);
                if value == &Value::Bool(false) {
                    format!("NOT {}", empty)
                } else {
                    empty
                }
            }
            // Fallback - always false for unsupported operations
            FilterOperation::Other(_) => "1=0".to_string(),
        }
    }

    fn equals(&self, field: &str, value: &Value, params: &mut Vec<SqlParam>) -> String {
        match value {
            Value::Null => format!("{} IS NULL", self.raw(field, params)),
            Value::Number(_) => {
                let expr = self.raw(field, params);
                params.push(number_param(value));
                format!("{} = ?", expr)
            }
            Value::Bool(b) => match self.dialect {
                SqlDialect::Sqlite => {
                    let expr = self.raw(field, params);
                    params.push(SqlParam::Boolean(*b));
                    format!("{} = ?", expr)
                }
                SqlDialect::MySql => {
                    let expr = self.text(field, params);
                    params.push(SqlParam::Text(b.to_string()));
                    format!("{} = ?", expr)
                }
            },
            _ => {
                let expr = self.text(field, params);
                params.push(text_param(value));
                format!("{} = ?", expr)
            }
        }
    }

    fn compare(&self, field: &str, op: &str, value: &Value, params: &mut Vec<SqlParam>) -> String {
        let expr = if value.is_number() { self.raw(field, params) } else { self.text(field, params) };
        params.push(if value.is_number() { number_param(value) } else { text_param(value) });
        format!("{} {} ?", expr, op)
    }

    fn array_contains(&self, field: &str, needle: &Value, params: &mut Vec<SqlParam>) -> String {
        match self.dialect {
            SqlDialect::Sqlite => {
                params.push(SqlParam::Text(json_path(field)));
                params.push(text_param(needle));
                format!("EXISTS (SELECT 1 FROM json_each({}, ?) WHERE value = ?)", self.json_column)
            }
            SqlDialect::MySql => {
                let expr = self.raw(field, params);
                params.push(SqlParam::Text(needle.to_string()));
                format!("JSON_CONTAINS({}, ?)", expr)
            }
        }
    }

    fn is_empty(&self, field: &str, params: &mut Vec<SqlParam>) -> String {
        match self.dialect {
            SqlDialect::Sqlite => {
                let a = self.raw(field, params);
                let b = self.raw(field, params);
                format!("({} IS NULL OR {} IN ('', '[]', '{{}}'))", a, b)
            }
            SqlDialect::MySql => {
                let a = self.raw(field, params);
                let b = self.text(field, params);
                let c = self.raw(field, params);
                format!(
                    "({} IS NULL OR {} IN ('', 'null') OR JSON_LENGTH({}) = 0)",
                    a, b, c
                )
            }
        }
    }

    /// `JSON_EXTRACT(col, ?)`; pushes the path parameter.
    fn raw(&self, field: &str, params: &mut Vec<SqlParam>) -> String {
        params.push(SqlParam::Text(json_path(field)));
        match self.dialect {
            SqlDialect::Sqlite => format!("json_extract({}, ?)", self.json_column),
            SqlDialect::MySql => format!("JSON_EXTRACT({}, ?)", self.json_column),
        }
    }

    /// Unquoted text form of the field.
    fn text(&self, field: &str, params: &mut Vec<SqlParam>) -> String {
        let raw = self.raw(field, params);
        match self.dialect {
            SqlDialect::Sqlite => raw,
            SqlDialect::MySql => format!("JSON_UNQUOTE({})", raw),
        }
    }
}

fn json_path(field: &str) -> String {
    // Support dot notation for nested fields
    // e.g., "user.name" -> "$.user.name"
    if field.starts_with('$') {
        field.to_string()
    } else {
        let quoted: Vec<String> = field.split('.').map(|s| format!("\"{}\"", s.replace('"', ""))).collect();
        format!("$.{}", quoted.join("."))
    }
}

fn number_param(value: &Value) -> SqlParam {
    match value.as_i64() {
        Some(i) => SqlParam::Integer(i),
        None => SqlParam::Numeric(value.as_f64().unwrap_or_default()),
    }
}

fn text_param(value: &Value) -> SqlParam {
    match value {
        Value::String(s) => SqlParam::Text(s.clone()),
        Value::Number(_) => number_param(value),
        Value::Bool(b) => SqlParam::Boolean(*b),
        other => SqlParam::Text(other.to_string()),
    }
}
