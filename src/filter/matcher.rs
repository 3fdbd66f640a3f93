//! In-process predicate evaluation, used by the in-memory backend.

use serde_json::Value;
use std::cmp::Ordering;

use super::ast::{FilterOperation, Operator};
use super::predicate::Predicate;

pub struct PredicateMatcher;

impl PredicateMatcher {
    /// Evaluate `predicate` against a document rendered as JSON.
    pub fn matches(predicate: &Predicate, doc: &Value) -> bool {
        match predicate {
            Predicate::Group { children, .. } if children.is_empty() => true,
            Predicate::Group { operator: Operator::And, children } => children.iter().all(|c| Self::matches(c, doc)),
            Predicate::Group { operator: Operator::Or, children } => children.iter().any(|c| Self::matches(c, doc)),
            Predicate::Field { field, operation, value } => {
                Self::compare(lookup(doc, field), operation, value)
            }
        }
    }

    fn compare(actual: Option<&Value>, operation: &FilterOperation, expected: &Value) -> bool {
        match operation {
            FilterOperation::Eq => actual.map(|a| loose_eq(a, expected)).unwrap_or(expected.is_null()),
            FilterOperation::Neq => !Self::compare(actual, &FilterOperation::Eq, expected),
            FilterOperation::Lt => ordering(actual, expected) == Some(Ordering::Less),
            FilterOperation::Lte => matches!(ordering(actual, expected), Some(Ordering::Less | Ordering::Equal)),
            FilterOperation::Gt => ordering(actual, expected) == Some(Ordering::Greater),
            FilterOperation::Gte => matches!(ordering(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
            FilterOperation::In => match (expected, actual) {
                (Value::Array(options), Some(a)) => options.iter().any(|o| loose_eq(a, o)),
                // scalar needle, array field
                (needle, Some(Value::Array(items))) => items.iter().any(|i| loose_eq(i, needle)),
                _ => false,
            },
            FilterOperation::ILike => match (actual, expected) {
                (Some(Value::String(text)), Value::String(pattern)) => like(&text.to_lowercase(), &pattern.to_lowercase()),
                _ => false,
            },
            FilterOperation::IsEmpty => {
                let empty = is_empty(actual);
                if expected == &Value::Bool(false) { !empty } else { empty }
            }
            FilterOperation::Other(_) => false,
        }
    }
}

/// Dotted path lookup (`meta.owner`, `address.city`).
fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| current.get(segment))
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn ordering(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    match (actual?, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(_) => false,
    }
}

/// SQL LIKE: `%` any run, `_` any single character.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(c) if *c == '_' || *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((bp, bt)) => {
                    p = bp + 1;
                    t = bt + 1;
                    backtrack = Some((bp, bt + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}
