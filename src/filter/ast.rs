//! Wire-level filter tree.
//!
//! Operations, operators and value types accept either their symbolic name
//! or their integer enumeration code:
//!
//! | Code | Operation | Operator | Type |
//! |------|-----------|----------|------|
//! | 0 | eq | and | STRING |
//! | 1 | lt | or | NUMBER |
//! | 2 | lte | | BOOLEAN |
//! | 3 | gt | | DATE |
//! | 4 | gte | | ARRAY |
//! | 5 | isEmpty | | |
//! | 6 | iLike | | |
//! | 7 | in | | |
//! | 8 | neq | | |

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;

use super::FilterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOperation {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    IsEmpty,
    ILike,
    In,
    Neq,
    /// A symbolic operation outside the table, passed through as `$<name>`.
    Other(String),
}

impl FilterOperation {
    pub fn from_code(code: i64) -> Result<Self, FilterError> {
        Ok(match code {
            0 => Self::Eq,
            1 => Self::Lt,
            2 => Self::Lte,
            3 => Self::Gt,
            4 => Self::Gte,
            5 => Self::IsEmpty,
            6 => Self::ILike,
            7 => Self::In,
            8 => Self::Neq,
            _ => return Err(FilterError::UnknownCode { kind: "operation", code }),
        })
    }

    pub fn from_name(name: &str) -> Self {
        match normalize(name).as_str() {
            "eq" => Self::Eq,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "isempty" => Self::IsEmpty,
            "ilike" => Self::ILike,
            "in" => Self::In,
            "neq" => Self::Neq,
            _ => Self::Other(name.to_string()),
        }
    }

    /// Canonical operator name, without the `$`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Eq => "eq",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::IsEmpty => "isEmpty",
            Self::ILike => "iLike",
            Self::In => "in",
            Self::Neq => "neq",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for FilterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl<'de> Deserialize<'de> for FilterOperation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self::from_name(&s)),
            Value::Number(n) => {
                let code = n.as_i64().ok_or_else(|| D::Error::custom(format!("invalid operation code {}", n)))?;
                Self::from_code(code).map_err(D::Error::custom)
            }
            other => Err(D::Error::custom(format!("invalid operation {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    And,
    Or,
}

impl Operator {
    pub fn from_code(code: i64) -> Result<Self, FilterError> {
        match code {
            0 => Ok(Self::And),
            1 => Ok(Self::Or),
            _ => Err(FilterError::UnknownCode { kind: "operator", code }),
        }
    }

    /// Predicate key, including the `$`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::And => "$and",
            Self::Or => "$or",
        }
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Self::And),
            Value::String(s) => match normalize(&s).as_str() {
                "" | "and" => Ok(Self::And),
                "or" => Ok(Self::Or),
                _ => Err(D::Error::custom(format!("unknown operator '{}'", s))),
            },
            Value::Number(n) => {
                let code = n.as_i64().ok_or_else(|| D::Error::custom(format!("invalid operator code {}", n)))?;
                Self::from_code(code).map_err(D::Error::custom)
            }
            other => Err(D::Error::custom(format!("invalid operator {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
    Array,
}

impl ValueType {
    pub fn from_code(code: i64) -> Result<Self, FilterError> {
        Ok(match code {
            0 => Self::String,
            1 => Self::Number,
            2 => Self::Boolean,
            3 => Self::Date,
            4 => Self::Array,
            _ => return Err(FilterError::UnknownCode { kind: "value type", code }),
        })
    }
}

impl<'de> Deserialize<'de> for ValueType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Self::String),
            Value::String(s) => match normalize(&s).as_str() {
                "" | "string" => Ok(Self::String),
                "number" => Ok(Self::Number),
                "boolean" => Ok(Self::Boolean),
                "date" => Ok(Self::Date),
                "array" => Ok(Self::Array),
                _ => Err(D::Error::custom(format!("unknown value type '{}'", s))),
            },
            Value::Number(n) => {
                let code = n.as_i64().ok_or_else(|| D::Error::custom(format!("invalid value type code {}", n)))?;
                Self::from_code(code).map_err(D::Error::custom)
            }
            other => Err(D::Error::custom(format!("invalid value type {}", other))),
        }
    }
}

/// `IS_EMPTY`, `isEmpty` and `isempty` all name the same thing.
fn normalize(name: &str) -> String {
    name.chars().filter(|c| *c != '_').flat_map(char::to_lowercase).collect()
}

/// A leaf comparison.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Filter {
    pub field: String,
    #[serde(default)]
    pub operation: Option<FilterOperation>,
    #[serde(default, deserialize_with = "raw_value")]
    pub value: Option<String>,
    #[serde(default, rename = "type", alias = "value_type", alias = "valueType")]
    pub value_type: ValueType,
}

impl Filter {
    pub fn new(field: impl Into<String>, operation: FilterOperation, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operation: Some(operation),
            value: Some(value.into()),
            value_type: ValueType::String,
        }
    }

    #[must_use]
    pub fn typed(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }
}

/// Leaf values are raw strings; scalar JSON values are stringified.
fn raw_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// `{operator, filter: [...]}`
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct FilterGroup {
    #[serde(default)]
    pub filter: Vec<FilterNode>,
    #[serde(default)]
    pub operator: Operator,
}

impl FilterGroup {
    pub fn and(filter: Vec<FilterNode>) -> Self {
        Self { filter, operator: Operator::And }
    }

    pub fn or(filter: Vec<FilterNode>) -> Self {
        Self { filter, operator: Operator::Or }
    }

    pub fn from_value(value: Value) -> Result<Self, FilterError> {
        serde_json::from_value(value).map_err(|e| FilterError::Malformed(e.to_string()))
    }
}

/// `filters` may hold one group or a list of groups.
#[derive(Debug, Clone, PartialEq)]
pub enum NestedFilters {
    One(FilterGroup),
    Many(Vec<FilterGroup>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// `{filters: group | [group]}`
    Nested(NestedFilters),
    /// `{filter: [...], operator}`
    Group(FilterGroup),
    /// `{field, operation, value, type}`
    Leaf(Filter),
}

impl From<Filter> for FilterNode {
    fn from(filter: Filter) -> Self {
        Self::Leaf(filter)
    }
}

impl From<FilterGroup> for FilterNode {
    fn from(group: FilterGroup) -> Self {
        Self::Group(group)
    }
}

impl<'de> Deserialize<'de> for FilterNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let Value::Object(map) = &value else {
            return Err(D::Error::custom(format!("filter node must be an object, got {}", value)));
        };
        if let Some(filters) = map.get("filters") {
            let nested = match filters {
                Value::Array(_) => NestedFilters::Many(serde_json::from_value(filters.clone()).map_err(D::Error::custom)?),
                _ => NestedFilters::One(serde_json::from_value(filters.clone()).map_err(D::Error::custom)?),
            };
            Ok(Self::Nested(nested))
        } else if map.contains_key("filter") {
            serde_json::from_value(value).map(Self::Group).map_err(D::Error::custom)
        } else if map.contains_key("field") {
            serde_json::from_value(value).map(Self::Leaf).map_err(D::Error::custom)
        } else {
            Err(D::Error::custom("filter node needs one of 'filters', 'filter' or 'field'"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_names_and_codes() {
        let op: FilterOperation = serde_json::from_value(json!("eq")).unwrap();
        assert_eq!(op, FilterOperation::Eq);
        let op: FilterOperation = serde_json::from_value(json!("IS_EMPTY")).unwrap();
        assert_eq!(op, FilterOperation::IsEmpty);
        let op: FilterOperation = serde_json::from_value(json!(6)).unwrap();
        assert_eq!(op, FilterOperation::ILike);
        let op: FilterOperation = serde_json::from_value(json!(8)).unwrap();
        assert_eq!(op, FilterOperation::Neq);
        let op: FilterOperation = serde_json::from_value(json!("regex")).unwrap();
        assert_eq!(op, FilterOperation::Other("regex".into()));

        assert!(serde_json::from_value::<FilterOperation>(json!(42)).is_err());
    }

    #[test]
    fn test_operator_and_type_codes() {
        assert_eq!(serde_json::from_value::<Operator>(json!(1)).unwrap(), Operator::Or);
        assert_eq!(serde_json::from_value::<Operator>(json!("AND")).unwrap(), Operator::And);
        assert!(serde_json::from_value::<Operator>(json!("xor")).is_err());

        assert_eq!(serde_json::from_value::<ValueType>(json!(3)).unwrap(), ValueType::Date);
        assert_eq!(serde_json::from_value::<ValueType>(json!("ARRAY")).unwrap(), ValueType::Array);
    }

    #[test]
    fn test_node_shapes() {
        let node: FilterNode = serde_json::from_value(json!({"field": "a", "value": 5})).unwrap();
        match node {
            FilterNode::Leaf(f) => {
                assert_eq!(f.value.as_deref(), Some("5"));
                assert!(f.operation.is_none());
                assert_eq!(f.value_type, ValueType::String);
            }
            other => panic!("expected leaf, got {:?}", other),
        }

        let node: FilterNode = serde_json::from_value(json!({"filter": [], "operator": 1})).unwrap();
        assert!(matches!(node, FilterNode::Group(FilterGroup { operator: Operator::Or, .. })));

        let node: FilterNode = serde_json::from_value(json!({"filters": [{"filter": []}]})).unwrap();
        assert!(matches!(node, FilterNode::Nested(NestedFilters::Many(ref g)) if g.len() == 1));

        assert!(serde_json::from_value::<FilterNode>(json!({"bogus": 1})).is_err());
    }

    #[test]
    fn test_bad_leaf_is_an_error_not_a_group() {
        let result = serde_json::from_value::<FilterNode>(json!({"field": "a", "operation": 99, "value": "x"}));
        assert!(result.is_err());
    }
}
