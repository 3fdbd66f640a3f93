//! Canonical predicate tree.

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use super::ast::{FilterOperation, Operator};

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `{"$and": [...]}` / `{"$or": [...]}`; children keep their input order.
    Group { operator: Operator, children: Vec<Predicate> },
    /// A single field comparison.
    Field { field: String, operation: FilterOperation, value: Value },
}

impl Predicate {
    /// Matches everything; serializes as `{}`.
    pub fn empty() -> Self {
        Self::Group { operator: Operator::And, children: Vec::new() }
    }

    pub fn field(field: impl Into<String>, operation: FilterOperation, value: Value) -> Self {
        Self::Field { field: field.into(), operation, value }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Group { children, .. } if children.is_empty())
    }

    /// JSON form consumed by query engines.
    ///
    /// ```text
    /// EQ      {field: v}
    /// NEQ     {field: {"$not": {"$eq": v}}}
    /// others  {field: {"$<op>": v}}
    /// ```
    pub fn to_value(&self) -> Value {
        if self.is_empty() {
            return Value::Object(Map::new());
        }
        self.to_value_inner()
    }

    fn to_value_inner(&self) -> Value {
        match self {
            Self::Group { operator, children } => {
                let items: Vec<Value> = children.iter().map(Self::to_value_inner).collect();
                let mut map = Map::new();
                map.insert(operator.key().to_string(), Value::Array(items));
                Value::Object(map)
            }
            Self::Field { field, operation, value } => {
                let condition = match operation {
                    FilterOperation::Eq => value.clone(),
                    FilterOperation::Neq => json!({"$not": {"$eq": value}}),
                    other => {
                        let mut op = Map::new();
                        op.insert(format!("${}", other.as_str()), value.clone());
                        Value::Object(op)
                    }
                };
                let mut map = Map::new();
                map.insert(field.clone(), condition);
                Value::Object(map)
            }
        }
    }
}

impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
