use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::filter::FilterGroup;
use crate::storage::traits::SortOrder;

/// Sort direction as sent by callers: `UNSORTED`, `ASCENDING`, `DESCENDING`
/// or the codes `0`, `1`, `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Unsorted,
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Unsorted),
            1 => Some(Self::Ascending),
            2 => Some(Self::Descending),
            _ => None,
        }
    }

    /// Backend sort order; `None` for unsorted entries.
    pub fn order(&self) -> Option<SortOrder> {
        match self {
            Self::Unsorted => None,
            Self::Ascending => Some(SortOrder::Ascending),
            Self::Descending => Some(SortOrder::Descending),
        }
    }
}

impl<'de> Deserialize<'de> for SortDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => match s.to_ascii_uppercase().as_str() {
                "UNSORTED" => Ok(Self::Unsorted),
                "ASCENDING" | "ASC" => Ok(Self::Ascending),
                "DESCENDING" | "DESC" => Ok(Self::Descending),
                _ => Err(D::Error::custom(format!("unknown sort order {}", s))),
            },
            Value::Number(n) => n
                .as_i64()
                .and_then(Self::from_code)
                .ok_or_else(|| D::Error::custom(format!("unknown sort order code {}", n))),
            Value::Null => Ok(Self::Unsorted),
            other => Err(D::Error::custom(format!("invalid sort order {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub order: SortDirection,
}

impl Sort {
    pub fn asc(field: &str) -> Self {
        Self { field: field.to_string(), order: SortDirection::Ascending }
    }

    pub fn desc(field: &str) -> Self {
        Self { field: field.to_string(), order: SortDirection::Descending }
    }
}

/// Field mask entry: `include: true` selects, `include: false` removes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldFilter {
    pub name: String,
    #[serde(default)]
    pub include: bool,
}

/// Arguments of a read.
///
/// `limit` of `None` or `0` means the configured ceiling; larger values are
/// clamped to it. `custom_arguments` travels as a `{value: bytes}` envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadRequest {
    #[serde(default)]
    pub filters: Vec<FilterGroup>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub sorts: Vec<Sort>,
    #[serde(default)]
    pub fields: Vec<FieldFilter>,
    #[serde(default)]
    pub custom_queries: Vec<String>,
    #[serde(default)]
    pub custom_arguments: Option<Value>,
}

impl ReadRequest {
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filtered(mut self, group: FilterGroup) -> Self {
        self.filters.push(group);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn sorted(mut self, sort: Sort) -> Self {
        self.sorts.push(sort);
        self
    }

    /// Backend sort list, unsorted entries dropped.
    pub fn sort_orders(&self) -> Vec<(String, SortOrder)> {
        self.sorts
            .iter()
            .filter_map(|s| s.order.order().map(|o| (s.field.clone(), o)))
            .collect()
    }

    /// `(include, exclude)` field lists.
    pub fn projection(&self) -> (Vec<String>, Vec<String>) {
        let (include, exclude): (Vec<&FieldFilter>, Vec<&FieldFilter>) = self.fields.iter().partition(|f| f.include);
        (
            include.into_iter().map(|f| f.name.clone()).collect(),
            exclude.into_iter().map(|f| f.name.clone()).collect(),
        )
    }
}
