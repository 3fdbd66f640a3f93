//! Configuration for a resource store.
//!
//! # Example
//!
//! ```
//! use resource_store::ResourceStoreConfig;
//!
//! // Minimal config (uses defaults)
//! let config = ResourceStoreConfig::new("users");
//! assert_eq!(config.read_limit, 1000);
//! assert_eq!(config.resource_name, "user");
//!
//! // From JSON
//! let config = ResourceStoreConfig::from_json(r#"{
//!     "collection": "organizations",
//!     "strategies": {"seq": {"strategy": "increment", "starting_value": 10}},
//!     "edges": [{"edge_name": "org_has_parent", "from": "id", "to": "parent_id",
//!                "to_vertice_name": "organizations"}]
//! }"#).unwrap();
//! assert_eq!(config.graph_name.as_deref(), None);
//! assert_eq!(config.edges.len(), 1);
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::status::ResourceError;

/// Field generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Increment,
    Uuid,
    Random,
    Timestamp,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Increment => "increment",
            Strategy::Uuid => "uuid",
            Strategy::Random => "random",
            Strategy::Timestamp => "timestamp",
        }
    }

    /// Parse a stored strategy name; unknown names are ignored by callers.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "increment" => Some(Strategy::Increment),
            "uuid" => Some(Strategy::Uuid),
            "random" => Some(Strategy::Random),
            "timestamp" => Some(Strategy::Timestamp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StrategyEntry {
    pub strategy: Strategy,
    #[serde(default, alias = "startingValue")]
    pub starting_value: Option<i64>,
}

impl StrategyEntry {
    pub fn new(strategy: Strategy) -> Self {
        Self { strategy, starting_value: None }
    }
}

/// How `increment` counters are advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterMode {
    /// GET then INCR: two concurrent creates may read the same value.
    #[default]
    ReadThenIncrement,
    /// Single INCR, assigns the pre-increment value.
    Atomic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Outbound,
    Inbound,
}

/// Declarative edge derived from a document's reference field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EdgeSpec {
    #[serde(alias = "edgeName")]
    pub edge_name: String,
    /// Field holding the source id (usually `id`).
    pub from: String,
    /// Field holding the target id or list of ids.
    pub to: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default, alias = "fromVerticeName")]
    pub from_vertice_name: Option<String>,
    #[serde(default, alias = "toVerticeName")]
    pub to_vertice_name: Option<String>,
}

impl EdgeSpec {
    pub fn outbound(edge_name: &str, from: &str, to: &str, to_vertice_name: &str) -> Self {
        Self {
            edge_name: edge_name.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            direction: Direction::Outbound,
            from_vertice_name: None,
            to_vertice_name: Some(to_vertice_name.to_string()),
        }
    }

    pub fn inbound(edge_name: &str, from: &str, to: &str, from_vertice_name: &str) -> Self {
        Self {
            edge_name: edge_name.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            direction: Direction::Inbound,
            from_vertice_name: Some(from_vertice_name.to_string()),
            to_vertice_name: None,
        }
    }

    pub fn validate(&self) -> Result<(), ResourceError> {
        let missing = match self.direction {
            Direction::Outbound if self.to_vertice_name.is_none() => Some("to_vertice_name"),
            Direction::Inbound if self.from_vertice_name.is_none() => Some("from_vertice_name"),
            _ => None,
        };
        match missing {
            Some(field) => Err(ResourceError::invalid(format!("edge {} requires {}", self.edge_name, field))),
            None if self.edge_name.is_empty() => Err(ResourceError::invalid("edge_name must not be empty")),
            None => Ok(()),
        }
    }

    /// `(from_vertex_collection, to_vertex_collection)` for documents of `collection`.
    pub fn vertex_collections(&self, collection: &str) -> (String, String) {
        match self.direction {
            Direction::Outbound => (
                collection.to_string(),
                self.to_vertice_name.clone().unwrap_or_default(),
            ),
            Direction::Inbound => (
                self.from_vertice_name.clone().unwrap_or_default(),
                collection.to_string(),
            ),
        }
    }
}

/// Configuration for one collection's store.
///
/// `collection` is the only required field.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceStoreConfig {
    pub collection: String,

    /// Singular name used in messages and events (default: collection minus trailing char)
    #[serde(default)]
    pub resource_name: String,

    /// Graph name; when set together with `edges` the store runs in graph mode
    #[serde(default)]
    pub graph_name: Option<String>,

    /// Field generation strategies, keyed by field name
    #[serde(default)]
    pub strategies: BTreeMap<String, StrategyEntry>,

    #[serde(default)]
    pub counter_mode: CounterMode,

    /// Opaque payload field carried as `{value: bytes}` on the wire
    #[serde(default)]
    pub buffer_field: Option<String>,

    #[serde(default)]
    pub required_fields: Vec<String>,

    /// Dotted timestamp paths (epoch-ms in storage, split on the wire)
    #[serde(default = "default_time_fields")]
    pub time_fields: Vec<String>,

    #[serde(default)]
    pub edges: Vec<EdgeSpec>,

    /// Read limit ceiling (default: 1000)
    #[serde(default = "default_read_limit")]
    pub read_limit: usize,
}

fn default_time_fields() -> Vec<String> {
    vec!["meta.created".to_string(), "meta.modified".to_string()]
}
fn default_read_limit() -> usize { 1000 }

impl Default for ResourceStoreConfig {
    fn default() -> Self {
        Self {
            collection: String::new(),
            resource_name: String::new(),
            graph_name: None,
            strategies: BTreeMap::new(),
            counter_mode: CounterMode::default(),
            buffer_field: None,
            required_fields: Vec::new(),
            time_fields: default_time_fields(),
            edges: Vec::new(),
            read_limit: default_read_limit(),
        }
    }
}

impl ResourceStoreConfig {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            ..Default::default()
        }
        .normalized()
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ResourceError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ResourceError::invalid(format!("invalid resource store config: {}", e)))?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ResourceError> {
        if self.collection.is_empty() {
            return Err(ResourceError::invalid("collection must not be empty"));
        }
        if self.read_limit == 0 {
            return Err(ResourceError::invalid("read_limit must be positive"));
        }
        for edge in &self.edges {
            edge.validate()?;
        }
        Ok(())
    }

    /// Graph mode needs a graph name and at least one edge.
    pub fn is_graph(&self) -> bool {
        self.graph_name.is_some() && !self.edges.is_empty()
    }

    fn normalized(mut self) -> Self {
        if self.resource_name.is_empty() {
            let mut chars = self.collection.chars();
            chars.next_back();
            self.resource_name = chars.as_str().to_string();
        }
        self
    }
}
