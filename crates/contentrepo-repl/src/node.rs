//! Read-only node state access used by the replication filters.
//!
//! The storage engine is external; filters see it only through
//! [`NodeStateLookup`]. [`MemoryNodeStore`] is a thread-safe in-memory
//! implementation, loadable from a JSON snapshot file.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::ReplError;

/// Value of a single- or multi-valued property, compared as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// A single value.
    Single(String),
    /// A multi-valued property.
    Multiple(Vec<String>),
}

impl PropertyValue {
    /// All values of the property.
    pub fn values(&self) -> &[String] {
        match self {
            PropertyValue::Single(value) => std::slice::from_ref(value),
            PropertyValue::Multiple(values) => values,
        }
    }

    /// The first value, if any.
    pub fn first(&self) -> Option<&str> {
        self.values().first().map(String::as_str)
    }

    /// Returns true if any value equals `expected`.
    pub fn contains(&self, expected: &str) -> bool {
        self.values().iter().any(|v| v == expected)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Single(value.to_string())
    }
}

/// Snapshot of one node's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Opaque node identifier.
    pub id: String,
    /// Absolute path.
    pub path: String,
    /// Primary node type name.
    pub primary_type: String,
    /// Mixin type names.
    #[serde(default)]
    pub mixin_types: BTreeSet<String>,
    /// Properties by name.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    /// Identifiers of the child nodes, in document order.
    #[serde(default)]
    pub child_ids: Vec<String>,
}

impl NodeSnapshot {
    /// Create a snapshot without mixins, properties or children.
    pub fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        primary_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            primary_type: primary_type.into(),
            mixin_types: BTreeSet::new(),
            properties: BTreeMap::new(),
            child_ids: Vec::new(),
        }
    }

    /// Add a mixin type.
    pub fn with_mixin(mut self, mixin: impl Into<String>) -> Self {
        self.mixin_types.insert(mixin.into());
        self
    }

    /// Set a property.
    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Append a child identifier.
    pub fn with_child(mut self, child_id: impl Into<String>) -> Self {
        self.child_ids.push(child_id.into());
        self
    }

    /// Returns true if the primary type or one of the mixins is `node_type`.
    pub fn is_node_type(&self, node_type: &str) -> bool {
        self.primary_type == node_type || self.mixin_types.contains(node_type)
    }

    /// A property by name.
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

/// Read-only accessor for node state, keyed by node identifier.
///
/// Implementations must be safe for concurrent reads.
pub trait NodeStateLookup: Send + Sync {
    /// Full state of a node, or None if it does not exist.
    fn node_state(&self, node_id: &str) -> Option<NodeSnapshot>;

    /// Absolute path of a node.
    fn path(&self, node_id: &str) -> Option<String> {
        self.node_state(node_id).map(|node| node.path)
    }

    /// First value of a property.
    fn property_value(&self, node_id: &str, name: &str) -> Option<String> {
        self.node_state(node_id)
            .and_then(|node| node.property(name).and_then(|p| p.first().map(str::to_string)))
    }
}

/// In-memory node store. Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    nodes: RwLock<HashMap<String, NodeSnapshot>>,
}

impl MemoryNodeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `nodes`.
    pub fn with_nodes(nodes: impl IntoIterator<Item = NodeSnapshot>) -> Self {
        let store = Self::new();
        for node in nodes {
            store.insert(node);
        }
        store
    }

    /// Load a JSON array of node snapshots.
    pub fn from_json_file(path: &Path) -> Result<Self, ReplError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ReplError::NodeSource {
            msg: format!("{}: {}", path.display(), e),
        })?;
        let nodes: Vec<NodeSnapshot> =
            serde_json::from_str(&contents).map_err(|e| ReplError::NodeSource {
                msg: format!("{}: {}", path.display(), e),
            })?;
        Ok(Self::with_nodes(nodes))
    }

    /// Insert or replace a node.
    pub fn insert(&self, node: NodeSnapshot) {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        nodes.insert(node.id.clone(), node);
    }

    /// Remove a node, returning its last state.
    pub fn remove(&self, node_id: &str) -> Option<NodeSnapshot> {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        nodes.remove(node_id)
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns true if no node is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NodeStateLookup for MemoryNodeStore {
    fn node_state(&self, node_id: &str) -> Option<NodeSnapshot> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        nodes.get(node_id).cloned()
    }
}
