//! Replication filters: per-node policies deciding whether changes may leave
//! the primary repository.
//!
//! Each filter is configured once from raw string properties (the persisted
//! configuration-node form), queried concurrently afterwards, and destroyed at
//! module shutdown. A [`FilterChain`] combines them: a node is excluded as soon
//! as one filter excludes it.

pub mod path;
pub mod property;
pub mod published;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, trace, warn};

use crate::config::FilterSpec;
use crate::error::ConfigError;
use crate::node::NodeStateLookup;

pub use path::PathFilter;
pub use property::PropertyFilter;
pub use published::PublishedOnlyFilter;

/// Property listing path prefixes (or path prefixes to replicate).
pub const PROP_REPLICATE: &str = "replicate";
/// Property listing exclusions.
pub const PROP_EXCLUDE: &str = "exclude";
/// Property controlling removal of already-replicated excluded nodes.
pub const PROP_REMOVE_EXISTING: &str = "removeExisting";

/// Everything a filter needs at `init` time.
#[derive(Clone)]
pub struct FilterContext {
    /// Raw configuration properties.
    pub params: BTreeMap<String, String>,
    /// Node state of the primary repository.
    pub nodes: Arc<dyn NodeStateLookup>,
}

impl FilterContext {
    /// Create a context from raw properties.
    pub fn new(params: BTreeMap<String, String>, nodes: Arc<dyn NodeStateLookup>) -> Self {
        Self { params, nodes }
    }

    /// A property that must be present.
    pub fn required(&self, filter: &str, name: &str) -> Result<&str, ConfigError> {
        self.params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingProperty {
                filter: filter.to_string(),
                name: name.to_string(),
            })
    }

    /// A property that may be absent.
    pub fn optional(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// The `removeExisting` flag; true when absent.
    pub fn remove_existing(&self, filter: &str) -> Result<bool, ConfigError> {
        match self.optional(PROP_REMOVE_EXISTING) {
            None => Ok(true),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(ConfigError::Malformed {
                    filter: filter.to_string(),
                    name: PROP_REMOVE_EXISTING.to_string(),
                    value: raw.to_string(),
                }),
            },
        }
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// A node-level replication policy.
pub trait ReplicationFilter: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Parse configuration. Called once, before any query.
    fn init(&mut self, ctx: &FilterContext) -> Result<(), ConfigError>;

    /// Returns true if changes to `node_id` must not be replicated.
    fn is_node_excluded(&self, node_id: &str) -> bool;

    /// Returns true if nodes that are excluded now but were replicated before
    /// must be deleted from the replica.
    fn removes_existing_excluded_nodes(&self) -> bool;

    /// Release configuration and node access.
    fn destroy(&mut self);
}

/// The built-in filter policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// [`PathFilter`].
    Path,
    /// [`PropertyFilter`].
    Property,
    /// [`PublishedOnlyFilter`].
    PublishedOnly,
}

impl FilterKind {
    /// A fresh, unconfigured filter of this kind.
    pub fn build(self) -> Box<dyn ReplicationFilter> {
        match self {
            FilterKind::Path => Box::new(PathFilter::new()),
            FilterKind::Property => Box::new(PropertyFilter::new()),
            FilterKind::PublishedOnly => Box::new(PublishedOnlyFilter::new()),
        }
    }
}

/// Ordered set of initialized filters.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn ReplicationFilter>>,
}

impl FilterChain {
    /// An empty chain; excludes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and initialize one filter per spec, in order.
    pub fn from_specs(
        specs: &[FilterSpec],
        nodes: Arc<dyn NodeStateLookup>,
    ) -> Result<Self, ConfigError> {
        let mut chain = Self::new();
        chain.add_specs(specs, nodes)?;
        Ok(chain)
    }

    /// Build, initialize and append one filter per spec.
    ///
    /// On the first failing `init` every filter in the chain is destroyed and
    /// the chain is left empty.
    pub fn add_specs(
        &mut self,
        specs: &[FilterSpec],
        nodes: Arc<dyn NodeStateLookup>,
    ) -> Result<(), ConfigError> {
        for spec in specs {
            let ctx = FilterContext::new(spec.raw_params(), Arc::clone(&nodes));
            if let Err(e) = self.add(spec.kind.build(), &ctx) {
                warn!(kind = ?spec.kind, error = %e, "replication filter rejected its configuration");
                self.destroy_all();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Initialize `filter` and append it.
    pub fn add(
        &mut self,
        mut filter: Box<dyn ReplicationFilter>,
        ctx: &FilterContext,
    ) -> Result<(), ConfigError> {
        filter.init(ctx)?;
        info!(filter = filter.name(), position = self.filters.len(), "replication filter initialized");
        self.filters.push(filter);
        Ok(())
    }

    /// Name of the first filter excluding `node_id`.
    pub fn excluded_by(&self, node_id: &str) -> Option<&str> {
        let filter = self.filters.iter().find(|f| f.is_node_excluded(node_id))?;
        trace!(node_id, filter = filter.name(), "node excluded");
        Some(filter.name())
    }

    /// Returns true if any filter excludes `node_id`.
    pub fn is_node_excluded(&self, node_id: &str) -> bool {
        self.excluded_by(node_id).is_some()
    }

    /// Returns true if a filter that excludes `node_id` asks for removal of existing copies.
    pub fn removes_existing(&self, node_id: &str) -> bool {
        self.filters
            .iter()
            .any(|f| f.removes_existing_excluded_nodes() && f.is_node_excluded(node_id))
    }

    /// Destroy every filter and empty the chain.
    pub fn destroy_all(&mut self) {
        for mut filter in self.filters.drain(..) {
            filter.destroy();
            info!(filter = filter.name(), "replication filter destroyed");
        }
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns true if the chain has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
