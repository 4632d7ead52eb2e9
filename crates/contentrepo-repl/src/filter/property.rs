//! Property-value replication filter.
//!
//! `exclude` is a comma-separated list of `name=value` pairs. A bare `name`
//! matches the property whatever its value.

use std::sync::Arc;

use tracing::info;

use super::{parse_list, FilterContext, ReplicationFilter, PROP_EXCLUDE};
use crate::error::ConfigError;
use crate::names;
use crate::node::{NodeSnapshot, NodeStateLookup};

const NAME: &str = "property";

/// One configured exclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRule {
    /// Property name.
    pub name: String,
    /// Value to match; None matches any value.
    pub value: Option<String>,
}

impl PropertyRule {
    fn parse(entry: &str) -> Result<Self, ConfigError> {
        let (name, value) = match entry.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim().to_string())),
            None => (entry.trim(), None),
        };
        if !names::is_valid_name(name) {
            return Err(ConfigError::Malformed {
                filter: NAME.to_string(),
                name: PROP_EXCLUDE.to_string(),
                value: entry.to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }

    fn matches(&self, node: &NodeSnapshot) -> bool {
        match (node.property(&self.name), &self.value) {
            (Some(_), None) => true,
            (Some(property), Some(expected)) => property.contains(expected),
            (None, _) => false,
        }
    }
}

struct PropertyRules {
    exclude: Vec<PropertyRule>,
    remove_existing: bool,
    nodes: Arc<dyn NodeStateLookup>,
}

/// Excludes nodes carrying a configured property (and value).
///
/// Nodes without state are not excluded by this filter.
#[derive(Default)]
pub struct PropertyFilter {
    rules: Option<PropertyRules>,
}

impl PropertyFilter {
    /// An unconfigured filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// The configured exclusions.
    pub fn rules(&self) -> &[PropertyRule] {
        self.rules.as_ref().map_or(&[], |rules| rules.exclude.as_slice())
    }
}

impl ReplicationFilter for PropertyFilter {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&mut self, ctx: &FilterContext) -> Result<(), ConfigError> {
        if self.rules.is_some() {
            return Err(ConfigError::AlreadyInitialized {
                filter: NAME.to_string(),
            });
        }
        let exclude = parse_list(ctx.required(NAME, PROP_EXCLUDE)?)
            .iter()
            .map(|entry| PropertyRule::parse(entry))
            .collect::<Result<Vec<_>, _>>()?;
        let remove_existing = ctx.remove_existing(NAME)?;

        info!(rules = exclude.len(), remove_existing, "property filter configured");
        self.rules = Some(PropertyRules {
            exclude,
            remove_existing,
            nodes: Arc::clone(&ctx.nodes),
        });
        Ok(())
    }

    fn is_node_excluded(&self, node_id: &str) -> bool {
        let Some(rules) = &self.rules else {
            return false;
        };
        match rules.nodes.node_state(node_id) {
            Some(node) => rules.exclude.iter().any(|rule| rule.matches(&node)),
            None => false,
        }
    }

    fn removes_existing_excluded_nodes(&self) -> bool {
        self.rules.as_ref().map_or(true, |rules| rules.remove_existing)
    }

    fn destroy(&mut self) {
        self.rules = None;
    }
}
