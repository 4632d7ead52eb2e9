//! Path-prefix replication filter.
//!
//! Configured with `replicate` and `exclude` lists of path prefixes. Matching is
//! a raw string prefix test: an `exclude` entry of `/content` also matches
//! `/content2`.

use std::sync::Arc;

use tracing::info;

use super::{parse_list, FilterContext, ReplicationFilter, PROP_EXCLUDE, PROP_REPLICATE};
use crate::error::ConfigError;
use crate::node::NodeStateLookup;

const NAME: &str = "path";

struct PathRules {
    replicate: Vec<String>,
    exclude: Vec<String>,
    remove_existing: bool,
    nodes: Arc<dyn NodeStateLookup>,
}

/// Excludes nodes whose path is unknown, under an `exclude` prefix, or under
/// no `replicate` prefix.
#[derive(Default)]
pub struct PathFilter {
    rules: Option<PathRules>,
}

impl PathFilter {
    /// An unconfigured filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `path` is outside every replicate prefix or inside an exclude prefix.
    pub fn is_path_excluded(&self, path: &str) -> bool {
        match &self.rules {
            Some(rules) => {
                rules.exclude.iter().any(|prefix| path.starts_with(prefix.as_str()))
                    || !rules.replicate.iter().any(|prefix| path.starts_with(prefix.as_str()))
            }
            None => true,
        }
    }
}

fn parse_prefixes(raw: &str, name: &str) -> Result<Vec<String>, ConfigError> {
    let prefixes = parse_list(raw);
    if let Some(bad) = prefixes.iter().find(|p| !p.starts_with('/')) {
        return Err(ConfigError::Malformed {
            filter: NAME.to_string(),
            name: name.to_string(),
            value: bad.clone(),
        });
    }
    Ok(prefixes)
}

impl ReplicationFilter for PathFilter {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&mut self, ctx: &FilterContext) -> Result<(), ConfigError> {
        if self.rules.is_some() {
            return Err(ConfigError::AlreadyInitialized {
                filter: NAME.to_string(),
            });
        }
        let replicate = parse_prefixes(ctx.required(NAME, PROP_REPLICATE)?, PROP_REPLICATE)?;
        let exclude = parse_prefixes(ctx.optional(PROP_EXCLUDE).unwrap_or(""), PROP_EXCLUDE)?;
        let remove_existing = ctx.remove_existing(NAME)?;

        info!(?replicate, ?exclude, remove_existing, "path filter configured");
        self.rules = Some(PathRules {
            replicate,
            exclude,
            remove_existing,
            nodes: Arc::clone(&ctx.nodes),
        });
        Ok(())
    }

    fn is_node_excluded(&self, node_id: &str) -> bool {
        let Some(rules) = &self.rules else {
            return true;
        };
        match rules.nodes.path(node_id) {
            Some(path) => self.is_path_excluded(&path),
            None => true,
        }
    }

    fn removes_existing_excluded_nodes(&self) -> bool {
        self.rules.as_ref().map_or(true, |rules| rules.remove_existing)
    }

    fn destroy(&mut self) {
        self.rules = None;
    }
}
