//! Publication-workflow replication filter.
//!
//! Only the live state of documents leaves the primary repository. Every node
//! is put in exactly one [`NodeClass`]; the class decides:
//!
//! | class                         | decision |
//! |-------------------------------|----------|
//! | request, scheduled job        | exclude  |
//! | outside `/content`            | include  |
//! | variant, state `published`    | include  |
//! | variant, any other state      | exclude  |
//! | handle without a live variant | exclude  |
//! | handle with a live variant    | include  |
//! | translation, other            | include  |
//!
//! Requests and jobs are excluded wherever they live.

use std::sync::Arc;

use tracing::info;

use super::{FilterContext, ReplicationFilter};
use crate::error::ConfigError;
use crate::names::{
    self, CONTENT_ROOT, HIPPOSCHED_JOB, HIPPOSTD_STATE, HIPPO_HARDHANDLE, HIPPO_REQUEST,
    HIPPO_TRANSLATION, STATE_PUBLISHED,
};
use crate::node::{NodeSnapshot, NodeStateLookup};

const NAME: &str = "published-only";

/// Workflow classification of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// Not part of the document tree.
    OutsideContent,
    /// A document variant carrying a workflow state.
    Publishable {
        /// True if the state is `published`.
        published: bool,
    },
    /// A document handle.
    Handle,
    /// A workflow request.
    Request,
    /// A scheduled workflow job.
    ScheduledJob,
    /// A translation entry of a handle.
    Translation,
    /// Anything else under the document tree (folders, resources, ...).
    Other,
}

impl NodeClass {
    /// Classify a node by type, location and workflow state.
    pub fn of(node: &NodeSnapshot) -> Self {
        if node.is_node_type(HIPPO_REQUEST) {
            return NodeClass::Request;
        }
        if node.is_node_type(HIPPOSCHED_JOB) {
            return NodeClass::ScheduledJob;
        }
        if !names::is_descendant_or_self(&node.path, CONTENT_ROOT) {
            return NodeClass::OutsideContent;
        }
        if let Some(state) = node.property(HIPPOSTD_STATE) {
            return NodeClass::Publishable {
                published: state.contains(STATE_PUBLISHED),
            };
        }
        if node.is_node_type(HIPPO_HARDHANDLE) {
            return NodeClass::Handle;
        }
        if node.is_node_type(HIPPO_TRANSLATION) {
            return NodeClass::Translation;
        }
        NodeClass::Other
    }
}

struct PublishedRules {
    remove_existing: bool,
    nodes: Arc<dyn NodeStateLookup>,
}

impl PublishedRules {
    /// A handle is excluded when every child that is not a translation or a
    /// request is an unpublished variant.
    fn is_handle_excluded(&self, handle: &NodeSnapshot) -> bool {
        for child_id in &handle.child_ids {
            let Some(child) = self.nodes.node_state(child_id) else {
                continue;
            };
            match NodeClass::of(&child) {
                NodeClass::Translation | NodeClass::Request => continue,
                NodeClass::Publishable { published: false } => continue,
                _ => return false,
            }
        }
        true
    }

    fn is_excluded(&self, node: &NodeSnapshot) -> bool {
        match NodeClass::of(node) {
            NodeClass::Request | NodeClass::ScheduledJob => true,
            NodeClass::Publishable { published } => !published,
            NodeClass::Handle => self.is_handle_excluded(node),
            NodeClass::OutsideContent | NodeClass::Translation | NodeClass::Other => false,
        }
    }
}

/// Replicates published document variants and their handles only.
///
/// Nodes without state are not excluded by this filter.
#[derive(Default)]
pub struct PublishedOnlyFilter {
    rules: Option<PublishedRules>,
}

impl PublishedOnlyFilter {
    /// An unconfigured filter.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplicationFilter for PublishedOnlyFilter {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&mut self, ctx: &FilterContext) -> Result<(), ConfigError> {
        if self.rules.is_some() {
            return Err(ConfigError::AlreadyInitialized {
                filter: NAME.to_string(),
            });
        }
        let remove_existing = ctx.remove_existing(NAME)?;

        info!(remove_existing, "published-only filter configured");
        self.rules = Some(PublishedRules {
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
            Some(node) => rules.is_excluded(&node),
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
