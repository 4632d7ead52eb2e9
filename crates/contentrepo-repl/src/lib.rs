#![warn(missing_docs)]

//! ContentRepo replication subsystem: node-level replication filters and the
//! driver that applies them to the change journal.

pub mod config;
pub mod error;
pub mod filter;
pub mod names;
pub mod node;
pub mod replicator;

pub use config::{FilterSpec, JournalSettings, ParamValue, ReplConfig};
pub use error::{ConfigError, ReplError};
pub use filter::{
    FilterChain, FilterContext, FilterKind, PathFilter, PropertyFilter, PublishedOnlyFilter,
    ReplicationFilter,
};
pub use node::{MemoryNodeStore, NodeSnapshot, NodeStateLookup, PropertyValue};
pub use replicator::{ReplicationAction, ReplicationStats, Replicator, ReplicatorState};
