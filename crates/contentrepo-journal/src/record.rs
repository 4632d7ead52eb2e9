//! Journal record and change event types.
//!
//! A record is one entry in the cluster-shared journal. Only change-log records
//! carry events; the other kinds describe cluster-wide state changes (locks,
//! namespace registrations, node type changes, ...) that the reader skips.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kind of repository mutation carried by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A node was added.
    NodeAdded,
    /// A node was removed.
    NodeRemoved,
    /// A property was added.
    PropertyAdded,
    /// A property was removed.
    PropertyRemoved,
    /// A property value changed.
    PropertyChanged,
    /// A node was moved or renamed.
    NodeMoved,
    /// A save completed; marks the end of a change set.
    Persist,
}

/// A single change event as handed to replication clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What happened.
    pub event_type: EventType,
    /// Path of the affected item.
    pub path: String,
    /// Identifier of the affected node (the parent node for property events).
    pub node_id: String,
    /// Milliseconds since the Unix epoch when the change was made.
    pub date: i64,
    /// User that made the change.
    pub user_id: String,
    /// Opaque user data attached to the save.
    pub user_data: Option<String>,
    /// Additional event information (e.g. source/destination of a move).
    pub info: BTreeMap<String, String>,
    /// Revision of the record this event was read from.
    #[serde(default)]
    pub revision: i64,
}

impl ChangeEvent {
    /// Create an event with empty user data and info map.
    pub fn new(
        event_type: EventType,
        path: impl Into<String>,
        node_id: impl Into<String>,
        date: i64,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            path: path.into(),
            node_id: node_id.into(),
            date,
            user_id: user_id.into(),
            user_data: None,
            info: BTreeMap::new(),
            revision: 0,
        }
    }

    /// Attach an info entry.
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }
}

/// Payload of a journal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A persisted change set.
    ChangeLog {
        /// Events of the change set, in the order they were produced.
        events: Vec<ChangeEvent>,
        /// User data supplied with the save.
        user_data: Option<String>,
    },
    /// A lock was acquired or released.
    Lock {
        /// Locked node.
        node_id: String,
        /// True for lock, false for unlock.
        is_lock: bool,
        /// Lock owner.
        owner: Option<String>,
    },
    /// A namespace mapping changed.
    Namespace {
        /// Previous prefix, if the mapping existed.
        old_prefix: Option<String>,
        /// New prefix, absent on unregister.
        new_prefix: Option<String>,
        /// Namespace URI.
        uri: String,
    },
    /// Node types were registered, re-registered or unregistered.
    NodeType {
        /// Affected node type names.
        names: Vec<String>,
    },
    /// Custom privileges were registered.
    Privilege {
        /// Registered privilege names.
        names: Vec<String>,
    },
    /// A workspace was created.
    Workspace {
        /// Name of the new workspace.
        name: String,
    },
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Journal revision; monotonic per producer and workspace.
    pub revision: i64,
    /// Milliseconds since the Unix epoch when the record was appended.
    pub timestamp: i64,
    /// Producer (cluster node) that wrote the record.
    pub producer_id: String,
    /// Workspace the record applies to.
    pub workspace: String,
    /// Record payload.
    pub kind: RecordKind,
}

impl Record {
    /// Create a change-log record.
    pub fn change_log(
        revision: i64,
        timestamp: i64,
        producer_id: impl Into<String>,
        workspace: impl Into<String>,
        events: Vec<ChangeEvent>,
    ) -> Self {
        Self {
            revision,
            timestamp,
            producer_id: producer_id.into(),
            workspace: workspace.into(),
            kind: RecordKind::ChangeLog {
                events,
                user_data: None,
            },
        }
    }

    /// Create a record of any kind.
    pub fn new(
        revision: i64,
        timestamp: i64,
        producer_id: impl Into<String>,
        workspace: impl Into<String>,
        kind: RecordKind,
    ) -> Self {
        Self {
            revision,
            timestamp,
            producer_id: producer_id.into(),
            workspace: workspace.into(),
            kind,
        }
    }

    /// Number of change events carried by this record.
    pub fn event_count(&self) -> usize {
        match &self.kind {
            RecordKind::ChangeLog { events, .. } => events.len(),
            _ => 0,
        }
    }
}
