//! Revision-scoped groups of change events.

use std::collections::VecDeque;

use crate::record::{ChangeEvent, Record, RecordKind};

/// The change events extracted from one journal record, consumed as a unit.
///
/// Every event in a bundle carries the bundle's revision.
#[derive(Debug, Clone)]
pub struct EventBundle {
    events: VecDeque<ChangeEvent>,
    timestamp: i64,
    revision: i64,
}

impl EventBundle {
    /// Extract the events of `record`.
    ///
    /// Returns None for records that carry no events: non change-log kinds and
    /// empty change sets are never buffered.
    pub fn from_record(record: Record) -> Option<Self> {
        let Record {
            revision,
            timestamp,
            kind,
            ..
        } = record;

        match kind {
            RecordKind::ChangeLog { events, user_data } => {
                if events.is_empty() {
                    return None;
                }
                let events = events
                    .into_iter()
                    .map(|mut event| {
                        event.revision = revision;
                        if event.user_data.is_none() {
                            event.user_data = user_data.clone();
                        }
                        event
                    })
                    .collect();
                Some(Self {
                    events,
                    timestamp,
                    revision,
                })
            }
            RecordKind::Lock { .. }
            | RecordKind::Namespace { .. }
            | RecordKind::NodeType { .. }
            | RecordKind::Privilege { .. }
            | RecordKind::Workspace { .. } => None,
        }
    }

    /// Take the next event of the bundle.
    pub fn next_event(&mut self) -> Option<ChangeEvent> {
        self.events.pop_front()
    }

    /// Returns true once every event has been taken.
    pub fn is_exhausted(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events not yet taken.
    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    /// Timestamp of the source record.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Revision of the source record.
    pub fn revision(&self) -> i64 {
        self.revision
    }
}
