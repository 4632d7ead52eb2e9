//! Shared fixtures for journal integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use contentrepo_journal::{
    ChangeEvent, CheckpointRegistry, EventType, MemoryJournal, ReaderConfig, Record, RecordKind,
    RecordStore, RevisionJournalReader,
};

pub const PRODUCER: &str = "JR";
pub const WORKSPACE: &str = "default";

/// Shape of one generated record.
#[derive(Debug, Clone)]
pub struct RecordSpec {
    /// 0 is the reader's producer, anything else a foreign one.
    pub producer: u8,
    /// True for the reader's workspace.
    pub own_workspace: bool,
    pub events: usize,
    /// True for a lock record instead of a change log.
    pub lock: bool,
    /// Added to the previous record's timestamp.
    pub ts_gap: i64,
}

/// Builds a journal from specs; revisions start at 1, timestamps at 1000.
pub fn build_journal(specs: &[RecordSpec]) -> (Arc<MemoryJournal>, Vec<Record>) {
    let journal = Arc::new(MemoryJournal::new("prop"));
    let mut records = Vec::with_capacity(specs.len());
    let mut timestamp = 1000;
    for (i, spec) in specs.iter().enumerate() {
        let revision = i as i64 + 1;
        timestamp += spec.ts_gap;
        let producer = if spec.producer == 0 {
            PRODUCER.to_string()
        } else {
            format!("P{}", spec.producer)
        };
        let workspace = if spec.own_workspace { WORKSPACE } else { "live" };
        let kind = if spec.lock {
            RecordKind::Lock {
                node_id: format!("lock-{}", revision),
                is_lock: true,
                owner: None,
            }
        } else {
            RecordKind::ChangeLog {
                events: (0..spec.events)
                    .map(|n| {
                        ChangeEvent::new(
                            EventType::PropertyChanged,
                            format!("/content/r{}/p{}", revision, n),
                            format!("node-{}", revision),
                            timestamp,
                            "editor",
                        )
                    })
                    .collect(),
                user_data: None,
            }
        };
        let record = Record::new(revision, timestamp, producer, workspace, kind);
        journal.append(record.clone()).expect("append");
        records.push(record);
    }
    (journal, records)
}

/// (revision, timestamp, path) of every event a reader of PRODUCER/WORKSPACE must see.
pub fn expected_events(records: &[Record]) -> Vec<(i64, i64, String)> {
    let mut out = Vec::new();
    for record in records {
        if record.producer_id != PRODUCER || record.workspace != WORKSPACE {
            continue;
        }
        if let RecordKind::ChangeLog { events, .. } = &record.kind {
            for event in events {
                out.push((record.revision, record.timestamp, event.path.clone()));
            }
        }
    }
    out
}

pub fn open_reader(
    store: Arc<dyn RecordStore>,
    registry: &CheckpointRegistry,
    min_buffer: usize,
) -> RevisionJournalReader {
    RevisionJournalReader::new(
        store,
        registry,
        ReaderConfig::new(PRODUCER)
            .with_workspace(WORKSPACE)
            .with_min_buffer_size(min_buffer),
    )
}

pub fn drain(reader: &mut RevisionJournalReader) -> Vec<(i64, String)> {
    reader.by_ref().map(|e| (e.revision, e.path)).collect()
}
