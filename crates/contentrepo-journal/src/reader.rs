//! Resumable, pull-style reader over the revision journal.
//!
//! The reader buffers [`EventBundle`]s read from the record store and hands
//! out their events one at a time. It can be repositioned by revision or by
//! point in time; time-based skips use the shared [`SkipCheckpointCache`] to
//! avoid re-scanning the journal from its start.
//!
//! A reader is owned by one consumer. It is not synchronized and exposes no
//! way to remove events from the journal.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::bundle::EventBundle;
use crate::checkpoint::{CheckpointRegistry, SkipCheckpointCache};
use crate::error::{JournalError, Result};
use crate::record::{ChangeEvent, Record};
use crate::store::RecordStore;

/// Number of events a refill accumulates before it stops reading and records a checkpoint.
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Configuration for a journal reader.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Producer whose records this reader consumes.
    pub producer_id: String,
    /// Workspace to read; None reads every workspace.
    pub workspace: Option<String>,
    /// Events to accumulate per refill.
    pub min_buffer_size: usize,
}

impl ReaderConfig {
    /// Reader configuration for `producer_id` across all workspaces.
    pub fn new(producer_id: impl Into<String>) -> Self {
        Self {
            producer_id: producer_id.into(),
            ..Self::default()
        }
    }

    /// Restrict the reader to one workspace.
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    /// Override the refill threshold.
    pub fn with_min_buffer_size(mut self, min_buffer_size: usize) -> Self {
        self.min_buffer_size = min_buffer_size.max(1);
        self
    }

    fn accepts(&self, record: &Record) -> bool {
        record.producer_id == self.producer_id
            && self
                .workspace
                .as_ref()
                .map_or(true, |ws| *ws == record.workspace)
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            producer_id: "default".to_string(),
            workspace: None,
            min_buffer_size: MIN_BUFFER_SIZE,
        }
    }
}

/// Cursor over the change events of one journal.
pub struct RevisionJournalReader {
    store: Arc<dyn RecordStore>,
    checkpoints: Arc<SkipCheckpointCache>,
    config: ReaderConfig,
    buffer: VecDeque<EventBundle>,
    last_revision: Option<i64>,
    position: i64,
}

impl RevisionJournalReader {
    /// Create a reader positioned at the start of the journal.
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: &CheckpointRegistry,
        config: ReaderConfig,
    ) -> Self {
        let checkpoints = registry.cache_for(&store);
        Self {
            store,
            checkpoints,
            config,
            buffer: VecDeque::new(),
            last_revision: None,
            position: 0,
        }
    }

    /// Skip every event whose record timestamp is not after `timestamp`.
    ///
    /// Uses the nearest checkpoint at or before `timestamp`, if any, to jump
    /// ahead. Afterwards the next event belongs to a record with a timestamp
    /// strictly greater than `timestamp`.
    pub fn skip_to(&mut self, timestamp: i64) {
        if let Some((checkpoint_ts, revision)) = self.checkpoints.floor(timestamp) {
            debug!(
                journal = %self.store.journal_id(),
                target = timestamp,
                checkpoint_ts,
                revision,
                "resuming from skip checkpoint"
            );
            self.buffer.clear();
            self.last_revision = Some(revision);
        }

        while self.has_next() {
            match self.buffer.front() {
                Some(bundle) if bundle.timestamp() <= timestamp => {
                    self.buffer.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Skip every event whose revision is not after `revision`.
    ///
    /// Always restarts the scan right after `revision`; the checkpoint cache
    /// is not consulted.
    pub fn skip_to_revision(&mut self, revision: i64) {
        self.buffer.clear();
        self.last_revision = Some(revision);

        while self.has_next() {
            match self.buffer.front() {
                Some(bundle) if bundle.revision() <= revision => {
                    self.buffer.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Returns true if another event is available, refilling from the store if needed.
    pub fn has_next(&mut self) -> bool {
        self.drop_exhausted();
        if self.buffer.is_empty() {
            self.refill();
            self.drop_exhausted();
        }
        !self.buffer.is_empty()
    }

    /// Take the next event.
    pub fn next_event(&mut self) -> Result<ChangeEvent> {
        if !self.has_next() {
            return Err(JournalError::NoSuchElement);
        }
        let bundle = self.buffer.front_mut().ok_or(JournalError::NoSuchElement)?;
        let event = bundle.next_event().ok_or(JournalError::NoSuchElement)?;
        if bundle.is_exhausted() {
            self.buffer.pop_front();
        }
        self.position += 1;
        Ok(event)
    }

    /// Take and discard `n` events.
    pub fn skip_events(&mut self, n: u64) -> Result<()> {
        for _ in 0..n {
            self.next_event()?;
        }
        Ok(())
    }

    /// Number of events returned so far. Diagnostic only; skips do not reset it.
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Revision of the last record read from the store, if any.
    pub fn last_revision(&self) -> Option<i64> {
        self.last_revision
    }

    /// Number of buffered events not yet returned.
    pub fn buffered(&self) -> usize {
        self.buffer.iter().map(EventBundle::remaining).sum()
    }

    fn drop_exhausted(&mut self) {
        while self.buffer.front().is_some_and(EventBundle::is_exhausted) {
            self.buffer.pop_front();
        }
    }

    fn refill(&mut self) {
        let records = match self.last_revision {
            Some(revision) => self.store.records_after(revision),
            None => self.store.records(),
        };
        let records = match records {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    journal = %self.store.journal_id(),
                    after = ?self.last_revision,
                    error = %e,
                    "unable to read journal records"
                );
                return;
            }
        };

        let mut scanned = 0usize;
        let mut buffered = 0usize;
        let mut last_timestamp = None;
        for record in records {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(
                        journal = %self.store.journal_id(),
                        after = ?self.last_revision,
                        error = %e,
                        "journal read failed mid-scan"
                    );
                    break;
                }
            };
            scanned += 1;
            self.last_revision = Some(record.revision);
            last_timestamp = Some(record.timestamp);

            if !self.config.accepts(&record) {
                continue;
            }
            if let Some(bundle) = EventBundle::from_record(record) {
                buffered += bundle.remaining();
                self.buffer.push_back(bundle);
            }
            if buffered >= self.config.min_buffer_size {
                break;
            }
        }

        debug!(
            journal = %self.store.journal_id(),
            scanned,
            buffered,
            last_revision = ?self.last_revision,
            "refilled journal buffer"
        );

        if buffered >= self.config.min_buffer_size {
            if let (Some(timestamp), Some(revision)) = (last_timestamp, self.last_revision) {
                if self.checkpoints.put(timestamp, revision) {
                    debug!(
                        journal = %self.store.journal_id(),
                        timestamp,
                        revision,
                        "stored skip checkpoint"
                    );
                }
            }
        }
    }
}

impl Iterator for RevisionJournalReader {
    type Item = ChangeEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().ok()
    }
}
