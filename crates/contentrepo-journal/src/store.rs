//! Record store contract and the in-memory journal.
//!
//! The record store is the cluster-shared, append-only journal. Readers only
//! ever consume it through [`RecordStore`]; appending is specific to each
//! backend.

use std::sync::RwLock;

use crate::error::{JournalError, Result};
use crate::record::{ChangeEvent, Record};

/// Fallible iterator over journal records in revision order.
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<Record>> + Send + 'a>;

/// Read access to an append-only, revision-ordered journal.
///
/// Implementations must yield records in strictly increasing revision order.
pub trait RecordStore: Send + Sync {
    /// Logical identity of this journal. Readers over the same identity share
    /// one skip checkpoint cache.
    fn journal_id(&self) -> &str;

    /// Iterate over all records from the start of the journal.
    fn records(&self) -> Result<RecordIter<'_>>;

    /// Iterate over all records whose revision is strictly greater than `revision`.
    fn records_after(&self, revision: i64) -> Result<RecordIter<'_>>;
}

/// In-memory journal. Thread-safe via RwLock; does not persist across restarts.
#[derive(Debug)]
pub struct MemoryJournal {
    id: String,
    records: RwLock<Vec<Record>>,
}

impl MemoryJournal {
    /// Create an empty journal with the given identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            records: RwLock::new(Vec::new()),
        }
    }

    /// Append a record. Its revision must be greater than every stored revision.
    pub fn append(&self, record: Record) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|e| JournalError::Store { msg: e.to_string() })?;
        if let Some(last) = records.last() {
            if record.revision <= last.revision {
                return Err(JournalError::Store {
                    msg: format!(
                        "revision {} is not after journal head {}",
                        record.revision, last.revision
                    ),
                });
            }
        }
        records.push(record);
        Ok(())
    }

    /// Append a change-log record at the next free revision.
    /// Returns the assigned revision.
    pub fn append_change_log(
        &self,
        timestamp: i64,
        producer_id: &str,
        workspace: &str,
        events: Vec<ChangeEvent>,
    ) -> Result<i64> {
        let mut records = self
            .records
            .write()
            .map_err(|e| JournalError::Store { msg: e.to_string() })?;
        let revision = records.last().map(|r| r.revision + 1).unwrap_or(1);
        records.push(Record::change_log(
            revision,
            timestamp,
            producer_id,
            workspace,
            events,
        ));
        Ok(revision)
    }

    /// Revision of the newest record, if any.
    pub fn head_revision(&self) -> Result<Option<i64>> {
        let records = self
            .records
            .read()
            .map_err(|e| JournalError::Store { msg: e.to_string() })?;
        Ok(records.last().map(|r| r.revision))
    }

    /// Number of records in the journal.
    pub fn len(&self) -> Result<usize> {
        let records = self
            .records
            .read()
            .map_err(|e| JournalError::Store { msg: e.to_string() })?;
        Ok(records.len())
    }

    /// Returns true if the journal holds no records.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn snapshot_after(&self, revision: Option<i64>) -> Result<Vec<Record>> {
        let records = self
            .records
            .read()
            .map_err(|e| JournalError::Store { msg: e.to_string() })?;
        let start = match revision {
            Some(rev) => records.partition_point(|r| r.revision <= rev),
            None => 0,
        };
        Ok(records[start..].to_vec())
    }
}

impl RecordStore for MemoryJournal {
    fn journal_id(&self) -> &str {
        &self.id
    }

    fn records(&self) -> Result<RecordIter<'_>> {
        let records = self.snapshot_after(None)?;
        Ok(Box::new(records.into_iter().map(Ok)))
    }

    fn records_after(&self, revision: i64) -> Result<RecordIter<'_>> {
        let records = self.snapshot_after(Some(revision))?;
        Ok(Box::new(records.into_iter().map(Ok)))
    }
}
