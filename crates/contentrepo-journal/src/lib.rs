#![warn(missing_docs)]

//! ContentRepo journal subsystem: revision-ordered change records, the resumable
//! journal reader, and the advisory timestamp-to-revision skip checkpoints.

pub mod bundle;
pub mod checkpoint;
pub mod error;
pub mod file_store;
pub mod reader;
pub mod record;
pub mod store;

pub use bundle::EventBundle;
pub use checkpoint::{CheckpointRegistry, SkipCheckpointCache};
pub use error::{JournalError, Result};
pub use file_store::FileJournal;
pub use reader::{ReaderConfig, RevisionJournalReader, MIN_BUFFER_SIZE};
pub use record::{ChangeEvent, EventType, Record, RecordKind};
pub use store::{MemoryJournal, RecordIter, RecordStore};
