//! File-backed journal.
//!
//! Records are appended to a single file as frames:
//! `[len: u32 LE][crc32: u32 LE][bincode(Record)]`. Iteration is lazy and
//! re-opens the file, so concurrent readers never block the appender.
//!
//! An in-memory index maps each intact frame's revision to the byte offset
//! where it ends, so [`RecordStore::records_after`] seeks straight to the
//! resume point instead of decoding the whole file.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{JournalError, Result};
use crate::record::Record;
use crate::store::{RecordIter, RecordStore};

/// Upper bound for a single encoded record.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

const HEADER_LEN: u64 = 8;

/// Offsets of intact frames, in revision order.
#[derive(Debug, Default)]
struct FrameIndex {
    /// `(revision, end offset)` of every intact frame.
    frames: Vec<(i64, u64)>,
    /// Length of the file.
    len: u64,
}

impl FrameIndex {
    fn head(&self) -> Option<i64> {
        self.frames.last().map(|(revision, _)| *revision)
    }

    /// Offset right after the last intact frame with a revision not after `revision`.
    fn resume_offset(&self, revision: i64) -> u64 {
        let p = self.frames.partition_point(|(r, _)| *r <= revision);
        if p == 0 {
            0
        } else {
            self.frames[p - 1].1
        }
    }

    /// Rebuild the index from the file. Damaged frames at the end of the file
    /// are reported as a truncation point; damaged frames in the middle are
    /// left out of the index.
    fn scan(path: &Path) -> Result<(Self, Option<u64>)> {
        let mut frames = FrameIter::open(path)?;
        let mut index = FrameIndex::default();
        let mut damaged_from: Option<u64> = None;
        loop {
            let start = frames.offset;
            match frames.read_raw()? {
                RawFrame::End => break,
                RawFrame::Torn => {
                    return Ok((index, Some(damaged_from.unwrap_or(start))));
                }
                RawFrame::BadChecksum => {
                    damaged_from.get_or_insert(start);
                }
                RawFrame::Data(data) => {
                    if let Some(at) = damaged_from.take() {
                        warn!(path = %path.display(), offset = at, "skipping damaged journal frame");
                    }
                    let record: Record = bincode::deserialize(&data)?;
                    index.frames.push((record.revision, frames.offset));
                }
            }
            index.len = frames.offset;
        }
        Ok((index, damaged_from))
    }
}

/// Append-only journal stored in one file.
#[derive(Debug)]
pub struct FileJournal {
    id: String,
    path: PathBuf,
    index: Mutex<FrameIndex>,
}

impl FileJournal {
    /// Open (or create) the journal file at `path` and index every frame in it.
    ///
    /// A torn or damaged last frame, left by a crash during append, is cut off.
    pub fn open(id: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        OpenOptions::new().create(true).append(true).open(&path)?;

        let (mut index, truncate_at) = FrameIndex::scan(&path)?;
        if let Some(at) = truncate_at {
            let file = OpenOptions::new().write(true).open(&path)?;
            let dropped = file.metadata()?.len().saturating_sub(at);
            file.set_len(at)?;
            file.sync_data()?;
            warn!(path = %path.display(), offset = at, dropped, "truncated torn journal tail");
            index.len = at;
        }
        debug!(
            path = %path.display(),
            records = index.frames.len(),
            head = ?index.head(),
            "opened file journal"
        );

        Ok(Self {
            id: id.into(),
            path,
            index: Mutex::new(index),
        })
    }

    /// Append a record. Its revision must be greater than the current head.
    pub fn append(&self, record: &Record) -> Result<()> {
        let mut index = self
            .index
            .lock()
            .map_err(|e| JournalError::Store { msg: e.to_string() })?;
        if let Some(last) = index.head() {
            if record.revision <= last {
                return Err(JournalError::Store {
                    msg: format!(
                        "revision {} is not after journal head {}",
                        record.revision, last
                    ),
                });
            }
        }

        let data = bincode::serialize(record)?;
        let len = u32::try_from(data.len())
            .ok()
            .filter(|len| *len <= MAX_FRAME_LEN)
            .ok_or_else(|| JournalError::Corrupted {
                msg: format!("record of {} bytes exceeds frame limit", data.len()),
            })?;

        let mut frame = Vec::with_capacity(HEADER_LEN as usize + data.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&data).to_le_bytes());
        frame.extend_from_slice(&data);

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(&frame)?;
        file.sync_data()?;

        index.len += frame.len() as u64;
        let end = index.len;
        index.frames.push((record.revision, end));
        Ok(())
    }

    /// Revision of the newest record, if any.
    pub fn head_revision(&self) -> Result<Option<i64>> {
        let index = self
            .index
            .lock()
            .map_err(|e| JournalError::Store { msg: e.to_string() })?;
        Ok(index.head())
    }
}

impl RecordStore for FileJournal {
    fn journal_id(&self) -> &str {
        &self.id
    }

    fn records(&self) -> Result<RecordIter<'_>> {
        Ok(Box::new(FrameIter::open(&self.path)?))
    }

    fn records_after(&self, revision: i64) -> Result<RecordIter<'_>> {
        let offset = self
            .index
            .lock()
            .map_err(|e| JournalError::Store { msg: e.to_string() })?
            .resume_offset(revision);
        let iter = FrameIter::open_at(&self.path, offset)?;
        Ok(Box::new(iter.filter(move |r| match r {
            Ok(record) => record.revision > revision,
            Err(_) => true,
        })))
    }
}

enum RawFrame {
    End,
    /// The file ends inside this frame.
    Torn,
    BadChecksum,
    Data(Vec<u8>),
}

/// Lazy frame decoder. Stops after the first error.
struct FrameIter {
    reader: BufReader<File>,
    offset: u64,
    done: bool,
}

impl FrameIter {
    fn open(path: &Path) -> Result<Self> {
        Self::open_at(path, 0)
    }

    fn open_at(path: &Path, offset: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            reader: BufReader::new(file),
            offset,
            done: false,
        })
    }

    fn read_raw(&mut self) -> Result<RawFrame> {
        let mut header = [0u8; HEADER_LEN as usize];
        let mut filled = 0;
        while filled < header.len() {
            match self.reader.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Ok(RawFrame::End);
        }
        if filled < header.len() {
            return Ok(RawFrame::Torn);
        }

        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if len > MAX_FRAME_LEN {
            return Err(JournalError::Corrupted {
                msg: format!("frame length {} at offset {} exceeds limit", len, self.offset),
            });
        }

        let mut data = vec![0u8; len as usize];
        if let Err(e) = self.reader.read_exact(&mut data) {
            if e.kind() == ErrorKind::UnexpectedEof {
                return Ok(RawFrame::Torn);
            }
            return Err(e.into());
        }
        self.offset += HEADER_LEN + u64::from(len);
        if crc32fast::hash(&data) != crc {
            return Ok(RawFrame::BadChecksum);
        }
        Ok(RawFrame::Data(data))
    }

    fn read_frame(&mut self) -> Result<Option<Record>> {
        match self.read_raw()? {
            RawFrame::End => Ok(None),
            RawFrame::Torn => Err(JournalError::Corrupted {
                msg: format!("truncated frame at offset {}", self.offset),
            }),
            RawFrame::BadChecksum => Err(JournalError::Corrupted {
                msg: "frame checksum mismatch".to_string(),
            }),
            RawFrame::Data(data) => Ok(Some(bincode::deserialize(&data)?)),
        }
    }
}

impl Iterator for FrameIter {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_frame() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ChangeEvent, EventType};
    use tempfile::TempDir;

    fn record(revision: i64) -> Record {
        Record::change_log(
            revision,
            1_700_000_000_000 + revision,
            "node-1",
            "default",
            vec![ChangeEvent::new(
                EventType::NodeAdded,
                format!("/content/n{}", revision),
                format!("id-{}", revision),
                0,
                "admin",
            )],
        )
    }

    /// Byte offset where frame `n` (0-based) starts in `path`.
    fn frame_start(path: &Path, n: usize) -> usize {
        let bytes = std::fs::read(path).unwrap();
        let mut offset = 0;
        for _ in 0..n {
            let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
            offset += HEADER_LEN as usize + len as usize;
        }
        offset
    }

    fn flip_byte(path: &Path, at: usize) {
        let mut bytes = std::fs::read(path).unwrap();
        bytes[at] ^= 0xFF;
        std::fs::write(path, &bytes).unwrap();
    }

    fn revisions(iter: RecordIter<'_>) -> Vec<Result<i64>> {
        iter.map(|r| r.map(|record| record.revision)).collect()
    }

    #[test]
    fn test_append_and_iterate() {
        let dir = TempDir::new().unwrap();
        let journal = FileJournal::open("j", dir.path().join("journal.log")).unwrap();
        for rev in 1..=3 {
            journal.append(&record(rev)).unwrap();
        }

        let all: Vec<Record> = journal.records().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(all, vec![record(1), record(2), record(3)]);

        let after: Vec<i64> = journal
            .records_after(1)
            .unwrap()
            .map(|r| r.unwrap().revision)
            .collect();
        assert_eq!(after, vec![2, 3]);
        assert_eq!(journal.records_after(3).unwrap().count(), 0);
        assert_eq!(journal.records_after(-5).unwrap().count(), 3);
    }

    #[test]
    fn test_resume_seeks_past_damaged_earlier_frames() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.log");
        let journal = FileJournal::open("j", &path).unwrap();
        for rev in 1..=3 {
            journal.append(&record(rev)).unwrap();
        }
        flip_byte(&path, frame_start(&path, 0) + HEADER_LEN as usize + 2);

        let after = revisions(journal.records_after(2).unwrap());
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].as_ref().unwrap(), &3);

        let from_start = revisions(journal.records().unwrap());
        assert!(matches!(from_start[..], [Err(JournalError::Corrupted { .. })]));
    }

    #[test]
    fn test_reopen_indexes_around_damaged_middle_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.log");
        {
            let journal = FileJournal::open("j", &path).unwrap();
            for rev in 1..=4 {
                journal.append(&record(rev)).unwrap();
            }
        }
        flip_byte(&path, frame_start(&path, 1) + HEADER_LEN as usize + 2);

        let journal = FileJournal::open("j", &path).unwrap();
        assert_eq!(journal.head_revision().unwrap(), Some(4));

        // Revision 2 is unreadable, so a resume after 1 still has to cross it.
        let after_first = revisions(journal.records_after(1).unwrap());
        assert!(matches!(after_first[..], [Err(JournalError::Corrupted { .. })]));

        let after_third: Vec<i64> = journal
            .records_after(3)
            .unwrap()
            .map(|r| r.unwrap().revision)
            .collect();
        assert_eq!(after_third, vec![4]);
    }

    #[test]
    fn test_records_appended_after_resume_point_are_read() {
        let dir = TempDir::new().unwrap();
        let journal = FileJournal::open("j", dir.path().join("journal.log")).unwrap();
        journal.append(&record(1)).unwrap();
        assert_eq!(journal.records_after(1).unwrap().count(), 0);

        journal.append(&record(2)).unwrap();
        journal.append(&record(3)).unwrap();
        let after: Vec<i64> = journal
            .records_after(1)
            .unwrap()
            .map(|r| r.unwrap().revision)
            .collect();
        assert_eq!(after, vec![2, 3]);
    }
    #[test]
    fn test_reopen_recovers_head() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.log");
        {
            let journal = FileJournal::open("j", &path).unwrap();
            journal.append(&record(10)).unwrap();
            journal.append(&record(11)).unwrap();
        }
        let journal = FileJournal::open("j", &path).unwrap();
        assert_eq!(journal.head_revision().unwrap(), Some(11));
        assert!(journal.append(&record(11)).is_err());
        journal.append(&record(12)).unwrap();
    }

    #[test]
    fn test_damaged_last_frame_is_cut_on_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.log");
        let journal = FileJournal::open("j", &path).unwrap();
        journal.append(&record(1)).unwrap();
        journal.append(&record(2)).unwrap();
        let intact_len = frame_start(&path, 1) as u64;

        let last = std::fs::metadata(&path).unwrap().len() as usize - 1;
        flip_byte(&path, last);

        let results = revisions(journal.records().unwrap());
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(JournalError::Corrupted { .. })));
        drop(journal);

        let journal = FileJournal::open("j", &path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), intact_len);
        assert_eq!(journal.head_revision().unwrap(), Some(1));
        journal.append(&record(2)).unwrap();
        let all: Vec<i64> = journal.records().unwrap().map(|r| r.unwrap().revision).collect();
        assert_eq!(all, vec![1, 2]);
    }

    #[test]
    fn test_torn_tail_is_reported_then_cut_on_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.log");
        let journal = FileJournal::open("j", &path).unwrap();
        journal.append(&record(1)).unwrap();
        journal.append(&record(2)).unwrap();
        let intact_len = frame_start(&path, 1);

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let results = revisions(journal.records().unwrap());
        assert_eq!(results.len(), 2);
        assert!(matches!(results[1], Err(JournalError::Corrupted { .. })));
        drop(journal);

        let journal = FileJournal::open("j", &path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), intact_len as u64);
        assert_eq!(journal.head_revision().unwrap(), Some(1));
        assert_eq!(journal.records_after(0).unwrap().count(), 1);
    }

    #[test]
    fn test_torn_header_is_cut_on_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.log");
        {
            let journal = FileJournal::open("j", &path).unwrap();
            journal.append(&record(1)).unwrap();
        }
        let intact_len = std::fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[7, 0, 0]).unwrap();
        drop(file);

        let journal = FileJournal::open("j", &path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), intact_len);
        journal.append(&record(2)).unwrap();
        assert_eq!(journal.records().unwrap().count(), 2);
    }

    #[test]
    fn test_oversized_frame_length_fails_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.log");
        let mut frame = (MAX_FRAME_LEN + 1).to_le_bytes().to_vec();
        frame.extend_from_slice(&[0u8; 4]);
        std::fs::write(&path, &frame).unwrap();

        assert!(matches!(
            FileJournal::open("j", &path),
            Err(JournalError::Corrupted { .. })
        ));
    }

    #[test]
    fn test_empty_file_has_no_records() {
        let dir = TempDir::new().unwrap();
        let journal = FileJournal::open("j", dir.path().join("empty.log")).unwrap();
        assert_eq!(journal.records().unwrap().count(), 0);
        assert_eq!(journal.head_revision().unwrap(), None);
    }
}
