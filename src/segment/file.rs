//! Segment file
//!
//! Owns one on-disk segment: its handle, size and key → offset map.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, SegKvError};
use crate::record::{Record, RecordReader};

use super::{SegmentId, SegmentInfo};

/// Outcome of replaying a segment from offset 0
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Records decoded
    pub records: u64,
    /// Bytes cut off a torn final record (0 when the file was clean)
    pub truncated_bytes: u64,
}

/// One append-only segment file
///
/// The handle is shared (`Arc<File>`) so the writer can append without
/// holding the index lock; only the bookkeeping (`size`, `index`) needs
/// exclusive access.
#[derive(Debug)]
pub struct Segment {
    id: SegmentId,
    path: PathBuf,
    file: Arc<File>,
    /// Bytes of complete records in the file
    size: u64,
    /// key → offset of the newest record for that key in this segment
    index: HashMap<String, u64>,
}

impl Segment {
    /// Create a fresh, empty segment file for appending
    ///
    /// Fails with `AlreadyExists` rather than clobbering a file that holds
    /// this id.
    pub fn create(dir: &Path, id: SegmentId) -> Result<Self> {
        let path = id.path_in(dir);
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)?;

        tracing::debug!("Created segment {} at {}", id, path.display());

        Ok(Self {
            id,
            path,
            file: Arc::new(file),
            size: 0,
            index: HashMap::new(),
        })
    }

    /// Open an existing segment file read-write; call `replay` to index it
    pub fn open(path: &Path, id: SegmentId) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            id,
            path: path.to_path_buf(),
            file: Arc::new(file),
            size,
            index: HashMap::new(),
        })
    }

    /// Assemble a segment whose contents and index were built elsewhere
    /// (the merged output of a compaction)
    pub fn from_parts(
        id: SegmentId,
        path: PathBuf,
        file: File,
        index: HashMap<String, u64>,
    ) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            id,
            path,
            file: Arc::new(file),
            size,
            index,
        })
    }

    /// Rebuild the local index by decoding every record from offset 0
    ///
    /// `on_record` sees each (key, offset) in file order so the caller can
    /// maintain a global index. With `allow_torn_tail`, a record cut short by
    /// the end of the file is dropped and the file truncated to the last
    /// complete record; otherwise it is reported as corruption.
    pub fn replay<F>(
        &mut self,
        allow_torn_tail: bool,
        mut on_record: F,
    ) -> Result<ReplaySummary>
    where
        F: FnMut(&str, u64),
    {
        let mut reader = RecordReader::open(&self.path)?;
        let mut summary = ReplaySummary::default();

        loop {
            match reader.next_record() {
                Ok(Some((offset, record))) => {
                    on_record(&record.key, offset);
                    self.index.insert(record.key, offset);
                    summary.records += 1;
                }
                Ok(None) => break,
                Err(SegKvError::TruncatedRecord { expected, found }) if allow_torn_tail => {
                    let valid = reader.position();
                    tracing::warn!(
                        "Segment {} has a torn record at offset {} ({} of {} bytes), truncating",
                        self.id,
                        valid,
                        found,
                        expected
                    );
                    self.file.set_len(valid)?;
                    self.file.sync_all()?;
                    summary.truncated_bytes = self.size.saturating_sub(valid);
                    break;
                }
                Err(SegKvError::TruncatedRecord { expected, found }) => {
                    return Err(SegKvError::CorruptRecord(format!(
                        "segment {} truncated at offset {} ({} of {} bytes)",
                        self.id,
                        reader.position(),
                        found,
                        expected
                    )));
                }
                Err(SegKvError::CorruptRecord(reason)) => {
                    return Err(SegKvError::CorruptRecord(format!(
                        "segment {} at offset {}: {}",
                        self.id,
                        reader.position(),
                        reason
                    )));
                }
                Err(e) => return Err(e),
            }
        }

        self.size = reader.position();
        Ok(summary)
    }

    /// Handle for appending at the current end of the segment
    pub fn append_handle(&self) -> AppendHandle {
        AppendHandle {
            id: self.id,
            file: Arc::clone(&self.file),
            offset: self.size,
        }
    }

    /// Record that `len` bytes holding `key` were appended at `offset`
    pub fn commit_append(&mut self, key: &str, offset: u64, len: u64) {
        self.index.insert(key.to_string(), offset);
        self.size = offset + len;
    }

    /// Flush file contents and metadata to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Read the single record stored at `offset` in the file at `path`
    ///
    /// Opens its own handle so concurrent readers never share a file cursor.
    pub fn read_record_at(path: &Path, offset: u64) -> Result<Record> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut reader = BufReader::new(file);

        match Record::decode_from(&mut reader)? {
            Some((record, _)) => Ok(record),
            None => Err(SegKvError::CorruptRecord(format!(
                "no record at offset {} in {}",
                offset,
                path.display()
            ))),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Offset of the newest record for `key` within this segment
    pub fn offset_of(&self, key: &str) -> Option<u64> {
        self.index.get(key).copied()
    }

    /// key → offset map for every key whose newest in-segment record is here
    pub fn offsets(&self) -> &HashMap<String, u64> {
        &self.index
    }

    pub fn key_count(&self) -> usize {
        self.index.len()
    }

    pub fn info(&self) -> SegmentInfo {
        SegmentInfo {
            id: self.id,
            path: self.path.clone(),
            size: self.size,
            key_count: self.index.len(),
        }
    }
}

/// Shared write access to the tail of a segment
///
/// Obtained under the index read lock and used after releasing it, so the
/// blocking write never holds up readers.
pub struct AppendHandle {
    id: SegmentId,
    file: Arc<File>,
    offset: u64,
}

impl AppendHandle {
    pub fn segment_id(&self) -> SegmentId {
        self.id
    }

    /// Offset the next append will land at
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Write `bytes` at the tracked end of the segment, optionally followed
    /// by `sync_data`
    ///
    /// If either step fails the file is cut back to the tracked end, so a
    /// record the caller was told failed never reappears on replay.
    pub fn write(&self, bytes: &[u8], sync: bool) -> Result<()> {
        let mut file = &*self.file;
        let result = file
            .seek(SeekFrom::Start(self.offset))
            .and_then(|_| file.write_all(bytes))
            .and_then(|_| if sync { self.file.sync_data() } else { Ok(()) });

        if let Err(e) = result {
            if let Err(trunc_err) = self.discard() {
                tracing::warn!(
                    "Failed to roll back partial append to segment {}: {}",
                    self.id,
                    trunc_err
                );
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Drop anything written past the tracked end
    pub fn discard(&self) -> Result<()> {
        self.file.set_len(self.offset)?;
        Ok(())
    }
}
