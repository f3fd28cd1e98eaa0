//! Segment Store
//!
//! Owns every segment file, the write target and the global index.
//!
//! ## Responsibilities
//! - Recover segments and rebuild the index on open
//! - Append records, rolling over to a new segment at the size limit
//! - Resolve keys to a physical (path, offset) location
//! - Merge all segments into one (see [`compaction`])
//!
//! ## Concurrency
//! - `write_lock`: the writer role. Held by every put and by compaction, so
//!   appends never interleave and compaction never sees a torn record.
//! - `state`: RwLock over the segment list and global index. Held only for
//!   in-memory bookkeeping, never across a blocking file write.

mod compaction;
mod recovery;
mod state;

pub use compaction::CompactionStats;
pub use recovery::RecoveryReport;
pub use state::Location;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::config::{Config, SyncStrategy};
use crate::error::{Result, SegKvError};
use crate::record::Record;
use crate::segment::{AppendHandle, Segment, SegmentInfo};

use state::StoreState;

/// Physical location of a key's newest record, ready for a read worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTarget {
    pub location: Location,
    pub path: PathBuf,
}

/// The log-structured segment store
pub struct SegmentStore {
    /// Directory holding the segment files
    dir: PathBuf,

    /// Rollover threshold in bytes
    max_segment_size: u64,

    /// Append durability policy
    sync_strategy: SyncStrategy,

    /// Writer role: serializes puts and compaction
    write_lock: Mutex<()>,

    /// Segment list + global index
    state: RwLock<StoreState>,

    /// Set once by `close`
    closed: AtomicBool,

    /// What the initial recovery found
    recovery: RecoveryReport,
}

impl SegmentStore {
    /// Open or create a store in `config.data_dir`
    ///
    /// Replays every segment before returning, so every key ever written
    /// (and not superseded) is indexed at its newest location.
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;

        let (state, recovery) = recovery::recover(&config.data_dir)?;

        tracing::info!(
            "Recovered {} segments, {} records, {} live keys from {}",
            recovery.segments_loaded,
            recovery.records_replayed,
            recovery.live_keys,
            config.data_dir.display()
        );
        if recovery.bytes_truncated > 0 {
            tracing::warn!(
                "Dropped {} bytes of torn data during recovery",
                recovery.bytes_truncated
            );
        }

        Ok(Self {
            dir: config.data_dir.clone(),
            max_segment_size: config.max_segment_size,
            sync_strategy: config.sync_strategy,
            write_lock: Mutex::new(()),
            state: RwLock::new(state),
            closed: AtomicBool::new(false),
            recovery,
        })
    }

    /// Append a key/value pair
    ///
    /// Steps:
    /// 1. Acquire the writer role
    /// 2. Roll over if the record would push the write target past the limit
    /// 3. Append the record (no index lock held)
    /// 4. Update the segment's local index and the global index
    ///
    /// Returns the number of live segments afterwards, so the caller can
    /// decide whether compaction is worthwhile.
    pub fn put(&self, key: &str, value: &str) -> Result<usize> {
        let len = Record::check_size(key, value)? as u64;

        let _writer = self.write_lock.lock();
        self.ensure_open()?;

        let bytes = Record::new(key, value).encode();

        let handle = match self.current_append_handle(len)? {
            Some(handle) => handle,
            None => self.roll_over()?,
        };

        handle.write(&bytes, self.sync_strategy == SyncStrategy::EveryWrite)?;

        let location = Location {
            segment_id: handle.segment_id(),
            offset: handle.offset(),
        };

        let mut state = self.state.write();
        let target = state.write_target_mut().ok_or(SegKvError::Closed)?;
        if target.id() != location.segment_id {
            return Err(SegKvError::Consistency(format!(
                "write target changed from segment {} to {} during put",
                location.segment_id,
                target.id()
            )));
        }
        target.commit_append(key, location.offset, len);
        state.index.insert(key.to_string(), location);

        Ok(state.segments.len())
    }

    /// Look up where the newest record for `key` lives
    pub fn locate(&self, key: &str) -> Result<Location> {
        self.ensure_open()?;
        self.state
            .read()
            .index
            .get(key)
            .copied()
            .ok_or_else(|| SegKvError::KeyNotFound(key.to_string()))
    }

    /// Resolve `key` to a file path and offset for a physical read
    pub fn resolve(&self, key: &str) -> Result<ReadTarget> {
        self.ensure_open()?;
        let state = self.state.read();

        let location = state
            .index
            .get(key)
            .copied()
            .ok_or_else(|| SegKvError::KeyNotFound(key.to_string()))?;

        let segment = state.segment(location.segment_id).ok_or_else(|| {
            SegKvError::Consistency(format!(
                "key {:?} points at segment {} which is not live",
                key, location.segment_id
            ))
        })?;

        Ok(ReadTarget {
            location,
            path: segment.path().to_path_buf(),
        })
    }

    /// Total bytes across all live segments
    pub fn size(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.state.read().total_size())
    }

    /// Number of live segments
    pub fn segment_count(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.state.read().segments.len())
    }

    /// Snapshot of every live segment, oldest first
    pub fn segments(&self) -> Result<Vec<SegmentInfo>> {
        self.ensure_open()?;
        Ok(self.state.read().segments.iter().map(Segment::info).collect())
    }

    /// Number of live keys in the global index
    pub fn key_count(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.state.read().index.len())
    }

    /// Close every segment handle; later calls are no-ops
    ///
    /// Waits for any in-flight put or compaction to finish first.
    pub fn close(&self) -> Result<()> {
        let _writer = self.write_lock.lock();
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let segments = {
            let mut state = self.state.write();
            std::mem::replace(&mut *state, StoreState::empty()).segments
        };

        let result = segments.last().map(Segment::sync).transpose();
        let count = segments.len();
        drop(segments);

        tracing::info!("Closed store at {} ({} segments)", self.dir.display(), count);
        result.map(|_| ())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn max_segment_size(&self) -> u64 {
        self.max_segment_size
    }

    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SegKvError::Closed);
        }
        Ok(())
    }

    /// Append handle for the write target, or None when `len` more bytes
    /// would exceed the limit. An empty segment always takes the record,
    /// so an oversized record sits alone instead of forcing endless rollovers.
    fn current_append_handle(&self, len: u64) -> Result<Option<AppendHandle>> {
        let state = self.state.read();
        let target = state.write_target().ok_or(SegKvError::Closed)?;

        if target.size() > 0 && target.size() + len > self.max_segment_size {
            Ok(None)
        } else {
            Ok(Some(target.append_handle()))
        }
    }

    /// Start a new segment and make it the write target (writer role held)
    fn roll_over(&self) -> Result<AppendHandle> {
        let (id, previous) = {
            let state = self.state.read();
            (state.next_segment_id, state.write_target().map(|s| s.id()))
        };

        let segment = Segment::create(&self.dir, id)?;
        let handle = segment.append_handle();

        {
            let mut state = self.state.write();
            state.segments.push(segment);
            state.next_segment_id = id.next();
        }

        tracing::debug!(
            "Rolled over from segment {:?} to segment {} (limit {} bytes)",
            previous.map(|p| p.0),
            id,
            self.max_segment_size
        );

        Ok(handle)
    }

    /// Replace in-memory state with a fresh recovery of the directory
    ///
    /// Used when compaction fails after the merged file may already be on
    /// disk; replay order guarantees the newest data wins either way.
    fn recover_in_place(&self) -> Result<()> {
        let (state, report) = recovery::recover(&self.dir)?;
        *self.state.write() = state;

        tracing::warn!(
            "Re-ran recovery after failed compaction: {} segments, {} live keys",
            report.segments_loaded,
            report.live_keys
        );
        Ok(())
    }
}
