//! Engine Module
//!
//! The storage engine handle that coordinates all components.
//!
//! ## Responsibilities
//! - Recover the segment store on startup
//! - Serialize writes behind the store's writer role
//! - Offload physical reads to the read pool
//! - Trigger background compaction when more than one segment exists
//! - Tear everything down exactly once

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Result, SegKvError};
use crate::segment::SegmentInfo;
use crate::store::{CompactionStats, ReadTarget, RecoveryReport, SegmentStore};
use crate::workers::{CompactionWorker, ReadPool};

/// How many times a read chases a key that moved under it
const MAX_READ_ATTEMPTS: usize = 3;

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/compact): Serialized by the store's writer role
///   - Only ONE append or compaction at a time
///   - Index lock taken only for the bookkeeping after the append
///
/// - **Reads** (get): Concurrent
///   - Key resolved under the index read lock
///   - File open/seek/decode runs on a read worker, caller waits on a
///     one-shot reply
///   - If compaction deleted the file in between, the key is re-resolved
///     and the read retried against its new location
///
/// One engine per data directory; share it with `Arc<Engine>`.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Segment files, index and writer role
    store: Arc<SegmentStore>,

    /// Threads doing physical reads
    readers: ReadPool,

    /// Background merge thread (None when auto compaction is off)
    compactor: Option<CompactionWorker>,

    /// Set once by `close`
    closed: AtomicBool,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config, create the data directory
    /// 2. Replay every segment to rebuild the index
    /// 3. Start read workers and the compaction worker
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(SegmentStore::open(&config)?);
        let readers = ReadPool::new(config.read_workers)?;

        let compactor = if config.auto_compaction {
            Some(CompactionWorker::spawn(Arc::clone(&store))?)
        } else {
            None
        };

        let engine = Self {
            config,
            store,
            readers,
            compactor,
            closed: AtomicBool::new(false),
        };

        // Segments left over from a previous run get merged right away
        if engine.store.segment_count()? > 1 {
            engine.trigger_compaction();
        }

        tracing::info!(
            "Engine opened at {} ({} read workers, auto compaction {})",
            engine.config.data_dir.display(),
            engine.config.read_workers,
            if engine.config.auto_compaction { "on" } else { "off" }
        );

        Ok(engine)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Open with a path and a custom segment rollover threshold
    pub fn open_with_max_size(path: &Path, max_segment_size: u64) -> Result<Self> {
        Self::open(
            Config::builder()
                .data_dir(path)
                .max_segment_size(max_segment_size)
                .build(),
        )
    }

    /// Get the value stored for `key`
    ///
    /// Returns `KeyNotFound` when the key was never written. I/O and decode
    /// failures are returned as-is.
    pub fn get(&self, key: &str) -> Result<String> {
        self.ensure_open()?;
        let target = self.store.resolve(key)?;
        self.get_resolved(key, target)
    }

    /// Read `key` from a location resolved earlier
    ///
    /// A compaction may have merged the segment away since `target` was
    /// resolved. When the file is gone and the index has moved on, the key is
    /// re-resolved and the read retried, up to `MAX_READ_ATTEMPTS` reads.
    pub fn get_resolved(&self, key: &str, mut target: ReadTarget) -> Result<String> {
        self.ensure_open()?;

        let mut attempt = 1;
        loop {
            match self.readers.read(target.path.clone(), target.location.offset) {
                Ok(record) if record.key == key => return Ok(record.value),
                Ok(record) => {
                    return Err(SegKvError::Consistency(format!(
                        "expected key {:?} at offset {} of segment {}, found {:?}",
                        key, target.location.offset, target.location.segment_id, record.key
                    )));
                }
                Err(e) if e.is_missing_file() && attempt < MAX_READ_ATTEMPTS => {
                    if self.store.locate(key)? == target.location {
                        return Err(e);
                    }
                    tracing::debug!(
                        "Segment {} vanished while reading {:?}, retrying",
                        target.location.segment_id,
                        key
                    );
                    target = self.store.resolve(key)?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Put a key-value pair
    ///
    /// Steps:
    /// 1. Append under the writer role (may roll over to a new segment)
    /// 2. Update the index
    /// 3. Signal background compaction if more than one segment exists
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_open()?;

        let segments = self.store.put(key, value)?;
        if segments > 1 {
            self.trigger_compaction();
        }

        Ok(())
    }

    /// Total bytes across all segments
    pub fn size(&self) -> Result<u64> {
        self.ensure_open()?;
        self.store.size()
    }

    /// Merge all segments now, on the calling thread
    pub fn compact(&self) -> Result<CompactionStats> {
        self.ensure_open()?;
        self.store.compact()
    }

    /// Close the engine
    ///
    /// Stops the compaction worker and read workers, then closes every
    /// segment file. Safe to call more than once; only the first call does
    /// anything. Every other operation fails with `Closed` afterwards.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(compactor) = &self.compactor {
            compactor.shutdown();
        }
        self.readers.shutdown();
        self.store.close()?;

        tracing::info!("Engine at {} closed", self.config.data_dir.display());
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the underlying segment store
    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    /// Get the number of live segments
    pub fn segment_count(&self) -> Result<usize> {
        self.ensure_open()?;
        self.store.segment_count()
    }

    /// Get a snapshot of every live segment, oldest first
    pub fn segments(&self) -> Result<Vec<SegmentInfo>> {
        self.ensure_open()?;
        self.store.segments()
    }

    /// Get the number of live keys
    pub fn key_count(&self) -> Result<usize> {
        self.ensure_open()?;
        self.store.key_count()
    }

    /// What recovery found when the engine was opened
    pub fn recovery_report(&self) -> &RecoveryReport {
        self.store.recovery_report()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
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

    fn trigger_compaction(&self) {
        if let Some(compactor) = &self.compactor {
            compactor.notify();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close engine at {}: {}", self.config.data_dir.display(), e);
        }
    }
}
