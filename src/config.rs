//! Configuration for SegKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, SegKvError};

/// Main configuration for a SegKV engine instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding every segment file
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── current-data     (segment 0)
    ///     ├── segment-<id>     (later segments)
    ///     └── merge-temp       (only while a compaction runs)
    pub data_dir: PathBuf,

    /// Size threshold (bytes) that triggers a rollover to a new segment
    pub max_segment_size: u64,

    /// Durability policy for appends
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Concurrency Configuration
    // -------------------------------------------------------------------------
    /// Number of long-lived read worker threads
    pub read_workers: usize,

    /// Merge segments in the background whenever more than one exists
    pub auto_compaction: bool,
}

/// When appended records are forced to stable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Leave flushing to the OS page cache
    OsBuffered,

    /// fdatasync after every append (safest, slowest)
    EveryWrite,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./segkv_data"),
            max_segment_size: 10 * 1024 * 1024, // 10 MB
            sync_strategy: SyncStrategy::OsBuffered,
            read_workers: 10,
            auto_compaction: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_segment_size == 0 {
            return Err(SegKvError::Config(
                "max_segment_size must be greater than zero".to_string(),
            ));
        }
        if self.read_workers == 0 {
            return Err(SegKvError::Config(
                "read_workers must be at least one".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the segment rollover threshold (in bytes)
    pub fn max_segment_size(mut self, bytes: u64) -> Self {
        self.config.max_segment_size = bytes;
        self
    }

    /// Set the append sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the number of read worker threads
    pub fn read_workers(mut self, count: usize) -> Self {
        self.config.read_workers = count;
        self
    }

    /// Enable or disable background compaction
    pub fn auto_compaction(mut self, enabled: bool) -> Self {
        self.config.auto_compaction = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
