//! Error types for SegKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using SegKvError
pub type Result<T> = std::result::Result<T, SegKvError>;

/// Unified error type for SegKV operations
#[derive(Debug, Error)]
pub enum SegKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The index points somewhere the live segment list cannot satisfy.
    /// The key logically exists, so this is never reported as `KeyNotFound`.
    #[error("Index consistency error: {0}")]
    Consistency(String),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Truncated record: expected {expected} bytes, found {found}")]
    TruncatedRecord { expected: usize, found: usize },

    #[error("Record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Engine is closed")]
    Closed,

    #[error("Read worker error: {0}")]
    Worker(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SegKvError {
    /// True when the error is the "no such key" outcome of a lookup
    pub fn is_not_found(&self) -> bool {
        matches!(self, SegKvError::KeyNotFound(_))
    }

    /// True when the underlying file vanished (e.g. removed by compaction)
    pub(crate) fn is_missing_file(&self) -> bool {
        matches!(self, SegKvError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
