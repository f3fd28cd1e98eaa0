//! Segment Module
//!
//! One append-only data file plus an in-memory offset index.
//!
//! ## Responsibilities
//! - Map segment ids to file names and back
//! - Create, reopen and replay segment files
//! - Append encoded records and track the write offset
//! - Physical single-record reads at a known offset
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── current-data      segment 0 (the first ever created)
//!   ├── segment-1
//!   ├── segment-2
//!   └── merge-temp        transient, only during compaction
//! ```

mod file;

pub use file::{AppendHandle, ReplaySummary, Segment};

use std::fmt;
use std::path::{Path, PathBuf};

/// File name of segment 0
pub const ACTIVE_FILE_NAME: &str = "current-data";

/// Prefix for every segment other than id 0
pub const SEGMENT_PREFIX: &str = "segment-";

/// Scratch file written by an in-flight compaction
pub const MERGE_TEMP_FILE_NAME: &str = "merge-temp";

/// Monotonically increasing segment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u64);

impl SegmentId {
    pub const FIRST: SegmentId = SegmentId(0);

    pub fn next(self) -> SegmentId {
        SegmentId(self.0 + 1)
    }

    /// File name for this id: "current-data" for 0, "segment-<id>" otherwise
    pub fn file_name(self) -> String {
        if self == Self::FIRST {
            ACTIVE_FILE_NAME.to_string()
        } else {
            format!("{}{}", SEGMENT_PREFIX, self.0)
        }
    }

    /// Full path of this segment inside `dir`
    pub fn path_in(self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }

    /// Parse a segment id from a file name
    /// "current-data" → Some(0), "segment-42" → Some(42), anything else → None
    ///
    /// Only canonical names parse, so `id.file_name()` always names the file
    /// that was found. "segment-01" and "segment-0" are not segments.
    pub fn parse(file_name: &str) -> Option<SegmentId> {
        if file_name == ACTIVE_FILE_NAME {
            return Some(Self::FIRST);
        }
        let digits = file_name.strip_prefix(SEGMENT_PREFIX)?;
        if digits.is_empty() || digits.starts_with('0') {
            return None;
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(SegmentId)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only description of a live segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    pub id: SegmentId,
    pub path: PathBuf,
    pub size: u64,
    /// Number of distinct keys whose newest in-segment record lives here
    pub key_count: usize,
}
