//! Segment compaction
//!
//! Merges every live segment into a single new one that holds only the
//! newest value per key, then swaps it in.
//!
//! ## Invariants
//!
//! - Compaction **MUST NOT** change logical state
//! - Old segment files are deleted only after the merged segment is synced,
//!   renamed into place and indexed
//! - A failure before the swap leaves the pre-compaction files and index
//!   exactly as they were

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{Result, SegKvError};
use crate::record::RecordReader;
use crate::segment::{Segment, SegmentId, MERGE_TEMP_FILE_NAME};

use super::state::Location;
use super::SegmentStore;

/// Result of a compaction run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Segments folded into the merged one (0 when nothing was done)
    pub segments_merged: usize,
    /// Records decoded from the source segments
    pub records_scanned: u64,
    /// Records written to the merged segment (one per live key)
    pub records_written: u64,
    /// Total size of the source segments
    pub bytes_before: u64,
    /// Size of the merged segment
    pub bytes_after: u64,
    /// Wall time spent
    pub duration: Duration,
}

impl CompactionStats {
    /// A compaction that found nothing to merge
    fn skipped(bytes: u64) -> Self {
        Self {
            bytes_before: bytes,
            bytes_after: bytes,
            ..Self::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.segments_merged == 0
    }

    /// Obsolete records dropped by the merge
    pub fn records_dropped(&self) -> u64 {
        self.records_scanned - self.records_written
    }
}

/// A source segment as seen at the start of compaction
struct SourceSegment {
    id: SegmentId,
    path: PathBuf,
    size: u64,
    /// key → offset of the newest record for that key within the segment
    latest: HashMap<String, u64>,
}

/// The merged file as written to the temp path
struct MergeOutput {
    offsets: HashMap<String, u64>,
    records_scanned: u64,
    records_written: u64,
    bytes: u64,
}

impl SegmentStore {
    /// Merge all segments into one
    ///
    /// Runs under the writer role, so puts wait until it finishes. A second
    /// call queued behind a running one finds a single segment and returns
    /// a no-op result.
    pub fn compact(&self) -> Result<CompactionStats> {
        let _writer = self.write_lock.lock();
        self.ensure_open()?;
        let started = Instant::now();

        let (sources, new_id) = {
            let state = self.state.read();
            let sources: Vec<SourceSegment> = state
                .segments
                .iter()
                .map(|s| SourceSegment {
                    id: s.id(),
                    path: s.path().to_path_buf(),
                    size: s.size(),
                    latest: s.offsets().clone(),
                })
                .collect();
            (sources, state.next_segment_id)
        };

        let bytes_before: u64 = sources.iter().map(|s| s.size).sum();
        if sources.len() <= 1 {
            return Ok(CompactionStats::skipped(bytes_before));
        }

        tracing::debug!(
            "Compacting {} segments ({} bytes) into segment {}",
            sources.len(),
            bytes_before,
            new_id
        );

        // Step 1: write the merged file; nothing live has changed yet
        let temp_path = self.dir.join(MERGE_TEMP_FILE_NAME);
        let merged = match write_merged(&sources, &temp_path) {
            Ok(merged) => merged,
            Err(e) => {
                remove_if_exists(&temp_path);
                tracing::warn!("Compaction aborted, keeping existing segments: {}", e);
                return Err(e);
            }
        };

        // Step 2: rename into place (the atomicity point)
        let final_path = new_id.path_in(&self.dir);
        if let Err(e) = fs::rename(&temp_path, &final_path) {
            remove_if_exists(&temp_path);
            self.recover_after_failure();
            return Err(e.into());
        }

        // Step 3: reopen as a live segment
        let segment = match open_merged(new_id, final_path, merged.offsets) {
            Ok(segment) => segment,
            Err(e) => {
                self.recover_after_failure();
                return Err(e);
            }
        };

        let index: HashMap<String, Location> = merged_index(&segment);
        let bytes_after = segment.size();

        // Step 4: swap segment list and index
        let old_segments = {
            let mut state = self.state.write();
            state.index = index;
            state.next_segment_id = new_id.next();
            std::mem::replace(&mut state.segments, vec![segment])
        };

        // Step 5: close and delete the sources
        for old in old_segments {
            let path = old.path().to_path_buf();
            drop(old);
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("Failed to delete compacted segment {}: {}", path.display(), e);
            }
        }

        let stats = CompactionStats {
            segments_merged: sources.len(),
            records_scanned: merged.records_scanned,
            records_written: merged.records_written,
            bytes_before,
            bytes_after,
            duration: started.elapsed(),
        };

        tracing::info!(
            "Compacted {} segments into segment {}: {} -> {} bytes, {} records kept, {} dropped in {:?}",
            stats.segments_merged,
            new_id,
            stats.bytes_before,
            stats.bytes_after,
            stats.records_written,
            stats.records_dropped(),
            stats.duration
        );

        Ok(stats)
    }

    fn recover_after_failure(&self) {
        if let Err(e) = self.recover_in_place() {
            tracing::error!("Recovery after failed compaction also failed: {}", e);
        }
    }
}

/// Replay sources newest → oldest, writing each key's newest record once
fn write_merged(sources: &[SourceSegment], temp_path: &Path) -> Result<MergeOutput> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(temp_path)?;
    let mut writer = BufWriter::new(file);

    let mut output = MergeOutput {
        offsets: HashMap::new(),
        records_scanned: 0,
        records_written: 0,
        bytes: 0,
    };

    for source in sources.iter().rev() {
        // Bound the replay to the bytes committed when compaction started
        let file = File::open(&source.path)?;
        let reader = RecordReader::new(BufReader::new(file.take(source.size)));

        for item in reader {
            let (offset, record) = item.map_err(|e| annotate(source.id, e))?;
            output.records_scanned += 1;

            // Older copy inside the same segment
            if source.latest.get(&record.key) != Some(&offset) {
                continue;
            }
            // Already taken from a newer segment
            if output.offsets.contains_key(&record.key) {
                continue;
            }

            let bytes = record.encode();
            writer.write_all(&bytes)?;
            output.offsets.insert(record.key, output.bytes);
            output.bytes += bytes.len() as u64;
            output.records_written += 1;
        }
    }

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    Ok(output)
}

fn open_merged(id: SegmentId, path: PathBuf, offsets: HashMap<String, u64>) -> Result<Segment> {
    let file = OpenOptions::new().read(true).write(true).open(&path)?;
    Segment::from_parts(id, path, file, offsets)
}

/// Global index for a store made of the single merged segment
fn merged_index(segment: &Segment) -> HashMap<String, Location> {
    segment
        .offsets()
        .iter()
        .map(|(key, &offset)| {
            (
                key.clone(),
                Location {
                    segment_id: segment.id(),
                    offset,
                },
            )
        })
        .collect()
}

fn annotate(id: SegmentId, err: SegKvError) -> SegKvError {
    match err {
        SegKvError::CorruptRecord(reason) => {
            SegKvError::CorruptRecord(format!("segment {} during compaction: {}", id, reason))
        }
        SegKvError::TruncatedRecord { expected, found } => SegKvError::CorruptRecord(format!(
            "segment {} during compaction: truncated record ({} of {} bytes)",
            id, found, expected
        )),
        other => other,
    }
}

fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
