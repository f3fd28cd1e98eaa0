//! Store state
//!
//! The in-memory bookkeeping guarded by the index lock.

use std::collections::HashMap;

use crate::segment::{Segment, SegmentId};

/// Where the newest record for a key lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub segment_id: SegmentId,
    pub offset: u64,
}

/// Segment list plus global index
///
/// Invariants:
/// - `segments` is sorted by id, oldest first; the last one is the write target
/// - `index` points every live key at its newest record across all segments
/// - `next_segment_id` is greater than every id in `segments`
#[derive(Debug)]
pub(crate) struct StoreState {
    pub(crate) segments: Vec<Segment>,
    pub(crate) index: HashMap<String, Location>,
    pub(crate) next_segment_id: SegmentId,
}

impl StoreState {
    /// State with no segments (after close)
    pub(crate) fn empty() -> Self {
        Self {
            segments: Vec::new(),
            index: HashMap::new(),
            next_segment_id: SegmentId::FIRST,
        }
    }

    pub(crate) fn write_target(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub(crate) fn write_target_mut(&mut self) -> Option<&mut Segment> {
        self.segments.last_mut()
    }

    /// Find a live segment by id (segments are sorted, so binary search)
    pub(crate) fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments
            .binary_search_by_key(&id, |s| s.id())
            .ok()
            .map(|pos| &self.segments[pos])
    }

    pub(crate) fn total_size(&self) -> u64 {
        self.segments.iter().map(|s| s.size()).sum()
    }
}
