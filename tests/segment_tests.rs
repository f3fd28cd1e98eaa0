//! Tests for Segment
//!
//! These tests verify:
//! - Creating and reopening segment files
//! - Appending records and tracking offsets/size
//! - Replay rebuilding the local index
//! - Torn tail handling during replay
//! - Single-record physical reads
//! - File naming and id parsing

use std::fs::{self, OpenOptions};
use std::io::Write;

use segkv::record::Record;
use segkv::segment::{Segment, SegmentId};
use segkv::SegKvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn append(segment: &mut Segment, key: &str, value: &str) -> u64 {
    let bytes = Record::new(key, value).encode();
    let handle = segment.append_handle();
    let offset = handle.offset();
    handle.write(&bytes, false).unwrap();
    segment.commit_append(key, offset, bytes.len() as u64);
    offset
}

// =============================================================================
// Create / Append Tests
// =============================================================================

#[test]
fn test_create_uses_naming_convention() {
    let temp = TempDir::new().unwrap();

    let first = Segment::create(temp.path(), SegmentId(0)).unwrap();
    let third = Segment::create(temp.path(), SegmentId(3)).unwrap();

    assert_eq!(first.path(), temp.path().join("current-data"));
    assert_eq!(third.path(), temp.path().join("segment-3"));
    assert_eq!(first.size(), 0);
    assert_eq!(first.key_count(), 0);
    assert!(third.path().exists());
}

#[test]
fn test_create_refuses_existing_file() {
    let temp = TempDir::new().unwrap();
    let mut segment = Segment::create(temp.path(), SegmentId(1)).unwrap();
    append(&mut segment, "k", "v");
    let size = segment.size();
    drop(segment);

    match Segment::create(temp.path(), SegmentId(1)) {
        Err(SegKvError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::AlreadyExists),
        other => panic!("expected AlreadyExists, got {:?}", other),
    }
    assert_eq!(fs::metadata(temp.path().join("segment-1")).unwrap().len(), size);
}

#[test]
fn test_append_tracks_offsets_and_size() {
    let temp = TempDir::new().unwrap();
    let mut segment = Segment::create(temp.path(), SegmentId(0)).unwrap();

    let first = append(&mut segment, "k1", "v1");
    let second = append(&mut segment, "k2", "v2");
    let third = append(&mut segment, "k1", "v1.1");

    let len_k1 = Record::encoded_len("k1", "v1") as u64;
    let len_k2 = Record::encoded_len("k2", "v2") as u64;
    let len_k1b = Record::encoded_len("k1", "v1.1") as u64;

    assert_eq!(first, 0);
    assert_eq!(second, len_k1);
    assert_eq!(third, len_k1 + len_k2);
    assert_eq!(segment.size(), len_k1 + len_k2 + len_k1b);
    assert_eq!(fs::metadata(segment.path()).unwrap().len(), segment.size());

    // Local index keeps only the newest offset per key
    assert_eq!(segment.offset_of("k1"), Some(third));
    assert_eq!(segment.offset_of("k2"), Some(second));
    assert_eq!(segment.key_count(), 2);
}

#[test]
fn test_synced_append() {
    let temp = TempDir::new().unwrap();
    let mut segment = Segment::create(temp.path(), SegmentId(0)).unwrap();

    let bytes = Record::new("k", "v").encode();
    let handle = segment.append_handle();
    handle.write(&bytes, true).unwrap();
    segment.commit_append("k", 0, bytes.len() as u64);

    assert_eq!(fs::metadata(segment.path()).unwrap().len(), bytes.len() as u64);
}

#[test]
fn test_discarded_append_leaves_clean_tail() {
    let temp = TempDir::new().unwrap();
    let mut segment = Segment::create(temp.path(), SegmentId(0)).unwrap();
    append(&mut segment, "k1", "v1");
    let committed = segment.size();

    // An append whose sync failed: bytes reached the file, then get rolled back
    let failed = Record::new("k2", "a much longer value").encode();
    let handle = segment.append_handle();
    handle.write(&failed, false).unwrap();
    handle.discard().unwrap();
    assert_eq!(fs::metadata(segment.path()).unwrap().len(), committed);

    // A shorter record lands at the same offset
    let offset = append(&mut segment, "k3", "v3");
    assert_eq!(offset, committed);
    let path = segment.path().to_path_buf();
    drop(segment);

    let mut reopened = Segment::open(&path, SegmentId(0)).unwrap();
    let summary = reopened.replay(false, |_, _| {}).unwrap();

    assert_eq!(summary.records, 2);
    assert_eq!(reopened.offset_of("k2"), None);
    assert_eq!(reopened.offset_of("k3"), Some(committed));
}

#[test]
fn test_read_record_at() {
    let temp = TempDir::new().unwrap();
    let mut segment = Segment::create(temp.path(), SegmentId(0)).unwrap();

    append(&mut segment, "a", "1");
    let offset = append(&mut segment, "b", "2");

    let record = Segment::read_record_at(segment.path(), offset).unwrap();
    assert_eq!(record, Record::new("b", "2"));
}

#[test]
fn test_read_record_at_end_of_file_is_corrupt() {
    let temp = TempDir::new().unwrap();
    let mut segment = Segment::create(temp.path(), SegmentId(0)).unwrap();
    append(&mut segment, "a", "1");

    let result = Segment::read_record_at(segment.path(), segment.size());
    assert!(matches!(result, Err(SegKvError::CorruptRecord(_))));
}

#[test]
fn test_read_record_at_missing_file_is_io_error() {
    let temp = TempDir::new().unwrap();
    let result = Segment::read_record_at(&temp.path().join("segment-9"), 0);

    match result {
        Err(SegKvError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("expected Io error, got {:?}", other),
    }
}

// =============================================================================
// Replay Tests
// =============================================================================

#[test]
fn test_replay_rebuilds_index() {
    let temp = TempDir::new().unwrap();
    let path = {
        let mut segment = Segment::create(temp.path(), SegmentId(2)).unwrap();
        append(&mut segment, "k1", "v1");
        append(&mut segment, "k2", "v2");
        append(&mut segment, "k1", "v1.1");
        segment.path().to_path_buf()
    };

    let mut reopened = Segment::open(&path, SegmentId(2)).unwrap();
    let mut seen = Vec::new();
    let summary = reopened
        .replay(false, |key, offset| seen.push((key.to_string(), offset)))
        .unwrap();

    assert_eq!(summary.records, 3);
    assert_eq!(summary.truncated_bytes, 0);
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], ("k1".to_string(), 0));
    assert_eq!(reopened.offset_of("k1"), Some(seen[2].1));
    assert_eq!(reopened.size(), fs::metadata(&path).unwrap().len());
}

#[test]
fn test_replay_truncates_torn_tail_when_allowed() {
    let temp = TempDir::new().unwrap();
    let (path, clean_size) = {
        let mut segment = Segment::create(temp.path(), SegmentId(0)).unwrap();
        append(&mut segment, "k1", "v1");
        append(&mut segment, "k2", "v2");
        (segment.path().to_path_buf(), segment.size())
    };

    // Simulate a crash in the middle of the third append
    let partial = Record::new("k3", "v3").encode();
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&partial[..10]).unwrap();
    drop(file);

    let mut reopened = Segment::open(&path, SegmentId(0)).unwrap();
    let summary = reopened.replay(true, |_, _| {}).unwrap();

    assert_eq!(summary.records, 2);
    assert_eq!(summary.truncated_bytes, 10);
    assert_eq!(reopened.size(), clean_size);
    assert_eq!(fs::metadata(&path).unwrap().len(), clean_size);
    assert_eq!(reopened.offset_of("k3"), None);
}

#[test]
fn test_replay_rejects_torn_record_when_not_allowed() {
    let temp = TempDir::new().unwrap();
    let path = {
        let mut segment = Segment::create(temp.path(), SegmentId(1)).unwrap();
        append(&mut segment, "k1", "v1");
        segment.path().to_path_buf()
    };

    let partial = Record::new("k2", "v2").encode();
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&partial[..partial.len() - 1]).unwrap();
    drop(file);

    let mut reopened = Segment::open(&path, SegmentId(1)).unwrap();
    let result = reopened.replay(false, |_, _| {});
    assert!(matches!(result, Err(SegKvError::CorruptRecord(_))));
}

#[test]
fn test_replay_rejects_bad_checksum_even_at_tail() {
    let temp = TempDir::new().unwrap();
    let path = {
        let mut segment = Segment::create(temp.path(), SegmentId(0)).unwrap();
        append(&mut segment, "k1", "v1");
        segment.path().to_path_buf()
    };

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&path, &bytes).unwrap();

    let mut reopened = Segment::open(&path, SegmentId(0)).unwrap();
    let result = reopened.replay(true, |_, _| {});
    assert!(matches!(result, Err(SegKvError::CorruptRecord(_))));
}

#[test]
fn test_info_snapshot() {
    let temp = TempDir::new().unwrap();
    let mut segment = Segment::create(temp.path(), SegmentId(4)).unwrap();
    append(&mut segment, "a", "1");
    append(&mut segment, "a", "2");

    let info = segment.info();
    assert_eq!(info.id, SegmentId(4));
    assert_eq!(info.key_count, 1);
    assert_eq!(info.size, segment.size());
    assert_eq!(info.path, temp.path().join("segment-4"));
}

// =============================================================================
// Naming Tests
// =============================================================================

#[test]
fn test_parse_recognizes_known_names() {
    assert_eq!(SegmentId::parse("current-data"), Some(SegmentId(0)));
    assert_eq!(SegmentId::parse("segment-7"), Some(SegmentId(7)));
    assert_eq!(SegmentId::parse("segment-120"), Some(SegmentId(120)));
    assert_eq!(SegmentId::parse("segment-"), None);
    assert_eq!(SegmentId::parse("segment-+3"), None);
    assert_eq!(SegmentId::parse("segment-3.tmp"), None);
    assert_eq!(SegmentId::parse("merge-temp"), None);
}

#[test]
fn test_parse_rejects_non_canonical_ids() {
    assert_eq!(SegmentId::parse("segment-01"), None);
    assert_eq!(SegmentId::parse("segment-001"), None);
    // Id 0 is only ever "current-data"
    assert_eq!(SegmentId::parse("segment-0"), None);
}

#[test]
fn test_file_name_round_trips_through_parse() {
    assert_eq!(SegmentId(0).file_name(), "current-data");
    assert_eq!(SegmentId(12).file_name(), "segment-12");
    for id in [0, 1, 10, 99, 1000] {
        let id = SegmentId(id);
        assert_eq!(SegmentId::parse(&id.file_name()), Some(id));
    }
}
