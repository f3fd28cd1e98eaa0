//! Integration tests for SegKV
//!
//! End-to-end scenarios through the public `Engine` API and the data
//! directory it leaves behind.

use std::fs;
use std::path::Path;

use segkv::{Config, Engine};
use tempfile::TempDir;

fn manual_engine(dir: &Path, max_segment_size: u64) -> Engine {
    Engine::open(
        Config::builder()
            .data_dir(dir)
            .max_segment_size(max_segment_size)
            .auto_compaction(false)
            .build(),
    )
    .unwrap()
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Basic Scenario
// =============================================================================

#[test]
fn test_basic_put_get_overwrite_missing() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open_path(temp.path()).unwrap();

    engine.put("k1", "v1").unwrap();
    engine.put("k2", "v2").unwrap();
    assert_eq!(engine.get("k1").unwrap(), "v1");
    assert_eq!(engine.get("k2").unwrap(), "v2");

    engine.put("k1", "v1.1").unwrap();
    assert_eq!(engine.get("k1").unwrap(), "v1.1");

    assert!(engine.get("missing").unwrap_err().is_not_found());
}

// =============================================================================
// Durability
// =============================================================================

#[test]
fn test_values_survive_restart() {
    let temp = TempDir::new().unwrap();
    {
        let engine = Engine::open_with_max_size(temp.path(), 200).unwrap();
        for i in 0..50 {
            engine.put(&format!("key{}", i), &format!("first{}", i)).unwrap();
        }
        for i in (0..50).step_by(2) {
            engine.put(&format!("key{}", i), &format!("second{}", i)).unwrap();
        }
        engine.close().unwrap();
    }

    let engine = Engine::open_with_max_size(temp.path(), 200).unwrap();
    for i in 0..50 {
        let expected = if i % 2 == 0 {
            format!("second{}", i)
        } else {
            format!("first{}", i)
        };
        assert_eq!(engine.get(&format!("key{}", i)).unwrap(), expected);
    }
}

#[test]
fn test_restart_after_crash_without_close() {
    let temp = TempDir::new().unwrap();
    let engine = manual_engine(temp.path(), 1024);
    engine.put("k", "v").unwrap();

    // Leak the engine so nothing is synced or closed
    std::mem::forget(engine);

    let engine = manual_engine(temp.path(), 1024);
    assert_eq!(engine.get("k").unwrap(), "v");
}

// =============================================================================
// Segment Layout
// =============================================================================

#[test]
fn test_rollover_creates_segments_within_limit() {
    let temp = TempDir::new().unwrap();
    let engine = manual_engine(temp.path(), 100);

    for i in 0..20 {
        engine.put(&format!("key{}", i), &format!("value{}", i)).unwrap();
    }

    let segments = engine.segments().unwrap();
    assert!(segments.len() > 1);
    for segment in &segments {
        assert!(segment.size <= 100);
        assert_eq!(fs::metadata(&segment.path).unwrap().len(), segment.size);
    }
    for i in 0..20 {
        assert_eq!(engine.get(&format!("key{}", i)).unwrap(), format!("value{}", i));
    }
}

#[test]
fn test_segment_file_naming() {
    let temp = TempDir::new().unwrap();
    let engine = manual_engine(temp.path(), 50);

    for i in 0..3 {
        engine.put(&format!("key{}", i), "value").unwrap();
    }

    assert_eq!(
        file_names(temp.path()),
        vec!["current-data", "segment-1", "segment-2"]
    );
}

#[test]
fn test_size_grows_and_shrinks_only_on_compaction() {
    let temp = TempDir::new().unwrap();
    let engine = manual_engine(temp.path(), 60);

    let mut last = engine.size().unwrap();
    for i in 0..12 {
        engine.put("counter", &i.to_string()).unwrap();
        let size = engine.size().unwrap();
        assert!(size > last);
        last = size;
    }

    engine.compact().unwrap();
    assert!(engine.size().unwrap() < last);
    assert_eq!(engine.get("counter").unwrap(), "11");
}
