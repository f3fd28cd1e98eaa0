//! # SegKV
//!
//! A log-structured, segment-based key-value storage engine with:
//! - Append-only segment files with CRC-checked records
//! - Crash recovery by replaying every segment
//! - Size-based segment rollover
//! - Background compaction that keeps only the newest value per key
//! - Single-writer/multi-reader concurrency with a pool of read workers
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │          (Single Writer / Multi Reader coordinator)         │
//! └──────────┬──────────────────────┬───────────────────┬───────┘
//!            │ put                  │ get               │ trigger
//!            ▼                      ▼                   ▼
//!   ┌─────────────────┐    ┌─────────────────┐  ┌─────────────────┐
//!   │  Segment Store  │◄───│   Read Pool     │  │   Compaction    │
//!   │ (writer role +  │    │ (worker threads)│  │    Worker       │
//!   │  RwLock index)  │◄───┼─────────────────┼──│ (1-slot queue)  │
//!   └────────┬────────┘    └─────────────────┘  └─────────────────┘
//!            │
//!            ▼
//!   ┌─────────────────────────────────────────────┐
//!   │ current-data │ segment-1 │ ... │ segment-N  │
//!   └─────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod segment;
pub mod store;
pub mod workers;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{SegKvError, Result};
pub use config::{Config, SyncStrategy};
pub use engine::Engine;
pub use store::{CompactionStats, RecoveryReport};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of SegKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
