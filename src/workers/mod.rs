//! Workers Module
//!
//! Background threads owned by the engine.
//!
//! ## Architecture
//! - Read pool: fixed number of threads draining a bounded request queue;
//!   each request carries its own one-shot reply channel
//! - Compaction worker: a single thread draining a one-slot signal queue,
//!   so triggers arriving while a merge is pending coalesce into it

mod compactor;
mod read_pool;

pub use compactor::CompactionWorker;
pub use read_pool::ReadPool;
