//! Record Module
//!
//! Binary framing for a single key/value pair.
//!
//! ## Responsibilities
//! - Explicit length-prefixed encoding (no delimiters, no reflection)
//! - CRC32 checksums for corruption detection
//! - Exact consumed-byte reporting for offset bookkeeping
//! - Sequential replay of a segment file
//!
//! ## Record Format
//! ```text
//! ┌──────────────┬────────────┬──────────────┬───────────┬───────┬─────────┐
//! │ TotalLen (4) │ KeyLen (4) │ ValueLen (4) │ CRC32 (4) │  Key  │  Value  │
//! └──────────────┴────────────┴──────────────┴───────────┴───────┴─────────┘
//! ```
//! All integers are little endian. `TotalLen` covers the whole record,
//! header included. The CRC covers `KeyLen`, `ValueLen`, key and value.

mod codec;
mod reader;

pub use codec::Record;
pub use reader::RecordReader;

/// Header size: TotalLen (4) + KeyLen (4) + ValueLen (4) + CRC32 (4) = 16 bytes
pub const HEADER_SIZE: usize = 16;

/// Largest record (header included) the engine will write or accept on replay
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;
