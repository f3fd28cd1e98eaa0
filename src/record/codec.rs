//! Record codec
//!
//! Encoding and decoding of a single framed record.

use std::io::{self, Read};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, SegKvError};

use super::{HEADER_SIZE, MAX_RECORD_SIZE};

/// A single key/value pair as stored in a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: String,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Exact size of the encoded frame for this key/value pair
    pub fn encoded_len(key: &str, value: &str) -> usize {
        HEADER_SIZE + key.len() + value.len()
    }

    /// Validate that a key/value pair fits in one frame, returning its size
    pub fn check_size(key: &str, value: &str) -> Result<usize> {
        let size = Self::encoded_len(key, value);
        if size > MAX_RECORD_SIZE {
            return Err(SegKvError::RecordTooLarge {
                size,
                max: MAX_RECORD_SIZE,
            });
        }
        Ok(size)
    }

    /// Size of this record once encoded
    pub fn len(&self) -> usize {
        Self::encoded_len(&self.key, &self.value)
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty() && self.value.is_empty()
    }

    /// Encode to bytes
    ///
    /// Format: total_len (4) + key_len (4) + value_len (4) + crc (4) + key + value.
    /// Callers must have checked the size with [`Record::check_size`].
    pub fn encode(&self) -> Bytes {
        let total_len = self.len();
        let key_len = (self.key.len() as u32).to_le_bytes();
        let value_len = (self.value.len() as u32).to_le_bytes();

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&key_len);
        hasher.update(&value_len);
        hasher.update(self.key.as_bytes());
        hasher.update(self.value.as_bytes());
        let crc = hasher.finalize();

        let mut buf = BytesMut::with_capacity(total_len);
        buf.put_u32_le(total_len as u32);
        buf.put_slice(&key_len);
        buf.put_slice(&value_len);
        buf.put_u32_le(crc);
        buf.put_slice(self.key.as_bytes());
        buf.put_slice(self.value.as_bytes());
        buf.freeze()
    }

    /// Decode one record from the reader's current position
    ///
    /// Returns:
    /// - `Ok(Some((record, consumed)))`: a full record and its frame size
    /// - `Ok(None)`: clean end of stream, no bytes left
    /// - `Err(TruncatedRecord)`: the stream ended inside a record
    /// - `Err(CorruptRecord)`: lengths, checksum or UTF-8 are invalid
    pub fn decode_from<R: Read>(reader: &mut R) -> Result<Option<(Record, u64)>> {
        let mut header = [0u8; HEADER_SIZE];
        let read = read_full(reader, &mut header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < HEADER_SIZE {
            return Err(SegKvError::TruncatedRecord {
                expected: HEADER_SIZE,
                found: read,
            });
        }

        let mut cursor = &header[..];
        let total_len = cursor.get_u32_le() as usize;
        let key_len = cursor.get_u32_le() as usize;
        let value_len = cursor.get_u32_le() as usize;
        let stored_crc = cursor.get_u32_le();

        if total_len > MAX_RECORD_SIZE {
            return Err(SegKvError::CorruptRecord(format!(
                "record length {} exceeds maximum {}",
                total_len, MAX_RECORD_SIZE
            )));
        }
        if total_len != HEADER_SIZE + key_len + value_len {
            return Err(SegKvError::CorruptRecord(format!(
                "length mismatch: total {} vs key {} + value {}",
                total_len, key_len, value_len
            )));
        }

        let mut body = vec![0u8; key_len + value_len];
        let read = read_full(reader, &mut body)?;
        if read < body.len() {
            return Err(SegKvError::TruncatedRecord {
                expected: total_len,
                found: HEADER_SIZE + read,
            });
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header[4..12]);
        hasher.update(&body);
        let computed_crc = hasher.finalize();
        if computed_crc != stored_crc {
            return Err(SegKvError::CorruptRecord(format!(
                "checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, computed_crc
            )));
        }

        let value = body.split_off(key_len);
        let key = String::from_utf8(body)
            .map_err(|e| SegKvError::CorruptRecord(format!("key is not UTF-8: {}", e)))?;
        let value = String::from_utf8(value)
            .map_err(|e| SegKvError::CorruptRecord(format!("value is not UTF-8: {}", e)))?;

        Ok(Some((Record { key, value }, total_len as u64)))
    }
}

/// Read until `buf` is full or the stream ends; returns bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
