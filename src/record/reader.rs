//! Record Reader
//!
//! Sequential replay over every record in a segment file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::Result;

use super::Record;

/// Replays records in file order, tracking the offset of each one
pub struct RecordReader<R: Read> {
    reader: R,
    /// Offset of the next record to decode
    position: u64,
    /// Set after end of stream or the first error
    done: bool,
}

impl RecordReader<BufReader<File>> {
    /// Open a segment file for replay from offset 0
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
            done: false,
        }
    }

    /// Offset just past the last fully decoded record
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Decode the next record, returning it with the offset it started at
    pub fn next_record(&mut self) -> Result<Option<(u64, Record)>> {
        if self.done {
            return Ok(None);
        }

        match Record::decode_from(&mut self.reader) {
            Ok(Some((record, consumed))) => {
                let offset = self.position;
                self.position += consumed;
                Ok(Some((offset, record)))
            }
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    /// (offset, record)
    type Item = Result<(u64, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
