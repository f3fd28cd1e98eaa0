//! Read Pool
//!
//! Offloads physical segment reads (open, seek, decode) to worker threads.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{Result, SegKvError};
use crate::record::Record;
use crate::segment::Segment;

enum ReadJob {
    Read {
        path: PathBuf,
        offset: u64,
        reply: Sender<Result<Record>>,
    },
    Shutdown,
}

/// Fixed-size pool of read worker threads
///
/// The request queue holds at most one pending job per worker; a full queue
/// blocks new dispatches until a worker frees up.
pub struct ReadPool {
    tx: Sender<ReadJob>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ReadPool {
    /// Spawn `size` worker threads
    pub fn new(size: usize) -> Result<Self> {
        let (tx, rx) = channel::bounded::<ReadJob>(size);

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("segkv-read-{}", i))
                .spawn(move || Self::run(rx))?;
            workers.push(handle);
        }

        Ok(Self {
            tx,
            workers: Mutex::new(workers),
        })
    }

    /// Read the record at `offset` in `path` on a worker, blocking until done
    pub fn read(&self, path: PathBuf, offset: u64) -> Result<Record> {
        let (reply_tx, reply_rx) = channel::bounded(1);

        self.tx
            .send(ReadJob::Read {
                path,
                offset,
                reply: reply_tx,
            })
            .map_err(|_| SegKvError::Closed)?;

        reply_rx
            .recv()
            .map_err(|_| SegKvError::Worker("read worker exited before replying".to_string()))?
    }

    /// Stop every worker and wait for it to exit; later calls are no-ops
    pub fn shutdown(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());

        for _ in &workers {
            // Workers may already be gone; nothing left to stop then
            let _ = self.tx.send(ReadJob::Shutdown);
        }

        for handle in workers {
            if handle.join().is_err() {
                tracing::warn!("Read worker panicked before shutdown");
            }
        }
    }

    fn run(rx: Receiver<ReadJob>) {
        for job in rx.iter() {
            match job {
                ReadJob::Read {
                    path,
                    offset,
                    reply,
                } => {
                    tracing::trace!("Reading offset {} of {}", offset, path.display());
                    let result = Segment::read_record_at(&path, offset);
                    // The caller may have given up; dropping the result is fine
                    let _ = reply.send(result);
                }
                ReadJob::Shutdown => break,
            }
        }
    }
}
