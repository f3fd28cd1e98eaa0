//! Compaction Worker
//!
//! Runs store compaction on a background thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::error::{Result, SegKvError};
use crate::store::SegmentStore;

enum Signal {
    Compact,
    Shutdown,
}

/// Background compaction thread with at-most-one-pending coalescing
pub struct CompactionWorker {
    tx: Sender<Signal>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CompactionWorker {
    pub fn spawn(store: Arc<SegmentStore>) -> Result<Self> {
        // One slot: a trigger while a compaction is already queued is dropped
        let (tx, rx) = channel::bounded::<Signal>(1);

        let handle = thread::Builder::new()
            .name("segkv-compactor".to_string())
            .spawn(move || Self::run(store, rx))?;

        Ok(Self {
            tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Ask for a compaction without waiting for it
    pub fn notify(&self) {
        match self.tx.try_send(Signal::Compact) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::trace!("Compaction already pending, trigger coalesced");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Stop the thread after any queued compaction; later calls are no-ops
    pub fn shutdown(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };

        let _ = self.tx.send(Signal::Shutdown);
        if handle.join().is_err() {
            tracing::warn!("Compaction worker panicked before shutdown");
        }
    }

    fn run(store: Arc<SegmentStore>, rx: Receiver<Signal>) {
        for signal in rx.iter() {
            match signal {
                Signal::Compact => match store.compact() {
                    Ok(stats) if stats.is_noop() => {
                        tracing::trace!("Background compaction found nothing to merge");
                    }
                    Ok(_) => {}
                    Err(SegKvError::Closed) => break,
                    Err(e) => {
                        tracing::warn!("Background compaction failed: {}", e);
                    }
                },
                Signal::Shutdown => break,
            }
        }
    }
}
