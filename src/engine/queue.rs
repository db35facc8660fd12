//! Bounded queue that makes room by dropping its oldest entry

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Multi-producer queue whose `push` never blocks.
///
/// When the queue is full the oldest entry is discarded to make room, so a
/// slow consumer always sees the most recent results.
#[derive(Debug, Clone)]
pub struct ResultQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> ResultQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue `item`; returns how many old entries were discarded for it
    pub fn push(&self, item: T) -> usize {
        let mut item = item;
        let mut evicted = 0;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => break,
                Err(TrySendError::Full(back)) => {
                    item = back;
                    if self.rx.try_recv().is_ok() {
                        evicted += 1;
                    }
                }
                // We hold a receiver, so the channel cannot be disconnected
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
        if evicted > 0 {
            self.dropped.fetch_add(evicted as u64, Ordering::Relaxed);
            trace!("Result queue full - dropped {} oldest", evicted);
        }
        evicted
    }

    /// Consumer handle
    pub fn receiver(&self) -> Receiver<T> {
        self.rx.clone()
    }

    /// Discard everything currently queued; returns the count
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    /// Total entries discarded to make room
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
