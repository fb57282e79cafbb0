//! Bounded FIFO of ready slot ids between the decode thread and the reader

use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};

use super::pool::SlotId;

/// Producer half. Dropping it (or calling [`close`](Self::close)) closes
/// the ring; the reader drains what is left and then sees `None`.
pub struct SlotWriter {
    tx: Sender<SlotId>,
}

/// Consumer half.
pub struct SlotReader {
    rx: Receiver<SlotId>,
    capacity: usize,
}

/// Result of a timed pop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedPop {
    Ready(SlotId),
    TimedOut,
    Closed,
}

/// Create a ring holding at most `capacity` slot ids.
pub fn slot_ring(capacity: usize) -> (SlotWriter, SlotReader) {
    let (tx, rx) = flume::bounded(capacity);
    (SlotWriter { tx }, SlotReader { rx, capacity })
}

impl SlotWriter {
    /// Non-blocking push. `false` when the ring is full or the reader is gone.
    pub fn try_push(&self, slot: SlotId) -> bool {
        match self.tx.try_send(slot) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    /// Reader half has been dropped; nothing pushed will ever be read.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_disconnected()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// No further pushes. Wakes a blocked reader.
    pub fn close(self) {
        drop(self);
    }
}

impl SlotReader {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Blocks until a slot is ready. `None` only once closed and drained.
    pub fn pop_blocking(&self) -> Option<SlotId> {
        self.rx.recv().ok()
    }

    pub fn try_pop(&self) -> Option<SlotId> {
        self.rx.try_recv().ok()
    }

    pub fn pop_timeout(&self, timeout: Duration) -> TimedPop {
        match self.rx.recv_timeout(timeout) {
            Ok(slot) => TimedPop::Ready(slot),
            Err(RecvTimeoutError::Timeout) => TimedPop::TimedOut,
            Err(RecvTimeoutError::Disconnected) => TimedPop::Closed,
        }
    }

    pub async fn pop_async(&self) -> Option<SlotId> {
        self.rx.recv_async().await.ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Writer is gone. Items may still be buffered.
    pub fn is_closed(&self) -> bool {
        self.rx.is_disconnected()
    }
}
