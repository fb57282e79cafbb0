//! Pipeline counters shared by the decode thread and the reader

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;
use serde::Serialize;

/// Point-in-time copy of the stream counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub frames_decoded: u64,
    pub frames_read: u64,
    /// Times the decode thread had to wait for a free slot
    pub backpressure_waits: u64,
}

#[derive(Default)]
pub(crate) struct Stats {
    // Written by the producer
    frames_decoded: CachePadded<AtomicU64>,
    backpressure_waits: CachePadded<AtomicU64>,
    // Written by the consumer
    frames_read: CachePadded<AtomicU64>,
}

impl Stats {
    pub(crate) fn frame_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("framefetch_frames_decoded").increment(1);
    }

    pub(crate) fn frame_read(&self) {
        self.frames_read.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("framefetch_frames_read").increment(1);
    }

    pub(crate) fn backpressure_wait(&self) {
        self.backpressure_waits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("framefetch_backpressure_waits").increment(1);
    }

    pub(crate) fn snapshot(&self) -> StreamStats {
        StreamStats {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_read: self.frames_read.load(Ordering::Relaxed),
            backpressure_waits: self.backpressure_waits.load(Ordering::Relaxed),
        }
    }
}
