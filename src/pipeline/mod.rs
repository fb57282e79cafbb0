//! Bounded-lookahead decode pipeline

pub mod pool;
pub mod producer;
pub mod ringbuf;
pub mod stats;
pub mod stream;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use arc_swap::ArcSwapOption;
use crossbeam::utils::CachePadded;

use crate::error::DecodeError;
use pool::BufferPool;
use stats::Stats;

pub use pool::{SlotId, SlotRef};
pub use stats::StreamStats;
pub use stream::{FrameView, StopHandle, Stream};

/// Stream lifecycle. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    Created = 0,
    Running = 1,
    Stopped = 2,
}

/// Decode thread lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProducerState {
    Idle = 0,
    Decoding = 1,
    Stopping = 2,
    Stopped = 3,
}

impl From<u8> for StreamState {
    fn from(v: u8) -> Self {
        match v {
            0 => StreamState::Created,
            1 => StreamState::Running,
            _ => StreamState::Stopped,
        }
    }
}

impl From<u8> for ProducerState {
    fn from(v: u8) -> Self {
        match v {
            0 => ProducerState::Idle,
            1 => ProducerState::Decoding,
            2 => ProducerState::Stopping,
            _ => ProducerState::Stopped,
        }
    }
}

/// State shared between the stream façade and its decode thread
pub(crate) struct Shared {
    pub(crate) pool: BufferPool,
    stop: AtomicBool,
    state: AtomicU8,
    producer_state: AtomicU8,
    /// Frames decoded and published
    produced: CachePadded<AtomicU64>,
    /// Frames whose view the consumer has dropped
    released: CachePadded<AtomicU64>,
    /// Decode failure waiting to be handed to the consumer
    error: ArcSwapOption<DecodeError>,
    pub(crate) stats: Stats,
}

impl Shared {
    pub(crate) fn new(pool: BufferPool) -> Self {
        Self {
            pool,
            stop: AtomicBool::new(false),
            state: AtomicU8::new(StreamState::Created as u8),
            producer_state: AtomicU8::new(ProducerState::Idle as u8),
            produced: CachePadded::new(AtomicU64::new(0)),
            released: CachePadded::new(AtomicU64::new(0)),
            error: ArcSwapOption::empty(),
            stats: Stats::default(),
        }
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Request a stop and move to `Stopped`. `true` on the first call.
    pub(crate) fn stop(&self) -> bool {
        self.request_stop();
        let previous = self.state.swap(StreamState::Stopped as u8, Ordering::AcqRel);
        previous != StreamState::Stopped as u8
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> StreamState {
        self.state.load(Ordering::Acquire).into()
    }

    pub(crate) fn set_state(&self, state: StreamState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Created -> Running. Fails if the stream has left `Created`.
    pub(crate) fn try_begin(&self) -> bool {
        self.state
            .compare_exchange(
                StreamState::Created as u8,
                StreamState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn producer_state(&self) -> ProducerState {
        self.producer_state.load(Ordering::Acquire).into()
    }

    pub(crate) fn set_producer_state(&self, state: ProducerState) {
        self.producer_state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn produced(&self) -> u64 {
        self.produced.load(Ordering::Acquire)
    }

    pub(crate) fn set_produced(&self, cursor: u64) {
        self.produced.store(cursor, Ordering::Release);
    }

    pub(crate) fn released(&self) -> u64 {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn release_one(&self) {
        self.released.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_error(&self, err: DecodeError) {
        self.error.store(Some(err.into()));
    }

    pub(crate) fn take_error(&self) -> Option<std::sync::Arc<DecodeError>> {
        self.error.swap(None)
    }
}
