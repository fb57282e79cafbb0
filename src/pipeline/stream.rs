//! Stream façade: owns the pool, the ring and the decode thread

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, info_span, instrument};

use super::pool::{BufferPool, SlotId, SlotRef};
use super::producer::{ExitReason, Producer};
use super::ringbuf::{slot_ring, SlotReader, SlotWriter, TimedPop};
use super::stats::StreamStats;
use super::{ProducerState, Shared, StreamState};
use crate::capture::frame::{FrameBuffer, PixelFormat};
use crate::capture::source::{FrameSource, SourceGuard};
use crate::error::{BuildError, StreamError};
use crate::{utils, PrefetchConfig};

/// Prefetching frame stream over a [`FrameSource`].
///
/// A background thread decodes up to `capacity` frames ahead into a
/// fixed pool of buffers; [`read_next`](Self::read_next) hands them out
/// in decode order without copying.
pub struct Stream<S: FrameSource> {
    shared: Arc<Shared>,
    reader: SlotReader,
    /// Source and ring writer, until the producer takes them
    pending: Option<(SourceGuard<S>, SlotWriter)>,
    handle: Option<JoinHandle<ExitReason>>,
    config: PrefetchConfig,
}

/// Borrowed view of one decoded frame. The slot goes back to the decode
/// thread when the view is dropped.
pub struct FrameView<'a> {
    buffer: SlotRef<'a>,
    slot: SlotId,
    shared: &'a Shared,
}

/// Requests a stop from any thread
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl<S: FrameSource> Stream<S> {
    /// Open `identifier` with `S` and allocate the buffer pool.
    pub fn open(identifier: &str, config: PrefetchConfig) -> Result<Self, BuildError> {
        let source = S::open(identifier)?;
        Self::from_source(source, config)
    }

    /// Wrap an already-open source. The source is released even if
    /// allocation fails.
    #[instrument(skip(source, config), fields(capacity = config.capacity))]
    pub fn from_source(source: S, config: PrefetchConfig) -> Result<Self, BuildError> {
        let source = SourceGuard::new(source);
        let (width, height) = source.dimensions();
        let pool = BufferPool::allocate(config.capacity, width, height, source.format())?;

        let (writer, reader) = slot_ring(pool.capacity());
        Ok(Self {
            shared: Arc::new(Shared::new(pool)),
            reader,
            pending: Some((source, writer)),
            handle: None,
            config,
        })
    }

    /// Spawn the decode thread. Created -> Running.
    pub fn start(&mut self) -> Result<StopHandle, StreamError> {
        if !self.shared.try_begin() {
            return Err(StreamError::AlreadyStarted);
        }
        let Some((source, writer)) = self.pending.take() else {
            return Err(StreamError::AlreadyStarted);
        };

        let poll_interval = Duration::from_millis(self.config.backpressure_poll_ms);
        let producer = Producer::new(source, writer, self.shared.clone(), poll_interval);
        let pin_core = self.config.pin_core;
        let span = info_span!("producer", capacity = self.capacity());

        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                let _enter = span.enter();
                if let Some(core) = pin_core {
                    utils::pin_current_thread(core);
                }
                producer.run()
            });

        match spawned {
            Ok(handle) => {
                info!(capacity = self.capacity(), "Stream started");
                self.handle = Some(handle);
                Ok(self.stop_handle())
            }
            Err(e) => {
                error!("Failed to spawn decode thread: {}", e);
                self.shared.set_state(StreamState::Stopped);
                Err(StreamError::Spawn(e))
            }
        }
    }

    /// Block until the next frame is decoded.
    ///
    /// Returns `EndOfStream` once the stream has stopped and every
    /// buffered frame was read, or `Decode` once if the source failed.
    pub fn read_next(&mut self) -> Result<FrameView<'_>, StreamError> {
        self.ensure_started()?;
        match self.reader.pop_blocking() {
            Some(slot) => Ok(self.view(slot)),
            None => Err(self.finish()),
        }
    }

    /// Like [`read_next`](Self::read_next) but gives up after `timeout`
    /// with `Ok(None)`.
    pub fn read_next_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<FrameView<'_>>, StreamError> {
        self.ensure_started()?;
        match self.reader.pop_timeout(timeout) {
            TimedPop::Ready(slot) => Ok(Some(self.view(slot))),
            TimedPop::TimedOut => Ok(None),
            TimedPop::Closed => Err(self.finish()),
        }
    }

    /// Async flavour of [`read_next`](Self::read_next).
    pub async fn read_next_async(&mut self) -> Result<FrameView<'_>, StreamError> {
        self.ensure_started()?;
        match self.reader.pop_async().await {
            Some(slot) => Ok(self.view(slot)),
            None => Err(self.finish()),
        }
    }

    /// Whether `read_next` would return a frame without blocking.
    pub fn has_ready(&self) -> bool {
        !self.reader.is_empty()
    }

    /// Ask the decode thread to stop after its current frame. Buffered
    /// frames stay readable. Idempotent.
    pub fn stop(&mut self) {
        if self.shared.stop() {
            info!("Stream stop requested");
        }
        if self.pending.take().is_some() {
            // Never started: closing the ring here ends the stream
            debug!("Stopping stream that was never started");
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    pub fn producer_state(&self) -> ProducerState {
        self.shared.producer_state()
    }

    pub fn capacity(&self) -> usize {
        self.shared.pool.capacity()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.shared.pool.dimensions()
    }

    pub fn format(&self) -> PixelFormat {
        self.shared.pool.format()
    }

    /// Frames waiting in the ring
    pub fn buffered(&self) -> usize {
        self.reader.len()
    }

    /// Frames decoded so far
    pub fn frames_produced(&self) -> u64 {
        self.shared.produced()
    }

    pub fn stats(&self) -> StreamStats {
        self.shared.stats.snapshot()
    }

    fn ensure_started(&self) -> Result<(), StreamError> {
        if self.pending.is_some() {
            return Err(StreamError::NotStarted);
        }
        Ok(())
    }

    fn view(&self, slot: SlotId) -> FrameView<'_> {
        self.shared.stats.frame_read();
        FrameView {
            buffer: self.shared.pool.get(slot),
            slot,
            shared: &self.shared,
        }
    }

    fn finish(&self) -> StreamError {
        match self.shared.take_error() {
            Some(err) => StreamError::Decode(err),
            None => StreamError::EndOfStream,
        }
    }
}

impl<S: FrameSource> Drop for Stream<S> {
    fn drop(&mut self) {
        self.shared.request_stop();
        self.pending.take();

        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(reason) => debug!(?reason, "Decode thread joined"),
                Err(_) => error!("Decode thread panicked"),
            }
        }
        self.shared.set_state(StreamState::Stopped);
    }
}

impl FrameView<'_> {
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn data(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Owned copy of the frame data
    pub fn to_vec(&self) -> Vec<u8> {
        self.buffer.as_slice().to_vec()
    }
}

impl fmt::Debug for FrameView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameView")
            .field("slot", &self.slot)
            .field("sequence", &self.buffer.sequence())
            .field("len", &self.buffer.len())
            .finish()
    }
}

impl Deref for FrameView<'_> {
    type Target = FrameBuffer;

    fn deref(&self) -> &FrameBuffer {
        &self.buffer
    }
}

impl Drop for FrameView<'_> {
    fn drop(&mut self) {
        self.shared.release_one();
    }
}

impl StopHandle {
    /// Same as [`Stream::stop`], from any thread.
    pub fn stop(&self) {
        if self.shared.stop() {
            info!("Stream stop requested through handle");
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TestPattern;

    fn config(capacity: usize) -> PrefetchConfig {
        PrefetchConfig {
            capacity,
            ..PrefetchConfig::default()
        }
    }

    #[test]
    fn test_read_before_start() {
        let mut stream = Stream::from_source(TestPattern::new(4, 4, 3), config(2)).unwrap();
        assert_eq!(stream.state(), StreamState::Created);
        assert!(matches!(stream.read_next(), Err(StreamError::NotStarted)));
        assert!(!stream.has_ready());
    }

    #[test]
    fn test_stop_without_start_ends_stream() {
        let mut stream = Stream::from_source(TestPattern::new(4, 4, 3), config(2)).unwrap();
        stream.stop();
        assert_eq!(stream.state(), StreamState::Stopped);
        assert!(matches!(stream.read_next(), Err(StreamError::EndOfStream)));
        assert!(matches!(stream.start(), Err(StreamError::AlreadyStarted)));
    }

    #[test]
    fn test_view_exposes_frame() {
        let mut stream = Stream::from_source(TestPattern::new(4, 2, 1), config(3)).unwrap();
        stream.start().unwrap();

        let frame = stream.read_next().unwrap();
        assert_eq!(frame.slot(), 0);
        assert_eq!(frame.sequence(), 0);
        assert_eq!((frame.width(), frame.height()), (4, 2));
        assert_eq!(frame.format(), PixelFormat::Rgb24);
        assert_eq!(frame.data().len(), 24);
        assert_eq!(TestPattern::frame_number(&frame.to_vec()), Some(1));
        drop(frame);

        assert!(stream.read_next().unwrap_err().is_end_of_stream());
        assert_eq!(stream.stats().frames_read, 1);
    }

    #[test]
    fn test_timed_read() {
        let source = TestPattern::new(4, 4, 1).with_decode_delay(Duration::from_millis(200));
        let mut stream = Stream::from_source(source, config(2)).unwrap();
        stream.start().unwrap();

        assert!(stream
            .read_next_timeout(Duration::from_millis(5))
            .unwrap()
            .is_none());
        let frame = stream.read_next_timeout(Duration::from_secs(5)).unwrap();
        assert!(frame.is_some());
    }

    #[test]
    fn test_stop_handle_from_another_thread() {
        let mut stream = Stream::from_source(TestPattern::new(4, 4, u64::MAX), config(2)).unwrap();
        let handle = stream.start().unwrap();

        let stopper = thread::spawn(move || handle.stop());
        stopper.join().unwrap();
        // the handle moves the state right away, like Stream::stop
        assert_eq!(stream.state(), StreamState::Stopped);

        let mut read = 0;
        while stream.read_next().is_ok() {
            read += 1;
        }
        // at most a full ring plus the frame in flight when stop landed
        assert!(read <= 3, "read {read} frames after stop");
        assert_eq!(stream.state(), StreamState::Stopped);
    }
}
