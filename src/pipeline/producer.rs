//! Background decode loop

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::utils::Backoff;
use tracing::{debug, info, trace, warn};

use super::pool::SlotId;
use super::ringbuf::SlotWriter;
use super::{ProducerState, Shared, StreamState};
use crate::capture::source::{Decoded, FrameSource, SourceGuard};
use crate::error::DecodeError;

/// Why the decode loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    EndOfStream,
    StopRequested,
    DecodeFailed,
    /// The stream (and its ring reader) was dropped
    ReaderGone,
}

pub(crate) struct Producer<S: FrameSource> {
    source: SourceGuard<S>,
    writer: SlotWriter,
    shared: Arc<Shared>,
    /// Frames produced so far; next target is `cursor % capacity`
    cursor: u64,
    poll_interval: Duration,
}

impl<S: FrameSource> Producer<S> {
    pub(crate) fn new(
        source: SourceGuard<S>,
        writer: SlotWriter,
        shared: Arc<Shared>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            writer,
            shared,
            cursor: 0,
            poll_interval,
        }
    }

    /// Run until end-of-stream, a decode failure or a stop request.
    /// The ring is closed and the source released on every path.
    pub(crate) fn run(mut self) -> ExitReason {
        self.shared.set_producer_state(ProducerState::Decoding);
        let reason = self.decode_loop();
        self.shared.set_producer_state(ProducerState::Stopping);

        let Producer {
            source,
            writer,
            shared,
            cursor,
            ..
        } = self;
        shared.set_state(StreamState::Stopped);
        writer.close();
        drop(source);
        shared.set_producer_state(ProducerState::Stopped);

        info!(frames = cursor, ?reason, "Decode loop finished");
        reason
    }

    fn decode_loop(&mut self) -> ExitReason {
        let capacity = self.shared.pool.capacity() as u64;

        loop {
            if let Err(reason) = self.wait_for_slot(capacity) {
                return reason;
            }

            let target = (self.cursor % capacity) as SlotId;
            let frame = self.cursor + 1;
            let outcome = {
                let mut buffer = self.shared.pool.get_mut(target);
                let source = &mut self.source;
                // A panicking source ends the stream with an error, not the process
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    source.grab_and_decode_into(&mut buffer)
                }))
                .unwrap_or_else(|_| Err(DecodeError::Panicked { frame }));
                if let Ok(Decoded::Frame) = outcome {
                    buffer.sequence = self.cursor;
                }
                outcome
            };

            match outcome {
                Ok(Decoded::Frame) => {}
                Ok(Decoded::EndOfStream) => {
                    debug!(frames = self.cursor, "Source reached end of stream");
                    return ExitReason::EndOfStream;
                }
                Err(err) => {
                    warn!(frame, "Decode failed: {}", err);
                    self.shared.record_error(err);
                    return ExitReason::DecodeFailed;
                }
            }

            self.cursor += 1;
            self.shared.set_produced(self.cursor);
            self.shared.stats.frame_decoded();

            if let Err(reason) = self.publish(target) {
                return reason;
            }
            trace!(slot = target, cursor = self.cursor, "Published frame");

            // Stop is checked after the in-progress frame is published
            if self.shared.stop_requested() {
                debug!(frames = self.cursor, "Stop requested");
                return ExitReason::StopRequested;
            }
        }
    }

    /// Wait until the next slot is free: fewer than `capacity` frames are
    /// published-but-unreleased and the ring has room.
    fn wait_for_slot(&self, capacity: u64) -> Result<(), ExitReason> {
        let backoff = Backoff::new();
        let mut waited = false;

        loop {
            self.check_running()?;

            let in_flight = self.cursor - self.shared.released();
            if in_flight < capacity && !self.writer.is_full() {
                return Ok(());
            }

            if !waited {
                waited = true;
                self.shared.stats.backpressure_wait();
                trace!(in_flight, capacity, "Ring full, waiting for reader");
            }
            self.pause(&backoff);
        }
    }

    fn publish(&self, slot: SlotId) -> Result<(), ExitReason> {
        let backoff = Backoff::new();
        while !self.writer.try_push(slot) {
            self.check_running()?;
            self.pause(&backoff);
        }
        Ok(())
    }

    fn check_running(&self) -> Result<(), ExitReason> {
        if self.writer.is_abandoned() {
            return Err(ExitReason::ReaderGone);
        }
        if self.shared.stop_requested() {
            debug!(frames = self.cursor, "Stop requested while waiting for a slot");
            return Err(ExitReason::StopRequested);
        }
        Ok(())
    }

    fn pause(&self, backoff: &Backoff) {
        if backoff.is_completed() {
            thread::sleep(self.poll_interval);
        } else {
            backoff.snooze();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{PixelFormat, TestPattern};
    use crate::pipeline::pool::BufferPool;
    use crate::pipeline::ringbuf::{slot_ring, SlotReader};

    fn setup(
        capacity: usize,
        source: TestPattern,
    ) -> (Producer<TestPattern>, SlotReader, Arc<Shared>) {
        let pool = BufferPool::allocate(capacity, 4, 4, PixelFormat::Rgb24).unwrap();
        let shared = Arc::new(Shared::new(pool));
        let (writer, reader) = slot_ring(capacity);
        let producer = Producer::new(
            SourceGuard::new(source),
            writer,
            shared.clone(),
            Duration::from_millis(1),
        );
        (producer, reader, shared)
    }

    #[test]
    fn test_round_robin_until_end_of_stream() {
        let (producer, reader, shared) = setup(4, TestPattern::new(4, 4, 3));

        assert_eq!(producer.run(), ExitReason::EndOfStream);
        assert_eq!(shared.produced(), 3);
        assert_eq!(shared.state(), StreamState::Stopped);
        assert_eq!(shared.producer_state(), ProducerState::Stopped);

        let slots: Vec<_> = std::iter::from_fn(|| reader.pop_blocking()).collect();
        assert_eq!(slots, vec![0, 1, 2]);
        assert_eq!(TestPattern::frame_number(shared.pool.get(2).as_slice()), Some(3));
        assert_eq!(shared.pool.get(2).sequence(), 2);
    }

    #[test]
    fn test_decode_failure_is_recorded() {
        let (producer, reader, shared) = setup(4, TestPattern::new(4, 4, 10).fail_at(2));

        assert_eq!(producer.run(), ExitReason::DecodeFailed);
        assert_eq!(reader.pop_blocking(), Some(0));
        assert_eq!(reader.pop_blocking(), None);
        assert!(shared.take_error().is_some());
        assert!(shared.take_error().is_none());
    }

    #[test]
    fn test_source_panic_becomes_decode_error() {
        let (producer, reader, shared) = setup(4, TestPattern::new(4, 4, 10).panic_at(3));

        assert_eq!(producer.run(), ExitReason::DecodeFailed);
        assert_eq!(shared.state(), StreamState::Stopped);
        assert_eq!(reader.pop_blocking(), Some(0));
        assert_eq!(reader.pop_blocking(), Some(1));
        assert_eq!(reader.pop_blocking(), None);

        let err = shared.take_error().unwrap();
        assert!(matches!(*err, DecodeError::Panicked { frame: 3 }));
    }

    #[test]
    fn test_backpressure_bounds_decoding() {
        let (producer, reader, shared) = setup(2, TestPattern::new(4, 4, 100));
        let handle = thread::spawn(move || producer.run());

        thread::sleep(Duration::from_millis(50));
        assert_eq!(shared.produced(), 2);
        assert_eq!(reader.len(), 2);
        assert!(shared.stats.snapshot().backpressure_waits >= 1);

        shared.request_stop();
        assert_eq!(handle.join().unwrap(), ExitReason::StopRequested);
        assert_eq!(shared.produced(), 2);
    }

    #[test]
    fn test_popped_slot_is_not_reused_until_released() {
        let (producer, reader, shared) = setup(2, TestPattern::new(4, 4, 100));
        let handle = thread::spawn(move || producer.run());

        thread::sleep(Duration::from_millis(20));
        // Popped but not released: the producer must keep waiting
        assert_eq!(reader.pop_blocking(), Some(0));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(shared.produced(), 2);

        shared.release_one();
        assert_eq!(reader.pop_blocking(), Some(1));
        assert_eq!(reader.pop_blocking(), Some(0));
        assert_eq!(TestPattern::frame_number(shared.pool.get(0).as_slice()), Some(3));

        drop(reader);
        assert_eq!(handle.join().unwrap(), ExitReason::ReaderGone);
    }
}
