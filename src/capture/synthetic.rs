//! Synthetic source that generates numbered frames without any I/O

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::capture::frame::{FrameBuffer, PixelFormat};
use crate::capture::source::{Decoded, FrameSource};
use crate::error::{DecodeError, OpenError};

/// Produces `frames` frames, numbered from 1. Each frame is filled with
/// its number's low byte and carries the full number little-endian in
/// its first 8 bytes.
#[derive(Debug, Clone)]
pub struct TestPattern {
    width: u32,
    height: u32,
    format: PixelFormat,
    frames: u64,
    emitted: u64,
    fail_at: Option<u64>,
    panic_at: Option<u64>,
    decode_delay: Option<Duration>,
    released: Option<Arc<AtomicBool>>,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, frames: u64) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgb24,
            frames,
            emitted: 0,
            fail_at: None,
            panic_at: None,
            decode_delay: None,
            released: None,
        }
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Fail decoding of frame number `frame` (1-based).
    pub fn fail_at(mut self, frame: u64) -> Self {
        self.fail_at = Some(frame);
        self
    }

    /// Panic inside the decode of frame number `frame` (1-based).
    pub fn panic_at(mut self, frame: u64) -> Self {
        self.panic_at = Some(frame);
        self
    }

    /// Sleep this long inside every decode call.
    pub fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = Some(delay);
        self
    }

    /// Flag set when the source is released.
    pub fn with_release_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.released = Some(flag);
        self
    }

    /// Number of decode calls that produced a frame.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Frame number stamped into a buffer by this source.
    pub fn frame_number(data: &[u8]) -> Option<u64> {
        let head: [u8; 8] = data.get(..8)?.try_into().ok()?;
        Some(u64::from_le_bytes(head))
    }
}

impl FrameSource for TestPattern {
    /// Identifier form: `WIDTHxHEIGHT:FRAMES[:fail=N]`, e.g. `64x48:10`.
    fn open(identifier: &str) -> Result<Self, OpenError> {
        let bad = |reason: &str| OpenError::invalid(identifier, reason);

        let mut parts = identifier.split(':');
        let dims = parts.next().ok_or_else(|| bad("missing dimensions"))?;
        let (w, h) = dims
            .split_once('x')
            .ok_or_else(|| bad("dimensions must be WIDTHxHEIGHT"))?;
        let width = w.parse().map_err(|_| bad("bad width"))?;
        let height = h.parse().map_err(|_| bad("bad height"))?;
        let frames = parts
            .next()
            .ok_or_else(|| bad("missing frame count"))?
            .parse()
            .map_err(|_| bad("bad frame count"))?;

        let mut pattern = Self::new(width, height, frames);
        for opt in parts {
            match opt.split_once('=') {
                Some(("fail", n)) => {
                    let frame = n.parse().map_err(|_| bad("bad fail frame"))?;
                    pattern = pattern.fail_at(frame);
                }
                _ => return Err(bad("unknown option")),
            }
        }
        Ok(pattern)
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn grab_and_decode_into(&mut self, buffer: &mut FrameBuffer) -> Result<Decoded, DecodeError> {
        if self.emitted >= self.frames {
            return Ok(Decoded::EndOfStream);
        }
        if let Some(delay) = self.decode_delay {
            std::thread::sleep(delay);
        }

        let number = self.emitted + 1;
        if self.panic_at == Some(number) {
            panic!("test pattern panicked on frame {number}");
        }
        if self.fail_at == Some(number) {
            return Err(DecodeError::Corrupt {
                frame: number,
                reason: "injected failure".into(),
            });
        }

        let data = buffer.as_mut_slice();
        data.fill(number as u8);
        let stamp = number.to_le_bytes();
        let n = stamp.len().min(data.len());
        data[..n].copy_from_slice(&stamp[..n]);

        self.emitted = number;
        trace!(frame = number, "Generated test frame");
        Ok(Decoded::Frame)
    }

    fn release(&mut self) {
        if let Some(flag) = &self.released {
            flag.store(true, Ordering::SeqCst);
        }
    }
}
