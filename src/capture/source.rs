//! Decode collaborator surface consumed by the prefetch pipeline

use std::ops::{Deref, DerefMut};

use crate::capture::frame::{FrameBuffer, PixelFormat};
use crate::error::{DecodeError, OpenError};

/// Outcome of a single grab+decode call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Frame,
    EndOfStream,
}

/// A sequential media source that decodes one frame at a time into a
/// caller-provided buffer.
pub trait FrameSource: Send + 'static {
    /// Open a source by identifier (usually a path).
    fn open(identifier: &str) -> Result<Self, OpenError>
    where
        Self: Sized;

    /// Frame dimensions. Queried once, before buffers are allocated.
    fn dimensions(&self) -> (u32, u32);

    /// Layout the buffers must be allocated in.
    fn format(&self) -> PixelFormat;

    /// Grab the next unit of media and decode it into `buffer`.
    fn grab_and_decode_into(&mut self, buffer: &mut FrameBuffer) -> Result<Decoded, DecodeError>;

    /// Release the underlying handle. Called exactly once.
    fn release(&mut self) {}
}

/// Owns a source and releases it on every exit path.
pub(crate) struct SourceGuard<S: FrameSource> {
    source: S,
}

impl<S: FrameSource> SourceGuard<S> {
    pub(crate) fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: FrameSource> Deref for SourceGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.source
    }
}

impl<S: FrameSource> DerefMut for SourceGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: FrameSource> Drop for SourceGuard<S> {
    fn drop(&mut self) {
        tracing::debug!("Releasing frame source");
        self.source.release();
    }
}
