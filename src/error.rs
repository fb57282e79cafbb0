//! Error types for sources, the buffer pool and the stream façade

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Source could not be opened. Not retried.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid source {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("no frames found in {0}")]
    Empty(PathBuf),
}

impl OpenError {
    pub(crate) fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("source reported invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("pool capacity must be positive")]
    ZeroCapacity,

    #[error("frame size overflows for {width}x{height}")]
    Overflow { width: u32, height: u32 },

    #[error("failed to allocate {bytes} bytes for slot {slot}")]
    OutOfMemory { slot: usize, bytes: usize },
}

/// Mid-stream decode failure. Terminal for the stream instance.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("i/o error while reading frame {frame}: {source}")]
    Io {
        frame: u64,
        #[source]
        source: io::Error,
    },

    #[error("corrupt frame {frame}: {reason}")]
    Corrupt { frame: u64, reason: String },

    #[error("frame {frame} is {got} bytes, buffer holds {expected}")]
    SizeMismatch {
        frame: u64,
        expected: usize,
        got: usize,
    },

    #[error("source panicked while decoding frame {frame}")]
    Panicked { frame: u64 },
}

/// Errors raised while building a [`Stream`](crate::Stream).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// Errors returned by the stream façade.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream already started")]
    AlreadyStarted,

    #[error("stream was never started")]
    NotStarted,

    #[error("end of stream")]
    EndOfStream,

    #[error("decode failed: {0}")]
    Decode(Arc<DecodeError>),

    #[error("failed to spawn decode thread: {0}")]
    Spawn(#[source] io::Error),
}

impl From<DecodeError> for StreamError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(Arc::new(err))
    }
}

impl StreamError {
    /// Clean finish, as opposed to a failure.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}
