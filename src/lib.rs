//! Bounded-lookahead frame prefetching.
//!
//! A background thread decodes frames from a sequential [`FrameSource`]
//! into a fixed pool of reusable buffers and hands them to the reader in
//! order through a bounded ring of slot ids.

pub mod capture;
pub mod error;
pub mod pipeline;
pub mod utils;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use capture::{FrameBuffer, FrameSource, PixelFormat};
pub use error::{AllocationError, BuildError, DecodeError, OpenError, StreamError};
pub use pipeline::{FrameView, ProducerState, StopHandle, Stream, StreamState, StreamStats};

/// Default number of frames decoded ahead
pub const DEFAULT_CAPACITY: usize = 128;

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub prefetch: PrefetchConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Y4m,
    JpegSequence,
    /// Identifier is `WIDTHxHEIGHT:FRAMES[:fail=N]`
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Pool size, ring capacity and lookahead depth
    pub capacity: usize,
    /// Sleep between fullness checks once spinning gives up
    pub backpressure_poll_ms: u64,
    pub thread_name: String,
    /// Pin the decode thread to this core
    pub pin_core: Option<usize>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Synthetic,
            path: "640x480:300".into(),
        }
    }
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            backpressure_poll_ms: 1,
            thread_name: "framefetch-decode".into(),
            pin_core: None,
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then `FRAMEFETCH_*`
    /// environment variables (`FRAMEFETCH_PREFETCH__CAPACITY=16`).
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder
            .add_source(
                config::Environment::with_prefix("FRAMEFETCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
