//! Framefetch driver: drains a source through the prefetch stream

use std::path::PathBuf;
use std::time::Instant;

use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};

use framefetch::capture::{JpegSequence, TestPattern, Y4mSource};
use framefetch::{utils, Config, FrameSource, SourceKind, Stream};

/// Runs on a blocking thread: reads block and dropping the stream joins
/// the decode thread.
fn drain<S: FrameSource>(config: &Config) -> Result<()> {
    let mut stream = Stream::<S>::open(&config.source.path, config.prefetch.clone())?;
    let (width, height) = stream.dimensions();
    info!(
        "Streaming {} ({}x{} {:?}), lookahead {}",
        config.source.path,
        width,
        height,
        stream.format(),
        stream.capacity()
    );

    stream.start()?;
    let started = Instant::now();
    let mut frames = 0u64;
    let mut checksum = 0u64;

    loop {
        match stream.read_next() {
            Ok(frame) => {
                frames += 1;
                checksum = checksum.wrapping_add(frame.data().iter().map(|&b| b as u64).sum());
            }
            Err(e) if e.is_end_of_stream() => break,
            Err(e) => {
                warn!("Stream ended with error after {} frames", frames);
                return Err(eyre!(e));
            }
        }
    }

    let elapsed = started.elapsed();
    let stats = stream.stats();
    info!(
        frames,
        checksum,
        backpressure_waits = stats.backpressure_waits,
        "Drained in {:.2?} ({:.1} fps)",
        elapsed,
        frames as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    utils::init_tracing("framefetch=info");

    info!("Framefetch launching...");

    // Load configuration
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(path.as_deref())?;

    tokio::task::spawn_blocking(move || match config.source.kind {
        SourceKind::Y4m => drain::<Y4mSource>(&config),
        SourceKind::JpegSequence => drain::<JpegSequence>(&config),
        SourceKind::Synthetic => drain::<TestPattern>(&config),
    })
    .await??;

    info!("Framefetch shutting down");
    Ok(())
}
