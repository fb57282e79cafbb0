//! Image-sequence source: a directory of JPEG files decoded to RGB24

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, trace};
use zune_jpeg::JpegDecoder;

use crate::capture::frame::{FrameBuffer, PixelFormat};
use crate::capture::source::{Decoded, FrameSource};
use crate::error::{DecodeError, OpenError};

pub struct JpegSequence {
    files: Vec<PathBuf>,
    next: usize,
    width: u32,
    height: u32,
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

fn probe_dimensions(path: &Path) -> Result<(u32, u32), OpenError> {
    let data = fs::read(path).map_err(|source| OpenError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = JpegDecoder::new(data.as_slice());
    decoder
        .decode_headers()
        .map_err(|e| OpenError::invalid(path, format!("{e:?}")))?;
    let (w, h) = decoder
        .dimensions()
        .ok_or_else(|| OpenError::invalid(path, "no dimensions in header"))?;

    let width = u32::try_from(w).map_err(|_| OpenError::invalid(path, "width too large"))?;
    let height = u32::try_from(h).map_err(|_| OpenError::invalid(path, "height too large"))?;
    Ok((width, height))
}

impl JpegSequence {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for JpegSequence {
    fn open(identifier: &str) -> Result<Self, OpenError> {
        let dir = PathBuf::from(identifier);
        let entries = fs::read_dir(&dir).map_err(|source| OpenError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| OpenError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && is_jpeg(&path) {
                files.push(path);
            }
        }
        files.sort();

        let first = files.first().ok_or_else(|| OpenError::Empty(dir.clone()))?;
        let (width, height) = probe_dimensions(first)?;
        info!(
            "Opened jpeg sequence {}: {} files, {}x{}",
            dir.display(),
            files.len(),
            width,
            height
        );

        Ok(Self {
            files,
            next: 0,
            width,
            height,
        })
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> PixelFormat {
        PixelFormat::Rgb24
    }

    fn grab_and_decode_into(&mut self, buffer: &mut FrameBuffer) -> Result<Decoded, DecodeError> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(Decoded::EndOfStream);
        };
        let frame = self.next as u64 + 1;

        let data = fs::read(path).map_err(|source| DecodeError::Io { frame, source })?;
        let mut decoder = JpegDecoder::new(data.as_slice());
        decoder.decode_headers().map_err(|e| DecodeError::Corrupt {
            frame,
            reason: format!("{e:?}"),
        })?;

        let got = decoder.output_buffer_size().unwrap_or(0);
        if got != buffer.len() {
            return Err(DecodeError::SizeMismatch {
                frame,
                expected: buffer.len(),
                got,
            });
        }

        decoder
            .decode_into(buffer.as_mut_slice())
            .map_err(|e| DecodeError::Corrupt {
                frame,
                reason: format!("{e:?}"),
            })?;

        trace!(frame, "Decoded {}", path.display());
        self.next += 1;
        Ok(Decoded::Frame)
    }
}
