//! YUV4MPEG2 file source, memory-mapped

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, info, instrument};

use crate::capture::frame::{FrameBuffer, PixelFormat};
use crate::capture::source::{Decoded, FrameSource};
use crate::error::{DecodeError, OpenError};

const SIGNATURE: &[u8] = b"YUV4MPEG2";
const FRAME_TAG: &[u8] = b"FRAME";

/// Stream header fields we care about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    width: u32,
    height: u32,
    format: PixelFormat,
    /// Offset of the first FRAME tag
    data_start: usize,
}

pub struct Y4mSource {
    path: PathBuf,
    map: Option<Mmap>,
    header: Header,
    offset: usize,
    frame: u64,
}

impl Y4mSource {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_header(data: &[u8]) -> Result<Header, String> {
    let end = data
        .iter()
        .position(|&b| b == b'\n')
        .ok_or("header is not terminated")?;
    let line = std::str::from_utf8(&data[..end]).map_err(|_| "header is not ascii")?;

    let mut tokens = line.split(' ');
    if tokens.next().map(str::as_bytes) != Some(SIGNATURE) {
        return Err("missing YUV4MPEG2 signature".into());
    }

    let mut width = None;
    let mut height = None;
    // 4:2:0 is the default when no C tag is present
    let mut format = PixelFormat::I420;

    for token in tokens.filter(|t| !t.is_empty()) {
        let mut chars = token.chars();
        let tag = chars.next();
        let value = chars.as_str();
        match tag {
            Some('W') => width = Some(value.parse::<u32>().map_err(|_| "bad width")?),
            Some('H') => height = Some(value.parse::<u32>().map_err(|_| "bad height")?),
            Some('C') => {
                format = match value {
                    "420" | "420jpeg" | "420paldv" | "420mpeg2" => PixelFormat::I420,
                    "444" => PixelFormat::Yuv444,
                    "mono" => PixelFormat::Gray8,
                    other => return Err(format!("unsupported colourspace C{other}")),
                }
            }
            // frame rate, interlacing, aspect and extensions don't affect layout
            _ => {}
        }
    }

    Ok(Header {
        width: width.ok_or("missing W tag")?,
        height: height.ok_or("missing H tag")?,
        format,
        data_start: end + 1,
    })
}

impl FrameSource for Y4mSource {
    #[instrument]
    fn open(identifier: &str) -> Result<Self, OpenError> {
        let path = PathBuf::from(identifier);
        let file = File::open(&path).map_err(|source| OpenError::Io {
            path: path.clone(),
            source,
        })?;

        // SAFETY: the map is read-only and the file is not expected to be
        // truncated while a stream reads it.
        let map = unsafe { Mmap::map(&file) }.map_err(|source| OpenError::Io {
            path: path.clone(),
            source,
        })?;

        let header = parse_header(&map).map_err(|reason| OpenError::invalid(&path, reason))?;
        info!(
            "Opened y4m source {}x{} {:?}",
            header.width, header.height, header.format
        );

        Ok(Self {
            path,
            offset: header.data_start,
            header,
            map: Some(map),
            frame: 0,
        })
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.header.width, self.header.height)
    }

    fn format(&self) -> PixelFormat {
        self.header.format
    }

    fn grab_and_decode_into(&mut self, buffer: &mut FrameBuffer) -> Result<Decoded, DecodeError> {
        let Some(map) = self.map.as_ref() else {
            return Ok(Decoded::EndOfStream);
        };
        let rest = &map[self.offset..];
        if rest.is_empty() {
            return Ok(Decoded::EndOfStream);
        }

        let frame = self.frame + 1;
        let corrupt = |reason: &str| DecodeError::Corrupt {
            frame,
            reason: reason.into(),
        };

        if !rest.starts_with(FRAME_TAG) {
            return Err(corrupt("missing FRAME tag"));
        }
        let header_len = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| corrupt("unterminated FRAME header"))?
            + 1;

        let expected = buffer.len();
        let payload = &rest[header_len..];
        if payload.len() < expected {
            return Err(DecodeError::SizeMismatch {
                frame,
                expected,
                got: payload.len(),
            });
        }

        buffer.as_mut_slice().copy_from_slice(&payload[..expected]);
        self.offset += header_len + expected;
        self.frame = frame;
        Ok(Decoded::Frame)
    }

    fn release(&mut self) {
        if self.map.take().is_some() {
            debug!(frames = self.frame, "Unmapped {}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir()
            .join(format!("framefetch-{}-{name}.y4m", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_parse_header() {
        let header = parse_header(b"YUV4MPEG2 W4 H2 F30:1 Ip A1:1 C444\nFRAME\n").unwrap();
        assert_eq!(header.width, 4);
        assert_eq!(header.height, 2);
        assert_eq!(header.format, PixelFormat::Yuv444);
        assert_eq!(header.data_start, 35);

        let header = parse_header(b"YUV4MPEG2 W4 H2\n").unwrap();
        assert_eq!(header.format, PixelFormat::I420);

        assert!(parse_header(b"YUV4MPEG2 W4 H2 C422\n").is_err());
        assert!(parse_header(b"YUV4MPEG2 H2\n").is_err());
        assert!(parse_header(b"RIFF W4 H2\n").is_err());
    }

    #[test]
    fn test_reads_frames_in_order() {
        let mut contents = b"YUV4MPEG2 W2 H2 F25:1 Cmono\n".to_vec();
        for n in 1..=3u8 {
            contents.extend_from_slice(b"FRAME\n");
            contents.extend_from_slice(&[n; 4]);
        }
        let path = write_fixture("mono", &contents);

        let mut source = Y4mSource::open(path.to_str().unwrap()).unwrap();
        assert_eq!(source.dimensions(), (2, 2));
        assert_eq!(source.format(), PixelFormat::Gray8);

        let mut buf = FrameBuffer::new(2, 2, PixelFormat::Gray8).unwrap();
        for n in 1..=3u8 {
            assert_eq!(source.grab_and_decode_into(&mut buf).unwrap(), Decoded::Frame);
            assert_eq!(buf.as_slice(), &[n; 4]);
        }
        assert_eq!(
            source.grab_and_decode_into(&mut buf).unwrap(),
            Decoded::EndOfStream
        );

        source.release();
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_truncated_frame_is_a_decode_error() {
        let mut contents = b"YUV4MPEG2 W2 H2 C420jpeg\nFRAME\n".to_vec();
        contents.extend_from_slice(&[0; 6]);
        contents.extend_from_slice(b"FRAME Ixyz\n");
        contents.extend_from_slice(&[0; 3]);
        let path = write_fixture("truncated", &contents);

        let mut source = Y4mSource::open(path.to_str().unwrap()).unwrap();
        let mut buf = FrameBuffer::new(2, 2, PixelFormat::I420).unwrap();

        assert_eq!(source.grab_and_decode_into(&mut buf).unwrap(), Decoded::Frame);
        let err = source.grab_and_decode_into(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::SizeMismatch {
                frame: 2,
                expected: 6,
                got: 3
            }
        ));

        drop(source);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let err = Y4mSource::open("/nonexistent/clip.y4m").err().unwrap();
        assert!(matches!(err, OpenError::Io { .. }));
    }
}
