use serde::{Deserialize, Serialize};

use crate::error::AllocationError;

/// Pixel layouts a decode target can be allocated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Gray8,
    /// Planar 4:2:0, Y then U then V, chroma planes rounded up
    I420,
    /// Planar 4:4:4
    Yuv444,
}

impl PixelFormat {
    /// Bytes needed for one `width` x `height` frame, `None` on overflow.
    pub fn frame_size(self, width: u32, height: u32) -> Option<usize> {
        let w = width as usize;
        let h = height as usize;
        let luma = w.checked_mul(h)?;
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 | PixelFormat::Yuv444 => luma.checked_mul(3),
            PixelFormat::Gray8 => Some(luma),
            PixelFormat::I420 => {
                let chroma = w.div_ceil(2).checked_mul(h.div_ceil(2))?;
                luma.checked_add(chroma.checked_mul(2)?)
            }
        }
    }
}

/// Preallocated decode target. Size is fixed for its whole life.
#[derive(Debug)]
pub struct FrameBuffer {
    data: Box<[u8]>,
    width: u32,
    height: u32,
    format: PixelFormat,
    /// Frame number of the last decode written here
    pub(crate) sequence: u64,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self, AllocationError> {
        if width == 0 || height == 0 {
            return Err(AllocationError::InvalidDimensions { width, height });
        }
        let size = format
            .frame_size(width, height)
            .ok_or(AllocationError::Overflow { width, height })?;

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| AllocationError::OutOfMemory { slot: 0, bytes: size })?;
        data.resize(size, 0);

        Ok(Self {
            data: data.into_boxed_slice(),
            width,
            height,
            format,
            sequence: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Decoders write in place; the length never changes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes() {
        assert_eq!(PixelFormat::Rgb24.frame_size(4, 2), Some(24));
        assert_eq!(PixelFormat::Gray8.frame_size(4, 2), Some(8));
        assert_eq!(PixelFormat::I420.frame_size(4, 2), Some(8 + 2 * 2));
        // odd dimensions round chroma up
        assert_eq!(PixelFormat::I420.frame_size(3, 3), Some(9 + 2 * 4));
        assert_eq!(PixelFormat::Rgb24.frame_size(u32::MAX, u32::MAX), None);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let err = FrameBuffer::new(0, 10, PixelFormat::Rgb24).unwrap_err();
        assert!(matches!(
            err,
            AllocationError::InvalidDimensions { width: 0, height: 10 }
        ));
    }

    #[test]
    fn test_buffer_is_zeroed_and_sized() {
        let buf = FrameBuffer::new(8, 4, PixelFormat::Bgr24).unwrap();
        assert_eq!(buf.len(), 96);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
        assert_eq!(buf.format(), PixelFormat::Bgr24);
    }
}
