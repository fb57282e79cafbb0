//! Preallocated decode targets addressed by slot id

use std::mem;
use std::ops::Deref;

use parking_lot::{Mutex, MutexGuard};
use tracing::info;

use crate::capture::frame::{FrameBuffer, PixelFormat};
use crate::error::AllocationError;

/// Index of a buffer inside the pool, in `0..capacity`
pub type SlotId = usize;

/// Fixed set of frame buffers. Nothing is allocated after construction.
///
/// Each slot sits behind its own lock. Slot hand-off is governed by the
/// ring and the release counter, so these locks are never contended in
/// normal operation; they only make the aliasing rules checkable.
pub struct BufferPool {
    slots: Box<[Mutex<FrameBuffer>]>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

/// Read-only access to one slot
pub struct SlotRef<'a>(MutexGuard<'a, FrameBuffer>);

impl Deref for SlotRef<'_> {
    type Target = FrameBuffer;

    fn deref(&self) -> &FrameBuffer {
        &self.0
    }
}

impl BufferPool {
    pub fn allocate(
        count: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, AllocationError> {
        if count == 0 {
            return Err(AllocationError::ZeroCapacity);
        }
        if width == 0 || height == 0 {
            return Err(AllocationError::InvalidDimensions { width, height });
        }
        let frame_bytes = format
            .frame_size(width, height)
            .ok_or(AllocationError::Overflow { width, height })?;

        info!(
            count,
            frame_bytes,
            total_mb = count.saturating_mul(frame_bytes) as f64 / (1024.0 * 1024.0),
            "Allocating buffer pool {}x{} {:?}",
            width,
            height,
            format
        );

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(count)
            .map_err(|_| AllocationError::OutOfMemory {
                slot: 0,
                bytes: count.saturating_mul(mem::size_of::<Mutex<FrameBuffer>>()),
            })?;
        for slot in 0..count {
            let buffer = FrameBuffer::new(width, height, format).map_err(|e| match e {
                AllocationError::OutOfMemory { bytes, .. } => {
                    AllocationError::OutOfMemory { slot, bytes }
                }
                other => other,
            })?;
            slots.push(Mutex::new(buffer));
        }

        Ok(Self {
            slots: slots.into_boxed_slice(),
            width,
            height,
            format,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Exclusive access for the producer while it decodes.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    pub fn get_mut(&self, slot: SlotId) -> MutexGuard<'_, FrameBuffer> {
        self.slots[slot].lock()
    }

    /// Read-only view for the consumer.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    pub fn get(&self, slot: SlotId) -> SlotRef<'_> {
        SlotRef(self.slots[slot].lock())
    }
}
