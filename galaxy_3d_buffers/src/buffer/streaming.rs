/// Streaming ring for transient per-draw data
///
/// Wraps one dynamic buffer and hands out write regions at an advancing
/// cursor. Regions that fit after the cursor are written without overwriting
/// anything a previous draw may still read; a region that does not fit
/// discards the whole buffer and restarts at offset 0.

use crate::engine::Engine;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::buffer::device::BufferDevice;
use crate::buffer::flags::{Access, BindFlags, MapFlags, Usage};
use crate::buffer::resource::{BufferDesc, BufferMapping, BufferResource};
use crate::{engine_bail, engine_debug, engine_trace, engine_warn};

const SOURCE: &str = "galaxy3d::Streaming";

/// How a region may be written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// The region does not overlap anything handed out since the last discard
    NoOverwrite,
    /// The whole buffer was thrown away, the region starts at 0
    Discard,
}

impl WritePolicy {
    pub fn map_flags(&self) -> MapFlags {
        match self {
            WritePolicy::NoOverwrite => MapFlags::NO_OVERWRITE,
            WritePolicy::Discard => MapFlags::DISCARD,
        }
    }
}

/// One mapped region of the ring
#[derive(Debug, Clone, Copy)]
pub struct StreamingAllocation {
    /// Byte offset of the region inside the ring buffer
    pub position: u64,
    pub policy: WritePolicy,
    pub mapping: BufferMapping,
}

pub struct StreamingBuffer {
    buffer: Option<BufferResource>,
    bind_flags: BindFlags,
    position: u64,
    mapped: bool,
    config: EngineConfig,
}

impl StreamingBuffer {
    /// Empty ring; the buffer is created by the first `map`
    pub fn new(bind_flags: BindFlags) -> Self {
        Self::with_config(bind_flags, Engine::config())
    }

    pub fn with_config(bind_flags: BindFlags, config: EngineConfig) -> Self {
        Self {
            buffer: None,
            bind_flags,
            position: 0,
            mapped: false,
            config,
        }
    }

    /// Map `size` bytes aligned to `stride`
    ///
    /// A stride of 0 means no alignment. Every map must be followed by an
    /// `unmap` before the next one.
    pub fn map(&mut self, device: &mut dyn BufferDevice, size: u64, stride: u32) -> Result<StreamingAllocation> {
        if self.mapped {
            engine_bail!(SOURCE, InvalidArgument => "Streaming buffer is already mapped");
        }
        if size == 0 {
            engine_bail!(SOURCE, InvalidArgument => "Size 0 requested");
        }

        if self.capacity() < size {
            let new_size = self.config.streaming_min_size.max((self.capacity() * 2).max(size));
            self.grow(device, new_size)?;
        }

        let capacity = self.capacity();
        let stride = u64::from(stride.max(1));
        let mut position = self.position;
        position += (stride - position % stride) % stride;

        let policy = if position.checked_add(size).map_or(true, |end| end > capacity) {
            position = 0;
            WritePolicy::Discard
        } else {
            WritePolicy::NoOverwrite
        };

        let Some(buffer) = self.buffer.as_mut() else {
            engine_bail!(SOURCE, "Streaming buffer has no storage");
        };
        let mapping = buffer.map(device, position, size, MapFlags::WRITE | policy.map_flags())?;

        engine_trace!(SOURCE, "Mapped {} bytes at {} ({:?})", size, position, policy);
        self.position = position + size;
        self.mapped = true;
        Ok(StreamingAllocation { position, policy, mapping })
    }

    pub fn unmap(&mut self, device: &mut dyn BufferDevice) {
        if !self.mapped {
            engine_warn!(SOURCE, "Unmap called without a previous map call");
            return;
        }
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.unmap(device);
        }
        self.mapped = false;
    }

    /// Copy `data` into the ring and return its position
    pub fn upload(&mut self, device: &mut dyn BufferDevice, data: &[u8], stride: u32) -> Result<u64> {
        let allocation = self.map(device, data.len() as u64, stride)?;
        // SAFETY: the region covers data.len() bytes and stays mapped until unmap
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), allocation.mapping.as_ptr(), data.len());
        }
        self.unmap(device);
        Ok(allocation.position)
    }

    /// Replace the ring buffer with a bigger one
    fn grow(&mut self, device: &mut dyn BufferDevice, size: u64) -> Result<()> {
        engine_debug!(SOURCE, "Growing streaming buffer from {} to {} bytes", self.capacity(), size);

        let desc = BufferDesc {
            size,
            usage: Usage::DYNAMIC,
            bind_flags: self.bind_flags,
            access: Access::GPU | Access::MAP_W,
            structure_byte_stride: 0,
        };
        let buffer = BufferResource::create_with_config(device, &desc, None, self.config.clone())?;

        if let Some(previous) = self.buffer.replace(buffer) {
            previous.destroy(device);
        }
        self.position = 0;
        Ok(())
    }

    /// Size of the current ring buffer, 0 before the first map
    pub fn capacity(&self) -> u64 {
        self.buffer.as_ref().map_or(0, |b| b.size())
    }

    /// Cursor where the next region starts (before alignment)
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn bind_flags(&self) -> BindFlags {
        self.bind_flags
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn buffer(&self) -> Option<&BufferResource> {
        self.buffer.as_ref()
    }

    pub fn buffer_mut(&mut self) -> Option<&mut BufferResource> {
        self.buffer.as_mut()
    }

    pub fn destroy(mut self, device: &mut dyn BufferDevice) {
        if self.mapped {
            self.unmap(device);
        }
        if let Some(buffer) = self.buffer.take() {
            buffer.destroy(device);
        }
    }
}

#[cfg(test)]
#[path = "streaming_tests.rs"]
mod tests;
