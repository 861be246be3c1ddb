/// Vulkan implementation of the buffer device
///
/// Objects are plain `vk::Buffer`s backed by gpu-allocator allocations.
/// Host-visible allocations are persistently mapped by gpu-allocator and are
/// always HOST_COHERENT, so unmapping needs no flush. Device-local objects go
/// through temporary staging buffers and one-shot submissions.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use galaxy_3d_buffers::galaxy3d::{Error, Result};
use galaxy_3d_buffers::galaxy3d::buffer::{
    BufferBarrier, BufferDevice, DeviceCaps, DirtyRange, MapFlags, ObjectAllocation, ObjectDesc,
    ObjectHandle, TransferDst, TransferSrc,
};
use galaxy_3d_buffers::{engine_bail, engine_err, engine_error, engine_trace, engine_warn};
use rustc_hash::FxHashMap;
use std::ptr::NonNull;
use std::sync::Arc;
use crate::vulkan_context::{VulkanContext, SOURCE};
use crate::vulkan_flags::{access_to_vk, memory_location, stage_to_vk, usage_to_vk};

/// One Vulkan buffer and its memory
struct VulkanObject {
    buffer: vk::Buffer,
    /// Taken when the object is freed
    allocation: Option<Allocation>,
    size: u64,
}

impl VulkanObject {
    fn mapped_ptr(&self) -> Option<NonNull<u8>> {
        self.allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .map(|p| p.cast::<u8>())
    }
}

/// Buffer device backed by a Vulkan logical device
pub struct VulkanBufferDevice {
    context: Arc<VulkanContext>,
    caps: DeviceCaps,
    objects: FxHashMap<ObjectHandle, VulkanObject>,
    next_handle: u64,
    /// Object bound for the active transform feedback capture
    stream_output: Option<ObjectHandle>,
}

impl VulkanBufferDevice {
    /// Device with the capabilities of the modern backend
    pub fn new(context: Arc<VulkanContext>) -> Self {
        Self::with_caps(context, DeviceCaps::modern())
    }

    pub fn with_caps(context: Arc<VulkanContext>, caps: DeviceCaps) -> Self {
        Self {
            context,
            caps,
            objects: FxHashMap::default(),
            next_handle: 1,
            stream_output: None,
        }
    }

    pub fn context(&self) -> &Arc<VulkanContext> {
        &self.context
    }

    /// Vulkan buffer behind `handle`
    pub fn vk_buffer(&self, handle: ObjectHandle) -> Option<vk::Buffer> {
        self.objects.get(&handle).map(|o| o.buffer)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Mark `handle` as bound for transform feedback
    pub fn begin_stream_output(&mut self, handle: ObjectHandle) {
        self.stream_output = Some(handle);
    }

    fn object(&self, handle: ObjectHandle) -> Result<&VulkanObject> {
        match self.objects.get(&handle) {
            Some(object) => Ok(object),
            None => Err(engine_err!(SOURCE, "Unknown buffer object {:?}", handle)),
        }
    }

    /// Create, allocate and bind a Vulkan buffer
    fn allocate_buffer(
        &self,
        name: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<VulkanObject> {
        let device = &self.context.device;

        unsafe {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = device
                .create_buffer(&buffer_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create buffer: {:?}", e))?;

            let requirements = device.get_buffer_memory_requirements(buffer);

            let allocation = self
                .context
                .allocator
                .lock()
                .map_err(|_| engine_err!(SOURCE, "Allocator mutex poisoned"))
                .and_then(|mut allocator| {
                    allocator
                        .allocate(&AllocationCreateDesc {
                            name,
                            requirements,
                            location,
                            linear: true,
                            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                        })
                        .map_err(|e| {
                            engine_error!(SOURCE, "Failed to allocate {} bytes of buffer memory: {:?}", size, e);
                            Error::OutOfMemory
                        })
                });

            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            if let Err(e) = device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                let object = VulkanObject { buffer, allocation: Some(allocation), size };
                self.free_buffer(object);
                engine_bail!(SOURCE, "Failed to bind buffer memory: {:?}", e);
            }

            Ok(VulkanObject { buffer, allocation: Some(allocation), size })
        }
    }

    fn free_buffer(&self, mut object: VulkanObject) {
        if let Some(allocation) = object.allocation.take() {
            match self.context.allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        engine_warn!(SOURCE, "Failed to free buffer memory: {:?}", e);
                    }
                }
                Err(_) => engine_warn!(SOURCE, "Allocator mutex poisoned, leaking buffer memory"),
            }
        }
        unsafe {
            self.context.device.destroy_buffer(object.buffer, None);
        }
    }

    /// Host-visible scratch buffer for one transfer
    fn staging(&self, size: u64, location: MemoryLocation) -> Result<VulkanObject> {
        let usage = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
        self.allocate_buffer("Staging Buffer", size.max(1), usage, location)
    }

    fn copy_regions(&self, dst: vk::Buffer, src: vk::Buffer, regions: &[vk::BufferCopy]) -> Result<()> {
        if regions.is_empty() {
            return Ok(());
        }
        self.context.submit_one_shot(|device, command_buffer| unsafe {
            device.cmd_copy_buffer(command_buffer, src, dst, regions);
        })
    }

    fn write_object(&self, handle: ObjectHandle, base: u64, data: &[u8], ranges: &[DirtyRange]) -> Result<()> {
        let object = self.object(handle)?;
        for range in ranges {
            if range.offset + range.size > data.len() as u64 || base + range.offset + range.size > object.size {
                engine_bail!(SOURCE, InvalidArgument => "Transfer range {}+{} out of bounds", range.offset, range.size);
            }
        }

        if let Some(ptr) = object.mapped_ptr() {
            for range in ranges {
                // SAFETY: bounds checked above; the allocation is persistently mapped
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        data.as_ptr().add(range.offset as usize),
                        ptr.as_ptr().add((base + range.offset) as usize),
                        range.size as usize,
                    );
                }
            }
            return Ok(());
        }

        let total: u64 = ranges.iter().map(|r| r.size).sum();
        let staging = self.staging(total, MemoryLocation::CpuToGpu)?;
        let result = match staging.mapped_ptr() {
            Some(ptr) => {
                let mut regions = Vec::with_capacity(ranges.len());
                let mut packed = 0u64;
                for range in ranges {
                    // SAFETY: the staging buffer holds the sum of all range sizes
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            data.as_ptr().add(range.offset as usize),
                            ptr.as_ptr().add(packed as usize),
                            range.size as usize,
                        );
                    }
                    regions.push(vk::BufferCopy { src_offset: packed, dst_offset: base + range.offset, size: range.size });
                    packed += range.size;
                }
                self.copy_regions(object.buffer, staging.buffer, &regions)
            }
            None => Err(engine_err!(SOURCE, "Staging buffer is not host visible")),
        };
        self.free_buffer(staging);
        result
    }

    fn read_object(&self, handle: ObjectHandle, base: u64, data: &mut [u8], ranges: &[DirtyRange]) -> Result<()> {
        let object = self.object(handle)?;
        for range in ranges {
            if range.offset + range.size > data.len() as u64 || base + range.offset + range.size > object.size {
                engine_bail!(SOURCE, InvalidArgument => "Transfer range {}+{} out of bounds", range.offset, range.size);
            }
        }

        if let Some(ptr) = object.mapped_ptr() {
            for range in ranges {
                // SAFETY: bounds checked above; the allocation is persistently mapped
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        ptr.as_ptr().add((base + range.offset) as usize),
                        data.as_mut_ptr().add(range.offset as usize),
                        range.size as usize,
                    );
                }
            }
            return Ok(());
        }

        let total: u64 = ranges.iter().map(|r| r.size).sum();
        let staging = self.staging(total, MemoryLocation::GpuToCpu)?;
        let mut regions = Vec::with_capacity(ranges.len());
        let mut packed = 0u64;
        for range in ranges {
            regions.push(vk::BufferCopy { src_offset: base + range.offset, dst_offset: packed, size: range.size });
            packed += range.size;
        }

        let result = self.copy_regions(staging.buffer, object.buffer, &regions).and_then(|()| {
            let Some(ptr) = staging.mapped_ptr() else {
                engine_bail!(SOURCE, "Staging buffer is not host visible");
            };
            for (range, region) in ranges.iter().zip(&regions) {
                // SAFETY: the staging buffer holds the sum of all range sizes
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        ptr.as_ptr().add(region.dst_offset as usize),
                        data.as_mut_ptr().add(range.offset as usize),
                        range.size as usize,
                    );
                }
            }
            Ok(())
        });
        self.free_buffer(staging);
        result
    }

    fn copy_objects(
        &self,
        dst: ObjectHandle,
        dst_base: u64,
        src: ObjectHandle,
        src_base: u64,
        ranges: &[DirtyRange],
    ) -> Result<()> {
        let dst_object = self.object(dst)?;
        let src_object = self.object(src)?;
        for range in ranges {
            if src_base + range.offset + range.size > src_object.size
                || dst_base + range.offset + range.size > dst_object.size
            {
                engine_bail!(SOURCE, InvalidArgument => "Transfer range {}+{} out of bounds", range.offset, range.size);
            }
        }

        if dst != src {
            let regions: Vec<vk::BufferCopy> = ranges
                .iter()
                .map(|r| vk::BufferCopy { src_offset: src_base + r.offset, dst_offset: dst_base + r.offset, size: r.size })
                .collect();
            return self.copy_regions(dst_object.buffer, src_object.buffer, &regions);
        }

        // vkCmdCopyBuffer forbids overlapping regions within one buffer
        let total: u64 = ranges.iter().map(|r| r.size).sum();
        let staging = self.staging(total, MemoryLocation::GpuOnly)?;
        let mut to_staging = Vec::with_capacity(ranges.len());
        let mut from_staging = Vec::with_capacity(ranges.len());
        let mut packed = 0u64;
        for range in ranges {
            to_staging.push(vk::BufferCopy { src_offset: src_base + range.offset, dst_offset: packed, size: range.size });
            from_staging.push(vk::BufferCopy { src_offset: packed, dst_offset: dst_base + range.offset, size: range.size });
            packed += range.size;
        }

        let buffer = src_object.buffer;
        let staging_buffer = staging.buffer;
        let result = self.context.submit_one_shot(|device, command_buffer| unsafe {
            device.cmd_copy_buffer(command_buffer, buffer, staging_buffer, &to_staging);
            let barrier = vk::MemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::TRANSFER_READ);
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            );
            device.cmd_copy_buffer(command_buffer, staging_buffer, buffer, &from_staging);
        });
        self.free_buffer(staging);
        result
    }
}

impl BufferDevice for VulkanBufferDevice {
    fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    fn create_object(&mut self, desc: &ObjectDesc) -> Result<ObjectAllocation> {
        let location = memory_location(desc.memory);
        let object = self.allocate_buffer("Buffer Object", desc.size, usage_to_vk(desc.usage), location)?;

        let handle = ObjectHandle(self.next_handle);
        self.next_handle += 1;
        engine_trace!(SOURCE, "Created buffer object {:?} ({} bytes, {:?})", handle, desc.size, location);
        self.objects.insert(handle, object);

        Ok(ObjectAllocation { handle, offset: 0 })
    }

    fn destroy_object(&mut self, handle: ObjectHandle) {
        if self.stream_output == Some(handle) {
            self.stream_output = None;
        }
        match self.objects.remove(&handle) {
            Some(object) => {
                // The object may still be referenced by in-flight work
                let idle = unsafe { self.context.device.queue_wait_idle(self.context.queue) };
                report_idle_wait(handle, idle);
                self.free_buffer(object);
            }
            None => engine_warn!(SOURCE, "Destroying unknown object {:?}", handle),
        }
    }

    fn transfer(
        &mut self,
        dst: TransferDst<'_>,
        src: TransferSrc<'_>,
        ranges: &[DirtyRange],
        flags: MapFlags,
    ) -> Result<()> {
        engine_trace!(SOURCE, "Transfer of {} ranges ({:?})", ranges.len(), flags);
        match (dst, src) {
            (TransferDst::Object { handle, offset }, TransferSrc::Host(data)) => {
                self.write_object(handle, offset, data, ranges)
            }
            (TransferDst::Host(data), TransferSrc::Object { handle, offset }) => {
                self.read_object(handle, offset, data, ranges)
            }
            (
                TransferDst::Object { handle: dst, offset: dst_offset },
                TransferSrc::Object { handle: src, offset: src_offset },
            ) => self.copy_objects(dst, dst_offset, src, src_offset, ranges),
            (TransferDst::Host(dst), TransferSrc::Host(src)) => {
                for range in ranges {
                    let start = range.offset as usize;
                    let end = start + range.size as usize;
                    match (dst.get_mut(start..end), src.get(start..end)) {
                        (Some(d), Some(s)) => d.copy_from_slice(s),
                        _ => engine_bail!(SOURCE, InvalidArgument => "Transfer range {}+{} out of bounds",
                            range.offset, range.size),
                    }
                }
                Ok(())
            }
        }
    }

    fn map_object(
        &mut self,
        handle: ObjectHandle,
        offset: u64,
        size: u64,
        flags: MapFlags,
    ) -> Result<NonNull<u8>> {
        let object = self.object(handle)?;
        if offset + size > object.size {
            engine_bail!(SOURCE, InvalidArgument => "Map range {}+{} exceeds object size {}",
                offset, size, object.size);
        }
        let Some(ptr) = object.mapped_ptr() else {
            engine_bail!(SOURCE, "Buffer object {:?} is not host visible", handle);
        };

        if !flags.intersects(MapFlags::DISCARD | MapFlags::NO_OVERWRITE) {
            // Unsynchronized maps must not race the GPU
            unsafe {
                self.context
                    .device
                    .queue_wait_idle(self.context.queue)
                    .map_err(|e| engine_err!(SOURCE, "Failed to wait for queue idle: {:?}", e))?;
            }
        }

        // SAFETY: offset is inside the mapped allocation
        Ok(unsafe { NonNull::new_unchecked(ptr.as_ptr().add(offset as usize)) })
    }

    fn unmap_object(&mut self, handle: ObjectHandle, ranges: &[DirtyRange]) {
        if !self.objects.contains_key(&handle) {
            engine_warn!(SOURCE, "Unmapping unknown object {:?}", handle);
            return;
        }
        engine_trace!(SOURCE, "Unmapped {:?}, {} coherent ranges", handle, ranges.len());
    }

    fn pipeline_barrier(&mut self, barrier: &BufferBarrier) {
        let Some(object) = self.objects.get(&barrier.handle) else {
            engine_warn!(SOURCE, "Barrier on unknown object {:?}", barrier.handle);
            return;
        };

        let buffer_barrier = vk::BufferMemoryBarrier::default()
            .src_access_mask(access_to_vk(barrier.src_bind))
            .dst_access_mask(access_to_vk(barrier.dst_bind))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(object.buffer)
            .offset(barrier.offset)
            .size(barrier.size);
        let src_stage = stage_to_vk(barrier.src_bind);
        let dst_stage = stage_to_vk(barrier.dst_bind);

        let result = self.context.submit_one_shot(|device, command_buffer| unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[buffer_barrier],
                &[],
            );
        });
        if let Err(e) = result {
            engine_warn!(SOURCE, "Failed to record buffer barrier: {}", e);
        }
    }

    fn stream_output_active(&self, handle: ObjectHandle) -> bool {
        self.stream_output == Some(handle)
    }

    fn end_stream_output(&mut self) {
        engine_trace!(SOURCE, "Ending transform feedback");
        self.stream_output = None;
    }
}

impl Drop for VulkanBufferDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.context.device.device_wait_idle();
        }
        let objects: Vec<VulkanObject> = self.objects.drain().map(|(_, object)| object).collect();
        if !objects.is_empty() {
            engine_warn!(SOURCE, "Releasing {} buffer objects still alive", objects.len());
        }
        for object in objects {
            self.free_buffer(object);
        }
    }
}

/// Warn when the queue could not drain before an object is freed
fn report_idle_wait(handle: ObjectHandle, result: ash::prelude::VkResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            engine_warn!(SOURCE, "Queue wait before destroying {:?} failed: {:?}", handle, err);
            false
        }
    }
}

#[cfg(test)]
#[path = "vulkan_buffer_device_tests.rs"]
mod tests;
