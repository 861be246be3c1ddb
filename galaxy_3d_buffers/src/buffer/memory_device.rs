/// In-memory BufferDevice
///
/// Backend objects are plain host allocations. Every call is recorded so the
/// traffic a buffer generates can be inspected. A few knobs simulate driver
/// behavior: failing allocations, misaligned map pointers and an active
/// stream-output capture.

use std::ptr::NonNull;
use bytemuck::{Pod, Zeroable};
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::buffer::dirty_ranges::DirtyRange;
use crate::buffer::device::{
    BufferBarrier, BufferDevice, BindingTarget, DeviceCaps, MemoryPreference, ObjectAllocation,
    ObjectDesc, ObjectHandle, ObjectUsage, TransferDst, TransferSrc,
};
use crate::buffer::flags::MapFlags;
use crate::{engine_bail, engine_error, engine_warn};

const SOURCE: &str = "galaxy3d::MemoryDevice";

/// 16 byte aligned storage unit, so map pointers honor the resource alignment
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, align(16))]
struct Block([u8; 16]);

const BLOCK_SIZE: usize = std::mem::size_of::<Block>();

struct MemoryObject {
    desc: ObjectDesc,
    blocks: Vec<Block>,
    mapped: bool,
}

impl MemoryObject {
    fn new(desc: ObjectDesc) -> Self {
        // One spare block lets a misaligned map still cover the whole object
        let blocks = (desc.size as usize + BLOCK_SIZE).div_ceil(BLOCK_SIZE);
        Self {
            desc,
            blocks: vec![Block::zeroed(); blocks],
            mapped: false,
        }
    }

    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<Block, u8>(&self.blocks)[..self.desc.size as usize]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let size = self.desc.size as usize;
        &mut bytemuck::cast_slice_mut::<Block, u8>(&mut self.blocks)[..size]
    }
}

/// Transfer endpoint as recorded in the command log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Host,
    Object(ObjectHandle),
}

/// One recorded device call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    Create { handle: ObjectHandle, desc: ObjectDesc },
    Destroy(ObjectHandle),
    Transfer {
        dst: Endpoint,
        src: Endpoint,
        ranges: Vec<DirtyRange>,
        flags: MapFlags,
    },
    Map { handle: ObjectHandle, flags: MapFlags },
    Unmap { handle: ObjectHandle, ranges: Vec<DirtyRange> },
    Barrier(BufferBarrier),
    EndStreamOutput,
}

/// Host memory implementation of `BufferDevice`
pub struct MemoryDevice {
    caps: DeviceCaps,
    objects: FxHashMap<ObjectHandle, MemoryObject>,
    next_handle: u64,
    commands: Vec<DeviceCommand>,
    fail_allocations: bool,
    misaligned_maps: bool,
    stream_output: Option<ObjectHandle>,
}

impl MemoryDevice {
    pub fn new(caps: DeviceCaps) -> Self {
        Self {
            caps,
            objects: FxHashMap::default(),
            next_handle: 1,
            commands: Vec::new(),
            fail_allocations: false,
            misaligned_maps: false,
            stream_output: None,
        }
    }

    // ===== KNOBS =====

    /// Make every `create_object` fail with `OutOfMemory`
    pub fn set_fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    /// Return map pointers one byte past an aligned address
    pub fn set_misaligned_maps(&mut self, misaligned: bool) {
        self.misaligned_maps = misaligned;
    }

    /// Pretend `handle` is captured by an active stream-output
    pub fn begin_stream_output(&mut self, handle: ObjectHandle) {
        self.stream_output = Some(handle);
    }

    // ===== INSPECTION =====

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of live objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn contains_object(&self, handle: ObjectHandle) -> bool {
        self.objects.contains_key(&handle)
    }

    /// Current content of an object
    pub fn object_bytes(&self, handle: ObjectHandle) -> Option<&[u8]> {
        self.objects.get(&handle).map(|o| o.bytes())
    }

    pub fn object_desc(&self, handle: ObjectHandle) -> Option<&ObjectDesc> {
        self.objects.get(&handle).map(|o| &o.desc)
    }

    pub fn is_mapped(&self, handle: ObjectHandle) -> bool {
        self.objects.get(&handle).is_some_and(|o| o.mapped)
    }

    /// Barriers recorded so far
    pub fn barriers(&self) -> Vec<BufferBarrier> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::Barrier(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    /// Allocate a standalone upload object filled with `data`
    pub fn create_upload_object(&mut self, data: &[u8]) -> Result<ObjectAllocation> {
        let allocation = self.create_object(&ObjectDesc {
            size: data.len() as u64,
            binding: BindingTarget::Generic,
            usage: ObjectUsage::TRANSFER_SRC,
            memory: MemoryPreference::HOST_VISIBLE,
            dynamic: true,
            coherent: true,
        })?;
        if let Some(object) = self.objects.get_mut(&allocation.handle) {
            object.bytes_mut().copy_from_slice(data);
        }
        Ok(allocation)
    }

    fn read_range(&self, src: &TransferSrc<'_>, range: &DirtyRange) -> Result<Vec<u8>> {
        let (bytes, base) = match src {
            TransferSrc::Host(data) => (*data, 0),
            TransferSrc::Object { handle, offset } => match self.objects.get(handle) {
                Some(object) => (object.bytes(), *offset),
                None => engine_bail!(SOURCE, "Transfer from unknown object {:?}", handle),
            },
        };
        let start = (base + range.offset) as usize;
        let end = start + range.size as usize;
        match bytes.get(start..end) {
            Some(slice) => Ok(slice.to_vec()),
            None => engine_bail!(SOURCE, "Transfer source range {}..{} out of bounds", start, end),
        }
    }
}

impl BufferDevice for MemoryDevice {
    fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    fn create_object(&mut self, desc: &ObjectDesc) -> Result<ObjectAllocation> {
        if self.fail_allocations {
            engine_error!(SOURCE, "Failed to allocate a {} byte object", desc.size);
            return Err(Error::OutOfMemory);
        }

        let handle = ObjectHandle(self.next_handle);
        self.next_handle += 1;
        self.objects.insert(handle, MemoryObject::new(desc.clone()));
        self.commands.push(DeviceCommand::Create { handle, desc: desc.clone() });

        Ok(ObjectAllocation { handle, offset: 0 })
    }

    fn destroy_object(&mut self, handle: ObjectHandle) {
        if self.objects.remove(&handle).is_none() {
            engine_warn!(SOURCE, "Destroying unknown object {:?}", handle);
        }
        if self.stream_output == Some(handle) {
            self.stream_output = None;
        }
        self.commands.push(DeviceCommand::Destroy(handle));
    }

    fn transfer(
        &mut self,
        dst: TransferDst<'_>,
        src: TransferSrc<'_>,
        ranges: &[DirtyRange],
        flags: MapFlags,
    ) -> Result<()> {
        let src_endpoint = match &src {
            TransferSrc::Host(_) => Endpoint::Host,
            TransferSrc::Object { handle, .. } => Endpoint::Object(*handle),
        };

        // Staged per range, source and destination may be the same object
        let staged = ranges
            .iter()
            .map(|range| self.read_range(&src, range))
            .collect::<Result<Vec<_>>>()?;

        let dst_endpoint = match dst {
            TransferDst::Host(data) => {
                for (range, bytes) in ranges.iter().zip(&staged) {
                    let start = range.offset as usize;
                    match data.get_mut(start..start + bytes.len()) {
                        Some(slice) => slice.copy_from_slice(bytes),
                        None => engine_bail!(SOURCE, "Transfer destination range out of bounds"),
                    }
                }
                Endpoint::Host
            }
            TransferDst::Object { handle, offset } => {
                let Some(object) = self.objects.get_mut(&handle) else {
                    engine_bail!(SOURCE, "Transfer to unknown object {:?}", handle);
                };
                let data = object.bytes_mut();
                for (range, bytes) in ranges.iter().zip(&staged) {
                    let start = (offset + range.offset) as usize;
                    match data.get_mut(start..start + bytes.len()) {
                        Some(slice) => slice.copy_from_slice(bytes),
                        None => engine_bail!(SOURCE, "Transfer destination range out of bounds"),
                    }
                }
                Endpoint::Object(handle)
            }
        };

        self.commands.push(DeviceCommand::Transfer {
            dst: dst_endpoint,
            src: src_endpoint,
            ranges: ranges.to_vec(),
            flags,
        });
        Ok(())
    }

    fn map_object(
        &mut self,
        handle: ObjectHandle,
        offset: u64,
        size: u64,
        flags: MapFlags,
    ) -> Result<NonNull<u8>> {
        let shift = usize::from(self.misaligned_maps);
        let Some(object) = self.objects.get_mut(&handle) else {
            engine_bail!(SOURCE, "Mapping unknown object {:?}", handle);
        };
        if offset + size > object.desc.size {
            engine_bail!(SOURCE, InvalidArgument => "Map range {}+{} exceeds object size {}",
                offset, size, object.desc.size);
        }

        object.mapped = true;
        let base = object.blocks.as_mut_ptr().cast::<u8>();
        let ptr = NonNull::new(base.wrapping_add(offset as usize + shift))
            .ok_or_else(|| Error::BackendError("Null mapping".to_string()))?;

        self.commands.push(DeviceCommand::Map { handle, flags });
        Ok(ptr)
    }

    fn unmap_object(&mut self, handle: ObjectHandle, ranges: &[DirtyRange]) {
        match self.objects.get_mut(&handle) {
            Some(object) => object.mapped = false,
            None => engine_warn!(SOURCE, "Unmapping unknown object {:?}", handle),
        }
        self.commands.push(DeviceCommand::Unmap { handle, ranges: ranges.to_vec() });
    }

    fn pipeline_barrier(&mut self, barrier: &BufferBarrier) {
        self.commands.push(DeviceCommand::Barrier(*barrier));
    }

    fn stream_output_active(&self, handle: ObjectHandle) -> bool {
        self.stream_output == Some(handle)
    }

    fn end_stream_output(&mut self) {
        self.stream_output = None;
        self.commands.push(DeviceCommand::EndStreamOutput);
    }
}

#[cfg(test)]
#[path = "memory_device_tests.rs"]
mod tests;
