/// Buffer resource - location coherency engine
///
/// A buffer's bytes may live in a host mirror (`SYSMEM`), in a backend object
/// (`GPU_OBJECT`), or nowhere yet (`DISCARDED` / `CLEARED`). The `locations`
/// bitmask records which copies are current. Copies are brought up to date
/// lazily by `ensure_location`; writes invalidate the other copies and record
/// dirty ranges so only modified bytes travel to the GPU object.
///
/// Loading a location is a copy, it leaves the source valid. Only writes (map
/// with WRITE, copies, updates) invalidate other locations.
///
/// Every operation runs on the thread that owns the device; nothing here is
/// synchronized.

use std::ptr::NonNull;
use crate::engine::Engine;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::buffer::backend::BackendOps;
use crate::buffer::conversion::{
    convert_vertices, ConversionMap, FixupFlags, Hysteresis, HysteresisAction, VertexConversion,
};
use crate::buffer::state::{BufferCore, SOURCE};
use crate::buffer::device::{
    BackendKind, BindingTarget, BufferDevice, ObjectAllocation, ObjectHandle, TransferDst, TransferSrc,
};
use crate::buffer::dirty_ranges::DirtyRange;
use crate::buffer::flags::{Access, BindFlags, Location, MapFlags, Usage};
use crate::buffer::object::{BufferObject, ObjectUser, ObjectView};
use crate::buffer::vertex::{BufferId, DrawState, VertexFormat};
use crate::{engine_bail, engine_debug, engine_error, engine_trace, engine_warn};

/// Creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub access: Access,
    /// Element size of structured buffers, 0 otherwise
    pub structure_byte_stride: u32,
}

impl BufferDesc {
    /// GPU-only buffer with no usage hints
    pub fn new(size: u64, bind_flags: BindFlags) -> Self {
        Self {
            size,
            usage: Usage::empty(),
            bind_flags,
            access: Access::GPU,
            structure_byte_stride: 0,
        }
    }
}

/// Where the authoritative bytes of a buffer live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAddress {
    Object { handle: ObjectHandle, offset: u64 },
    /// The host mirror, see `BufferResource::sysmem`
    Host,
}

/// Pointer handed out by `BufferResource::map`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferMapping {
    ptr: NonNull<u8>,
    len: usize,
}

impl BufferMapping {
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the mapped bytes
    ///
    /// # Safety
    ///
    /// The buffer must stay mapped and untouched by any other operation while
    /// the slice is alive.
    pub unsafe fn as_mut_slice<'a>(&self) -> &'a mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len)
    }
}

/// Staging object passed to `update_sub_resource`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadObject {
    pub allocation: ObjectAllocation,
    /// The object replaces the buffer's own object instead of being copied
    pub rename_on_unmap: bool,
    /// The object is currently mapped and must be flushed
    pub mapped: bool,
}

/// Description of the single sub-resource of a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubResourceDesc {
    pub format: VertexFormat,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub access: Access,
    pub width: u64,
    pub height: u32,
    pub depth: u32,
    pub size: u64,
}

/// A linear GPU-bindable buffer
pub struct BufferResource {
    core: BufferCore,
    ops: BackendOps,
    conversion: VertexConversion,
    hysteresis: Hysteresis,
}

impl BufferResource {
    // ===== CREATION =====

    /// Create a buffer with the current engine configuration
    pub fn create(
        device: &mut dyn BufferDevice,
        desc: &BufferDesc,
        data: Option<&[u8]>,
    ) -> Result<Self> {
        Self::create_with_config(device, desc, data, Engine::config())
    }

    /// Create a buffer with an explicit configuration
    pub fn create_with_config(
        device: &mut dyn BufferDevice,
        desc: &BufferDesc,
        data: Option<&[u8]>,
        config: EngineConfig,
    ) -> Result<Self> {
        if desc.size == 0 {
            engine_bail!(SOURCE, InvalidArgument => "Size 0 requested");
        }
        if desc.bind_flags.contains(BindFlags::CONSTANT_BUFFER)
            && desc.size % config.constant_buffer_alignment.max(1) != 0
        {
            engine_bail!(SOURCE, InvalidArgument =>
                "Size {:#x} is not suitably aligned for constant buffers", desc.size);
        }
        if let Some(data) = data {
            if (data.len() as u64) < desc.size {
                engine_bail!(SOURCE, InvalidArgument =>
                    "Initial data holds {} bytes, {} needed", data.len(), desc.size);
            }
        }

        let mut desc = desc.clone();
        if desc.bind_flags.contains(BindFlags::CONSTANT_BUFFER) && config.cb_access_map_w {
            desc.access |= Access::MAP_W;
        }

        let (ops, use_bo) = BackendOps::negotiate(device.caps(), &desc)?;
        let hysteresis = Hysteresis::new(config.hysteresis);
        let pin = config.software_vertex_processing || desc.usage.contains(Usage::MANAGED);
        let mut core = BufferCore::new(&desc, use_bo, config);

        // Managed and software-processed buffers keep their data across discards
        if pin {
            engine_trace!(SOURCE, "Pinning system memory for buffer {}", core.id.raw());
            core.pin_sysmem = true;
            core.locations = Location::SYSMEM;
        }
        if (core.locations.contains(Location::SYSMEM) || !use_bo) && !core.prepare_sysmem() {
            return Err(Error::OutOfMemory);
        }

        engine_debug!(SOURCE, "Created buffer {} ({} bytes, {:?}, use_bo {})",
            core.id.raw(), core.size, ops.kind(), use_bo);

        let mut resource = Self {
            core,
            ops,
            conversion: VertexConversion::new(),
            hysteresis,
        };

        if let Some(data) = data {
            if let Err(err) = resource.init_data(device, &data[..desc.size as usize]) {
                resource.destroy(device);
                return Err(err);
            }
        }

        Ok(resource)
    }

    fn init_data(&mut self, device: &mut dyn BufferDevice, data: &[u8]) -> Result<()> {
        if self.core.use_bo {
            return self.update_from_host(device, 0, data);
        }

        let Some(heap) = self.core.heap.as_mut() else {
            engine_bail!(SOURCE, "Buffer {} has no system memory", self.core.id.raw());
        };
        heap.copy_from_slice(data);
        self.core.validate_location(Location::SYSMEM);
        self.core.invalidate_location(Location::all() - Location::SYSMEM);
        Ok(())
    }

    // ===== LOCATION COHERENCY =====

    /// Bring `location` up to date
    ///
    /// `location` must be `SYSMEM` or `GPU_OBJECT`. On failure the locations
    /// are left as they were.
    pub fn ensure_location(&mut self, device: &mut dyn BufferDevice, location: Location) -> Result<()> {
        if !location.is_single_real() {
            engine_bail!(SOURCE, UnsupportedLocation =>
                "Cannot load {:?} for buffer {}", location, self.core.id.raw());
        }
        if self.core.locations.contains(location) {
            return Ok(());
        }
        if self.core.locations.is_empty() {
            engine_error!(SOURCE, "Buffer {} does not have any up to date location", self.core.id.raw());
            self.core.validate_location(Location::DISCARDED);
        }

        engine_trace!(SOURCE, "Loading {:?} for buffer {}, current locations {:?}",
            location, self.core.id.raw(), self.core.locations);

        let backed = location == Location::SYSMEM || self.core.use_bo;
        if !self.ops.prepare_location(&mut self.core, device, location) {
            return Err(if backed {
                Error::OutOfMemory
            } else {
                Error::UnsupportedLocation(format!("{:?} is not available for buffer {}",
                    location, self.core.id.raw()))
            });
        }

        if self.core.locations.contains(Location::DISCARDED) {
            engine_trace!(SOURCE, "Buffer {} previously discarded, nothing to copy", self.core.id.raw());
            self.core.validate_location(location);
            self.core.invalidate_location(Location::DISCARDED);
            return Ok(());
        }

        if location == Location::SYSMEM {
            self.load_sysmem_copy(device)?;
        } else {
            self.load_object_copy(device)?;
        }

        self.core.validate_location(location);
        if location == Location::GPU_OBJECT
            && self.core.heap.is_some()
            && !self.core.usage.contains(Usage::DYNAMIC)
        {
            self.core.evict_sysmem();
        }
        Ok(())
    }

    fn load_sysmem_copy(&mut self, device: &mut dyn BufferDevice) -> Result<()> {
        let core = &mut self.core;
        let Some(heap) = core.heap.as_mut() else {
            engine_bail!(SOURCE, "Buffer {} has no system memory", core.id.raw());
        };
        if core.locations.contains(Location::CLEARED) {
            heap.fill(0);
            return Ok(());
        }

        let source = core.object.as_ref().filter(|_| core.locations.contains(Location::GPU_OBJECT));
        let Some(object) = source else {
            engine_bail!(SOURCE, "No valid copy to load system memory of buffer {} from", core.id.raw());
        };
        device.transfer(
            TransferDst::Host(heap),
            TransferSrc::Object { handle: object.handle(), offset: object.offset() },
            &[DirtyRange::new(0, core.size)],
            MapFlags::WRITE,
        )
    }

    fn load_object_copy(&mut self, device: &mut dyn BufferDevice) -> Result<()> {
        if self.core.locations.contains(Location::CLEARED) {
            if !self.ops.prepare_location(&mut self.core, device, Location::SYSMEM) {
                return Err(Error::OutOfMemory);
            }
            if let Some(heap) = self.core.heap.as_mut() {
                heap.fill(0);
            }
        }

        if self.conversion.is_active() {
            return self.conversion_upload(device);
        }

        let core = &self.core;
        let (Some(heap), Some(object)) = (core.heap.as_ref(), core.object.as_ref()) else {
            engine_bail!(SOURCE, "Buffer {} has no source to upload from", core.id.raw());
        };
        let mut flags = MapFlags::WRITE;
        if core.dirty.is_fully_dirty() {
            flags |= MapFlags::DISCARD;
        }
        device.transfer(
            TransferDst::Object { handle: object.handle(), offset: object.offset() },
            TransferSrc::Host(heap),
            core.dirty.ranges(),
            flags,
        )
    }

    /// Upload the dirty ranges through the conversion map
    fn conversion_upload(&mut self, device: &mut dyn BufferDevice) -> Result<()> {
        self.ensure_location(device, Location::SYSMEM)?;
        self.core.pin_sysmem = true;

        let core = &self.core;
        let (Some(map), Some(heap), Some(object)) =
            (self.conversion.map(), core.heap.as_ref(), core.object.as_ref())
        else {
            engine_bail!(SOURCE, "Buffer {} cannot be converted", core.id.raw());
        };

        let mut scratch = Vec::new();
        if scratch.try_reserve_exact(heap.len()).is_err() {
            engine_error!(SOURCE, "Out of memory converting buffer {}", core.id.raw());
            return Err(Error::OutOfMemory);
        }
        scratch.extend_from_slice(heap);
        convert_vertices(map, &mut scratch, core.dirty.ranges());

        device.transfer(
            TransferDst::Object { handle: object.handle(), offset: object.offset() },
            TransferSrc::Host(&scratch),
            core.dirty.ranges(),
            MapFlags::WRITE,
        )
    }

    /// Mark `location` up to date without copying
    pub fn validate_location(&mut self, location: Location) {
        self.core.validate_location(location);
    }

    /// Mark the locations in `mask` stale for `(offset, size)`
    ///
    /// `size == 0` at offset 0 means the whole buffer.
    pub fn invalidate_range(&mut self, mask: Location, offset: u64, size: u64) {
        self.core.invalidate_range(mask, offset, size);
    }

    pub fn invalidate_location(&mut self, mask: Location) {
        self.core.invalidate_location(mask);
    }

    /// Location and address of the authoritative copy
    ///
    /// Sentinel states are materialized first, in the GPU object when one is
    /// used, in system memory otherwise. The GPU object wins when both are valid.
    pub fn authoritative_memory(&mut self, device: &mut dyn BufferDevice) -> Result<(Location, BufferAddress)> {
        if self.core.locations.intersects(Location::SENTINEL) {
            let target = if self.core.use_bo { Location::GPU_OBJECT } else { Location::SYSMEM };
            if let Err(err) = self.ensure_location(device, target) {
                // Object creation may have failed and disabled object usage
                if target == Location::GPU_OBJECT && !self.core.use_bo {
                    self.ensure_location(device, Location::SYSMEM)?;
                } else {
                    return Err(err);
                }
            }
        }

        let locations = self.core.locations;
        // The object holds converted vertices, sysmem the application's bytes
        if self.conversion.is_active() && locations.contains(Location::SYSMEM) && self.core.heap.is_some() {
            return Ok((Location::SYSMEM, BufferAddress::Host));
        }
        if locations.contains(Location::GPU_OBJECT) {
            if let Some(object) = self.core.object.as_ref() {
                return Ok((
                    Location::GPU_OBJECT,
                    BufferAddress::Object { handle: object.handle(), offset: object.offset() },
                ));
            }
        }
        if locations.contains(Location::SYSMEM) && self.core.heap.is_some() {
            return Ok((Location::SYSMEM, BufferAddress::Host));
        }

        engine_bail!(SOURCE, "Unexpected locations {:?} for buffer {}", locations, self.core.id.raw())
    }

    /// Authoritative bytes, read back through the device when they live in the GPU object
    pub fn read_bytes(&mut self, device: &mut dyn BufferDevice) -> Result<Vec<u8>> {
        let (_, address) = self.authoritative_memory(device)?;
        match address {
            BufferAddress::Host => match self.core.heap.as_ref() {
                Some(heap) => Ok(heap.clone()),
                None => engine_bail!(SOURCE, "Buffer {} has no system memory", self.core.id.raw()),
            },
            BufferAddress::Object { handle, offset } => {
                let mut bytes = vec![0u8; self.core.size as usize];
                device.transfer(
                    TransferDst::Host(&mut bytes),
                    TransferSrc::Object { handle, offset },
                    &[DirtyRange::new(0, self.core.size)],
                    MapFlags::WRITE,
                )?;
                Ok(bytes)
            }
        }
    }

    /// Load and pin the host mirror
    pub fn load_sysmem(&mut self, device: &mut dyn BufferDevice) -> Result<&[u8]> {
        self.ensure_location(device, Location::SYSMEM)?;
        self.core.pin_sysmem = true;
        match self.core.heap.as_deref() {
            Some(heap) => Ok(heap),
            None => engine_bail!(SOURCE, "Buffer {} has no system memory", self.core.id.raw()),
        }
    }

    // ===== MAP / UNMAP =====

    /// Map `size` bytes at `offset`
    ///
    /// Maps nest; only the last `unmap` flushes. DISCARD dirties the whole
    /// buffer whatever the range.
    pub fn map(
        &mut self,
        device: &mut dyn BufferDevice,
        offset: u64,
        size: u64,
        flags: MapFlags,
    ) -> Result<BufferMapping> {
        if offset > self.core.size || size > self.core.size - offset {
            engine_bail!(SOURCE, InvalidArgument =>
                "Map range {}+{} outside buffer {} of {} bytes", offset, size, self.core.id.raw(), self.core.size);
        }

        self.core.map_count += 1;
        match self.map_locations(device, offset, size, flags) {
            Ok(mapping) => Ok(mapping),
            Err(err) => {
                self.core.map_count -= 1;
                Err(err)
            }
        }
    }

    fn map_locations(
        &mut self,
        device: &mut dyn BufferDevice,
        offset: u64,
        size: u64,
        flags: MapFlags,
    ) -> Result<BufferMapping> {
        let write = flags.contains(MapFlags::WRITE);
        let discard = flags.contains(MapFlags::DISCARD);
        let (dirty_offset, dirty_size) = if discard { (0, 0) } else { (offset, size) };

        let sysmem_path = (write && !flags.intersects(MapFlags::NO_OVERWRITE | MapFlags::DISCARD))
            || (!write && self.core.locations.contains(Location::SYSMEM))
            || self.core.pin_sysmem
            || !self.core.use_bo;

        if sysmem_path {
            self.ensure_location(device, Location::SYSMEM)?;
            if write {
                self.core.invalidate_range(Location::all() - Location::SYSMEM, dirty_offset, dirty_size);
            }
        } else {
            if discard {
                if !self.ops.prepare_location(&mut self.core, device, Location::GPU_OBJECT) {
                    return Err(Error::OutOfMemory);
                }
                self.core.validate_location(Location::GPU_OBJECT);
            } else {
                self.ensure_location(device, Location::GPU_OBJECT)?;
            }

            if write {
                self.core.invalidate_location(Location::all() - Location::GPU_OBJECT);
                self.core.dirty.invalidate(dirty_offset, dirty_size);
            }
            if discard && self.core.heap.is_some() {
                self.core.evict_sysmem();
            }
            if self.core.map_count == 1 {
                self.map_object(device, flags, dirty_offset, dirty_size)?;
            }
        }

        let base = match self.core.map_ptr {
            Some(ptr) => Some(ptr),
            None => self.core.heap.as_mut().and_then(|heap| NonNull::new(heap.as_mut_ptr())),
        };
        let Some(base) = base else {
            engine_bail!(SOURCE, "Buffer {} has no memory to map", self.core.id.raw());
        };
        let ptr = NonNull::new(base.as_ptr().wrapping_add(offset as usize))
            .ok_or_else(|| Error::BackendError("Null mapping".to_string()))?;

        engine_trace!(SOURCE, "Returning memory at {:p} (base {:p}, offset {})", ptr, base, offset);
        Ok(BufferMapping { ptr, len: size as usize })
    }

    /// Map the GPU object itself, falling back when the pointer is misaligned
    fn map_object(
        &mut self,
        device: &mut dyn BufferDevice,
        flags: MapFlags,
        dirty_offset: u64,
        dirty_size: u64,
    ) -> Result<()> {
        let Some((handle, offset)) = self.core.object.as_ref().map(|o| (o.handle(), o.offset())) else {
            engine_bail!(SOURCE, "Buffer {} has no object to map", self.core.id.raw());
        };
        let ptr = device.map_object(handle, offset, self.core.size, flags)?;

        let alignment = self.core.config.resource_alignment.max(1);
        if (ptr.as_ptr() as usize as u64) % alignment == 0 {
            self.core.map_ptr = Some(ptr);
            return Ok(());
        }

        engine_warn!(SOURCE, "Pointer {:p} is not {} byte aligned", ptr, alignment);
        device.unmap_object(handle, &[]);
        self.core.map_ptr = None;

        if self.core.usage.contains(Usage::DYNAMIC) {
            // The extra copy costs more than not using an object at all
            engine_warn!(SOURCE, "Dynamic buffer {}, dropping GPU object", self.core.id.raw());
            self.drop_gpu_object(device);
        } else {
            engine_warn!(SOURCE, "Falling back to double-buffered operation for buffer {}", self.core.id.raw());
            self.ensure_location(device, Location::SYSMEM)?;
            self.core.pin_sysmem = true;
            if flags.contains(MapFlags::WRITE) {
                self.core.invalidate_range(Location::all() - Location::SYSMEM, dirty_offset, dirty_size);
            }
        }
        Ok(())
    }

    /// Release one map; the last one flushes the recorded ranges
    pub fn unmap(&mut self, device: &mut dyn BufferDevice) {
        if self.core.map_count == 0 {
            engine_warn!(SOURCE, "Unmap called without a previous map call");
            return;
        }

        self.core.map_count -= 1;
        if self.core.map_count > 0 {
            engine_trace!(SOURCE, "Ignoring unmap, {} maps outstanding", self.core.map_count);
            return;
        }

        if self.core.map_ptr.take().is_none() {
            return;
        }
        if let Some(object) = self.core.object.as_ref() {
            device.unmap_object(object.handle(), self.core.dirty.ranges());
        }
        self.core.dirty.clear();
    }

    /// Map, copy `data` at `offset` and unmap
    pub fn write(
        &mut self,
        device: &mut dyn BufferDevice,
        offset: u64,
        data: &[u8],
        flags: MapFlags,
    ) -> Result<()> {
        let mapping = self.map(device, offset, data.len() as u64, flags | MapFlags::WRITE)?;
        // SAFETY: the mapping covers data.len() bytes and nothing else runs until unmap
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapping.as_ptr(), data.len());
        }
        self.unmap(device);
        Ok(())
    }

    /// Map for reading and copy `size` bytes out
    pub fn read(&mut self, device: &mut dyn BufferDevice, offset: u64, size: u64) -> Result<Vec<u8>> {
        let mapping = self.map(device, offset, size, MapFlags::READ)?;
        let mut bytes = vec![0u8; mapping.len()];
        // SAFETY: the mapping covers size bytes and nothing else runs until unmap
        unsafe {
            std::ptr::copy_nonoverlapping(mapping.as_ptr(), bytes.as_mut_ptr(), bytes.len());
        }
        self.unmap(device);
        Ok(bytes)
    }

    // ===== COPIES =====

    fn check_range(&self, offset: u64, size: u64) -> Result<()> {
        if offset > self.core.size || size > self.core.size - offset {
            engine_bail!(SOURCE, InvalidArgument =>
                "Range {}+{} outside buffer {} of {} bytes", offset, size, self.core.id.raw(), self.core.size);
        }
        Ok(())
    }

    /// Copy `size` bytes from `src` into the authoritative copy at `dst_offset`
    ///
    /// The other locations are invalidated for the written range.
    pub fn copy_from_address(
        &mut self,
        device: &mut dyn BufferDevice,
        dst_offset: u64,
        src: TransferSrc<'_>,
        size: u64,
    ) -> Result<()> {
        self.check_range(dst_offset, size)?;

        let mut flags = MapFlags::WRITE;
        if dst_offset == 0 && size == self.core.size {
            flags |= MapFlags::DISCARD;
        }

        let (dst_location, dst_address) = self.authoritative_memory(device)?;
        let range = [DirtyRange::new(0, size)];
        match dst_address {
            BufferAddress::Object { handle, offset } => {
                device.transfer(
                    TransferDst::Object { handle, offset: offset + dst_offset },
                    src,
                    &range,
                    flags,
                )?;
            }
            BufferAddress::Host => {
                let Some(heap) = self.core.heap.as_mut() else {
                    engine_bail!(SOURCE, "Buffer {} has no system memory", self.core.id.raw());
                };
                let start = dst_offset as usize;
                device.transfer(TransferDst::Host(&mut heap[start..start + size as usize]), src, &range, flags)?;
            }
        }

        self.core.invalidate_range(Location::all() - dst_location, dst_offset, size);
        Ok(())
    }

    /// Upload host bytes at `offset`
    pub fn update_from_host(&mut self, device: &mut dyn BufferDevice, offset: u64, data: &[u8]) -> Result<()> {
        self.copy_from_address(device, offset, TransferSrc::Host(data), data.len() as u64)
    }

    /// Copy `size` bytes from another buffer
    pub fn copy_from(
        &mut self,
        device: &mut dyn BufferDevice,
        dst_offset: u64,
        src: &mut BufferResource,
        src_offset: u64,
        size: u64,
    ) -> Result<()> {
        self.check_range(dst_offset, size)?;
        src.check_range(src_offset, size)?;

        let (_, src_address) = src.authoritative_memory(device)?;
        let source = match src_address {
            BufferAddress::Object { handle, offset } => TransferSrc::Object { handle, offset: offset + src_offset },
            BufferAddress::Host => match src.core.heap.as_deref() {
                Some(heap) => TransferSrc::Host(&heap[src_offset as usize..(src_offset + size) as usize]),
                None => engine_bail!(SOURCE, "Buffer {} has no system memory", src.core.id.raw()),
            },
        };
        self.copy_from_address(device, dst_offset, source, size)
    }

    /// Copy `size` bytes inside this buffer; ranges may overlap
    pub fn copy_within(
        &mut self,
        device: &mut dyn BufferDevice,
        dst_offset: u64,
        src_offset: u64,
        size: u64,
    ) -> Result<()> {
        self.check_range(dst_offset, size)?;
        self.check_range(src_offset, size)?;

        let (location, address) = self.authoritative_memory(device)?;
        match address {
            BufferAddress::Object { handle, offset } => {
                device.transfer(
                    TransferDst::Object { handle, offset: offset + dst_offset },
                    TransferSrc::Object { handle, offset: offset + src_offset },
                    &[DirtyRange::new(0, size)],
                    MapFlags::WRITE,
                )?;
            }
            BufferAddress::Host => {
                let Some(heap) = self.core.heap.as_mut() else {
                    engine_bail!(SOURCE, "Buffer {} has no system memory", self.core.id.raw());
                };
                let src = src_offset as usize;
                heap.copy_within(src..src + size as usize, dst_offset as usize);
            }
        }

        self.core.invalidate_range(Location::all() - location, dst_offset, size);
        Ok(())
    }

    /// Update `(offset, size)` from a staging object
    pub fn update_sub_resource(
        &mut self,
        device: &mut dyn BufferDevice,
        upload: &UploadObject,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        self.check_range(offset, size)?;

        if upload.rename_on_unmap {
            self.set_object(device, upload.allocation);
            self.core.validate_location(Location::GPU_OBJECT);
            self.core.invalidate_location(Location::all() - Location::GPU_OBJECT);
        }

        let handle = upload.allocation.handle;
        if self.core.object.as_ref().is_some_and(|o| o.handle() == handle) {
            // Unmapping flushes the written range
            if upload.mapped {
                device.unmap_object(handle, &[DirtyRange::new(offset, size)]);
            }
            return Ok(());
        }

        self.copy_from_address(
            device,
            offset,
            TransferSrc::Object { handle, offset: upload.allocation.offset },
            size,
        )
    }

    // ===== OBJECT LIFECYCLE =====

    /// Replace the backend object (rename)
    ///
    /// Users of the previous object are invalidated and move to the new one
    /// before the previous object is destroyed.
    pub fn set_object(&mut self, device: &mut dyn BufferDevice, allocation: ObjectAllocation) {
        let mut object = BufferObject::new(allocation, self.core.size);
        match self.core.object.take() {
            Some(mut previous) => {
                engine_trace!(SOURCE, "Renaming buffer {} from {:?} to {:?}",
                    self.core.id.raw(), previous.handle(), allocation.handle);
                previous.transfer_users_to(&mut object);
                device.destroy_object(previous.handle());
            }
            None => object.register(&self.core.bo_user),
        }
        if let BackendOps::Modern(ops) = &mut self.ops {
            ops.reset_barrier();
        }
        self.core.object = Some(object);
    }

    /// Add `user` to the current object's user registry
    pub fn register_user(&mut self, user: &ObjectUser) -> bool {
        match self.core.object.as_mut() {
            Some(object) => {
                object.register(user);
                true
            }
            None => false,
        }
    }

    pub fn unregister_user(&mut self, user: &ObjectUser) {
        if let Some(object) = self.core.object.as_mut() {
            object.unregister(user);
        }
    }

    /// Move the content to system memory and release the GPU object
    pub fn unload(&mut self, device: &mut dyn BufferDevice) {
        if self.core.object.is_none() {
            return;
        }

        if let Err(err) = self.ensure_location(device, Location::SYSMEM) {
            engine_error!(SOURCE, "Failed to save buffer {} before unloading: {}", self.core.id.raw(), err);
        }
        self.core.invalidate_location(Location::GPU_OBJECT);
        self.ops.unload_location(&mut self.core, device, Location::GPU_OBJECT);
        self.core.dirty.clear();
        self.conversion.reset();
    }

    /// Stop using a GPU object for good
    pub fn drop_gpu_object(&mut self, device: &mut dyn BufferDevice) {
        self.core.use_bo = false;
        self.unload(device);
    }

    /// Release backend storage
    pub fn destroy(mut self, device: &mut dyn BufferDevice) {
        engine_debug!(SOURCE, "Destroying buffer {}", self.core.id.raw());
        if self.core.map_ptr.take().is_some() {
            if let Some(object) = self.core.object.as_ref() {
                device.unmap_object(object.handle(), &[]);
            }
        }
        self.ops.unload_location(&mut self.core, device, Location::GPU_OBJECT);
    }

    // ===== DRAW =====

    /// Make the GPU object current for a draw, re-analyzing the vertex layout
    ///
    /// `state` is `None` outside of draws (preload).
    pub fn load_for_draw(&mut self, device: &mut dyn BufferDevice, state: Option<&DrawState>) {
        if self.core.map_count > 0 && self.core.map_ptr.is_some() {
            engine_warn!(SOURCE, "Buffer {} is mapped through its object, not loading", self.core.id.raw());
            return;
        } else if self.core.map_count > 0 {
            engine_warn!(SOURCE, "Loading mapped buffer {}", self.core.id.raw());
        }

        if !self.core.use_bo {
            return;
        }
        if !self.ops.prepare_location(&mut self.core, device, Location::GPU_OBJECT) {
            engine_error!(SOURCE, "Failed to prepare the object of buffer {}", self.core.id.raw());
            return;
        }

        let mut decl_changed = false;
        if let Some(state) = state {
            let mut fixup = FixupFlags::empty();
            if !state.use_vertex_shader {
                let caps = device.caps();
                if !caps.vertex_bgra && !caps.ffp_generic_attributes {
                    fixup |= FixupFlags::COLOR;
                }
                if !caps.xyzrhw {
                    fixup |= FixupFlags::POSITION;
                }
            }
            decl_changed = self.conversion.find_declaration(
                self.core.id,
                &state.stream_info,
                fixup,
                self.core.usage.contains(Usage::STATIC_DECL),
            );
        }

        if !decl_changed && !self.core.dirty.is_dirty() {
            self.hysteresis.count_draw();
            return;
        }

        if decl_changed {
            let action = self.hysteresis.declaration_changed();
            let converting_dynamic = self.conversion.is_active() && self.core.usage.contains(Usage::DYNAMIC);
            if action == HysteresisAction::DropGpuObject || converting_dynamic {
                engine_warn!(SOURCE,
                    "Too many declaration changes or converting dynamic buffer {}, stopping converting",
                    self.core.id.raw());
                self.drop_gpu_object(device);
                return;
            }

            // The map changed, reload the whole buffer
            engine_debug!(SOURCE, "Reloading buffer {} because of a vertex declaration change", self.core.id.raw());
            if let Err(err) = self.ensure_location(device, Location::SYSMEM) {
                engine_error!(SOURCE, "Failed to load system memory of buffer {}: {}", self.core.id.raw(), err);
                return;
            }
            self.core.invalidate_range(Location::GPU_OBJECT, 0, 0);
        } else if self.conversion.is_active() && self.core.dirty.is_fully_dirty() {
            if self.hysteresis.full_conversion() == HysteresisAction::DropGpuObject {
                engine_warn!(SOURCE, "Too many full conversions of buffer {}, stopping converting",
                    self.core.id.raw());
                self.drop_gpu_object(device);
                return;
            }
        } else {
            self.hysteresis.count_draw();
        }

        if let Err(err) = self.ensure_location(device, Location::GPU_OBJECT) {
            engine_error!(SOURCE, "Failed to load the object of buffer {}: {}", self.core.id.raw(), err);
        }
    }

    /// Upload pending changes outside of a draw
    pub fn preload(&mut self, device: &mut dyn BufferDevice) {
        self.load_for_draw(device, None);
    }

    // ===== MODERN BACKEND =====

    /// Cached descriptor info of the GPU object (modern backend only)
    pub fn buffer_info(&self) -> Option<ObjectView> {
        match &self.ops {
            BackendOps::Modern(ops) => ops.buffer_info(&self.core),
            _ => None,
        }
    }

    /// Synchronize for use with `bind_mask` (modern backend only)
    pub fn barrier(&mut self, device: &mut dyn BufferDevice, bind_mask: BindFlags) {
        match &mut self.ops {
            BackendOps::Modern(ops) => ops.barrier(&self.core, device, bind_mask),
            _ => engine_trace!(SOURCE, "No barrier needed for buffer {}", self.core.id.raw()),
        }
    }

    /// Usages the buffer is synchronized for (modern backend only)
    pub fn barrier_bind_mask(&self) -> Option<BindFlags> {
        match &self.ops {
            BackendOps::Modern(ops) => Some(ops.tracker().bind_mask()),
            _ => None,
        }
    }

    // ===== DESCRIPTION =====

    pub fn sub_resource_desc(&self, sub_resource_idx: u32) -> Result<SubResourceDesc> {
        if sub_resource_idx != 0 {
            engine_bail!(SOURCE, InvalidArgument => "Invalid sub-resource index {}", sub_resource_idx);
        }
        Ok(SubResourceDesc {
            format: VertexFormat::R8_UNORM,
            usage: self.core.usage,
            bind_flags: self.core.bind_flags,
            access: self.core.access,
            width: self.core.size,
            height: 1,
            depth: 1,
            size: self.core.size,
        })
    }

    /// Row and slice pitch of a mapping
    pub fn map_pitch(&self, sub_resource_idx: u32) -> Result<(u64, u64)> {
        if sub_resource_idx != 0 {
            engine_bail!(SOURCE, InvalidArgument => "Invalid sub-resource index {}", sub_resource_idx);
        }
        Ok((self.core.size, self.core.size))
    }

    // ===== ACCESSORS =====

    pub fn id(&self) -> BufferId {
        self.core.id
    }

    pub fn size(&self) -> u64 {
        self.core.size
    }

    pub fn usage(&self) -> Usage {
        self.core.usage
    }

    pub fn bind_flags(&self) -> BindFlags {
        self.core.bind_flags
    }

    pub fn access(&self) -> Access {
        self.core.access
    }

    pub fn structure_byte_stride(&self) -> u32 {
        self.core.structure_byte_stride
    }

    pub fn locations(&self) -> Location {
        self.core.locations
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.ops.kind()
    }

    /// Binding target of the legacy object
    pub fn binding_target(&self) -> Option<BindingTarget> {
        match &self.ops {
            BackendOps::Legacy(ops) => Some(ops.binding()),
            _ => None,
        }
    }

    /// Whether a GPU object may be used
    pub fn uses_gpu_object(&self) -> bool {
        self.core.use_bo
    }

    pub fn object(&self) -> Option<&BufferObject> {
        self.core.object.as_ref()
    }

    pub fn object_handle(&self) -> Option<ObjectHandle> {
        self.core.object.as_ref().map(|o| o.handle())
    }

    /// The host mirror, if allocated
    pub fn sysmem(&self) -> Option<&[u8]> {
        self.core.heap.as_deref()
    }

    pub fn is_sysmem_pinned(&self) -> bool {
        self.core.pin_sysmem
    }

    pub fn dirty_ranges(&self) -> &[DirtyRange] {
        self.core.dirty.ranges()
    }

    pub fn map_count(&self) -> u32 {
        self.core.map_count
    }

    pub fn conversion_map(&self) -> Option<&ConversionMap> {
        self.conversion.map()
    }

    pub fn hysteresis(&self) -> &Hysteresis {
        &self.hysteresis
    }
}

impl Drop for BufferResource {
    fn drop(&mut self) {
        if let Some(object) = self.core.object.as_ref() {
            engine_warn!(SOURCE, "Buffer {} dropped without destroy, object {:?} leaked",
                self.core.id.raw(), object.handle());
        }
    }
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
