/// State shared by a buffer resource and its backend variant

use std::ptr::NonNull;
use crate::config::EngineConfig;
use crate::buffer::dirty_ranges::DirtyRanges;
use crate::buffer::flags::{Access, BindFlags, Location, Usage};
use crate::buffer::object::{BufferObject, ObjectUser};
use crate::buffer::resource::BufferDesc;
use crate::buffer::vertex::BufferId;
use crate::{engine_error, engine_trace};

pub(crate) const SOURCE: &str = "galaxy3d::Buffer";

pub(crate) struct BufferCore {
    pub id: BufferId,
    pub size: u64,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub access: Access,
    pub structure_byte_stride: u32,
    pub locations: Location,
    /// Host mirror, `size` bytes when present
    pub heap: Option<Vec<u8>>,
    /// The host mirror must never be evicted
    pub pin_sysmem: bool,
    pub object: Option<BufferObject>,
    /// The resource's own entry in its object's user registry
    pub bo_user: ObjectUser,
    /// GPU object usage allowed; cleared for good on degradation
    pub use_bo: bool,
    pub dirty: DirtyRanges,
    pub map_count: u32,
    /// Backend mapping held while `map_count > 0`
    pub map_ptr: Option<NonNull<u8>>,
    pub config: EngineConfig,
}

impl BufferCore {
    /// Fresh state: content cleared, nothing allocated yet
    pub fn new(desc: &BufferDesc, use_bo: bool, config: EngineConfig) -> Self {
        Self {
            id: BufferId::next(),
            size: desc.size,
            usage: desc.usage,
            bind_flags: desc.bind_flags,
            access: desc.access,
            structure_byte_stride: desc.structure_byte_stride,
            locations: Location::CLEARED,
            heap: None,
            pin_sysmem: false,
            object: None,
            bo_user: ObjectUser::new(),
            use_bo,
            dirty: DirtyRanges::new(desc.size, config.dirty_range_limit),
            map_count: 0,
            map_ptr: None,
            config,
        }
    }

    /// Allocate the host mirror if missing
    pub fn prepare_sysmem(&mut self) -> bool {
        if self.heap.is_some() {
            return true;
        }

        let mut heap = Vec::new();
        if heap.try_reserve_exact(self.size as usize).is_err() {
            engine_error!(SOURCE, "Failed to allocate {} bytes of system memory for buffer {}",
                self.size, self.id.raw());
            return false;
        }
        heap.resize(self.size as usize, 0);
        self.heap = Some(heap);
        true
    }

    /// Mark `location` up to date
    pub fn validate_location(&mut self, location: Location) {
        if location.contains(Location::GPU_OBJECT) {
            self.dirty.clear();
        }
        self.locations |= location;
        engine_trace!(SOURCE, "Buffer {} locations now {:?}", self.id.raw(), self.locations);
    }

    /// Mark `location` stale for `(offset, size)`; `size == 0` at offset 0 is the whole buffer
    pub fn invalidate_range(&mut self, location: Location, offset: u64, size: u64) {
        if location.contains(Location::GPU_OBJECT) {
            self.dirty.invalidate(offset, size);
        }
        self.locations.remove(location);
        engine_trace!(SOURCE, "Buffer {} locations now {:?}", self.id.raw(), self.locations);

        if self.locations.is_empty() {
            engine_error!(SOURCE, "Buffer {} does not have any up to date location", self.id.raw());
        }
    }

    pub fn invalidate_location(&mut self, location: Location) {
        self.invalidate_range(location, 0, 0);
    }

    /// Drop the host mirror unless pinned
    pub fn evict_sysmem(&mut self) {
        if self.pin_sysmem {
            engine_trace!(SOURCE, "Not evicting system memory for buffer {}", self.id.raw());
            return;
        }
        engine_trace!(SOURCE, "Evicting system memory for buffer {}", self.id.raw());
        self.invalidate_location(Location::SYSMEM);
        self.heap = None;
    }

    /// Install a freshly created object and register the resource as its user
    pub fn attach_object(&mut self, object: BufferObject) {
        let mut object = object;
        object.register(&self.bo_user);
        self.object = Some(object);
        self.dirty.invalidate_all();
    }

    /// Remove the object, invalidating every user
    pub fn detach_object(&mut self) -> Option<BufferObject> {
        let mut object = self.object.take()?;
        object.release_users();
        Some(object)
    }
}
