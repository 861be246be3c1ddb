/// Device collaborator - native buffer primitives the engine relies on
///
/// The engine never allocates, copies or maps backend memory itself. It goes
/// through a `BufferDevice`, implemented per backend (`MemoryDevice` in this
/// crate, the Vulkan device in `galaxy_3d_buffers_vulkan`).

use std::ptr::NonNull;
use bitflags::bitflags;
use crate::error::Result;
use crate::buffer::dirty_ranges::DirtyRange;
use crate::buffer::flags::{Access, BindFlags, MapFlags, Usage};
use crate::engine_warn;

/// Opaque backend object handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u64);

bitflags! {
    /// Native usage classes of a backend object
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const VERTEX = 1 << 2;
        const INDEX = 1 << 3;
        const UNIFORM = 1 << 4;
        const UNIFORM_TEXEL = 1 << 5;
        const STORAGE_TEXEL = 1 << 6;
        const TRANSFORM_FEEDBACK = 1 << 7;
        const INDIRECT = 1 << 8;
    }
}

impl ObjectUsage {
    /// Usage set required to bind an object with `bind_flags`
    pub fn from_bind_flags(bind_flags: BindFlags) -> Self {
        let mut usage = ObjectUsage::TRANSFER_SRC | ObjectUsage::TRANSFER_DST;
        if bind_flags.contains(BindFlags::VERTEX_BUFFER) {
            usage |= ObjectUsage::VERTEX;
        }
        if bind_flags.contains(BindFlags::INDEX_BUFFER) {
            usage |= ObjectUsage::INDEX;
        }
        if bind_flags.contains(BindFlags::CONSTANT_BUFFER) {
            usage |= ObjectUsage::UNIFORM;
        }
        if bind_flags.contains(BindFlags::SHADER_RESOURCE) {
            usage |= ObjectUsage::UNIFORM_TEXEL;
        }
        if bind_flags.contains(BindFlags::STREAM_OUTPUT) {
            usage |= ObjectUsage::TRANSFORM_FEEDBACK;
        }
        if bind_flags.contains(BindFlags::UNORDERED_ACCESS) {
            usage |= ObjectUsage::STORAGE_TEXEL;
        }
        if bind_flags.contains(BindFlags::INDIRECT_BUFFER) {
            usage |= ObjectUsage::INDIRECT;
        }
        if bind_flags.intersects(BindFlags::RENDER_TARGET | BindFlags::DEPTH_STENCIL) {
            engine_warn!("galaxy3d::Buffer", "Ignoring some bind flags {:?}", bind_flags);
        }
        usage
    }
}

bitflags! {
    /// Where backend memory should live
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryPreference: u32 {
        const HOST_VISIBLE = 1 << 0;
        const HOST_CACHED = 1 << 1;
        const DEVICE_LOCAL = 1 << 2;
    }
}

impl MemoryPreference {
    /// Memory preference for a buffer with the given access and usage
    pub fn from_access(access: Access, usage: Usage) -> Self {
        if access.contains(Access::MAP_R) {
            MemoryPreference::HOST_VISIBLE | MemoryPreference::HOST_CACHED
        } else if access.contains(Access::MAP_W) {
            MemoryPreference::HOST_VISIBLE
        } else if !usage.contains(Usage::DYNAMIC) {
            MemoryPreference::DEVICE_LOCAL
        } else {
            MemoryPreference::empty()
        }
    }
}

/// Binding target of a legacy (GL-like) buffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingTarget {
    /// Upload-only object with no bind flags
    Generic,
    Index,
    Vertex,
    Uniform,
    TextureBuffer,
    StreamOutput,
    Indirect,
}

/// Parameters of `BufferDevice::create_object`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDesc {
    pub size: u64,
    pub binding: BindingTarget,
    pub usage: ObjectUsage,
    pub memory: MemoryPreference,
    /// Rewritten frequently (stream-draw style hint)
    pub dynamic: bool,
    /// Host writes need no explicit flush
    pub coherent: bool,
}

/// A created object; `offset` is non-zero for sub-allocations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectAllocation {
    pub handle: ObjectHandle,
    pub offset: u64,
}

/// Source of a `transfer`
///
/// Range offsets are relative to the base (slice start or object offset).
#[derive(Debug)]
pub enum TransferSrc<'a> {
    Host(&'a [u8]),
    Object { handle: ObjectHandle, offset: u64 },
}

/// Destination of a `transfer`
#[derive(Debug)]
pub enum TransferDst<'a> {
    Host(&'a mut [u8]),
    Object { handle: ObjectHandle, offset: u64 },
}

/// Buffer memory barrier for the modern backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub handle: ObjectHandle,
    pub offset: u64,
    pub size: u64,
    pub src_bind: BindFlags,
    pub dst_bind: BindFlags,
}

/// Backend variant, picked once per resource at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// CPU only, no backend objects at all
    NoObject,
    /// GL-like backend with implicit synchronization
    Legacy,
    /// Vulkan-like backend with explicit barriers
    Modern,
}

/// Capabilities negotiated with the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCaps {
    pub backend: BackendKind,
    /// Buffer objects are available at all
    pub buffer_objects: bool,
    /// Sub-range mapping with explicit flush
    pub map_buffer_range: bool,
    pub texture_buffer_object: bool,
    pub draw_indirect: bool,
    pub transform_feedback: bool,
    /// BGRA vertex attributes are consumed natively
    pub vertex_bgra: bool,
    /// Fixed function attributes go through generic attributes (colors swizzled in shaders)
    pub ffp_generic_attributes: bool,
    /// Pre-transformed positions are consumed natively
    pub xyzrhw: bool,
}

impl DeviceCaps {
    pub fn no_object() -> Self {
        Self {
            backend: BackendKind::NoObject,
            buffer_objects: false,
            map_buffer_range: false,
            texture_buffer_object: false,
            draw_indirect: false,
            transform_feedback: false,
            vertex_bgra: false,
            ffp_generic_attributes: false,
            xyzrhw: false,
        }
    }

    /// Legacy backend without native BGRA or XYZRHW support
    pub fn legacy() -> Self {
        Self {
            backend: BackendKind::Legacy,
            buffer_objects: true,
            map_buffer_range: true,
            texture_buffer_object: true,
            draw_indirect: true,
            transform_feedback: true,
            vertex_bgra: false,
            ffp_generic_attributes: false,
            xyzrhw: false,
        }
    }

    pub fn modern() -> Self {
        Self {
            backend: BackendKind::Modern,
            buffer_objects: true,
            map_buffer_range: true,
            texture_buffer_object: true,
            draw_indirect: true,
            transform_feedback: true,
            vertex_bgra: true,
            ffp_generic_attributes: true,
            xyzrhw: true,
        }
    }
}

/// Native buffer primitives
pub trait BufferDevice {
    /// Capabilities, consulted at resource creation and draw time
    fn caps(&self) -> &DeviceCaps;

    /// Allocate a backend object
    fn create_object(&mut self, desc: &ObjectDesc) -> Result<ObjectAllocation>;

    /// Release a backend object
    fn destroy_object(&mut self, handle: ObjectHandle);

    /// Copy each range from `src` to `dst`
    ///
    /// `MapFlags::DISCARD` allows the previous destination content to be thrown away.
    fn transfer(
        &mut self,
        dst: TransferDst<'_>,
        src: TransferSrc<'_>,
        ranges: &[DirtyRange],
        flags: MapFlags,
    ) -> Result<()>;

    /// Map `size` bytes of an object starting at `offset`
    fn map_object(
        &mut self,
        handle: ObjectHandle,
        offset: u64,
        size: u64,
        flags: MapFlags,
    ) -> Result<NonNull<u8>>;

    /// Unmap an object, flushing `ranges` (relative to the mapped offset)
    fn unmap_object(&mut self, handle: ObjectHandle, ranges: &[DirtyRange]);

    /// Record a synchronization boundary
    fn pipeline_barrier(&mut self, barrier: &BufferBarrier);

    /// Whether `handle` is bound for an active stream-output capture
    fn stream_output_active(&self, handle: ObjectHandle) -> bool;

    /// End the active stream-output capture
    fn end_stream_output(&mut self);
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
