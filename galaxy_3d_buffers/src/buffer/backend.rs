/// Backend buffer-object adapters
///
/// Each variant knows how to make a location's storage exist
/// (`prepare_location`) and how to release it (`unload_location`). Copying
/// bytes between locations is the resource's job, not the variant's.
///
/// - `NoObjectOps`: CPU only backend, host memory is the only storage
/// - `LegacyOps`: GL-like backend, objects classified by binding target
/// - `ModernOps`: Vulkan-like backend, explicit barriers and cached
///   descriptor info

use crate::error::Result;
use crate::buffer::barrier::BarrierTracker;
use crate::buffer::state::{BufferCore, SOURCE};
use crate::buffer::device::{
    BackendKind, BindingTarget, BufferBarrier, BufferDevice, DeviceCaps, MemoryPreference,
    ObjectDesc, ObjectUsage,
};
use crate::buffer::flags::{Access, BindFlags, Location, Usage};
use crate::buffer::object::{BufferObject, ObjectView};
use crate::buffer::resource::BufferDesc;
use crate::{engine_bail, engine_error, engine_trace, engine_warn};

pub(crate) trait BufferOps {
    /// Make sure storage for `location` exists
    fn prepare_location(
        &mut self,
        core: &mut BufferCore,
        device: &mut dyn BufferDevice,
        location: Location,
    ) -> bool;

    /// Release the storage of `location`
    fn unload_location(
        &mut self,
        core: &mut BufferCore,
        device: &mut dyn BufferDevice,
        location: Location,
    );
}

fn prepare_common(core: &mut BufferCore, location: Location) -> Option<bool> {
    if location == Location::SYSMEM {
        return Some(core.prepare_sysmem());
    }
    if location != Location::GPU_OBJECT {
        engine_error!(SOURCE, "Invalid location {:?} for buffer {}", location, core.id.raw());
        return Some(false);
    }
    None
}

fn create_object(core: &mut BufferCore, device: &mut dyn BufferDevice, desc: &ObjectDesc) -> Result<()> {
    let allocation = device.create_object(desc)?;
    core.attach_object(BufferObject::new(allocation, core.size));
    engine_trace!(SOURCE, "Created object {:?} for buffer {}", allocation.handle, core.id.raw());
    Ok(())
}

fn destroy_object(core: &mut BufferCore, device: &mut dyn BufferDevice) {
    if let Some(object) = core.detach_object() {
        device.destroy_object(object.handle());
    }
}

// ============================================================================
// No-object variant
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct NoObjectOps;

impl BufferOps for NoObjectOps {
    fn prepare_location(
        &mut self,
        core: &mut BufferCore,
        _device: &mut dyn BufferDevice,
        location: Location,
    ) -> bool {
        if location == Location::SYSMEM {
            return core.prepare_sysmem();
        }
        engine_warn!(SOURCE, "Unhandled location {:?} without buffer objects", location);
        false
    }

    fn unload_location(
        &mut self,
        core: &mut BufferCore,
        _device: &mut dyn BufferDevice,
        location: Location,
    ) {
        engine_trace!(SOURCE, "Nothing to unload for {:?} of buffer {}", location, core.id.raw());
    }
}

// ============================================================================
// Legacy variant
// ============================================================================

#[derive(Debug)]
pub(crate) struct LegacyOps {
    binding: BindingTarget,
}

impl LegacyOps {
    pub fn new(caps: &DeviceCaps, bind_flags: BindFlags) -> Self {
        Self {
            binding: binding_from_bind_flags(caps, bind_flags),
        }
    }

    pub fn binding(&self) -> BindingTarget {
        self.binding
    }
}

/// Binding target for a legacy object
///
/// Index binding wins: objects that may serve as index buffers cannot be
/// sub-allocated.
pub(crate) fn binding_from_bind_flags(caps: &DeviceCaps, bind_flags: BindFlags) -> BindingTarget {
    if bind_flags.is_empty() {
        return BindingTarget::Generic;
    }
    if bind_flags.contains(BindFlags::INDEX_BUFFER) {
        return BindingTarget::Index;
    }
    if bind_flags.intersects(BindFlags::SHADER_RESOURCE | BindFlags::UNORDERED_ACCESS)
        && caps.texture_buffer_object
    {
        return BindingTarget::TextureBuffer;
    }
    if bind_flags.contains(BindFlags::CONSTANT_BUFFER) {
        return BindingTarget::Uniform;
    }
    if bind_flags.contains(BindFlags::STREAM_OUTPUT) {
        return BindingTarget::StreamOutput;
    }
    if bind_flags.contains(BindFlags::INDIRECT_BUFFER) && caps.draw_indirect {
        return BindingTarget::Indirect;
    }
    if !(bind_flags - (BindFlags::VERTEX_BUFFER | BindFlags::INDEX_BUFFER)).is_empty() {
        engine_warn!(SOURCE, "Unhandled bind flags {:?}", bind_flags);
    }
    BindingTarget::Vertex
}

impl BufferOps for LegacyOps {
    fn prepare_location(
        &mut self,
        core: &mut BufferCore,
        device: &mut dyn BufferDevice,
        location: Location,
    ) -> bool {
        if let Some(prepared) = prepare_common(core, location) {
            return prepared;
        }
        if core.object.is_some() {
            return true;
        }
        if !core.use_bo {
            engine_warn!(SOURCE, "Trying to create an object for buffer {} without object usage",
                core.id.raw());
            return false;
        }

        let dynamic = core.usage.contains(Usage::DYNAMIC);
        let desc = ObjectDesc {
            size: core.size,
            binding: self.binding,
            usage: ObjectUsage::from_bind_flags(core.bind_flags),
            memory: MemoryPreference::from_access(core.access, core.usage),
            dynamic,
            coherent: !dynamic,
        };
        match create_object(core, device, &desc) {
            Ok(()) => true,
            Err(err) => {
                engine_error!(SOURCE, "Failed to create buffer object: {}", err);
                core.use_bo = false;
                core.dirty.clear();
                false
            }
        }
    }

    fn unload_location(
        &mut self,
        core: &mut BufferCore,
        device: &mut dyn BufferDevice,
        location: Location,
    ) {
        if location != Location::GPU_OBJECT {
            engine_error!(SOURCE, "Unhandled location {:?}", location);
            return;
        }
        let Some(handle) = core.object.as_ref().map(|o| o.handle()) else {
            return;
        };

        // Deleting an object unbinds it, which is illegal during capture
        if core.bind_flags.contains(BindFlags::STREAM_OUTPUT) && device.stream_output_active(handle) {
            engine_warn!(SOURCE, "Deleting object for buffer {}, disabling stream output", core.id.raw());
            device.end_stream_output();
        }
        destroy_object(core, device);
    }
}

// ============================================================================
// Modern variant
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct ModernOps {
    barrier: BarrierTracker,
}

impl ModernOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor info of the current object, refreshed only after a rename or recreation
    pub fn buffer_info(&self, core: &BufferCore) -> Option<ObjectView> {
        let object = core.object.as_ref()?;
        match core.bo_user.view() {
            Some(view) => Some(view),
            None => Some(core.bo_user.refresh(object)),
        }
    }

    /// Record a barrier if using the buffer with `bind_mask` is a hazard
    pub fn barrier(&mut self, core: &BufferCore, device: &mut dyn BufferDevice, bind_mask: BindFlags) {
        let Some((src_bind, dst_bind)) = self.barrier.transition(bind_mask) else {
            return;
        };
        let Some(object) = core.object.as_ref() else {
            engine_warn!(SOURCE, "Barrier requested for buffer {} without an object", core.id.raw());
            return;
        };

        engine_trace!(SOURCE, "Barrier {:?} -> {:?} for buffer {}", src_bind, dst_bind, core.id.raw());
        device.pipeline_barrier(&BufferBarrier {
            handle: object.handle(),
            offset: object.offset(),
            size: core.size,
            src_bind,
            dst_bind,
        });
    }

    pub fn tracker(&self) -> &BarrierTracker {
        &self.barrier
    }

    /// A new object starts with no pending GPU usage
    pub fn reset_barrier(&mut self) {
        self.barrier.reset();
    }
}

impl BufferOps for ModernOps {
    fn prepare_location(
        &mut self,
        core: &mut BufferCore,
        device: &mut dyn BufferDevice,
        location: Location,
    ) -> bool {
        if let Some(prepared) = prepare_common(core, location) {
            return prepared;
        }
        if core.object.is_some() {
            return true;
        }
        if !core.use_bo {
            engine_warn!(SOURCE, "Trying to create an object for buffer {} without object usage",
                core.id.raw());
            return false;
        }

        let desc = ObjectDesc {
            size: core.size,
            binding: BindingTarget::Generic,
            usage: ObjectUsage::from_bind_flags(core.bind_flags),
            memory: MemoryPreference::from_access(core.access, core.usage),
            dynamic: core.usage.contains(Usage::DYNAMIC),
            coherent: true,
        };
        match create_object(core, device, &desc) {
            Ok(()) => {
                self.barrier.reset();
                true
            }
            Err(err) => {
                engine_warn!(SOURCE, "Failed to create buffer object: {}", err);
                false
            }
        }
    }

    fn unload_location(
        &mut self,
        core: &mut BufferCore,
        device: &mut dyn BufferDevice,
        location: Location,
    ) {
        if location != Location::GPU_OBJECT {
            engine_error!(SOURCE, "Unhandled location {:?}", location);
            return;
        }
        destroy_object(core, device);
    }
}

// ============================================================================
// Variant selection
// ============================================================================

/// The closed set of variants, chosen from the device backend
#[derive(Debug)]
pub(crate) enum BackendOps {
    NoObject(NoObjectOps),
    Legacy(LegacyOps),
    Modern(ModernOps),
}

impl BackendOps {
    /// Pick the variant and negotiate GPU object usage
    pub fn negotiate(caps: &DeviceCaps, desc: &BufferDesc) -> Result<(Self, bool)> {
        let gpu_access = desc.access.contains(Access::GPU);
        match caps.backend {
            BackendKind::NoObject => Ok((BackendOps::NoObject(NoObjectOps), false)),
            BackendKind::Legacy => {
                let use_bo = if !gpu_access {
                    engine_trace!(SOURCE, "Not creating an object because the buffer is not GPU accessible");
                    false
                } else if !caps.buffer_objects {
                    engine_trace!(SOURCE, "Not creating an object because buffer objects are not supported");
                    false
                } else if !caps.map_buffer_range && desc.usage.contains(Usage::DYNAMIC) {
                    engine_trace!(SOURCE, "Not creating an object for a dynamic buffer without range mapping");
                    false
                } else {
                    true
                };
                Ok((BackendOps::Legacy(LegacyOps::new(caps, desc.bind_flags)), use_bo))
            }
            BackendKind::Modern => {
                if desc.bind_flags.contains(BindFlags::STREAM_OUTPUT) && !caps.transform_feedback {
                    engine_bail!(SOURCE, InvalidArgument =>
                        "Stream output buffers need transform feedback support");
                }
                Ok((BackendOps::Modern(ModernOps::new()), gpu_access))
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            BackendOps::NoObject(_) => BackendKind::NoObject,
            BackendOps::Legacy(_) => BackendKind::Legacy,
            BackendOps::Modern(_) => BackendKind::Modern,
        }
    }

    fn ops(&mut self) -> &mut dyn BufferOps {
        match self {
            BackendOps::NoObject(ops) => ops,
            BackendOps::Legacy(ops) => ops,
            BackendOps::Modern(ops) => ops,
        }
    }

    pub fn prepare_location(
        &mut self,
        core: &mut BufferCore,
        device: &mut dyn BufferDevice,
        location: Location,
    ) -> bool {
        self.ops().prepare_location(core, device, location)
    }

    pub fn unload_location(
        &mut self,
        core: &mut BufferCore,
        device: &mut dyn BufferDevice,
        location: Location,
    ) {
        self.ops().unload_location(core, device, location)
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
