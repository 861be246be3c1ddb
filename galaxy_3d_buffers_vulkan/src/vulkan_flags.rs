/// Conversions from engine buffer flags to Vulkan flags

use ash::vk;
use gpu_allocator::MemoryLocation;
use galaxy_3d_buffers::galaxy3d::buffer::{BindFlags, MemoryPreference, ObjectUsage};

/// Vulkan usage flags for an object
///
/// Transfers in both directions are always allowed; the engine copies
/// between objects for renames and copy operations.
pub(crate) fn usage_to_vk(usage: ObjectUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
    if usage.contains(ObjectUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(ObjectUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(ObjectUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(ObjectUsage::UNIFORM_TEXEL) {
        flags |= vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER;
    }
    if usage.contains(ObjectUsage::STORAGE_TEXEL) {
        flags |= vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(ObjectUsage::TRANSFORM_FEEDBACK) {
        flags |= vk::BufferUsageFlags::TRANSFORM_FEEDBACK_BUFFER_EXT;
    }
    if usage.contains(ObjectUsage::INDIRECT) {
        flags |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    flags
}

pub(crate) fn memory_location(memory: MemoryPreference) -> MemoryLocation {
    if memory.contains(MemoryPreference::HOST_CACHED) {
        MemoryLocation::GpuToCpu
    } else if memory.contains(MemoryPreference::HOST_VISIBLE) {
        MemoryLocation::CpuToGpu
    } else if memory.contains(MemoryPreference::DEVICE_LOCAL) {
        MemoryLocation::GpuOnly
    } else {
        MemoryLocation::CpuToGpu
    }
}

/// Access mask covering every way a buffer bound with `bind` is used
pub(crate) fn access_to_vk(bind: BindFlags) -> vk::AccessFlags {
    let mut access = vk::AccessFlags::empty();
    if bind.contains(BindFlags::VERTEX_BUFFER) {
        access |= vk::AccessFlags::VERTEX_ATTRIBUTE_READ;
    }
    if bind.contains(BindFlags::INDEX_BUFFER) {
        access |= vk::AccessFlags::INDEX_READ;
    }
    if bind.contains(BindFlags::CONSTANT_BUFFER) {
        access |= vk::AccessFlags::UNIFORM_READ;
    }
    if bind.contains(BindFlags::SHADER_RESOURCE) {
        access |= vk::AccessFlags::SHADER_READ;
    }
    if bind.contains(BindFlags::UNORDERED_ACCESS) {
        access |= vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE;
    }
    if bind.contains(BindFlags::STREAM_OUTPUT) {
        access |= vk::AccessFlags::TRANSFORM_FEEDBACK_WRITE_EXT;
    }
    if bind.contains(BindFlags::INDIRECT_BUFFER) {
        access |= vk::AccessFlags::INDIRECT_COMMAND_READ;
    }
    if access.is_empty() {
        access = vk::AccessFlags::TRANSFER_READ | vk::AccessFlags::TRANSFER_WRITE;
    }
    access
}

pub(crate) fn stage_to_vk(bind: BindFlags) -> vk::PipelineStageFlags {
    let mut stages = vk::PipelineStageFlags::empty();
    if bind.intersects(BindFlags::VERTEX_BUFFER | BindFlags::INDEX_BUFFER) {
        stages |= vk::PipelineStageFlags::VERTEX_INPUT;
    }
    if bind.intersects(BindFlags::CONSTANT_BUFFER | BindFlags::SHADER_RESOURCE | BindFlags::UNORDERED_ACCESS) {
        stages |= vk::PipelineStageFlags::VERTEX_SHADER
            | vk::PipelineStageFlags::FRAGMENT_SHADER
            | vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    if bind.contains(BindFlags::STREAM_OUTPUT) {
        stages |= vk::PipelineStageFlags::TRANSFORM_FEEDBACK_EXT;
    }
    if bind.contains(BindFlags::INDIRECT_BUFFER) {
        stages |= vk::PipelineStageFlags::DRAW_INDIRECT;
    }
    if stages.is_empty() {
        stages = vk::PipelineStageFlags::TRANSFER;
    }
    stages
}

#[cfg(test)]
#[path = "vulkan_flags_tests.rs"]
mod tests;
