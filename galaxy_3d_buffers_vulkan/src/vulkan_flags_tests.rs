//! Unit tests for Vulkan flag conversion functions
//!
//! Pure mappings, no GPU required.

use super::*;
use galaxy_3d_buffers::galaxy3d::buffer::{Access, Usage};

// ============================================================================
// USAGE
// ============================================================================

#[test]
fn test_usage_always_allows_transfers() {
    let flags = usage_to_vk(ObjectUsage::empty());
    assert_eq!(flags, vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST);
}

#[test]
fn test_usage_from_bind_flags() {
    let usage = ObjectUsage::from_bind_flags(BindFlags::VERTEX_BUFFER | BindFlags::INDEX_BUFFER);
    let flags = usage_to_vk(usage);
    assert!(flags.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
    assert!(flags.contains(vk::BufferUsageFlags::INDEX_BUFFER));
    assert!(!flags.contains(vk::BufferUsageFlags::UNIFORM_BUFFER));

    let flags = usage_to_vk(ObjectUsage::from_bind_flags(BindFlags::CONSTANT_BUFFER));
    assert!(flags.contains(vk::BufferUsageFlags::UNIFORM_BUFFER));

    let flags = usage_to_vk(ObjectUsage::from_bind_flags(BindFlags::STREAM_OUTPUT));
    assert!(flags.contains(vk::BufferUsageFlags::TRANSFORM_FEEDBACK_BUFFER_EXT));

    let flags = usage_to_vk(ObjectUsage::from_bind_flags(BindFlags::INDIRECT_BUFFER));
    assert!(flags.contains(vk::BufferUsageFlags::INDIRECT_BUFFER));
}

// ============================================================================
// MEMORY LOCATION
// ============================================================================

#[test]
fn test_memory_location_from_access() {
    let read_back = MemoryPreference::from_access(Access::GPU | Access::MAP_R, Usage::empty());
    assert_eq!(memory_location(read_back), MemoryLocation::GpuToCpu);

    let upload = MemoryPreference::from_access(Access::GPU | Access::MAP_W, Usage::DYNAMIC);
    assert_eq!(memory_location(upload), MemoryLocation::CpuToGpu);

    let static_gpu = MemoryPreference::from_access(Access::GPU, Usage::empty());
    assert_eq!(memory_location(static_gpu), MemoryLocation::GpuOnly);

    assert_eq!(memory_location(MemoryPreference::empty()), MemoryLocation::CpuToGpu);
}

// ============================================================================
// BARRIER MASKS
// ============================================================================

#[test]
fn test_access_masks() {
    assert_eq!(access_to_vk(BindFlags::VERTEX_BUFFER), vk::AccessFlags::VERTEX_ATTRIBUTE_READ);
    assert_eq!(
        access_to_vk(BindFlags::UNORDERED_ACCESS),
        vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
    );
    assert_eq!(
        access_to_vk(BindFlags::empty()),
        vk::AccessFlags::TRANSFER_READ | vk::AccessFlags::TRANSFER_WRITE
    );
}

#[test]
fn test_stage_masks() {
    assert_eq!(stage_to_vk(BindFlags::INDEX_BUFFER), vk::PipelineStageFlags::VERTEX_INPUT);
    assert!(stage_to_vk(BindFlags::CONSTANT_BUFFER).contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
    assert_eq!(stage_to_vk(BindFlags::INDIRECT_BUFFER), vk::PipelineStageFlags::DRAW_INDIRECT);
    assert_eq!(stage_to_vk(BindFlags::empty()), vk::PipelineStageFlags::TRANSFER);
}
