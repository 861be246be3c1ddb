//! Integration tests for object lifecycle, streaming and degraded modes
//!
//! Degraded-mode fallbacks never fail the call; they are only visible in the
//! log, so these tests install a `MemoryLogger` and run serially.
//! No GPU required.
//!
//! Run with: cargo test --test lifecycle_integration_tests

use galaxy_3d_buffers::galaxy3d::{Engine, EngineConfig, StreamingBuffer};
use galaxy_3d_buffers::galaxy3d::log::{LogSeverity, MemoryLogger};
use galaxy_3d_buffers::galaxy3d::buffer::{
    BackendKind, BindFlags, BufferDesc, BufferResource, DeviceCaps, MapFlags, MemoryDevice,
    ObjectUser, UploadObject, Usage, WritePolicy,
};
use serial_test::serial;

fn create(device: &mut MemoryDevice, desc: &BufferDesc, data: Option<&[u8]>) -> BufferResource {
    BufferResource::create_with_config(device, desc, data, EngineConfig::default()).unwrap()
}

// ============================================================================
// RENAME
// ============================================================================

#[test]
#[serial]
fn test_integration_rename_invalidates_every_user() {
    let mut device = MemoryDevice::new(DeviceCaps::modern());
    let mut buffer = create(&mut device, &BufferDesc::new(16, BindFlags::CONSTANT_BUFFER), Some(&[0; 16]));
    assert_eq!(buffer.backend_kind(), BackendKind::Modern);

    let users: Vec<ObjectUser> = (0..3).map(|_| ObjectUser::new()).collect();
    for user in &users {
        buffer.register_user(user);
        user.refresh(buffer.object().unwrap());
    }
    let info = buffer.buffer_info().unwrap();

    for generation in 1..=3u8 {
        let allocation = device.create_upload_object(&[generation; 16]).unwrap();
        let upload = UploadObject { allocation, rename_on_unmap: true, mapped: false };
        buffer.update_sub_resource(&mut device, &upload, 0, 16).unwrap();

        for user in &users {
            assert!(!user.is_valid());
            assert_eq!(user.refresh(buffer.object().unwrap()).handle, allocation.handle);
        }
        assert_eq!(buffer.buffer_info().unwrap().handle, allocation.handle);
        assert_eq!(buffer.read_bytes(&mut device).unwrap(), vec![generation; 16]);
    }

    assert_ne!(buffer.buffer_info().unwrap().handle, info.handle);
    assert_eq!(device.object_count(), 1);

    // Dropped users leave the registry
    drop(users);
    assert_eq!(buffer.object().unwrap().user_count(), 1);
    buffer.destroy(&mut device);
}

// ============================================================================
// STREAMING
// ============================================================================

#[test]
#[serial]
fn test_integration_streaming_across_draws() {
    let mut device = MemoryDevice::new(DeviceCaps::legacy());
    let config = EngineConfig { streaming_min_size: 256, ..EngineConfig::default() };
    let mut ring = StreamingBuffer::with_config(BindFlags::VERTEX_BUFFER, config);

    let mut positions = Vec::new();
    for draw in 0..8u8 {
        positions.push(ring.upload(&mut device, &[draw; 24], 12).unwrap());
    }
    assert_eq!(positions, vec![0, 24, 48, 72, 96, 120, 144, 168]);

    let bytes = ring.buffer_mut().unwrap().read_bytes(&mut device).unwrap();
    for (draw, position) in positions.iter().enumerate() {
        let start = *position as usize;
        assert!(bytes[start..start + 24].iter().all(|b| *b == draw as u8));
    }

    // 192 + 80 does not fit in 256
    let allocation = ring.map(&mut device, 80, 16).unwrap();
    assert_eq!((allocation.position, allocation.policy), (0, WritePolicy::Discard));
    ring.unmap(&mut device);
    ring.destroy(&mut device);
    assert_eq!(device.object_count(), 0);
}

// ============================================================================
// DEGRADED MODES
// ============================================================================

#[test]
#[serial]
fn test_integration_misaligned_maps_are_logged() {
    let logger = MemoryLogger::new();
    Engine::set_logger(logger.clone());

    let mut device = MemoryDevice::new(DeviceCaps::legacy());
    let mut desc = BufferDesc::new(32, BindFlags::VERTEX_BUFFER);
    desc.usage = Usage::DYNAMIC;
    let mut buffer = create(&mut device, &desc, Some(&[0; 32]));
    device.set_misaligned_maps(true);

    buffer.write(&mut device, 0, &[1; 32], MapFlags::DISCARD).unwrap();
    assert!(!buffer.uses_gpu_object());
    assert!(logger.contains(LogSeverity::Warn, "byte aligned"));
    assert!(logger.contains(LogSeverity::Warn, "dropping GPU object"));
    assert_eq!(buffer.read_bytes(&mut device).unwrap(), vec![1u8; 32]);

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_failed_object_creation_is_silent_to_caller() {
    let logger = MemoryLogger::new();
    Engine::set_logger(logger.clone());

    let mut device = MemoryDevice::new(DeviceCaps::legacy());
    device.set_fail_allocations(true);
    let mut buffer = create(&mut device, &BufferDesc::new(16, BindFlags::VERTEX_BUFFER), Some(&[5; 16]));

    assert!(!buffer.uses_gpu_object());
    assert!(logger.contains(LogSeverity::Error, "Failed to create buffer object"));

    buffer.write(&mut device, 0, &[6; 4], MapFlags::empty()).unwrap();
    buffer.preload(&mut device);
    let mut expected = vec![5u8; 16];
    expected[..4].fill(6);
    assert_eq!(buffer.read_bytes(&mut device).unwrap(), expected);

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_unmap_without_map_warns() {
    let logger = MemoryLogger::new();
    Engine::set_logger(logger.clone());

    let mut device = MemoryDevice::new(DeviceCaps::no_object());
    let mut buffer = create(&mut device, &BufferDesc::new(16, BindFlags::VERTEX_BUFFER), None);
    buffer.unmap(&mut device);
    assert_eq!(logger.count(LogSeverity::Warn, "Unmap called without a previous map call"), 1);

    Engine::reset_logger();
}
