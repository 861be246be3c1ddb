use super::*;

fn desc(size: u64) -> ObjectDesc {
    ObjectDesc {
        size,
        binding: BindingTarget::Vertex,
        usage: ObjectUsage::from_bind_flags(crate::buffer::flags::BindFlags::VERTEX_BUFFER),
        memory: MemoryPreference::DEVICE_LOCAL,
        dynamic: false,
        coherent: true,
    }
}

#[test]
fn test_create_and_destroy() {
    let mut device = MemoryDevice::new(DeviceCaps::legacy());
    let object = device.create_object(&desc(64)).unwrap();
    assert_eq!(device.object_count(), 1);
    assert_eq!(device.object_bytes(object.handle).unwrap(), &[0u8; 64][..]);

    device.destroy_object(object.handle);
    assert_eq!(device.object_count(), 0);
    assert_eq!(device.commands().len(), 2);
}

#[test]
fn test_failing_allocations() {
    let mut device = MemoryDevice::new(DeviceCaps::legacy());
    device.set_fail_allocations(true);
    assert_eq!(device.create_object(&desc(64)), Err(Error::OutOfMemory));
    assert_eq!(device.object_count(), 0);
}

#[test]
fn test_transfer_host_to_object_ranges() {
    let mut device = MemoryDevice::new(DeviceCaps::legacy());
    let object = device.create_object(&desc(8)).unwrap();
    let data = [1u8, 2, 3, 4, 5, 6, 7, 8];

    device.transfer(
        TransferDst::Object { handle: object.handle, offset: 0 },
        TransferSrc::Host(&data),
        &[DirtyRange::new(2, 2), DirtyRange::new(6, 1)],
        MapFlags::WRITE,
    ).unwrap();

    assert_eq!(device.object_bytes(object.handle).unwrap(), &[0, 0, 3, 4, 0, 0, 7, 0]);
}

#[test]
fn test_transfer_object_to_host() {
    let mut device = MemoryDevice::new(DeviceCaps::legacy());
    let object = device.create_upload_object(&[9, 8, 7, 6]).unwrap();
    let mut host = [0u8; 4];

    device.transfer(
        TransferDst::Host(&mut host),
        TransferSrc::Object { handle: object.handle, offset: 0 },
        &[DirtyRange::new(0, 4)],
        MapFlags::WRITE,
    ).unwrap();

    assert_eq!(host, [9, 8, 7, 6]);
}

#[test]
fn test_transfer_within_one_object_overlapping() {
    let mut device = MemoryDevice::new(DeviceCaps::legacy());
    let object = device.create_upload_object(&[1, 2, 3, 4, 5, 6]).unwrap();

    device.transfer(
        TransferDst::Object { handle: object.handle, offset: 2 },
        TransferSrc::Object { handle: object.handle, offset: 0 },
        &[DirtyRange::new(0, 4)],
        MapFlags::WRITE,
    ).unwrap();

    assert_eq!(device.object_bytes(object.handle).unwrap(), &[1, 2, 1, 2, 3, 4]);
}

#[test]
fn test_transfer_out_of_bounds_fails() {
    let mut device = MemoryDevice::new(DeviceCaps::legacy());
    let object = device.create_object(&desc(4)).unwrap();
    let result = device.transfer(
        TransferDst::Object { handle: object.handle, offset: 0 },
        TransferSrc::Host(&[0u8; 8]),
        &[DirtyRange::new(0, 8)],
        MapFlags::WRITE,
    );
    assert!(result.is_err());
}

#[test]
fn test_map_pointer_alignment() {
    let mut device = MemoryDevice::new(DeviceCaps::legacy());
    let object = device.create_object(&desc(64)).unwrap();

    let ptr = device.map_object(object.handle, 0, 64, MapFlags::WRITE).unwrap();
    assert_eq!(ptr.as_ptr() as usize % 16, 0);
    assert!(device.is_mapped(object.handle));
    device.unmap_object(object.handle, &[]);

    device.set_misaligned_maps(true);
    let ptr = device.map_object(object.handle, 0, 64, MapFlags::WRITE).unwrap();
    assert_eq!(ptr.as_ptr() as usize % 16, 1);
}

#[test]
fn test_map_writes_reach_object() {
    let mut device = MemoryDevice::new(DeviceCaps::legacy());
    let object = device.create_object(&desc(16)).unwrap();

    let ptr = device.map_object(object.handle, 4, 4, MapFlags::WRITE).unwrap();
    unsafe {
        std::ptr::copy_nonoverlapping([0xAAu8; 4].as_ptr(), ptr.as_ptr(), 4);
    }
    device.unmap_object(object.handle, &[DirtyRange::new(0, 4)]);

    assert_eq!(&device.object_bytes(object.handle).unwrap()[4..8], &[0xAA; 4]);
}

#[test]
fn test_stream_output_tracking() {
    let mut device = MemoryDevice::new(DeviceCaps::legacy());
    let object = device.create_object(&desc(16)).unwrap();

    device.begin_stream_output(object.handle);
    assert!(device.stream_output_active(object.handle));
    device.end_stream_output();
    assert!(!device.stream_output_active(object.handle));
    assert_eq!(device.commands().last(), Some(&DeviceCommand::EndStreamOutput));
}
