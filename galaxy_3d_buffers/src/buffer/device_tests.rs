use super::*;

#[test]
fn test_object_usage_from_bind_flags() {
    let usage = ObjectUsage::from_bind_flags(BindFlags::VERTEX_BUFFER | BindFlags::INDEX_BUFFER);
    assert_eq!(
        usage,
        ObjectUsage::TRANSFER_SRC | ObjectUsage::TRANSFER_DST | ObjectUsage::VERTEX | ObjectUsage::INDEX
    );
}

#[test]
fn test_object_usage_always_transferable() {
    let usage = ObjectUsage::from_bind_flags(BindFlags::empty());
    assert_eq!(usage, ObjectUsage::TRANSFER_SRC | ObjectUsage::TRANSFER_DST);
}

#[test]
fn test_object_usage_texel_and_feedback() {
    let usage = ObjectUsage::from_bind_flags(
        BindFlags::SHADER_RESOURCE | BindFlags::UNORDERED_ACCESS | BindFlags::STREAM_OUTPUT,
    );
    assert!(usage.contains(ObjectUsage::UNIFORM_TEXEL));
    assert!(usage.contains(ObjectUsage::STORAGE_TEXEL));
    assert!(usage.contains(ObjectUsage::TRANSFORM_FEEDBACK));
}

#[test]
fn test_memory_preference_from_access() {
    assert_eq!(
        MemoryPreference::from_access(Access::GPU | Access::MAP_R | Access::MAP_W, Usage::empty()),
        MemoryPreference::HOST_VISIBLE | MemoryPreference::HOST_CACHED
    );
    assert_eq!(
        MemoryPreference::from_access(Access::GPU | Access::MAP_W, Usage::DYNAMIC),
        MemoryPreference::HOST_VISIBLE
    );
    assert_eq!(
        MemoryPreference::from_access(Access::GPU, Usage::empty()),
        MemoryPreference::DEVICE_LOCAL
    );
    assert!(MemoryPreference::from_access(Access::GPU, Usage::DYNAMIC).is_empty());
}

#[test]
fn test_caps_presets() {
    assert_eq!(DeviceCaps::no_object().backend, BackendKind::NoObject);
    assert!(!DeviceCaps::legacy().vertex_bgra);
    assert!(DeviceCaps::modern().xyzrhw);
}
