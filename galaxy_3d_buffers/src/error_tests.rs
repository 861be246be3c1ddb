//! Unit tests for error.rs
//!
//! Tests Error variants, Display output and the error macros.

use crate::error::{Error, Result};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_out_of_memory_display() {
    let err = Error::OutOfMemory;
    assert_eq!(format!("{}", err), "Out of memory");
}

#[test]
fn test_invalid_argument_display() {
    let err = Error::InvalidArgument("Size 0 requested".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Invalid argument"));
    assert!(display.contains("Size 0 requested"));
}

#[test]
fn test_unsupported_location_display() {
    let err = Error::UnsupportedLocation("GPU_OBJECT".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Unsupported location"));
    assert!(display.contains("GPU_OBJECT"));
}

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("transfer out of bounds".to_string());
    assert!(format!("{}", err).contains("Backend error"));
}

#[test]
fn test_initialization_failed_display() {
    let err = Error::InitializationFailed("no device".to_string());
    assert!(format!("{}", err).contains("Initialization failed"));
}

#[test]
fn test_error_is_std_error() {
    let err = Error::OutOfMemory;
    let _: &dyn std::error::Error = &err;
}

// ============================================================================
// MACROS
// ============================================================================

fn bail_invalid(size: u64) -> Result<u64> {
    if size == 0 {
        crate::engine_bail!("galaxy3d::Test", InvalidArgument => "Size {} requested", size);
    }
    Ok(size)
}

#[test]
fn test_engine_err_defaults_to_backend_error() {
    let err = crate::engine_err!("galaxy3d::Test", "device lost after {} frames", 3);
    assert_eq!(err, Error::BackendError("device lost after 3 frames".to_string()));
}

#[test]
fn test_engine_err_with_variant() {
    let err = crate::engine_err!("galaxy3d::Test", UnsupportedLocation => "location {:?}", "CLEARED");
    assert_eq!(err, Error::UnsupportedLocation("location \"CLEARED\"".to_string()));
}

#[test]
fn test_engine_bail_returns_early() {
    assert_eq!(bail_invalid(0), Err(Error::InvalidArgument("Size 0 requested".to_string())));
    assert_eq!(bail_invalid(16), Ok(16));
}
