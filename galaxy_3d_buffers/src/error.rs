//! Error types for the Galaxy3D buffer engine
//!
//! Allocation failures and invalid arguments are returned to the caller.
//! Degraded-mode fallbacks never surface here; they are only logged.

use std::fmt;

/// Result type for buffer engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Buffer engine errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A backend object or host copy could not be allocated
    OutOfMemory,

    /// Rejected before any state was touched (zero size, bad box, ...)
    InvalidArgument(String),

    /// The backend variant cannot provide the requested location
    UnsupportedLocation(String),

    /// Backend-specific error (Vulkan, in-memory device, ...)
    BackendError(String),

    /// Initialization failed (engine, device, subsystems)
    InitializationFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::UnsupportedLocation(msg) => write!(f, "Unsupported location: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ===== ERROR MACROS =====

/// Log an error and build the matching `Error` value
///
/// Without a variant the error is a `BackendError`.
///
/// # Example
///
/// ```no_run
/// # use galaxy_3d_buffers::engine_err;
/// let size = 0u64;
/// let err = engine_err!("galaxy3d::Buffer", InvalidArgument => "Size {} requested", size);
/// let err2 = engine_err!("galaxy3d::vulkan", "Failed to create buffer");
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $kind:ident => $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::galaxy3d::Error::$kind(message)
    }};
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::galaxy3d::Error::BackendError(message)
    }};
}

/// Log an error and return it from the current function
#[macro_export]
macro_rules! engine_bail {
    ($($arg:tt)*) => {
        return Err($crate::engine_err!($($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
