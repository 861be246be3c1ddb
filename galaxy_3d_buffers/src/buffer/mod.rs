/// Buffer module - residency, conversion and backend object management

// Module declarations
pub mod flags;
pub mod dirty_ranges;
pub mod vertex;
pub mod conversion;
pub mod device;
pub mod memory_device;
pub mod object;
pub mod barrier;
pub(crate) mod state;
pub(crate) mod backend;
pub mod resource;
pub mod streaming;

// Re-export the public types
pub use flags::*;
pub use dirty_ranges::*;
pub use vertex::*;
pub use conversion::*;
pub use device::*;
pub use memory_device::*;
pub use object::*;
pub use barrier::*;
pub use resource::*;
pub use streaming::*;
