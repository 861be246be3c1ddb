/*!
# Galaxy 3D Buffers

Buffer residency and conversion engine for the Galaxy 3D renderer.

A buffer's bytes may live in a host mirror, in a backend buffer object, or in
both. This crate keeps track of which copy is current, uploads only the byte
ranges that changed, reformats vertex data the backend cannot consume natively,
and hides the differences between backends behind a small device trait.

## Architecture

- **BufferResource**: location coherency, map/unmap, copies, draw-time loads
- **BufferDevice**: native buffer primitives implemented per backend
- **MemoryDevice**: host memory device, used without a GPU and in tests
- **VertexConversion**: byte-level conversion map with hysteresis
- **BufferObject**: backend object identity and its user registry
- **BarrierTracker**: hazard tracking for the modern backend
- **StreamingBuffer**: ring allocator for transient per-draw data
*/

// Internal modules
mod error;
mod engine;
mod config;
pub mod log;
pub mod buffer;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton and its configuration
    pub use crate::engine::Engine;
    pub use crate::config::{EngineConfig, HysteresisLimits};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger, MemoryLogger};
    }

    // Buffer sub-module with every buffer type
    pub mod buffer {
        pub use crate::buffer::*;
    }

    pub use crate::buffer::{BufferDesc, BufferResource, StreamingBuffer};
}

// Re-export math library at crate root
pub use glam;
