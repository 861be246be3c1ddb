/// Flag sets shared by the buffer engine
///
/// `Location` is the residency bitmask of a buffer; the others describe how a
/// buffer was created and how it is being accessed.

use bitflags::bitflags;

bitflags! {
    /// Which copies of a buffer's bytes are up to date
    ///
    /// `DISCARDED` and `CLEARED` are sentinel states meaning "no real bytes
    /// yet" (undefined and all-zero content respectively).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Location: u32 {
        /// Host-visible system memory mirror
        const SYSMEM = 1 << 0;
        /// Backend buffer object
        const GPU_OBJECT = 1 << 1;
        /// Content is undefined, nothing to copy
        const DISCARDED = 1 << 2;
        /// Content is all zeroes
        const CLEARED = 1 << 3;
    }
}

impl Location {
    /// Locations backed by actual storage
    pub const REAL: Location = Location::SYSMEM.union(Location::GPU_OBJECT);

    /// Locations that only describe content
    pub const SENTINEL: Location = Location::DISCARDED.union(Location::CLEARED);

    /// Whether a copy backed by storage is valid
    pub fn has_real_copy(&self) -> bool {
        self.intersects(Location::REAL)
    }

    /// Whether this is exactly one of the loadable locations
    pub fn is_single_real(&self) -> bool {
        *self == Location::SYSMEM || *self == Location::GPU_OBJECT
    }
}

bitflags! {
    /// How a buffer can be bound to the pipeline
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct BindFlags: u32 {
        const VERTEX_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const CONSTANT_BUFFER = 1 << 2;
        const SHADER_RESOURCE = 1 << 3;
        const STREAM_OUTPUT = 1 << 4;
        const RENDER_TARGET = 1 << 5;
        const DEPTH_STENCIL = 1 << 6;
        const UNORDERED_ACCESS = 1 << 7;
        const INDIRECT_BUFFER = 1 << 8;
    }
}

/// Bind usages that never write to the buffer
pub const READ_ONLY_BIND_MASK: BindFlags = BindFlags::VERTEX_BUFFER
    .union(BindFlags::INDEX_BUFFER)
    .union(BindFlags::CONSTANT_BUFFER)
    .union(BindFlags::SHADER_RESOURCE)
    .union(BindFlags::INDIRECT_BUFFER);

impl BindFlags {
    /// Subset of usages that only read
    pub fn read_only(&self) -> BindFlags {
        *self & READ_ONLY_BIND_MASK
    }

    /// Subset of usages that may write
    pub fn read_write(&self) -> BindFlags {
        *self - READ_ONLY_BIND_MASK
    }
}

bitflags! {
    /// Creation usage hints
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Usage: u32 {
        /// Rewritten frequently by the host
        const DYNAMIC = 1 << 0;
        /// The vertex declaration sourcing this buffer never changes
        const STATIC_DECL = 1 << 1;
        /// Keeps a host copy that survives discards
        const MANAGED = 1 << 2;
    }
}

bitflags! {
    /// Who may access the buffer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        const GPU = 1 << 0;
        const CPU = 1 << 1;
        const MAP_R = 1 << 2;
        const MAP_W = 1 << 3;
    }
}

bitflags! {
    /// Map and transfer flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        /// Previous content may be thrown away
        const DISCARD = 1 << 2;
        /// The caller promises not to touch bytes still in use by the GPU
        const NO_OVERWRITE = 1 << 3;
    }
}

#[cfg(test)]
#[path = "flags_tests.rs"]
mod tests;
