//! Engine-wide tunables
//!
//! A `BufferResource` takes a snapshot of the active `EngineConfig` when it is
//! created, so changing the configuration only affects resources created later.

/// Thresholds driving the vertex conversion hysteresis
///
/// These are empirically tuned values, kept configurable rather than derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HysteresisLimits {
    /// Declaration changes tolerated before the GPU object is dropped
    pub max_decl_changes: u32,
    /// Quiet draws after which the declaration change count resets
    pub reset_decl_change_draws: u32,
    /// Full-buffer conversions tolerated before the GPU object is dropped
    pub max_full_conversions: u32,
    /// Quiet draws after which the full conversion count resets
    pub reset_full_conversion_draws: u32,
}

impl Default for HysteresisLimits {
    fn default() -> Self {
        Self {
            max_decl_changes: 100,
            reset_decl_change_draws: 1000,
            max_full_conversions: 5,
            reset_full_conversion_draws: 20,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Vertex conversion hysteresis thresholds
    pub hysteresis: HysteresisLimits,

    /// Smallest size a streaming ring grows to (bytes)
    pub streaming_min_size: u64,

    /// Required alignment of pointers returned by backend maps
    pub resource_alignment: u64,

    /// Constant buffer sizes must be a multiple of this
    pub constant_buffer_alignment: u64,

    /// Number of dirty ranges tracked before collapsing to fully dirty
    pub dirty_range_limit: usize,

    /// Give constant buffers host-write access even when not requested
    pub cb_access_map_w: bool,

    /// Software vertex processing: every buffer keeps a pinned host copy
    pub software_vertex_processing: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hysteresis: HysteresisLimits::default(),
            streaming_min_size: 512 * 1024,
            resource_alignment: 16,
            constant_buffer_alignment: 16,
            dirty_range_limit: 4096,
            cb_access_map_w: false,
            software_vertex_processing: false,
        }
    }
}
