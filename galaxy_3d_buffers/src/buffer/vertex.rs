/// Vertex layout as seen by the conversion analyzer
///
/// Only what the byte-level analysis needs is described here: which fixed
/// function attribute slots are active, which buffer feeds them, their format,
/// stride and byte offset. Declaration and shader signature bookkeeping lives
/// above this layer.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a buffer resource, used to match attributes to their source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

impl BufferId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Vertex attribute formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum VertexFormat {
    /// Raw bytes, the format of buffer sub-resources
    R8_UNORM,
    R32_FLOAT,
    R32G32_FLOAT,
    R32G32B32_FLOAT,
    R32G32B32A32_FLOAT,
    R8G8B8A8_UNORM,
    /// D3D-style packed color, needs a red/blue swizzle on backends without BGRA attributes
    B8G8R8A8_UNORM,
    R8G8B8A8_UINT,
    R16G16_FLOAT,
    R16G16B16A16_FLOAT,
    R16G16_SINT,
    R16G16B16A16_SINT,
}

impl VertexFormat {
    /// Size of one attribute in bytes
    pub fn byte_count(&self) -> u32 {
        match self {
            VertexFormat::R8_UNORM => 1,
            VertexFormat::R32_FLOAT => 4,
            VertexFormat::R32G32_FLOAT => 8,
            VertexFormat::R32G32B32_FLOAT => 12,
            VertexFormat::R32G32B32A32_FLOAT => 16,
            VertexFormat::R8G8B8A8_UNORM => 4,
            VertexFormat::B8G8R8A8_UNORM => 4,
            VertexFormat::R8G8B8A8_UINT => 4,
            VertexFormat::R16G16_FLOAT => 4,
            VertexFormat::R16G16B16A16_FLOAT => 8,
            VertexFormat::R16G16_SINT => 4,
            VertexFormat::R16G16B16A16_SINT => 8,
        }
    }
}

/// Fixed function attribute slots, in analysis order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfpAttribute {
    Position,
    BlendWeight,
    BlendIndices,
    Normal,
    Diffuse,
    Specular,
    TexCoord0,
    TexCoord1,
    TexCoord2,
    TexCoord3,
    TexCoord4,
    TexCoord5,
    TexCoord6,
    TexCoord7,
}

impl FfpAttribute {
    pub const COUNT: usize = 14;

    pub const ALL: [FfpAttribute; Self::COUNT] = [
        FfpAttribute::Position,
        FfpAttribute::BlendWeight,
        FfpAttribute::BlendIndices,
        FfpAttribute::Normal,
        FfpAttribute::Diffuse,
        FfpAttribute::Specular,
        FfpAttribute::TexCoord0,
        FfpAttribute::TexCoord1,
        FfpAttribute::TexCoord2,
        FfpAttribute::TexCoord3,
        FfpAttribute::TexCoord4,
        FfpAttribute::TexCoord5,
        FfpAttribute::TexCoord6,
        FfpAttribute::TexCoord7,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// One active attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElement {
    pub format: VertexFormat,
    /// Bytes between consecutive vertices, 0 for a constant attribute
    pub stride: u32,
    /// Byte offset of the first element inside its buffer
    pub offset: u64,
    /// Buffer the attribute is sourced from
    pub buffer: BufferId,
}

/// Active attributes for the current draw
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub elements: [Option<VertexElement>; FfpAttribute::COUNT],
    /// The position attribute is already transformed (XYZRHW)
    pub position_transformed: bool,
}

impl StreamInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute assignment
    pub fn with(mut self, attribute: FfpAttribute, element: VertexElement) -> Self {
        self.set(attribute, element);
        self
    }

    pub fn set(&mut self, attribute: FfpAttribute, element: VertexElement) {
        self.elements[attribute.index()] = Some(element);
    }

    pub fn clear(&mut self, attribute: FfpAttribute) {
        self.elements[attribute.index()] = None;
    }

    pub fn element(&self, attribute: FfpAttribute) -> Option<&VertexElement> {
        self.elements[attribute.index()].as_ref()
    }
}

/// Draw-time state consulted by `BufferResource::load_for_draw`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawState {
    pub stream_info: StreamInfo,
    /// A programmable vertex shader consumes the attributes, no fixups apply
    pub use_vertex_shader: bool,
}
