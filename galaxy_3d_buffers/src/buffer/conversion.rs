/// Vertex conversion analyzer
///
/// Decides, per byte of the vertex stride, which fixup a vertex buffer needs
/// before the backend can consume it, and applies those fixups while
/// uploading. Two encodings are handled:
///
/// - packed BGRA colors on backends without native BGRA vertex attributes
///   (red and blue channels swapped)
/// - pre-transformed XYZRHW positions on backends without native support
///   (x, y, z divided by w and w replaced by 1/w)
///
/// `Hysteresis` keeps the analyzer from thrashing: a buffer whose layout keeps
/// changing, or that keeps being fully reconverted, stops using a GPU object.

use bitflags::bitflags;
use glam::Vec4;
use crate::config::HysteresisLimits;
use crate::buffer::dirty_ranges::DirtyRange;
use crate::buffer::vertex::{BufferId, FfpAttribute, StreamInfo, VertexElement, VertexFormat};
use crate::{engine_error, engine_trace, engine_warn};

const SOURCE: &str = "galaxy3d::Conversion";

/// Fixup applied to one byte of a vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionType {
    #[default]
    None,
    ColorSwizzle,
    PositionDehomogenize,
}

bitflags! {
    /// Fixups the active backend requires
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FixupFlags: u32 {
        const COLOR = 1 << 0;
        const POSITION = 1 << 1;
    }
}

/// Per-byte conversion tags for one vertex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionMap {
    stride: u32,
    entries: Vec<ConversionType>,
}

impl ConversionMap {
    fn new(stride: u32) -> Self {
        Self {
            stride,
            entries: vec![ConversionType::None; stride as usize],
        }
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn entries(&self) -> &[ConversionType] {
        &self.entries
    }

    pub fn get(&self, byte: usize) -> ConversionType {
        self.entries.get(byte).copied().unwrap_or_default()
    }

    /// Whether at least one byte needs a fixup
    pub fn needs_conversion(&self) -> bool {
        self.entries.iter().any(|e| *e != ConversionType::None)
    }
}

/// Conversion state owned by a buffer resource
#[derive(Debug, Clone, Default)]
pub struct VertexConversion {
    map: Option<ConversionMap>,
    has_declaration: bool,
}

impl VertexConversion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active map, if any byte of this buffer is converted
    pub fn map(&self) -> Option<&ConversionMap> {
        self.map.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.map.is_some()
    }

    /// A declaration has been analyzed at least once
    pub fn has_declaration(&self) -> bool {
        self.has_declaration
    }

    /// Forget the map and the declaration state
    pub fn reset(&mut self) {
        self.map = None;
        self.has_declaration = false;
    }

    /// Re-analyze the attributes sourced from `buffer`
    ///
    /// Returns whether the conversion map changed. With `static_decl`, the
    /// layout is only analyzed once. Attributes with conflicting strides leave
    /// the previous map untouched.
    pub fn find_declaration(
        &mut self,
        buffer: BufferId,
        stream_info: &StreamInfo,
        fixup: FixupFlags,
        static_decl: bool,
    ) -> bool {
        if self.has_declaration && static_decl {
            return false;
        }
        self.has_declaration = true;

        if fixup.is_empty() {
            engine_trace!(SOURCE, "No fixup required");
            return self.map.take().is_some();
        }

        let previous = self.map.clone();
        let mut fixup = fixup;
        let mut stride_this_run = 0u32;
        let mut changed = false;

        for attribute in FfpAttribute::ALL {
            match self.check_attribute(buffer, stream_info, attribute, fixup, &mut stride_this_run) {
                Some(attribute_changed) => changed |= attribute_changed,
                None => {
                    engine_warn!(SOURCE, "Skipping conversion analysis of buffer {}", buffer.raw());
                    self.map = previous;
                    return false;
                }
            }
            // Only the position slot can carry a transformed position
            if attribute == FfpAttribute::Position {
                fixup.remove(FixupFlags::POSITION);
            }
        }

        let unused = self.map.as_ref().is_some_and(|m| stride_this_run == 0 || !m.needs_conversion());
        if unused {
            if stride_this_run == 0 && !changed {
                engine_error!(SOURCE,
                    "No converted attribute found for buffer {} but a conversion map exists",
                    buffer.raw());
            }
            self.map = None;
            changed = true;
        }

        if changed {
            engine_trace!(SOURCE, "Conversion information changed for buffer {}", buffer.raw());
        }
        changed
    }

    fn check_attribute(
        &mut self,
        buffer: BufferId,
        stream_info: &StreamInfo,
        attribute: FfpAttribute,
        fixup: FixupFlags,
        stride_this_run: &mut u32,
    ) -> Option<bool> {
        let Some(element) = stream_info.element(attribute) else {
            return Some(false);
        };
        if element.buffer != buffer {
            return Some(false);
        }

        if fixup.contains(FixupFlags::COLOR) && element.format == VertexFormat::B8G8R8A8_UNORM {
            self.process_attribute(ConversionType::ColorSwizzle, element, stride_this_run)
        } else if fixup.contains(FixupFlags::POSITION) && stream_info.position_transformed {
            if element.format != VertexFormat::R32G32B32A32_FLOAT {
                engine_warn!(SOURCE, "Unexpected format {:?} for transformed position", element.format);
                return Some(false);
            }
            self.process_attribute(ConversionType::PositionDehomogenize, element, stride_this_run)
        } else if self.map.is_some() {
            self.process_attribute(ConversionType::None, element, stride_this_run)
        } else {
            Some(false)
        }
    }

    /// `None` when the stride conflicts with another attribute of this pass
    fn process_attribute(
        &mut self,
        conversion: ConversionType,
        element: &VertexElement,
        stride_this_run: &mut u32,
    ) -> Option<bool> {
        let mut changed = false;

        if element.stride == 0 {
            engine_warn!(SOURCE,
                "{:?} used with stride 0, assuming the stride of the existing map",
                element.format);
        } else if *stride_this_run != 0 && element.stride != *stride_this_run {
            engine_warn!(SOURCE,
                "Got two concurrent strides, {} and {}",
                element.stride, *stride_this_run);
            return None;
        } else {
            *stride_this_run = element.stride;
            if self.map.as_ref().map(|m| m.stride) != Some(element.stride) {
                engine_trace!(SOURCE, "Stride changed to {}, reallocating conversion map", element.stride);
                self.map = Some(ConversionMap::new(element.stride));
                changed = true;
            }
        }

        let Some(map) = self.map.as_mut() else {
            engine_warn!(SOURCE, "No vertex stride known for {:?}, not converting", element.format);
            return Some(changed);
        };

        let stride = u64::from(map.stride);
        let base = element.offset % stride;
        for i in 0..u64::from(element.format.byte_count()) {
            let idx = ((base + i) % stride) as usize;
            if map.entries[idx] != conversion {
                engine_trace!(SOURCE, "Byte {} was {:?}, is {:?} now", idx, map.entries[idx], conversion);
                map.entries[idx] = conversion;
                changed = true;
            }
        }

        Some(changed)
    }
}

// ===== BYTE FIXUPS =====

/// Swap the red and blue channels of the packed color at the start of `bytes`
///
/// Returns the number of bytes consumed.
pub fn fixup_color(bytes: &mut [u8]) -> usize {
    let Some(color) = bytes.get_mut(..4) else {
        return 4;
    };
    let src = u32::from_le_bytes([color[0], color[1], color[2], color[3]]);
    let dst = (src & 0xff00_ff00) | ((src & 0x00ff_0000) >> 16) | ((src & 0x0000_00ff) << 16);
    color.copy_from_slice(&dst.to_le_bytes());
    4
}

/// Dehomogenize the XYZRHW position at the start of `bytes`
///
/// w == 0 and w == 1 are left untouched. Returns the number of bytes consumed.
pub fn fixup_position(bytes: &mut [u8]) -> usize {
    let size = std::mem::size_of::<Vec4>();
    let Some(raw) = bytes.get_mut(..size) else {
        return size;
    };
    let mut p: Vec4 = bytemuck::pod_read_unaligned(raw);
    if p.w != 1.0 && p.w != 0.0 {
        let w = 1.0 / p.w;
        p.x *= w;
        p.y *= w;
        p.z *= w;
        p.w = w;
        raw.copy_from_slice(bytemuck::bytes_of(&p));
    }
    size
}

/// Apply `map` in place to every vertex touched by `ranges`
pub fn convert_vertices(map: &ConversionMap, data: &mut [u8], ranges: &[DirtyRange]) {
    let stride = map.stride as usize;
    if stride == 0 {
        return;
    }
    let vertex_count = data.len() / stride;

    for range in ranges {
        let first = range.offset as usize / stride;
        let last = (range.end() as usize / stride + 1).min(vertex_count);

        for vertex in first..last {
            let base = vertex * stride;
            let mut j = 0;
            while j < stride {
                let tail = &mut data[base + j..base + stride];
                j += match map.entries[j] {
                    ConversionType::None => 4,
                    ConversionType::ColorSwizzle => fixup_color(tail),
                    ConversionType::PositionDehomogenize => fixup_position(tail),
                };
            }
        }
    }
}

// ===== HYSTERESIS =====

/// What the caller must do after a hysteresis update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HysteresisAction {
    Proceed,
    /// Stop converting, the GPU object is dropped for good
    DropGpuObject,
}

/// Counters limiting how often a buffer gets reconverted
#[derive(Debug, Clone)]
pub struct Hysteresis {
    limits: HysteresisLimits,
    decl_change_count: u32,
    draw_count: u32,
    full_conversion_count: u32,
}

impl Hysteresis {
    pub fn new(limits: HysteresisLimits) -> Self {
        Self {
            limits,
            decl_change_count: 0,
            draw_count: 0,
            full_conversion_count: 0,
        }
    }

    /// A draw without declaration change or full reconversion
    pub fn count_draw(&mut self) {
        self.draw_count = self.draw_count.saturating_add(1);
        if self.draw_count > self.limits.reset_decl_change_draws {
            self.decl_change_count = 0;
        }
        if self.draw_count > self.limits.reset_full_conversion_draws {
            self.full_conversion_count = 0;
        }
    }

    /// The conversion map changed this draw
    pub fn declaration_changed(&mut self) -> HysteresisAction {
        self.decl_change_count = self.decl_change_count.saturating_add(1);
        self.draw_count = 0;
        if self.decl_change_count > self.limits.max_decl_changes {
            HysteresisAction::DropGpuObject
        } else {
            HysteresisAction::Proceed
        }
    }

    /// The whole buffer is being reconverted with an unchanged map
    pub fn full_conversion(&mut self) -> HysteresisAction {
        self.full_conversion_count = self.full_conversion_count.saturating_add(1);
        if self.full_conversion_count > self.limits.max_full_conversions {
            HysteresisAction::DropGpuObject
        } else {
            HysteresisAction::Proceed
        }
    }

    pub fn decl_change_count(&self) -> u32 {
        self.decl_change_count
    }

    pub fn draw_count(&self) -> u32 {
        self.draw_count
    }

    pub fn full_conversion_count(&self) -> u32 {
        self.full_conversion_count
    }
}

#[cfg(test)]
#[path = "conversion_tests.rs"]
mod tests;
