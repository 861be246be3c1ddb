/// Dirty range tracking
///
/// Records which byte spans of a buffer changed since the GPU object was last
/// synchronized. The set is conservative: it means "at least these bytes
/// changed". Whole-buffer invalidations, invalid ranges and overflow all
/// collapse it to a single `(0, size)` entry.

use crate::engine_warn;

/// A byte span inside a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRange {
    pub offset: u64,
    pub size: u64,
}

impl DirtyRange {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// One past the last byte
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    fn contains(&self, other: &DirtyRange) -> bool {
        self.offset <= other.offset && other.end() <= self.end()
    }
}

/// Ordered set of modified ranges of one buffer
#[derive(Debug, Clone)]
pub struct DirtyRanges {
    ranges: Vec<DirtyRange>,
    buffer_size: u64,
    limit: usize,
}

impl DirtyRanges {
    /// Empty set for a buffer of `buffer_size` bytes, holding at most `limit` entries
    pub fn new(buffer_size: u64, limit: usize) -> Self {
        Self {
            ranges: Vec::new(),
            buffer_size,
            limit: limit.max(1),
        }
    }

    /// Record `(offset, size)` as modified
    ///
    /// `size == 0` at offset 0 means the whole buffer.
    pub fn invalidate(&mut self, offset: u64, size: u64) {
        if offset == 0 && (size == 0 || size == self.buffer_size) {
            self.invalidate_all();
            return;
        }

        if offset > self.buffer_size || size > self.buffer_size - offset {
            engine_warn!("galaxy3d::Buffer",
                "Invalid range {}+{} for a {} byte buffer, invalidating entire buffer",
                offset, size, self.buffer_size);
            self.invalidate_all();
            return;
        }

        // Already covered, nothing new to remember
        if self.is_fully_dirty() {
            return;
        }
        let range = DirtyRange::new(offset, size);
        if self.ranges.iter().any(|r| r.contains(&range)) {
            return;
        }

        if self.ranges.len() >= self.limit {
            engine_warn!("galaxy3d::Buffer",
                "More than {} dirty ranges, invalidating entire buffer", self.limit);
            self.invalidate_all();
            return;
        }

        if self.ranges.try_reserve(1).is_err() {
            crate::engine_error!("galaxy3d::Buffer",
                "Failed to grow the dirty range array, invalidating entire buffer");
            self.invalidate_all();
            return;
        }

        self.ranges.push(range);
    }

    /// Collapse to a single fully dirty entry
    pub fn invalidate_all(&mut self) {
        self.ranges.clear();
        self.ranges.push(DirtyRange::new(0, self.buffer_size));
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn is_dirty(&self) -> bool {
        !self.ranges.is_empty()
    }

    pub fn is_fully_dirty(&self) -> bool {
        self.ranges.len() == 1
            && self.ranges[0].offset == 0
            && self.ranges[0].size == self.buffer_size
    }

    pub fn ranges(&self) -> &[DirtyRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }
}

#[cfg(test)]
#[path = "dirty_ranges_tests.rs"]
mod tests;
