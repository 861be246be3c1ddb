/// Hazard tracking for the modern backend
///
/// Remembers the bind usages a buffer was last synchronized for and reports a
/// transition only when a writer follows readers, readers follow a writer, or
/// a writer follows a writer. Read-after-read reuse needs no barrier.

use crate::buffer::flags::{BindFlags, READ_ONLY_BIND_MASK};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BarrierTracker {
    bind_mask: BindFlags,
}

impl BarrierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Usages the buffer is currently synchronized for
    pub fn bind_mask(&self) -> BindFlags {
        self.bind_mask
    }

    /// Request use with `bind_mask`
    ///
    /// Returns the `(src, dst)` usages of the barrier to record, if any.
    pub fn transition(&mut self, bind_mask: BindFlags) -> Option<(BindFlags, BindFlags)> {
        let src = if bind_mask.intersects(!READ_ONLY_BIND_MASK) {
            let mut src = self.bind_mask & READ_ONLY_BIND_MASK;
            if src.is_empty() {
                src = self.bind_mask;
            }
            self.bind_mask = bind_mask;
            src
        } else if !self.bind_mask.contains(bind_mask) {
            let src = self.bind_mask - READ_ONLY_BIND_MASK;
            self.bind_mask |= bind_mask;
            src
        } else {
            BindFlags::empty()
        };

        (!src.is_empty()).then_some((src, bind_mask))
    }

    pub fn reset(&mut self) {
        self.bind_mask = BindFlags::empty();
    }
}

#[cfg(test)]
#[path = "barrier_tests.rs"]
mod tests;
