use super::*;

// ============================================================================
// Basic tracking
// ============================================================================

#[test]
fn test_new_is_clean() {
    let dirty = DirtyRanges::new(256, 16);
    assert!(!dirty.is_dirty());
    assert!(!dirty.is_fully_dirty());
    assert!(dirty.is_empty());
}

#[test]
fn test_sub_ranges_keep_insertion_order() {
    let mut dirty = DirtyRanges::new(256, 16);
    dirty.invalidate(64, 16);
    dirty.invalidate(8, 4);

    assert_eq!(dirty.ranges(), &[DirtyRange::new(64, 16), DirtyRange::new(8, 4)]);
    assert!(dirty.is_dirty());
    assert!(!dirty.is_fully_dirty());
}

#[test]
fn test_contained_range_is_not_recorded_twice() {
    let mut dirty = DirtyRanges::new(256, 16);
    dirty.invalidate(0, 128);
    dirty.invalidate(16, 32);
    assert_eq!(dirty.len(), 1);
}

#[test]
fn test_clear_empties_the_set() {
    let mut dirty = DirtyRanges::new(256, 16);
    dirty.invalidate(0, 0);
    dirty.clear();
    assert!(!dirty.is_dirty());
}

// ============================================================================
// Collapse to fully dirty
// ============================================================================

#[test]
fn test_zero_size_at_origin_means_whole_buffer() {
    let mut dirty = DirtyRanges::new(256, 16);
    dirty.invalidate(32, 8);
    dirty.invalidate(0, 0);
    assert_eq!(dirty.ranges(), &[DirtyRange::new(0, 256)]);
    assert!(dirty.is_fully_dirty());
}

#[test]
fn test_full_extent_collapses_to_one_entry() {
    let mut dirty = DirtyRanges::new(256, 16);
    dirty.invalidate(8, 8);
    dirty.invalidate(100, 20);
    dirty.invalidate(0, 256);
    assert_eq!(dirty.len(), 1);
    assert!(dirty.is_fully_dirty());
}

#[test]
fn test_out_of_range_collapses_to_fully_dirty() {
    let mut dirty = DirtyRanges::new(256, 16);
    dirty.invalidate(250, 10);
    assert!(dirty.is_fully_dirty());

    let mut dirty = DirtyRanges::new(256, 16);
    dirty.invalidate(300, 0);
    assert!(dirty.is_fully_dirty());
}

#[test]
fn test_overflow_collapses_to_fully_dirty() {
    let mut dirty = DirtyRanges::new(1024, 3);
    dirty.invalidate(0, 4);
    dirty.invalidate(100, 4);
    dirty.invalidate(200, 4);
    assert_eq!(dirty.len(), 3);

    dirty.invalidate(300, 4);
    assert!(dirty.is_fully_dirty());
}

#[test]
fn test_sub_range_never_shrinks_fully_dirty() {
    let mut dirty = DirtyRanges::new(256, 16);
    dirty.invalidate_all();
    dirty.invalidate(16, 16);
    dirty.invalidate(200, 56);
    assert!(dirty.is_fully_dirty());
    assert_eq!(dirty.ranges(), &[DirtyRange::new(0, 256)]);
}
