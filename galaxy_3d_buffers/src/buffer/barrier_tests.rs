use super::*;

#[test]
fn test_first_read_needs_no_barrier() {
    let mut tracker = BarrierTracker::new();
    assert_eq!(tracker.transition(BindFlags::VERTEX_BUFFER), None);
    assert_eq!(tracker.bind_mask(), BindFlags::VERTEX_BUFFER);
}

#[test]
fn test_read_after_read_needs_no_barrier() {
    let mut tracker = BarrierTracker::new();
    tracker.transition(BindFlags::VERTEX_BUFFER);
    assert_eq!(tracker.transition(BindFlags::CONSTANT_BUFFER), None);
    assert_eq!(tracker.transition(BindFlags::VERTEX_BUFFER), None);
    assert_eq!(tracker.bind_mask(), BindFlags::VERTEX_BUFFER | BindFlags::CONSTANT_BUFFER);
}

#[test]
fn test_write_after_read() {
    let mut tracker = BarrierTracker::new();
    tracker.transition(BindFlags::VERTEX_BUFFER | BindFlags::INDEX_BUFFER);

    let barrier = tracker.transition(BindFlags::STREAM_OUTPUT);
    assert_eq!(
        barrier,
        Some((BindFlags::VERTEX_BUFFER | BindFlags::INDEX_BUFFER, BindFlags::STREAM_OUTPUT))
    );
    assert_eq!(tracker.bind_mask(), BindFlags::STREAM_OUTPUT);
}

#[test]
fn test_read_after_write() {
    let mut tracker = BarrierTracker::new();
    tracker.transition(BindFlags::UNORDERED_ACCESS);

    let barrier = tracker.transition(BindFlags::SHADER_RESOURCE);
    assert_eq!(barrier, Some((BindFlags::UNORDERED_ACCESS, BindFlags::SHADER_RESOURCE)));
    assert_eq!(tracker.bind_mask(), BindFlags::UNORDERED_ACCESS | BindFlags::SHADER_RESOURCE);

    // Further reads are covered
    assert_eq!(tracker.transition(BindFlags::SHADER_RESOURCE), None);
}

#[test]
fn test_write_after_write_fences_on_previous_mask() {
    let mut tracker = BarrierTracker::new();
    tracker.transition(BindFlags::UNORDERED_ACCESS);

    let barrier = tracker.transition(BindFlags::UNORDERED_ACCESS);
    assert_eq!(barrier, Some((BindFlags::UNORDERED_ACCESS, BindFlags::UNORDERED_ACCESS)));
}

#[test]
fn test_write_prefers_read_only_subset_as_source() {
    let mut tracker = BarrierTracker::new();
    tracker.transition(BindFlags::STREAM_OUTPUT);
    tracker.transition(BindFlags::VERTEX_BUFFER);
    assert_eq!(tracker.bind_mask(), BindFlags::STREAM_OUTPUT | BindFlags::VERTEX_BUFFER);

    let barrier = tracker.transition(BindFlags::STREAM_OUTPUT);
    assert_eq!(barrier, Some((BindFlags::VERTEX_BUFFER, BindFlags::STREAM_OUTPUT)));
}

#[test]
fn test_write_on_fresh_buffer_needs_no_barrier() {
    let mut tracker = BarrierTracker::new();
    assert_eq!(tracker.transition(BindFlags::UNORDERED_ACCESS), None);
}
