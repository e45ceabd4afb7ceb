//! Frame containment bookkeeping.
//!
//! Frames own the elements geometrically inside them. Membership is written
//! only here: gestures report that something finished moving and the
//! reconciler answers with the `frame_id` changes to apply.

use crate::element::ElementId;
use crate::geometry::{rect_contains_rect, shrink_rect};
use crate::store::BoardStore;

/// Margin inside a frame's bounds that contents must clear.
pub const FRAME_CONTENT_INSET: f64 = 10.0;

/// One membership change: element and its new frame (or `None` to clear).
pub type MembershipChange = (ElementId, Option<ElementId>);

/// Containment pass after a frame finished moving or resizing: every
/// eligible element is retested against the frame's inset bounds. Elements
/// newly inside gain membership, elements that left lose it.
pub fn reconcile_frame_moved(store: &BoardStore, frame_id: ElementId) -> Vec<MembershipChange> {
    let Some(frame) = store.get(frame_id) else {
        return Vec::new();
    };
    if !frame.is_frame() {
        return Vec::new();
    }
    let inset = shrink_rect(frame.bounds(), FRAME_CONTENT_INSET);
    let mut changes = Vec::new();
    for element in store.ordered() {
        if element.id == frame_id || !element.can_join_frame() {
            continue;
        }
        let contained = rect_contains_rect(inset, element.bounds());
        if contained && element.frame_id != Some(frame_id) {
            changes.push((element.id, Some(frame_id)));
        } else if !contained && element.frame_id == Some(frame_id) {
            changes.push((element.id, None));
        }
    }
    changes
}

/// Containment pass after a non-frame element finished moving: find at most
/// one containing frame, preferring the topmost in render order.
pub fn reconcile_element_moved(
    store: &BoardStore,
    element_id: ElementId,
) -> Option<MembershipChange> {
    let element = store.get(element_id)?;
    if !element.can_join_frame() {
        return None;
    }
    let bounds = element.bounds();
    let mut found = None;
    for frame in store.ordered_rev() {
        if !frame.is_frame() {
            continue;
        }
        if rect_contains_rect(shrink_rect(frame.bounds(), FRAME_CONTENT_INSET), bounds) {
            found = Some(frame.id);
            break;
        }
    }
    (element.frame_id != found).then_some((element_id, found))
}
