//! Topmost-wins hit-testing against the element store.

use kurbo::Point;

use crate::camera::Camera;
use crate::connector::{resolve_endpoints, route_points};
use crate::element::{Element, ElementId, ElementKind};
use crate::geometry::{point_to_polyline_dist, point_to_segment_dist, rotated_box_contains};
use crate::store::BoardStore;

/// Screen-pixel tolerance for line, freehand and connector hits.
pub const SEGMENT_HIT_TOLERANCE_PX: f64 = 8.0;
/// Screen-pixel radius for matching a shape's cardinal edge anchors.
pub const ANCHOR_RADIUS_PX: f64 = 12.0;

/// Cardinal side of a connectable shape's rotated box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorSide {
    Top,
    Right,
    Bottom,
    Left,
}

/// An edge anchor match: which shape, which side, where in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeAnchor {
    pub element_id: ElementId,
    pub side: AnchorSide,
    pub position: Point,
}

/// Hit-test a screen point, converting tolerances at the camera's zoom.
pub fn hit_test_screen(store: &BoardStore, camera: &Camera, screen: Point) -> Option<ElementId> {
    hit_test_world(
        store,
        camera.screen_to_world(screen),
        camera.screen_len_to_world(SEGMENT_HIT_TOLERANCE_PX),
    )
}

/// Hit-test a world point with a world-unit tolerance. Non-connector
/// elements are tested topmost-first; connectors only when no shape
/// matched, again topmost-first.
pub fn hit_test_world(store: &BoardStore, point: Point, tolerance: f64) -> Option<ElementId> {
    let candidates = store.candidates_at_point(point);
    for element in store.ordered_rev() {
        if element.is_connector() || !candidates.contains(&element.id) {
            continue;
        }
        if element_contains(element, point, tolerance) {
            return Some(element.id);
        }
    }
    for element in store.ordered_rev() {
        let ElementKind::Connector {
            route, thickness, ..
        } = &element.kind
        else {
            continue;
        };
        let Some((start, end)) = resolve_endpoints(store, element) else {
            continue;
        };
        let pts = route_points(start, end, *route);
        if point_to_polyline_dist(point, &pts) <= tolerance.max(*thickness) {
            return Some(element.id);
        }
    }
    None
}

/// Geometric containment for one non-connector element.
pub fn element_contains(element: &Element, point: Point, tolerance: f64) -> bool {
    match &element.kind {
        ElementKind::Sticky { .. }
        | ElementKind::Rectangle { .. }
        | ElementKind::Circle { .. }
        | ElementKind::Text { .. }
        | ElementKind::Frame => rotated_box_contains(element.bounds(), element.rotation(), point),
        ElementKind::Line => {
            let (a, b) = element.line_endpoints();
            point_to_segment_dist(point, a, b) <= tolerance
        }
        ElementKind::Freehand {
            stroke_width,
            ..
        } => {
            let reach = tolerance.max(*stroke_width);
            let quick = element.bounds().inflate(reach, reach);
            if !quick.contains(point) {
                return false;
            }
            point_to_polyline_dist(point, &element.freehand_world_points()) <= reach
        }
        ElementKind::Connector { .. } => false,
    }
}

/// The four cardinal edge-midpoint anchors of a connectable element,
/// rotated with it.
pub fn edge_anchors(element: &Element) -> [(AnchorSide, Point); 4] {
    let bounds = element.bounds();
    let center = bounds.center();
    let rad = element.rotation().to_radians();
    let rotate = |p: Point| crate::geometry::rotate_point(p, center, rad);
    [
        (AnchorSide::Top, rotate(Point::new(center.x, bounds.y0))),
        (AnchorSide::Right, rotate(Point::new(bounds.x1, center.y))),
        (AnchorSide::Bottom, rotate(Point::new(center.x, bounds.y1))),
        (AnchorSide::Left, rotate(Point::new(bounds.x0, center.y))),
    ]
}

/// Topmost edge anchor within the pixel radius of a screen point, if any.
pub fn anchor_at_screen(store: &BoardStore, camera: &Camera, screen: Point) -> Option<EdgeAnchor> {
    let world = camera.screen_to_world(screen);
    let radius = camera.screen_len_to_world(ANCHOR_RADIUS_PX);
    anchor_at_world(store, world, radius)
}

/// Topmost edge anchor within `radius` world units of a world point.
pub fn anchor_at_world(store: &BoardStore, world: Point, radius: f64) -> Option<EdgeAnchor> {
    for element in store.ordered_rev() {
        if !element.is_connectable() {
            continue;
        }
        for (side, position) in edge_anchors(element) {
            if (position - world).hypot() <= radius {
                return Some(EdgeAnchor {
                    element_id: element.id,
                    side,
                    position,
                });
            }
        }
    }
    None
}
