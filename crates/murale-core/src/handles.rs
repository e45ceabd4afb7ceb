//! Selection handles: where they sit, what they hit, and the resize and
//! rotation math they drive.

use kurbo::Point;

use crate::element::{Element, ElementKind};
use crate::geometry::{normalize_deg, rotate_point};
use crate::hittest::AnchorSide;

/// Handle hit tolerance in screen pixels.
pub const HANDLE_HIT_TOLERANCE_PX: f64 = 10.0;
/// Distance from the top edge to the rotation handle, in world units.
pub const ROTATE_HANDLE_OFFSET: f64 = 28.0;
/// Resizing never shrinks an element below this.
pub const MIN_ELEMENT_SIZE: f64 = 8.0;
/// Modifier-key rotation snapping step.
pub const ROTATION_STEP_DEG: f64 = 15.0;
/// Free rotation snaps to a cardinal angle within this margin.
pub const CARDINAL_SNAP_DEG: f64 = 2.0;

/// Corner positions of a box selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Kind of selection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Corner(Corner),
    Edge(AnchorSide),
    /// Line endpoint (0 = start, 1 = end).
    Endpoint(u8),
    Rotate,
}

/// A handle with its world position.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
    pub position: Point,
    pub kind: HandleKind,
}

impl Handle {
    pub fn new(position: Point, kind: HandleKind) -> Self {
        Self { position, kind }
    }

    /// Whether a world point falls within `tolerance` of this handle.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let dx = point.x - self.position.x;
        let dy = point.y - self.position.y;
        dx * dx + dy * dy <= tolerance * tolerance
    }
}

/// Handles for the current primary selection.
pub fn handles_for(element: &Element) -> Vec<Handle> {
    match &element.kind {
        ElementKind::Connector { .. } => Vec::new(),
        ElementKind::Line => {
            let (start, end) = element.line_endpoints();
            vec![
                Handle::new(start, HandleKind::Endpoint(0)),
                Handle::new(end, HandleKind::Endpoint(1)),
            ]
        }
        ElementKind::Freehand { .. } => corner_handles(element),
        _ => {
            let mut handles = corner_handles(element);
            handles.extend(edge_handles(element));
            if element.supports_rotation() {
                handles.push(rotate_handle(element));
            }
            handles
        }
    }
}

/// First handle under a world point, corners before edges.
pub fn handle_at(element: &Element, point: Point, tolerance: f64) -> Option<HandleKind> {
    handles_for(element)
        .iter()
        .find(|h| h.hit_test(point, tolerance))
        .map(|h| h.kind)
}

fn corner_handles(element: &Element) -> Vec<Handle> {
    let bounds = element.bounds();
    let center = bounds.center();
    let angle = element.rotation().to_radians();
    let place = |x: f64, y: f64, corner: Corner| {
        Handle::new(
            rotate_point(Point::new(x, y), center, angle),
            HandleKind::Corner(corner),
        )
    };
    vec![
        place(bounds.x0, bounds.y0, Corner::TopLeft),
        place(bounds.x1, bounds.y0, Corner::TopRight),
        place(bounds.x0, bounds.y1, Corner::BottomLeft),
        place(bounds.x1, bounds.y1, Corner::BottomRight),
    ]
}

fn edge_handles(element: &Element) -> Vec<Handle> {
    let bounds = element.bounds();
    let center = bounds.center();
    let angle = element.rotation().to_radians();
    let place = |x: f64, y: f64, side: AnchorSide| {
        Handle::new(
            rotate_point(Point::new(x, y), center, angle),
            HandleKind::Edge(side),
        )
    };
    vec![
        place(center.x, bounds.y0, AnchorSide::Top),
        place(bounds.x1, center.y, AnchorSide::Right),
        place(center.x, bounds.y1, AnchorSide::Bottom),
        place(bounds.x0, center.y, AnchorSide::Left),
    ]
}

fn rotate_handle(element: &Element) -> Handle {
    let bounds = element.bounds();
    let center = bounds.center();
    let angle = element.rotation().to_radians();
    let above = Point::new(center.x, bounds.y0 - ROTATE_HANDLE_OFFSET);
    Handle::new(rotate_point(above, center, angle), HandleKind::Rotate)
}

/// Recompute an element's box from its state at grab time and the current
/// pointer. For rotated elements the pointer is un-rotated into the local
/// frame, the box is resized there, and the new center is rotated back so
/// the opposite corner or edge stays put in world space.
pub fn apply_resize(start: &Element, kind: HandleKind, pointer: Point) -> Option<Element> {
    match kind {
        HandleKind::Rotate => None,
        HandleKind::Endpoint(which) => resize_line(start, which, pointer),
        HandleKind::Corner(_) | HandleKind::Edge(_) => match &start.kind {
            ElementKind::Freehand { .. } => resize_freehand(start, kind, pointer),
            ElementKind::Line | ElementKind::Connector { .. } => None,
            _ => resize_box(start, kind, pointer),
        },
    }
}

fn resize_box(start: &Element, kind: HandleKind, pointer: Point) -> Option<Element> {
    let (x0, y0, x1, y1) = resized_local_box(start, kind, pointer)?;
    let bounds = start.bounds();
    let angle = start.rotation().to_radians();
    let local_center = Point::new((x0 + x1) / 2.0, (y0 + y1) / 2.0);
    let world_center = rotate_point(local_center, bounds.center(), angle);

    let mut element = start.clone();
    element.width = x1 - x0;
    element.height = y1 - y0;
    element.x = world_center.x - element.width / 2.0;
    element.y = world_center.y - element.height / 2.0;
    Some(element)
}

fn resize_freehand(start: &Element, kind: HandleKind, pointer: Point) -> Option<Element> {
    let (x0, y0, x1, y1) = resized_local_box(start, kind, pointer)?;
    let bounds = start.bounds();
    let sx = (x1 - x0) / bounds.width().max(1e-9);
    let sy = (y1 - y0) / bounds.height().max(1e-9);

    let mut element = start.clone();
    element.x = x0;
    element.y = y0;
    element.width = x1 - x0;
    element.height = y1 - y0;
    if let ElementKind::Freehand { points, .. } = &mut element.kind {
        for p in points.iter_mut() {
            p.x *= sx;
            p.y *= sy;
        }
    }
    Some(element)
}

/// New local-frame box after dragging `kind` to the (un-rotated) pointer,
/// clamped to the minimum size so edges never cross.
fn resized_local_box(
    start: &Element,
    kind: HandleKind,
    pointer: Point,
) -> Option<(f64, f64, f64, f64)> {
    let bounds = start.bounds();
    let angle = start.rotation().to_radians();
    let local = rotate_point(pointer, bounds.center(), -angle);

    let (mut x0, mut y0, mut x1, mut y1) = (bounds.x0, bounds.y0, bounds.x1, bounds.y1);
    match kind {
        HandleKind::Corner(Corner::TopLeft) => {
            x0 = local.x;
            y0 = local.y;
        }
        HandleKind::Corner(Corner::TopRight) => {
            x1 = local.x;
            y0 = local.y;
        }
        HandleKind::Corner(Corner::BottomLeft) => {
            x0 = local.x;
            y1 = local.y;
        }
        HandleKind::Corner(Corner::BottomRight) => {
            x1 = local.x;
            y1 = local.y;
        }
        HandleKind::Edge(AnchorSide::Top) => y0 = local.y,
        HandleKind::Edge(AnchorSide::Right) => x1 = local.x,
        HandleKind::Edge(AnchorSide::Bottom) => y1 = local.y,
        HandleKind::Edge(AnchorSide::Left) => x0 = local.x,
        HandleKind::Endpoint(_) | HandleKind::Rotate => return None,
    }

    if x0 != bounds.x0 {
        x0 = x0.min(x1 - MIN_ELEMENT_SIZE);
    } else {
        x1 = x1.max(x0 + MIN_ELEMENT_SIZE);
    }
    if y0 != bounds.y0 {
        y0 = y0.min(y1 - MIN_ELEMENT_SIZE);
    } else {
        y1 = y1.max(y0 + MIN_ELEMENT_SIZE);
    }
    Some((x0, y0, x1, y1))
}

/// Move one endpoint of a line, keeping its drawn direction signed.
fn resize_line(start: &Element, which: u8, pointer: Point) -> Option<Element> {
    if !matches!(start.kind, ElementKind::Line) {
        return None;
    }
    let (mut a, mut b) = start.line_endpoints();
    if which == 0 {
        a = pointer;
    } else {
        b = pointer;
    }
    let mut element = start.clone();
    element.x = a.x;
    element.y = a.y;
    element.width = b.x - a.x;
    element.height = b.y - a.y;
    Some(element)
}

/// Rotation implied by a pointer position during a rotate drag: the angle
/// swept from the grab point, added to the rotation at grab time.
pub fn rotation_from_pointer(
    center: Point,
    grab: Point,
    pointer: Point,
    start_rotation: f64,
) -> f64 {
    let grab_angle = (grab.y - center.y).atan2(grab.x - center.x);
    let pointer_angle = (pointer.y - center.y).atan2(pointer.x - center.x);
    let swept = (pointer_angle - grab_angle).to_degrees();
    normalize_deg(start_rotation + swept)
}

/// Snap a rotation angle: to 15 degree steps while the modifier is held,
/// otherwise to the nearest cardinal when within a small margin.
pub fn snap_rotation(degrees: f64, step_snap: bool) -> f64 {
    let degrees = normalize_deg(degrees);
    if step_snap {
        return normalize_deg((degrees / ROTATION_STEP_DEG).round() * ROTATION_STEP_DEG);
    }
    for cardinal in [0.0, 90.0, 180.0, 270.0, 360.0] {
        if (degrees - cardinal).abs() <= CARDINAL_SNAP_DEG {
            return normalize_deg(cardinal);
        }
    }
    degrees
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::palette;
    use crate::element::ElementType;
    use uuid::Uuid;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Element {
        Element::new(ElementType::Rectangle, Uuid::new_v4(), x, y, w, h, Uuid::new_v4())
    }

    #[test]
    fn test_handle_layout_per_kind() {
        let boxed = rect(0.0, 0.0, 100.0, 50.0);
        let handles = handles_for(&boxed);
        // 4 corners + 4 edges + rotate.
        assert_eq!(handles.len(), 9);
        assert!(matches!(handles[0].kind, HandleKind::Corner(Corner::TopLeft)));
        assert!(matches!(handles.last().unwrap().kind, HandleKind::Rotate));

        let frame = Element::new(
            ElementType::Frame,
            boxed.board_id,
            0.0,
            0.0,
            400.0,
            300.0,
            boxed.created_by,
        );
        assert_eq!(handles_for(&frame).len(), 8);

        let line = Element::new(
            ElementType::Line,
            boxed.board_id,
            0.0,
            0.0,
            120.0,
            -40.0,
            boxed.created_by,
        );
        let line_handles = handles_for(&line);
        assert_eq!(line_handles.len(), 2);
        assert_eq!(line_handles[1].position, Point::new(120.0, -40.0));

        let connector = Element::new_connector(
            boxed.board_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            boxed.created_by,
        );
        assert!(handles_for(&connector).is_empty());
    }

    #[test]
    fn test_rotated_corner_handle_position() {
        let mut e = rect(0.0, 0.0, 100.0, 100.0);
        e.set_rotation(90.0);
        // Top-left corner swings to the top-right under a quarter turn.
        let handles = handles_for(&e);
        let tl = handles[0].position;
        assert!((tl.x - 100.0).abs() < 1e-9);
        assert!((tl.y - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_handle_at_respects_tolerance() {
        let e = rect(0.0, 0.0, 100.0, 100.0);
        assert_eq!(
            handle_at(&e, Point::new(102.0, 98.0), 10.0),
            Some(HandleKind::Corner(Corner::BottomRight))
        );
        assert_eq!(handle_at(&e, Point::new(50.0, 50.0), 10.0), None);
        assert_eq!(
            handle_at(&e, Point::new(50.0, -ROTATE_HANDLE_OFFSET), 10.0),
            Some(HandleKind::Rotate)
        );
    }

    #[test]
    fn test_unrotated_corner_resize() {
        let e = rect(10.0, 10.0, 100.0, 50.0);
        let resized = apply_resize(
            &e,
            HandleKind::Corner(Corner::BottomRight),
            Point::new(160.0, 110.0),
        )
        .unwrap();
        assert_eq!((resized.x, resized.y), (10.0, 10.0));
        assert_eq!((resized.width, resized.height), (150.0, 100.0));
    }

    #[test]
    fn test_resize_enforces_minimum_size() {
        let e = rect(0.0, 0.0, 100.0, 100.0);
        // Drag the right edge far past the left one.
        let resized = apply_resize(
            &e,
            HandleKind::Edge(AnchorSide::Right),
            Point::new(-500.0, 50.0),
        )
        .unwrap();
        assert_eq!(resized.width, MIN_ELEMENT_SIZE);
        assert_eq!(resized.x, 0.0);
    }

    #[test]
    fn test_edge_resize_moves_one_axis() {
        let e = rect(0.0, 0.0, 100.0, 100.0);
        let resized = apply_resize(
            &e,
            HandleKind::Edge(AnchorSide::Top),
            Point::new(999.0, -20.0),
        )
        .unwrap();
        assert_eq!(resized.width, 100.0);
        assert_eq!(resized.height, 120.0);
        assert_eq!(resized.y, -20.0);
        assert_eq!(resized.x, 0.0);
    }

    #[test]
    fn test_rotated_resize_keeps_opposite_corner_anchored() {
        let mut e = rect(0.0, 0.0, 100.0, 60.0);
        e.set_rotation(30.0);
        let angle = 30f64.to_radians();
        let anchor_before = rotate_point(Point::new(0.0, 0.0), e.bounds().center(), angle);

        // Grab the bottom-right handle and pull outward in world space.
        let grab = rotate_point(Point::new(100.0, 60.0), e.bounds().center(), angle);
        let resized = apply_resize(
            &e,
            HandleKind::Corner(Corner::BottomRight),
            Point::new(grab.x + 25.0, grab.y + 13.0),
        )
        .unwrap();

        let anchor_after = rotate_point(
            Point::new(resized.bounds().x0, resized.bounds().y0),
            resized.bounds().center(),
            angle,
        );
        assert!((anchor_before.x - anchor_after.x).abs() < 1e-6);
        assert!((anchor_before.y - anchor_after.y).abs() < 1e-6);
        assert!(resized.width > 100.0);
    }

    #[test]
    fn test_line_endpoint_resize_keeps_direction() {
        let line = Element::new(
            ElementType::Line,
            Uuid::new_v4(),
            50.0,
            80.0,
            -30.0,
            40.0,
            Uuid::new_v4(),
        );
        let moved = apply_resize(&line, HandleKind::Endpoint(1), Point::new(0.0, 0.0)).unwrap();
        let (a, b) = moved.line_endpoints();
        assert_eq!(a, Point::new(50.0, 80.0));
        assert_eq!(b, Point::new(0.0, 0.0));
        assert_eq!((moved.width, moved.height), (-50.0, -80.0));
    }

    #[test]
    fn test_freehand_resize_scales_points() {
        let stroke = Element::new_freehand(
            Uuid::new_v4(),
            &[Point::new(0.0, 0.0), Point::new(50.0, 100.0)],
            palette::STROKE,
            Uuid::new_v4(),
        );
        let resized = apply_resize(
            &stroke,
            HandleKind::Corner(Corner::BottomRight),
            Point::new(100.0, 200.0),
        )
        .unwrap();
        assert_eq!((resized.width, resized.height), (100.0, 200.0));
        let ElementKind::Freehand { points, .. } = &resized.kind else {
            panic!("expected freehand");
        };
        assert_eq!(points[1], Point::new(100.0, 200.0));
    }

    #[test]
    fn test_rotation_from_pointer_sweep() {
        let center = Point::new(0.0, 0.0);
        let grab = Point::new(10.0, 0.0);
        // Quarter turn clockwise in y-down coordinates.
        let angle = rotation_from_pointer(center, grab, Point::new(0.0, 10.0), 0.0);
        assert!((angle - 90.0).abs() < 1e-9);

        let carried = rotation_from_pointer(center, grab, Point::new(0.0, 10.0), 45.0);
        assert!((carried - 135.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_snapping() {
        assert_eq!(snap_rotation(88.5, false), 90.0);
        assert_eq!(snap_rotation(359.0, false), 0.0);
        assert_eq!(snap_rotation(47.0, false), 47.0);
        assert_eq!(snap_rotation(47.0, true), 45.0);
        assert_eq!(snap_rotation(8.0, true), 15.0);
    }
}
