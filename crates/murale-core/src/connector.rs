//! Connector geometry: live endpoint resolution and route expansion.
//!
//! Connectors carry no geometry of their own. Every frame (and every hit
//! test) re-resolves both referenced elements, clips the segment to their
//! rotated edges, and expands the stored route kind into points.

use kurbo::{ParamCurve, Point, QuadBez};

use crate::element::{ConnectorRoute, Element, ElementKind};
use crate::geometry::rotated_edge_toward;
use crate::store::BoardStore;

/// Segments used to approximate a curved route for hit-testing.
const CURVE_SAMPLES: usize = 16;

/// Resolve a connector's endpoints against the live store, clipped to each
/// shape's rotated edge. `None` when either referenced element is missing
/// or not connectable; such a connector is inert.
pub fn resolve_endpoints(store: &BoardStore, connector: &Element) -> Option<(Point, Point)> {
    let (from_id, to_id) = connector.connector_endpoints()?;
    let from = store.get(from_id)?;
    let to = store.get(to_id)?;
    if !from.is_connectable() || !to.is_connectable() {
        return None;
    }
    let start = attach_point(from, to.center());
    let end = attach_point(to, from.center());
    Some((start, end))
}

/// Edge point of `element` facing `toward`, honoring rotation and circular
/// geometry.
pub fn attach_point(element: &Element, toward: Point) -> Point {
    let elliptical = matches!(element.kind, ElementKind::Circle { .. });
    rotated_edge_toward(element.bounds(), element.rotation(), toward, elliptical)
}

/// Control point of the quadratic used for curved routes: the midpoint
/// bowed perpendicular to the chord.
pub fn curve_control(start: Point, end: Point) -> Point {
    let chord = end - start;
    let len = chord.hypot();
    if len < f64::EPSILON {
        return start;
    }
    let mid = start.midpoint(end);
    let normal = kurbo::Vec2::new(chord.y / len, -chord.x / len);
    let bow = (len * 0.18).clamp(16.0, 80.0);
    mid + normal * bow
}

/// Expand a route into a polyline. Curved routes are sampled; callers that
/// need the exact curve use `curve_control` directly.
pub fn route_points(start: Point, end: Point, route: ConnectorRoute) -> Vec<Point> {
    match route {
        ConnectorRoute::Straight => vec![start, end],
        ConnectorRoute::Elbow => {
            let dx = (end.x - start.x).abs();
            let dy = (end.y - start.y).abs();
            if dx >= dy {
                let mx = (start.x + end.x) / 2.0;
                vec![
                    start,
                    Point::new(mx, start.y),
                    Point::new(mx, end.y),
                    end,
                ]
            } else {
                let my = (start.y + end.y) / 2.0;
                vec![
                    start,
                    Point::new(start.x, my),
                    Point::new(end.x, my),
                    end,
                ]
            }
        }
        ConnectorRoute::Curved => {
            let quad = QuadBez::new(start, curve_control(start, end), end);
            (0..=CURVE_SAMPLES)
                .map(|i| quad.eval(i as f64 / CURVE_SAMPLES as f64))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementType, UserId};
    use uuid::Uuid;

    fn boxed_at(store: &mut BoardStore, x: f64, y: f64) -> Uuid {
        let e = Element::new(
            ElementType::Rectangle,
            store.board_id(),
            x,
            y,
            100.0,
            60.0,
            UserId::new_v4(),
        );
        let id = e.id;
        store.insert(e);
        id
    }

    #[test]
    fn test_resolve_clips_to_facing_edges() {
        let mut store = BoardStore::new(Uuid::new_v4());
        let a = boxed_at(&mut store, 0.0, 0.0);
        let b = boxed_at(&mut store, 300.0, 0.0);
        let connector = Element::new_connector(store.board_id(), a, b, UserId::new_v4());
        let (start, end) = resolve_endpoints(&store, &connector).unwrap();
        // Horizontal neighbors connect right edge to left edge.
        assert!((start.x - 100.0).abs() < 1e-9);
        assert!((start.y - 30.0).abs() < 1e-9);
        assert!((end.x - 300.0).abs() < 1e-9);
        assert!((end.y - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_missing_endpoint_is_inert() {
        let mut store = BoardStore::new(Uuid::new_v4());
        let a = boxed_at(&mut store, 0.0, 0.0);
        let connector =
            Element::new_connector(store.board_id(), a, Uuid::new_v4(), UserId::new_v4());
        assert!(resolve_endpoints(&store, &connector).is_none());
    }

    #[test]
    fn test_resolve_rejects_connector_endpoint() {
        let mut store = BoardStore::new(Uuid::new_v4());
        let a = boxed_at(&mut store, 0.0, 0.0);
        let b = boxed_at(&mut store, 300.0, 0.0);
        let first = Element::new_connector(store.board_id(), a, b, UserId::new_v4());
        let first_id = first.id;
        store.insert(first);
        let second = Element::new_connector(store.board_id(), a, first_id, UserId::new_v4());
        assert!(resolve_endpoints(&store, &second).is_none());
    }

    #[test]
    fn test_straight_and_elbow_routes() {
        let s = Point::new(0.0, 0.0);
        let e = Point::new(100.0, 20.0);
        assert_eq!(route_points(s, e, ConnectorRoute::Straight).len(), 2);

        let elbow = route_points(s, e, ConnectorRoute::Elbow);
        assert_eq!(elbow.len(), 4);
        assert_eq!(elbow[1], Point::new(50.0, 0.0));
        assert_eq!(elbow[2], Point::new(50.0, 20.0));

        let tall = route_points(s, Point::new(20.0, 100.0), ConnectorRoute::Elbow);
        assert_eq!(tall[1], Point::new(0.0, 50.0));
    }

    #[test]
    fn test_curved_route_passes_near_control() {
        let s = Point::new(0.0, 0.0);
        let e = Point::new(200.0, 0.0);
        let pts = route_points(s, e, ConnectorRoute::Curved);
        assert_eq!(pts.len(), CURVE_SAMPLES + 1);
        assert_eq!(pts[0], s);
        assert_eq!(pts[CURVE_SAMPLES], e);
        // The chord is horizontal, so the bow shows up as a y excursion.
        let max_dev = pts.iter().map(|p| p.y.abs()).fold(0.0, f64::max);
        assert!(max_dev > 5.0);
    }

    #[test]
    fn test_curve_control_degenerate_chord() {
        let p = Point::new(3.0, 4.0);
        assert_eq!(curve_control(p, p), p);
    }
}
