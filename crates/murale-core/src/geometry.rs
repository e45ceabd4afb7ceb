//! Geometry helpers shared by hit-testing, manipulation and rendering.

use kurbo::{Point, Rect};

/// Rotate `point` around `center` by `angle` radians (positive is clockwise
/// in the y-down board coordinate system).
pub fn rotate_point(point: Point, center: Point, angle: f64) -> Point {
    let (sin, cos) = angle.sin_cos();
    let d = point - center;
    Point::new(
        center.x + d.x * cos - d.y * sin,
        center.y + d.x * sin + d.y * cos,
    )
}

/// Distance from a point to the segment a→b.
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    let seg = b - a;
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return (point - a).hypot();
    }
    let t = ((point - a).dot(seg) / len_sq).clamp(0.0, 1.0);
    (point - (a + seg * t)).hypot()
}

/// Minimum distance from a point to a polyline.
pub fn point_to_polyline_dist(point: Point, points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|w| point_to_segment_dist(point, w[0], w[1]))
        .fold(f64::INFINITY, f64::min)
}

/// Whether `point` lies inside `bounds` rotated by `rotation` degrees about
/// its center. The point is rotated back into the box's local frame first.
pub fn rotated_box_contains(bounds: Rect, rotation: f64, point: Point) -> bool {
    if rotation == 0.0 {
        return bounds.contains(point);
    }
    let local = rotate_point(point, bounds.center(), -rotation.to_radians());
    bounds.contains(local)
}

/// Axis-aligned overlap test. Touching edges do not count as overlap.
pub fn rects_overlap(a: Rect, b: Rect) -> bool {
    a.x0 < b.x1 && b.x0 < a.x1 && a.y0 < b.y1 && b.y0 < a.y1
}

/// Whether `inner` is fully contained in `outer` (edges may touch).
pub fn rect_contains_rect(outer: Rect, inner: Rect) -> bool {
    inner.x0 >= outer.x0 && inner.y0 >= outer.y0 && inner.x1 <= outer.x1 && inner.y1 <= outer.y1
}

/// Shrink a rectangle by `margin` on every side. Collapses to the center
/// point when the margin exceeds half the extent.
pub fn shrink_rect(rect: Rect, margin: f64) -> Rect {
    let c = rect.center();
    Rect::new(
        (rect.x0 + margin).min(c.x),
        (rect.y0 + margin).min(c.y),
        (rect.x1 - margin).max(c.x),
        (rect.y1 - margin).max(c.y),
    )
}

/// Point where the ray from the center of `bounds` toward `target` crosses
/// the rectangle boundary. Falls back to the center for a zero-length ray.
pub fn rect_edge_toward(bounds: Rect, target: Point) -> Point {
    let c = bounds.center();
    let d = target - c;
    if d.hypot2() < f64::EPSILON {
        return c;
    }
    let half_w = bounds.width() / 2.0;
    let half_h = bounds.height() / 2.0;
    let tx = if d.x.abs() < f64::EPSILON {
        f64::INFINITY
    } else {
        half_w / d.x.abs()
    };
    let ty = if d.y.abs() < f64::EPSILON {
        f64::INFINITY
    } else {
        half_h / d.y.abs()
    };
    let t = tx.min(ty);
    if !t.is_finite() {
        return c;
    }
    c + d * t
}

/// Point where the ray from the center of `bounds` toward `target` crosses
/// the inscribed ellipse boundary.
pub fn ellipse_edge_toward(bounds: Rect, target: Point) -> Point {
    let c = bounds.center();
    let d = target - c;
    if d.hypot2() < f64::EPSILON {
        return c;
    }
    let a = (bounds.width() / 2.0).max(f64::EPSILON);
    let b = (bounds.height() / 2.0).max(f64::EPSILON);
    let t = 1.0 / ((d.x / a).powi(2) + (d.y / b).powi(2)).sqrt();
    c + d * t
}

/// Point where the ray from the rotated box center toward `target` leaves
/// the box, honoring the box rotation in degrees. `elliptical` switches the
/// boundary between the box edge and the inscribed ellipse.
pub fn rotated_edge_toward(bounds: Rect, rotation: f64, target: Point, elliptical: bool) -> Point {
    let center = bounds.center();
    let rad = rotation.to_radians();
    let local_target = rotate_point(target, center, -rad);
    let local_edge = if elliptical {
        ellipse_edge_toward(bounds, local_target)
    } else {
        rect_edge_toward(bounds, local_target)
    };
    rotate_point(local_edge, center, rad)
}

/// Normalize an angle in degrees to the half-open range [0, 360).
pub fn normalize_deg(angle: f64) -> f64 {
    let a = angle % 360.0;
    if a < 0.0 { a + 360.0 } else { a }
}
