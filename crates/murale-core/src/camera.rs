//! Viewport transform between board (world) space and screen space.

use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Lower zoom clamp.
pub const MIN_ZOOM: f64 = 0.1;
/// Upper zoom clamp.
pub const MAX_ZOOM: f64 = 4.0;

/// Host-facing viewport state: screen-space pan offset plus zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

/// Pan/zoom camera. Screen = world * zoom + offset.
#[derive(Debug, Clone)]
pub struct Camera {
    pub offset: Vec2,
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// World-to-screen transform.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.zoom)
    }

    /// Screen-to-world transform.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.zoom) * Affine::translate(-self.offset)
    }

    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        self.inverse_transform() * screen_point
    }

    pub fn world_to_screen(&self, world_point: Point) -> Point {
        self.transform() * world_point
    }

    /// Convert a screen-pixel length (hit tolerances, snap radii) to world
    /// units at the current zoom.
    pub fn screen_len_to_world(&self, len: f64) -> f64 {
        len / self.zoom
    }

    /// Pan by a screen-space delta.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Multiply zoom by `factor`, keeping `screen_point` over the same
    /// world point.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        let new_zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        if (new_zoom - self.zoom).abs() < f64::EPSILON {
            return;
        }
        let anchor = self.screen_to_world(screen_point);
        self.zoom = new_zoom;
        let drifted = self.world_to_screen(anchor);
        self.offset += Vec2::new(screen_point.x - drifted.x, screen_point.y - drifted.y);
    }

    /// World rectangle currently visible in a viewport of `size` pixels.
    pub fn visible_world_rect(&self, size: Size) -> Rect {
        let top_left = self.screen_to_world(Point::ZERO);
        let bottom_right = self.screen_to_world(Point::new(size.width, size.height));
        Rect::from_points(top_left, bottom_right)
    }

    /// Center `bounds` in a viewport of `size` pixels with uniform padding.
    pub fn fit_to_bounds(&mut self, bounds: Rect, size: Size, padding: f64) {
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            return;
        }
        let inner_w = (size.width - padding * 2.0).max(1.0);
        let inner_h = (size.height - padding * 2.0).max(1.0);
        self.zoom = (inner_w / bounds.width())
            .min(inner_h / bounds.height())
            .clamp(MIN_ZOOM, MAX_ZOOM);
        let center = bounds.center();
        self.offset = Vec2::new(
            size.width / 2.0 - center.x * self.zoom,
            size.height / 2.0 - center.y * self.zoom,
        );
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            x: self.offset.x,
            y: self.offset.y,
            zoom: self.zoom,
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.offset = Vec2::new(viewport.x, viewport.y);
        self.zoom = viewport.zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_at_default() {
        let camera = Camera::new();
        let p = Point::new(100.0, 200.0);
        let w = camera.screen_to_world(p);
        assert!((w.x - 100.0).abs() < f64::EPSILON);
        assert!((w.y - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_offset_and_zoom_mapping() {
        let mut camera = Camera::new();
        camera.offset = Vec2::new(50.0, -30.0);
        camera.zoom = 2.0;
        let w = camera.screen_to_world(Point::new(150.0, 70.0));
        assert!((w.x - 50.0).abs() < 1e-12);
        assert!((w.y - 50.0).abs() < 1e-12);
        let s = camera.world_to_screen(w);
        assert!((s.x - 150.0).abs() < 1e-10);
        assert!((s.y - 70.0).abs() < 1e-10);
    }

    #[test]
    fn test_zoom_at_keeps_anchor_fixed() {
        let mut camera = Camera::new();
        camera.offset = Vec2::new(12.0, 34.0);
        let anchor_screen = Point::new(400.0, 300.0);
        let anchor_world = camera.screen_to_world(anchor_screen);
        camera.zoom_at(anchor_screen, 1.7);
        let after = camera.world_to_screen(anchor_world);
        assert!((after.x - anchor_screen.x).abs() < 1e-9);
        assert!((after.y - anchor_screen.y).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_clamps_to_range() {
        let mut camera = Camera::new();
        camera.zoom_at(Point::ZERO, 1e-6);
        assert!((camera.zoom - MIN_ZOOM).abs() < f64::EPSILON);
        camera.zoom_at(Point::ZERO, 1e6);
        assert!((camera.zoom - MAX_ZOOM).abs() < f64::EPSILON);
    }

    #[test]
    fn test_visible_world_rect_scales_with_zoom() {
        let mut camera = Camera::new();
        camera.zoom = 2.0;
        let rect = camera.visible_world_rect(Size::new(800.0, 600.0));
        assert!((rect.width() - 400.0).abs() < 1e-12);
        assert!((rect.height() - 300.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_to_bounds_centers_content() {
        let mut camera = Camera::new();
        camera.fit_to_bounds(
            Rect::new(0.0, 0.0, 400.0, 300.0),
            Size::new(800.0, 600.0),
            40.0,
        );
        let center = camera.world_to_screen(Point::new(200.0, 150.0));
        assert!((center.x - 400.0).abs() < 1e-9);
        assert!((center.y - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_viewport_round_trip() {
        let mut camera = Camera::new();
        camera.set_viewport(Viewport {
            x: 5.0,
            y: -7.0,
            zoom: 9.0,
        });
        assert!((camera.zoom - MAX_ZOOM).abs() < f64::EPSILON);
        let v = camera.viewport();
        assert_eq!((v.x, v.y), (5.0, -7.0));
        assert!((camera.screen_len_to_world(8.0) - 2.0).abs() < f64::EPSILON);
    }
}
