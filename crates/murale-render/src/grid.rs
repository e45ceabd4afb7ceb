//! Adaptive dot grid.
//!
//! Dots sit on a world-space lattice whose spacing doubles as the view
//! zooms out, so the screen density stays readable and the dot count
//! stays bounded. All dots batch into a single fill.

use kurbo::{BezPath, Point, Size};
use murale_core::Camera;
use peniko::Color;

use crate::scene::Scene;

/// World-unit spacing between dots at zoom 1.
pub const GRID_BASE_SPACING: f64 = 32.0;
/// Hard ceiling on dots per frame.
pub const GRID_MAX_DOTS: usize = 4000;
/// Screen-space spacing below which the lattice coarsens.
const MIN_SCREEN_SPACING: f64 = 14.0;
/// Dot half-size in screen pixels.
const DOT_RADIUS_PX: f64 = 1.5;
const BASE_ALPHA: f64 = 70.0;
/// Dots are fully faded out at this zoom and below.
const FADE_LOW_ZOOM: f64 = 0.1;
/// Dots are at full opacity at this zoom and above.
const FADE_FULL_ZOOM: f64 = 0.4;

/// Lattice spacing in world units for `zoom`.
pub fn grid_spacing(zoom: f64) -> f64 {
    let mut spacing = GRID_BASE_SPACING;
    while spacing * zoom < MIN_SCREEN_SPACING {
        spacing *= 2.0;
    }
    spacing
}

fn grid_alpha(zoom: f64) -> u8 {
    let t = ((zoom - FADE_LOW_ZOOM) / (FADE_FULL_ZOOM - FADE_LOW_ZOOM)).clamp(0.0, 1.0);
    (BASE_ALPHA * t) as u8
}

/// Push the visible dot lattice into `scene`. Returns the dot count.
pub fn draw_grid(scene: &mut Scene, camera: &Camera, viewport_size: Size) -> usize {
    let zoom = camera.zoom();
    let alpha = grid_alpha(zoom);
    if alpha == 0 {
        return 0;
    }

    let visible = camera.visible_world_rect(viewport_size);
    let mut spacing = grid_spacing(zoom);
    loop {
        let cols = (visible.width() / spacing).ceil() as usize + 1;
        let rows = (visible.height() / spacing).ceil() as usize + 1;
        if cols.saturating_mul(rows) <= GRID_MAX_DOTS {
            break;
        }
        spacing *= 2.0;
    }

    // Constant screen size regardless of zoom.
    let dot = DOT_RADIUS_PX / zoom;
    let start_x = (visible.x0 / spacing).floor() * spacing;
    let start_y = (visible.y0 / spacing).floor() * spacing;

    let mut path = BezPath::new();
    let mut count = 0;
    let mut x = start_x;
    while x <= visible.x1 {
        let mut y = start_y;
        while y <= visible.y1 {
            // A small square per dot is cheaper than an ellipse.
            path.move_to(Point::new(x - dot, y - dot));
            path.line_to(Point::new(x + dot, y - dot));
            path.line_to(Point::new(x + dot, y + dot));
            path.line_to(Point::new(x - dot, y + dot));
            path.close_path();
            count += 1;
            y += spacing;
        }
        x += spacing;
    }

    scene.fill(
        camera.transform(),
        Color::from_rgba8(160, 160, 160, alpha),
        path,
    );
    count
}
