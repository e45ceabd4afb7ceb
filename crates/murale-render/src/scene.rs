//! Backend-neutral display list built once per frame.
//!
//! The pipeline appends [`DrawItem`]s in paint order; a backend walks the
//! list and rasterizes it with whatever graphics API it owns. Paths are
//! in world coordinates under the item's transform, so screen-space
//! layers (peer cursors, labels) simply carry the identity transform.

use kurbo::{Affine, BezPath, Point};
use peniko::Color;

/// One draw call.
#[derive(Debug, Clone)]
pub enum DrawItem {
    Fill {
        transform: Affine,
        color: Color,
        path: BezPath,
    },
    Stroke {
        transform: Affine,
        color: Color,
        width: f64,
        /// On/off dash lengths; `None` is a solid stroke.
        dashes: Option<[f64; 2]>,
        path: BezPath,
    },
    /// Pre-wrapped text. `origin` is the top-left of the first line;
    /// each following line advances by `line_height`.
    Text {
        transform: Affine,
        color: Color,
        origin: Point,
        font_size: f64,
        line_height: f64,
        lines: Vec<String>,
    },
}

/// Display list for a single frame.
#[derive(Debug, Default)]
pub struct Scene {
    items: Vec<DrawItem>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear for the next frame, keeping the allocation.
    pub fn reset(&mut self) {
        self.items.clear();
    }

    pub fn items(&self) -> &[DrawItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn fill(&mut self, transform: Affine, color: Color, path: BezPath) {
        self.items.push(DrawItem::Fill {
            transform,
            color,
            path,
        });
    }

    pub fn stroke(&mut self, transform: Affine, color: Color, width: f64, path: BezPath) {
        self.items.push(DrawItem::Stroke {
            transform,
            color,
            width,
            dashes: None,
            path,
        });
    }

    pub fn stroke_dashed(
        &mut self,
        transform: Affine,
        color: Color,
        width: f64,
        dashes: [f64; 2],
        path: BezPath,
    ) {
        self.items.push(DrawItem::Stroke {
            transform,
            color,
            width,
            dashes: Some(dashes),
            path,
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn text(
        &mut self,
        transform: Affine,
        color: Color,
        origin: Point,
        font_size: f64,
        line_height: f64,
        lines: Vec<String>,
    ) {
        self.items.push(DrawItem::Text {
            transform,
            color,
            origin,
            font_size,
            line_height,
            lines,
        });
    }
}

/// Counters sampled while building one frame, for diagnostics and
/// adaptive behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// The backing surface changed size this frame.
    pub surface_resized: bool,
    pub elements_total: usize,
    pub elements_drawn: usize,
    pub elements_culled: usize,
    pub connectors_drawn: usize,
    /// Fresh line-wrap computations (cache misses) this frame.
    pub text_layouts: usize,
    pub grid_dots: usize,
    /// Below the zoom threshold, elements drew as flat boxes.
    pub lod_active: bool,
    pub draw_items: usize,
}
