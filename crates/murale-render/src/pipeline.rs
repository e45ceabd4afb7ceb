//! Frame construction.
//!
//! [`RenderPipeline::build_frame`] turns a [`RenderContext`] into a
//! display list in a fixed paint order: background, grid, culled
//! elements (flat boxes below the zoom threshold), connectors resolved
//! against live endpoint geometry, interaction affordances, and peer
//! cursors in screen space.

use kurbo::{Affine, BezPath, Ellipse, Point, Rect, Shape as _, Size, Vec2};
use murale_core::color::palette;
use murale_core::connector::{curve_control, resolve_endpoints, route_points};
use murale_core::element::{
    ConnectorRoute, DEFAULT_STROKE_WIDTH, Element, ElementKind, ElementType, LineStyle, UserId,
};
use murale_core::geometry::rects_overlap;
use murale_core::gesture::Gesture;
use murale_core::handles::{Handle, HandleKind, handles_for};
use peniko::Color;

use crate::context::RenderContext;
use crate::grid::draw_grid;
use crate::scene::{FrameStats, Scene};
use crate::text::TextLayoutCache;

/// Zoom below which elements draw as flat boxes and ellipses.
pub const LOD_ZOOM_THRESHOLD: f64 = 0.3;

const STICKY_SHADOW_OFFSET: f64 = 3.0;
const TEXT_INSET: f64 = 8.0;
const FRAME_LABEL_SIZE: f64 = 12.0;
const ARROWHEAD_LEN: f64 = 10.0;
const ARROWHEAD_ANGLE: f64 = std::f64::consts::PI / 6.0;
/// On/off dash pattern for dashed connectors, in world units.
const CONNECTOR_DASH: [f64; 2] = [8.0, 6.0];

const SHADOW_COLOR: Color = Color::from_rgba8(15, 23, 42, 36);
const HOVER_COLOR: Color = Color::from_rgba8(59, 130, 246, 140);
/// Emerald highlight for a connector drag's snap target.
const SNAP_COLOR: Color = Color::from_rgba8(16, 185, 129, 200);

const PEER_PALETTE: [(u8, u8, u8); 6] = [
    (239, 68, 68),  // red
    (34, 197, 94),  // green
    (59, 130, 246), // blue
    (245, 158, 11), // amber
    (168, 85, 247), // purple
    (20, 184, 166), // teal
];

/// Builds one display list per frame, holding the wrap cache and the
/// backing-surface size across frames.
pub struct RenderPipeline {
    scene: Scene,
    text_cache: TextLayoutCache,
    surface_size: Size,
    stats: FrameStats,
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPipeline {
    pub fn new() -> Self {
        Self {
            scene: Scene::new(),
            text_cache: TextLayoutCache::new(),
            surface_size: Size::ZERO,
            stats: FrameStats::default(),
        }
    }

    /// The display list built by the last [`build_frame`](Self::build_frame).
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Counters from the last frame.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Current backing-surface size in device pixels.
    pub fn surface_size(&self) -> Size {
        self.surface_size
    }

    /// Build the display list for one frame.
    pub fn build_frame(&mut self, ctx: &RenderContext) -> FrameStats {
        self.scene.reset();
        let mut stats = FrameStats::default();

        // Reallocate the backing surface only when the size changed.
        let surface = ctx.surface_size();
        if surface != self.surface_size {
            self.surface_size = surface;
            stats.surface_resized = true;
        }

        let transform = ctx.camera.transform();
        let zoom = ctx.camera.zoom();
        let lod = zoom < LOD_ZOOM_THRESHOLD;
        stats.lod_active = lod;

        let bg = Rect::from_origin_size(Point::ORIGIN, ctx.viewport_size);
        self.scene
            .fill(Affine::IDENTITY, ctx.background_color, bg.to_path(0.1));

        stats.grid_dots = draw_grid(&mut self.scene, ctx.camera, ctx.viewport_size);

        // Elements in z-order; connectors are deferred so they always
        // paint over the shapes they join.
        let visible = ctx.camera.visible_world_rect(ctx.viewport_size);
        let mut connectors: Vec<&Element> = Vec::new();
        for element in ctx.store.ordered() {
            if element.is_connector() {
                connectors.push(element);
                continue;
            }
            stats.elements_total += 1;
            if !rects_overlap(element.bounds(), visible) {
                stats.elements_culled += 1;
                continue;
            }
            if lod {
                self.draw_element_flat(element, transform);
            } else {
                self.draw_element(ctx, element, transform);
            }
            stats.elements_drawn += 1;
        }

        for connector in connectors {
            stats.elements_total += 1;
            if self.draw_connector(ctx, connector, transform, visible, lod) {
                stats.elements_drawn += 1;
                stats.connectors_drawn += 1;
            } else {
                stats.elements_culled += 1;
            }
        }

        self.draw_affordances(ctx, transform, zoom);
        self.draw_peer_cursors(ctx);

        stats.text_layouts = self.text_cache.take_frame_layouts();
        stats.draw_items = self.scene.len();
        self.stats = stats;
        stats
    }

    /// Full-detail drawing for one non-connector element.
    fn draw_element(&mut self, ctx: &RenderContext, element: &Element, transform: Affine) {
        let bounds = element.bounds();
        let xf = rotated_transform(transform, element);
        let skip_text = ctx.editing_id == Some(element.id);
        let ink: Color = palette::TEXT.into();

        match &element.kind {
            ElementKind::Sticky { font_size, .. } => {
                let shadow = bounds + Vec2::new(STICKY_SHADOW_OFFSET, STICKY_SHADOW_OFFSET);
                self.scene.fill(xf, SHADOW_COLOR, shadow.to_path(0.1));
                self.scene.fill(xf, element.color.into(), bounds.to_path(0.1));
                if !skip_text {
                    self.draw_wrapped_text(element, *font_size, bounds, xf, ink);
                }
            }
            ElementKind::Rectangle { font_size, .. } => {
                self.scene
                    .fill(xf, element.color.with_alpha(46), bounds.to_path(0.1));
                self.scene
                    .stroke(xf, element.color.into(), 2.0, bounds.to_path(0.1));
                if !skip_text {
                    self.draw_wrapped_text(element, *font_size, bounds, xf, ink);
                }
            }
            ElementKind::Circle { font_size, .. } => {
                let ellipse = Ellipse::new(
                    bounds.center(),
                    (bounds.width() / 2.0, bounds.height() / 2.0),
                    0.0,
                );
                self.scene
                    .fill(xf, element.color.with_alpha(46), ellipse.to_path(0.1));
                self.scene
                    .stroke(xf, element.color.into(), 2.0, ellipse.to_path(0.1));
                if !skip_text {
                    self.draw_wrapped_text(element, *font_size, bounds, xf, ink);
                }
            }
            ElementKind::Text { font_size, .. } => {
                if !skip_text {
                    self.draw_wrapped_text(element, *font_size, bounds, xf, element.color.into());
                }
            }
            ElementKind::Frame => {
                self.scene
                    .fill(xf, element.color.with_alpha(18), bounds.to_path(0.1));
                self.scene
                    .stroke(xf, element.color.into(), 1.5, bounds.to_path(0.1));
                if !element.text.is_empty() && !skip_text {
                    let label = self
                        .text_cache
                        .layout(&element.text, FRAME_LABEL_SIZE, f64::INFINITY);
                    let origin =
                        Point::new(bounds.x0, bounds.y0 - FRAME_LABEL_SIZE * 1.6);
                    self.scene.text(
                        xf,
                        element.color.into(),
                        origin,
                        FRAME_LABEL_SIZE,
                        label.line_height,
                        label.lines.clone(),
                    );
                }
            }
            ElementKind::Line => {
                let (a, b) = element.line_endpoints();
                self.scene.stroke(
                    transform,
                    element.color.into(),
                    DEFAULT_STROKE_WIDTH,
                    segment(a, b),
                );
            }
            ElementKind::Freehand { stroke_width, .. } => {
                let points = element.freehand_world_points();
                self.scene
                    .stroke(transform, element.color.into(), *stroke_width, polyline(&points));
            }
            // Deferred to the connector pass.
            ElementKind::Connector { .. } => {}
        }
    }

    /// Flat-color stand-in below the zoom threshold: no text, shadows,
    /// or stroke detail.
    fn draw_element_flat(&mut self, element: &Element, transform: Affine) {
        let bounds = element.bounds();
        let path = match element.kind {
            ElementKind::Circle { .. } => Ellipse::new(
                bounds.center(),
                (bounds.width() / 2.0, bounds.height() / 2.0),
                0.0,
            )
            .to_path(0.1),
            _ => bounds.to_path(0.1),
        };
        self.scene.fill(transform, element.color.into(), path);
    }

    /// Draw one connector. Returns false when it resolved to nothing
    /// visible (missing endpoint or off-screen).
    fn draw_connector(
        &mut self,
        ctx: &RenderContext,
        connector: &Element,
        transform: Affine,
        visible: Rect,
        lod: bool,
    ) -> bool {
        let ElementKind::Connector {
            route,
            line_style,
            thickness,
            ..
        } = &connector.kind
        else {
            return false;
        };
        let Some((start, end)) = resolve_endpoints(ctx.store, connector) else {
            return false;
        };
        // Curved routes bow away from the chord; pad the cull box for it.
        let reach = Rect::from_points(start, end).inflate(80.0, 80.0);
        if !rects_overlap(reach, visible) {
            return false;
        }

        let color: Color = connector.color.into();
        if lod {
            self.scene.stroke(transform, color, 1.0, segment(start, end));
            return true;
        }

        let path = connector_path(start, end, *route);
        match line_style {
            LineStyle::Dashed => {
                self.scene
                    .stroke_dashed(transform, color, *thickness, CONNECTOR_DASH, path);
            }
            LineStyle::Solid => self.scene.stroke(transform, color, *thickness, path),
        }

        let tail = arrow_tail(start, end, *route);
        if let Some(head) = arrowhead(tail, end) {
            self.scene.fill(transform, color, head);
        }
        true
    }

    fn draw_wrapped_text(
        &mut self,
        element: &Element,
        font_size: f64,
        bounds: Rect,
        xf: Affine,
        ink: Color,
    ) {
        if element.text.is_empty() {
            return;
        }
        let max_width = (bounds.width() - 2.0 * TEXT_INSET).max(font_size);
        let layout = self.text_cache.layout(&element.text, font_size, max_width);
        self.scene.text(
            xf,
            ink,
            Point::new(bounds.x0 + TEXT_INSET, bounds.y0 + TEXT_INSET),
            font_size,
            layout.line_height,
            layout.lines.clone(),
        );
    }

    /// Hover and selection outlines, handles, and gesture previews.
    /// Stroke widths scale inversely with zoom for constant screen size.
    fn draw_affordances(&mut self, ctx: &RenderContext, transform: Affine, zoom: f64) {
        if let Some(hover) = ctx.hover {
            if !ctx.selection.contains(&hover) {
                if let Some(element) = ctx.store.get(hover) {
                    self.outline_element(ctx, element, transform, HOVER_COLOR, 1.5 / zoom, None);
                }
            }
        }

        if let Some((&primary, rest)) = ctx.selection.split_last() {
            let dash = 4.0 / zoom;
            for &id in rest {
                if let Some(element) = ctx.store.get(id) {
                    self.outline_element(
                        ctx,
                        element,
                        transform,
                        ctx.selection_color,
                        1.0 / zoom,
                        Some([dash, dash]),
                    );
                }
            }
            if let Some(element) = ctx.store.get(primary) {
                self.outline_element(
                    ctx,
                    element,
                    transform,
                    ctx.selection_color,
                    2.0 / zoom,
                    None,
                );
                for handle in handles_for(element) {
                    self.draw_handle(&handle, transform, ctx.selection_color, zoom);
                }
            }
        }

        match ctx.gesture {
            Some(Gesture::MarqueeSelecting { start, current }) => {
                let rect = Rect::from_points(*start, *current);
                self.scene.fill(
                    transform,
                    Color::from_rgba8(59, 130, 246, 25),
                    rect.to_path(0.1),
                );
                let dash = 4.0 / zoom;
                self.scene.stroke_dashed(
                    transform,
                    ctx.selection_color,
                    1.0 / zoom,
                    [dash, dash],
                    rect.to_path(0.1),
                );
            }
            Some(Gesture::Connecting {
                from,
                current,
                target,
            }) => {
                let end = target.map_or(*current, |anchor| anchor.position);
                let dash = 6.0 / zoom;
                let mut preview = BezPath::new();
                preview.move_to(from.position);
                preview.quad_to(curve_control(from.position, end), end);
                self.scene.stroke_dashed(
                    transform,
                    ctx.selection_color,
                    2.0 / zoom,
                    [dash, dash],
                    preview,
                );
                if let Some(anchor) = target {
                    if let Some(element) = ctx.store.get(anchor.element_id) {
                        self.outline_element(ctx, element, transform, SNAP_COLOR, 2.0 / zoom, None);
                    }
                    let ring = Ellipse::new(anchor.position, (8.0 / zoom, 8.0 / zoom), 0.0);
                    self.scene
                        .stroke(transform, SNAP_COLOR, 2.0 / zoom, ring.to_path(0.1));
                }
            }
            Some(Gesture::DrawingShape { ty, start, current }) => {
                let rect = Rect::from_points(*start, *current);
                let dash = 4.0 / zoom;
                let path = match ty {
                    ElementType::Line => segment(*start, *current),
                    ElementType::Circle => Ellipse::new(
                        rect.center(),
                        (rect.width() / 2.0, rect.height() / 2.0),
                        0.0,
                    )
                    .to_path(0.1),
                    _ => rect.to_path(0.1),
                };
                self.scene.stroke_dashed(
                    transform,
                    ctx.selection_color,
                    1.5 / zoom,
                    [dash, dash],
                    path,
                );
            }
            Some(Gesture::DrawingFreehand { points }) => {
                if points.len() > 1 {
                    self.scene.stroke(
                        transform,
                        palette::STROKE.into(),
                        DEFAULT_STROKE_WIDTH,
                        polyline(points),
                    );
                }
            }
            _ => {}
        }
    }

    /// Outline an element along its visible silhouette.
    fn outline_element(
        &mut self,
        ctx: &RenderContext,
        element: &Element,
        transform: Affine,
        color: Color,
        width: f64,
        dashes: Option<[f64; 2]>,
    ) {
        let path = match &element.kind {
            ElementKind::Connector { route, .. } => {
                let Some((start, end)) = resolve_endpoints(ctx.store, element) else {
                    return;
                };
                connector_path(start, end, *route)
            }
            ElementKind::Line => {
                let (a, b) = element.line_endpoints();
                segment(a, b)
            }
            _ => element.bounds().to_path(0.1),
        };
        let xf = rotated_transform(transform, element);
        match dashes {
            Some(dash) => self.scene.stroke_dashed(xf, color, width, dash, path),
            None => self.scene.stroke(xf, color, width, path),
        }
    }

    /// White-filled handle glyphs: squares for corners and edges,
    /// circles for endpoints and the rotate grab.
    fn draw_handle(&mut self, handle: &Handle, transform: Affine, accent: Color, zoom: f64) {
        let size = 10.0 / zoom;
        let half = size / 2.0;
        let pos = handle.position;
        let path = match handle.kind {
            HandleKind::Endpoint(_) | HandleKind::Rotate => {
                Ellipse::new(pos, (half, half), 0.0).to_path(0.1)
            }
            HandleKind::Corner(_) | HandleKind::Edge(_) => {
                Rect::new(pos.x - half, pos.y - half, pos.x + half, pos.y + half).to_path(0.1)
            }
        };
        self.scene.fill(transform, Color::WHITE, path.clone());
        self.scene.stroke(transform, accent, 1.5 / zoom, path);
    }

    /// Peer cursors as labeled arrows, drawn in screen space so they stay
    /// the same size at any zoom.
    fn draw_peer_cursors(&mut self, ctx: &RenderContext) {
        let viewport = Rect::from_origin_size(Point::ORIGIN, ctx.viewport_size).inflate(24.0, 24.0);
        for peer in &ctx.peers {
            let screen = ctx.camera.world_to_screen(Point::new(peer.x, peer.y));
            if !viewport.contains(screen) {
                continue;
            }
            let color = peer_color(peer.user);

            let mut pointer = BezPath::new();
            pointer.move_to(screen);
            pointer.line_to(Point::new(screen.x, screen.y + 18.0));
            pointer.line_to(Point::new(screen.x + 14.0, screen.y + 14.0));
            pointer.close_path();
            self.scene.fill(Affine::IDENTITY, color, pointer.clone());
            self.scene.stroke(Affine::IDENTITY, Color::WHITE, 1.5, pointer);

            let mut label = peer.user.simple().to_string();
            label.truncate(8);
            self.scene.text(
                Affine::IDENTITY,
                color,
                Point::new(screen.x + 18.0, screen.y + 16.0),
                11.0,
                14.0,
                vec![label],
            );
        }
    }
}

fn rotated_transform(transform: Affine, element: &Element) -> Affine {
    let rotation = element.rotation();
    if rotation == 0.0 {
        transform
    } else {
        transform * Affine::rotate_about(rotation.to_radians(), element.bounds().center())
    }
}

fn segment(a: Point, b: Point) -> BezPath {
    let mut path = BezPath::new();
    path.move_to(a);
    path.line_to(b);
    path
}

fn polyline(points: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    if let Some((first, rest)) = points.split_first() {
        path.move_to(*first);
        for point in rest {
            path.line_to(*point);
        }
    }
    path
}

fn connector_path(start: Point, end: Point, route: ConnectorRoute) -> BezPath {
    match route {
        ConnectorRoute::Curved => {
            let mut path = BezPath::new();
            path.move_to(start);
            path.quad_to(curve_control(start, end), end);
            path
        }
        _ => polyline(&route_points(start, end, route)),
    }
}

/// Point the arrowhead tangent is taken against: the control point for
/// curves, the last interior vertex otherwise.
fn arrow_tail(start: Point, end: Point, route: ConnectorRoute) -> Point {
    match route {
        ConnectorRoute::Curved => curve_control(start, end),
        _ => {
            let points = route_points(start, end, route);
            points[points.len() - 2]
        }
    }
}

fn arrowhead(tail: Point, tip: Point) -> Option<BezPath> {
    let dir = tip - tail;
    if dir.hypot() < 1e-6 {
        return None;
    }
    let angle = dir.atan2();
    let left = tip - Vec2::from_angle(angle - ARROWHEAD_ANGLE) * ARROWHEAD_LEN;
    let right = tip - Vec2::from_angle(angle + ARROWHEAD_ANGLE) * ARROWHEAD_LEN;
    let mut path = BezPath::new();
    path.move_to(left);
    path.line_to(tip);
    path.line_to(right);
    path.close_path();
    Some(path)
}

fn peer_color(user: UserId) -> Color {
    let (r, g, b) = PEER_PALETTE[(user.as_u128() % PEER_PALETTE.len() as u128) as usize];
    Color::from_rgba8(r, g, b, 255)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::DrawItem;
    use murale_core::element::DEFAULT_CONNECTOR_THICKNESS;
    use murale_core::presence::PeerCursor;
    use murale_core::{BoardStore, Camera, Viewport};
    use uuid::Uuid;

    fn camera_at(zoom: f64) -> Camera {
        let mut camera = Camera::new();
        camera.set_viewport(Viewport { x: 0.0, y: 0.0, zoom });
        camera
    }

    fn sticky(store: &BoardStore, user: UserId, x: f64, y: f64) -> Element {
        Element::new(ElementType::Sticky, store.board_id(), x, y, 160.0, 120.0, user)
    }

    fn text_items(scene: &Scene) -> usize {
        scene
            .items()
            .iter()
            .filter(|item| matches!(item, DrawItem::Text { .. }))
            .count()
    }

    #[test]
    fn test_lod_frame_culls_and_measures_no_text() {
        let mut store = BoardStore::new(Uuid::new_v4());
        let user = Uuid::new_v4();
        let mut elements = Vec::new();
        for i in 0..600 {
            let col = (i % 30) as f64;
            let row = (i / 30) as f64;
            let mut e = sticky(&store, user, col * 400.0, row * 300.0);
            e.text = format!("note {i}");
            elements.push(e);
        }
        store.load(elements);

        let camera = camera_at(0.2);
        let ctx = RenderContext::new(&store, &camera, Size::new(800.0, 600.0));
        let mut pipeline = RenderPipeline::new();
        let stats = pipeline.build_frame(&ctx);

        assert!(stats.lod_active);
        assert_eq!(stats.elements_total, 600);
        assert!(stats.elements_culled > 0);
        assert!(stats.elements_drawn < stats.elements_total);
        assert_eq!(stats.elements_drawn + stats.elements_culled, stats.elements_total);
        assert_eq!(stats.text_layouts, 0);
        assert_eq!(text_items(pipeline.scene()), 0);
    }

    #[test]
    fn test_full_detail_wraps_text_once_then_caches() {
        let mut store = BoardStore::new(Uuid::new_v4());
        let user = Uuid::new_v4();
        let mut note = sticky(&store, user, 10.0, 10.0);
        note.text = "a sticky with enough words to wrap".to_string();
        store.insert(note);

        let camera = camera_at(1.0);
        let ctx = RenderContext::new(&store, &camera, Size::new(800.0, 600.0));
        let mut pipeline = RenderPipeline::new();

        let first = pipeline.build_frame(&ctx);
        assert_eq!(first.text_layouts, 1);
        assert_eq!(text_items(pipeline.scene()), 1);

        let second = pipeline.build_frame(&ctx);
        assert_eq!(second.text_layouts, 0);
        assert_eq!(text_items(pipeline.scene()), 1);
    }

    #[test]
    fn test_editing_element_keeps_box_but_skips_text() {
        let mut store = BoardStore::new(Uuid::new_v4());
        let user = Uuid::new_v4();
        let mut note = sticky(&store, user, 10.0, 10.0);
        note.text = "being edited".to_string();
        let id = note.id;
        store.insert(note);

        let camera = camera_at(1.0);
        let ctx = RenderContext::new(&store, &camera, Size::new(800.0, 600.0))
            .with_editing(Some(id));
        let mut pipeline = RenderPipeline::new();
        let stats = pipeline.build_frame(&ctx);

        assert_eq!(stats.elements_drawn, 1);
        assert_eq!(stats.text_layouts, 0);
        assert_eq!(text_items(pipeline.scene()), 0);
    }

    #[test]
    fn test_connector_draws_between_live_endpoints() {
        let mut store = BoardStore::new(Uuid::new_v4());
        let user = Uuid::new_v4();
        let a = sticky(&store, user, 0.0, 0.0);
        let b = sticky(&store, user, 400.0, 0.0);
        let connector = Element::new_connector(store.board_id(), a.id, b.id, user);
        store.insert(a);
        store.insert(b);
        store.insert(connector);

        let camera = camera_at(1.0);
        let ctx = RenderContext::new(&store, &camera, Size::new(800.0, 600.0));
        let mut pipeline = RenderPipeline::new();
        let stats = pipeline.build_frame(&ctx);

        assert_eq!(stats.connectors_drawn, 1);
        assert!(pipeline.scene().items().iter().any(|item| matches!(
            item,
            DrawItem::Stroke { width, .. } if *width == DEFAULT_CONNECTOR_THICKNESS
        )));
    }

    #[test]
    fn test_connector_with_missing_endpoint_is_inert() {
        let mut store = BoardStore::new(Uuid::new_v4());
        let user = Uuid::new_v4();
        let a = sticky(&store, user, 0.0, 0.0);
        let b = sticky(&store, user, 400.0, 0.0);
        let a_id = a.id;
        let connector = Element::new_connector(store.board_id(), a.id, b.id, user);
        store.insert(a);
        store.insert(b);
        store.insert(connector);
        assert!(store.remove(a_id).is_some());

        let camera = camera_at(1.0);
        let ctx = RenderContext::new(&store, &camera, Size::new(800.0, 600.0));
        let mut pipeline = RenderPipeline::new();
        let stats = pipeline.build_frame(&ctx);

        assert_eq!(stats.connectors_drawn, 0);
        assert_eq!(stats.elements_total, 2);
        assert_eq!(stats.elements_drawn, 1);
    }

    #[test]
    fn test_surface_reallocates_only_on_change() {
        let store = BoardStore::new(Uuid::new_v4());
        let camera = camera_at(1.0);
        let mut pipeline = RenderPipeline::new();

        let ctx = RenderContext::new(&store, &camera, Size::new(800.0, 600.0));
        assert!(pipeline.build_frame(&ctx).surface_resized);
        assert!(!pipeline.build_frame(&ctx).surface_resized);

        let scaled = RenderContext::new(&store, &camera, Size::new(800.0, 600.0))
            .with_scale_factor(2.0);
        assert!(pipeline.build_frame(&scaled).surface_resized);
        assert_eq!(pipeline.surface_size(), Size::new(1600.0, 1200.0));
    }

    #[test]
    fn test_selection_outlines_and_handles() {
        let mut store = BoardStore::new(Uuid::new_v4());
        let user = Uuid::new_v4();
        let a = sticky(&store, user, 0.0, 0.0);
        let b = sticky(&store, user, 300.0, 0.0);
        let selection = vec![a.id, b.id];
        store.insert(a);
        store.insert(b);

        let camera = camera_at(1.0);
        let ctx = RenderContext::new(&store, &camera, Size::new(800.0, 600.0))
            .with_selection(&selection);
        let mut pipeline = RenderPipeline::new();
        pipeline.build_frame(&ctx);

        // Secondary member gets a dashed outline.
        assert!(pipeline.scene().items().iter().any(|item| matches!(
            item,
            DrawItem::Stroke { dashes: Some(_), .. }
        )));
        // Primary gets the heavier outline plus white-filled handles.
        assert!(pipeline.scene().items().iter().any(|item| matches!(
            item,
            DrawItem::Stroke { width, dashes: None, .. } if *width == 2.0
        )));
        let white_fills = pipeline
            .scene()
            .items()
            .iter()
            .filter(|item| matches!(item, DrawItem::Fill { color, .. } if *color == Color::WHITE))
            .count();
        assert_eq!(white_fills, 9);
    }

    #[test]
    fn test_hover_outline_skipped_when_selected() {
        let mut store = BoardStore::new(Uuid::new_v4());
        let user = Uuid::new_v4();
        let a = sticky(&store, user, 0.0, 0.0);
        let id = a.id;
        let selection = vec![id];
        store.insert(a);
        let camera = camera_at(1.0);
        let mut pipeline = RenderPipeline::new();

        let hovered = RenderContext::new(&store, &camera, Size::new(800.0, 600.0))
            .with_hover(Some(id));
        pipeline.build_frame(&hovered);
        assert!(pipeline.scene().items().iter().any(|item| matches!(
            item,
            DrawItem::Stroke { color, .. } if *color == HOVER_COLOR
        )));

        let also_selected = RenderContext::new(&store, &camera, Size::new(800.0, 600.0))
            .with_hover(Some(id))
            .with_selection(&selection);
        pipeline.build_frame(&also_selected);
        assert!(!pipeline.scene().items().iter().any(|item| matches!(
            item,
            DrawItem::Stroke { color, .. } if *color == HOVER_COLOR
        )));
    }

    #[test]
    fn test_marquee_preview_draws_translucent_box() {
        let store = BoardStore::new(Uuid::new_v4());
        let camera = camera_at(1.0);
        let gesture = Gesture::MarqueeSelecting {
            start: Point::new(10.0, 10.0),
            current: Point::new(220.0, 160.0),
        };
        let ctx = RenderContext::new(&store, &camera, Size::new(800.0, 600.0))
            .with_gesture(&gesture);
        let mut pipeline = RenderPipeline::new();
        pipeline.build_frame(&ctx);

        assert!(pipeline.scene().items().iter().any(|item| matches!(
            item,
            DrawItem::Stroke { dashes: Some(_), .. }
        )));
    }

    #[test]
    fn test_peer_cursor_draws_labeled_arrow_in_screen_space() {
        let store = BoardStore::new(Uuid::new_v4());
        let camera = camera_at(1.0);
        let peer = PeerCursor {
            user: Uuid::new_v4(),
            x: 200.0,
            y: 150.0,
            last_seen_ms: 0,
            latency_ms: 0,
        };
        let ctx = RenderContext::new(&store, &camera, Size::new(800.0, 600.0))
            .with_peers(vec![peer]);
        let mut pipeline = RenderPipeline::new();
        pipeline.build_frame(&ctx);

        let labels: Vec<&DrawItem> = pipeline
            .scene()
            .items()
            .iter()
            .filter(|item| matches!(item, DrawItem::Text { .. }))
            .collect();
        assert_eq!(labels.len(), 1);
        let DrawItem::Text { transform, lines, .. } = labels[0] else {
            unreachable!();
        };
        assert_eq!(*transform, Affine::IDENTITY);
        assert_eq!(lines[0].len(), 8);
    }

    #[test]
    fn test_offscreen_peer_cursor_is_clipped() {
        let store = BoardStore::new(Uuid::new_v4());
        let camera = camera_at(1.0);
        let peer = PeerCursor {
            user: Uuid::new_v4(),
            x: 5_000.0,
            y: 5_000.0,
            last_seen_ms: 0,
            latency_ms: 0,
        };
        let ctx = RenderContext::new(&store, &camera, Size::new(800.0, 600.0))
            .with_peers(vec![peer]);
        let mut pipeline = RenderPipeline::new();
        pipeline.build_frame(&ctx);
        assert_eq!(text_items(pipeline.scene()), 0);
    }
}
