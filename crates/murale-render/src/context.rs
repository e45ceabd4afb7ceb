//! Per-frame render inputs and the backend seam.

use kurbo::Size;
use murale_core::element::ElementId;
use murale_core::engine::BoardEngine;
use murale_core::gesture::Gesture;
use murale_core::presence::PeerCursor;
use murale_core::{BoardStore, Camera};
use peniko::Color;
use thiserror::Error;

use crate::scene::Scene;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("surface error: {0}")]
    Surface(String),
    #[error("render failed: {0}")]
    Backend(String),
}

/// Everything the pipeline reads to build one frame.
pub struct RenderContext<'a> {
    /// The board to render.
    pub store: &'a BoardStore,
    /// Viewport transform owner.
    pub camera: &'a Camera,
    /// Viewport size in logical pixels.
    pub viewport_size: Size,
    /// Device pixel ratio (for HiDPI).
    pub scale_factor: f64,
    pub background_color: Color,
    /// Selection highlight color.
    pub selection_color: Color,
    /// Selected ids, primary last.
    pub selection: &'a [ElementId],
    pub hover: Option<ElementId>,
    /// Gesture in flight, read for marquee, connector, shape, and
    /// freehand previews.
    pub gesture: Option<&'a Gesture>,
    /// Element whose text an external editor currently owns; its text
    /// layer is skipped so the editor overlay is not doubled.
    pub editing_id: Option<ElementId>,
    pub peers: Vec<PeerCursor>,
}

impl<'a> RenderContext<'a> {
    pub fn new(store: &'a BoardStore, camera: &'a Camera, viewport_size: Size) -> Self {
        Self {
            store,
            camera,
            viewport_size,
            scale_factor: 1.0,
            background_color: Color::from_rgba8(250, 250, 250, 255),
            selection_color: Color::from_rgba8(59, 130, 246, 255),
            selection: &[],
            hover: None,
            gesture: None,
            editing_id: None,
            peers: Vec::new(),
        }
    }

    /// Wire a context straight from an engine's current state.
    pub fn for_engine(engine: &'a BoardEngine, viewport_size: Size) -> Self {
        let gesture = engine.gesture();
        let editing_id = match gesture {
            Gesture::EditingText { id, .. } => Some(*id),
            _ => None,
        };
        Self {
            selection: engine.selection().ids(),
            hover: engine.hover(),
            gesture: Some(gesture),
            editing_id,
            peers: engine.peers().copied().collect(),
            ..Self::new(engine.store(), engine.camera(), viewport_size)
        }
    }

    /// Set the scale factor for HiDPI.
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    pub fn with_selection(mut self, selection: &'a [ElementId]) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_hover(mut self, hover: Option<ElementId>) -> Self {
        self.hover = hover;
        self
    }

    pub fn with_gesture(mut self, gesture: &'a Gesture) -> Self {
        self.gesture = Some(gesture);
        self
    }

    pub fn with_editing(mut self, editing_id: Option<ElementId>) -> Self {
        self.editing_id = editing_id;
        self
    }

    pub fn with_peers(mut self, peers: Vec<PeerCursor>) -> Self {
        self.peers = peers;
        self
    }

    /// Backing surface size in device pixels.
    pub fn surface_size(&self) -> Size {
        self.viewport_size * self.scale_factor
    }
}

/// Rasterizer seam. A backend receives the finished display list once
/// per frame and owns everything GPU- or window-specific.
pub trait RenderBackend {
    fn submit(&mut self, scene: &Scene, surface_size: Size) -> Result<(), RenderError>;
}
