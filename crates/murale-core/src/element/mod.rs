//! Element data model: the atomic unit of a board.

mod row;

pub use row::{ElementPatch, ElementRow, PropertyBag};

use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::color::{ElementColor, palette};

/// Unique identifier for elements. Server-assigned; creates carry a
/// temporary client id until the insert confirms.
pub type ElementId = Uuid;
/// Identifier of the owning board.
pub type BoardId = Uuid;
/// Identifier of the authoring user.
pub type UserId = Uuid;
/// Wall-clock milliseconds since the unix epoch.
pub type TimestampMs = u64;

/// Current wall-clock time in milliseconds.
pub fn now_ms() -> TimestampMs {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as TimestampMs)
        .unwrap_or(0)
}

/// Default font size for text-bearing elements.
pub const DEFAULT_FONT_SIZE: f64 = 16.0;
/// Default freehand stroke width in world units.
pub const DEFAULT_STROKE_WIDTH: f64 = 3.0;
/// Default connector line thickness in world units.
pub const DEFAULT_CONNECTOR_THICKNESS: f64 = 2.0;

/// Closed set of element kinds, as stored in the row's `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Sticky,
    Rectangle,
    Circle,
    Text,
    Frame,
    Line,
    Freehand,
    Connector,
}

impl ElementType {
    /// Default world-unit size used when a create request omits one.
    pub fn default_size(self) -> (f64, f64) {
        match self {
            ElementType::Sticky => (160.0, 120.0),
            ElementType::Rectangle => (140.0, 100.0),
            ElementType::Circle => (120.0, 120.0),
            ElementType::Text => (160.0, 40.0),
            ElementType::Frame => (400.0, 300.0),
            ElementType::Line => (120.0, 0.0),
            ElementType::Freehand | ElementType::Connector => (0.0, 0.0),
        }
    }

    pub fn default_color(self) -> ElementColor {
        match self {
            ElementType::Sticky => palette::STICKY,
            ElementType::Rectangle | ElementType::Circle => palette::SHAPE,
            ElementType::Text => palette::TEXT,
            ElementType::Frame => palette::FRAME,
            ElementType::Line => palette::LINE,
            ElementType::Freehand => palette::STROKE,
            ElementType::Connector => palette::CONNECTOR,
        }
    }
}

/// Route kind for connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorRoute {
    Straight,
    Elbow,
    #[default]
    Curved,
}

/// Line style for connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
}

/// Variant-specific element data.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Sticky { rotation: f64, font_size: f64 },
    Rectangle { rotation: f64, font_size: f64 },
    Circle { rotation: f64, font_size: f64 },
    Text { rotation: f64, font_size: f64 },
    Frame,
    Line,
    Freehand { points: Vec<Point>, stroke_width: f64 },
    Connector {
        from_id: ElementId,
        to_id: ElementId,
        route: ConnectorRoute,
        line_style: LineStyle,
        thickness: f64,
    },
}

impl ElementKind {
    pub fn new_default(ty: ElementType) -> Self {
        match ty {
            ElementType::Sticky => ElementKind::Sticky {
                rotation: 0.0,
                font_size: DEFAULT_FONT_SIZE,
            },
            ElementType::Rectangle => ElementKind::Rectangle {
                rotation: 0.0,
                font_size: DEFAULT_FONT_SIZE,
            },
            ElementType::Circle => ElementKind::Circle {
                rotation: 0.0,
                font_size: DEFAULT_FONT_SIZE,
            },
            ElementType::Text => ElementKind::Text {
                rotation: 0.0,
                font_size: DEFAULT_FONT_SIZE,
            },
            ElementType::Frame => ElementKind::Frame,
            ElementType::Line => ElementKind::Line,
            ElementType::Freehand => ElementKind::Freehand {
                points: Vec::new(),
                stroke_width: DEFAULT_STROKE_WIDTH,
            },
            ElementType::Connector => ElementKind::Connector {
                from_id: Uuid::nil(),
                to_id: Uuid::nil(),
                route: ConnectorRoute::default(),
                line_style: LineStyle::default(),
                thickness: DEFAULT_CONNECTOR_THICKNESS,
            },
        }
    }
}

/// One shape/note/connector/stroke record on a board.
///
/// `x, y, width, height` are world units. Lines keep signed extents so the
/// drawn direction survives; `bounds` normalizes. Connectors leave the box
/// zeroed and derive geometry from their referenced endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: ElementId,
    pub board_id: BoardId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: ElementColor,
    pub text: String,
    pub z_index: i64,
    /// Assigned and cleared only by frame containment reconciliation.
    pub frame_id: Option<ElementId>,
    pub kind: ElementKind,
    pub created_by: UserId,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

impl Element {
    /// New element with a fresh temporary id and per-kind defaults.
    pub fn new(
        ty: ElementType,
        board_id: BoardId,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        created_by: UserId,
    ) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::new_v4(),
            board_id,
            x,
            y,
            width,
            height,
            color: ty.default_color(),
            text: String::new(),
            z_index: 0,
            frame_id: None,
            kind: ElementKind::new_default(ty),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// New connector between two elements. Endpoint validity is checked by
    /// the engine before the connector reaches the store.
    pub fn new_connector(
        board_id: BoardId,
        from_id: ElementId,
        to_id: ElementId,
        created_by: UserId,
    ) -> Self {
        let mut element = Self::new(
            ElementType::Connector,
            board_id,
            0.0,
            0.0,
            0.0,
            0.0,
            created_by,
        );
        element.kind = ElementKind::Connector {
            from_id,
            to_id,
            route: ConnectorRoute::default(),
            line_style: LineStyle::default(),
            thickness: DEFAULT_CONNECTOR_THICKNESS,
        };
        element
    }

    /// New freehand stroke from world-space points. The bounding box is
    /// computed here and the stored points become box-relative.
    pub fn new_freehand(
        board_id: BoardId,
        world_points: &[Point],
        color: ElementColor,
        created_by: UserId,
    ) -> Self {
        let mut min = Point::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in world_points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        if world_points.is_empty() {
            min = Point::ZERO;
            max = Point::ZERO;
        }
        let relative = world_points
            .iter()
            .map(|p| Point::new(p.x - min.x, p.y - min.y))
            .collect();
        let mut element = Self::new(
            ElementType::Freehand,
            board_id,
            min.x,
            min.y,
            max.x - min.x,
            max.y - min.y,
            created_by,
        );
        element.color = color;
        element.kind = ElementKind::Freehand {
            points: relative,
            stroke_width: DEFAULT_STROKE_WIDTH,
        };
        element
    }

    pub fn element_type(&self) -> ElementType {
        match self.kind {
            ElementKind::Sticky { .. } => ElementType::Sticky,
            ElementKind::Rectangle { .. } => ElementType::Rectangle,
            ElementKind::Circle { .. } => ElementType::Circle,
            ElementKind::Text { .. } => ElementType::Text,
            ElementKind::Frame => ElementType::Frame,
            ElementKind::Line => ElementType::Line,
            ElementKind::Freehand { .. } => ElementType::Freehand,
            ElementKind::Connector { .. } => ElementType::Connector,
        }
    }

    /// Normalized bounding box in world coordinates.
    pub fn bounds(&self) -> Rect {
        Rect::from_points(
            Point::new(self.x, self.y),
            Point::new(self.x + self.width, self.y + self.height),
        )
    }

    pub fn center(&self) -> Point {
        self.bounds().center()
    }

    /// Rotation in degrees; zero for kinds that do not rotate.
    pub fn rotation(&self) -> f64 {
        match self.kind {
            ElementKind::Sticky { rotation, .. }
            | ElementKind::Rectangle { rotation, .. }
            | ElementKind::Circle { rotation, .. }
            | ElementKind::Text { rotation, .. } => rotation,
            _ => 0.0,
        }
    }

    pub fn supports_rotation(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::Sticky { .. }
                | ElementKind::Rectangle { .. }
                | ElementKind::Circle { .. }
                | ElementKind::Text { .. }
        )
    }

    /// Set rotation in degrees; ignored for kinds that do not rotate.
    pub fn set_rotation(&mut self, degrees: f64) {
        match &mut self.kind {
            ElementKind::Sticky { rotation, .. }
            | ElementKind::Rectangle { rotation, .. }
            | ElementKind::Circle { rotation, .. }
            | ElementKind::Text { rotation, .. } => *rotation = degrees,
            _ => {}
        }
    }

    pub fn font_size(&self) -> f64 {
        match self.kind {
            ElementKind::Sticky { font_size, .. }
            | ElementKind::Rectangle { font_size, .. }
            | ElementKind::Circle { font_size, .. }
            | ElementKind::Text { font_size, .. } => font_size,
            _ => DEFAULT_FONT_SIZE,
        }
    }

    pub fn is_connector(&self) -> bool {
        matches!(self.kind, ElementKind::Connector { .. })
    }

    pub fn is_frame(&self) -> bool {
        matches!(self.kind, ElementKind::Frame)
    }

    /// Kinds drawn as a (possibly rotated) box.
    pub fn is_boxed(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::Sticky { .. }
                | ElementKind::Rectangle { .. }
                | ElementKind::Circle { .. }
                | ElementKind::Text { .. }
                | ElementKind::Frame
        )
    }

    /// Kinds a connector may attach to.
    pub fn is_connectable(&self) -> bool {
        self.is_boxed()
    }

    /// Kinds whose text field is editable.
    pub fn is_text_bearing(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::Sticky { .. }
                | ElementKind::Rectangle { .. }
                | ElementKind::Circle { .. }
                | ElementKind::Text { .. }
        )
    }

    /// Kinds eligible for frame membership.
    pub fn can_join_frame(&self) -> bool {
        !self.is_frame() && !self.is_connector()
    }

    pub fn connector_endpoints(&self) -> Option<(ElementId, ElementId)> {
        match self.kind {
            ElementKind::Connector { from_id, to_id, .. } => Some((from_id, to_id)),
            _ => None,
        }
    }

    /// Line endpoints; the signed box diagonal.
    pub fn line_endpoints(&self) -> (Point, Point) {
        (
            Point::new(self.x, self.y),
            Point::new(self.x + self.width, self.y + self.height),
        )
    }

    /// Freehand points translated back into world space.
    pub fn freehand_world_points(&self) -> Vec<Point> {
        match &self.kind {
            ElementKind::Freehand { points, .. } => points
                .iter()
                .map(|p| Point::new(p.x + self.x, p.y + self.y))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }

    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }
}
