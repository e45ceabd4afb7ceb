//! Wire form of elements: persistence rows with an open `properties` bag,
//! and the sparse patch type used for partial updates.

use kurbo::Point;
use serde::{Deserialize, Deserializer, Serialize};

use super::{
    BoardId, ConnectorRoute, DEFAULT_CONNECTOR_THICKNESS, DEFAULT_FONT_SIZE, DEFAULT_STROKE_WIDTH,
    Element, ElementId, ElementKind, ElementType, LineStyle, TimestampMs, UserId,
};
use crate::color::ElementColor;
use uuid::Uuid;

/// Open attribute bag carried by the row's `properties` JSON column.
///
/// Every key is optional so rows written by older versions parse cleanly;
/// absent keys fall back to kind defaults when the row becomes an element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PropertyBag {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_id: Option<ElementId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_id: Option<ElementId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<ConnectorRoute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_style: Option<LineStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thickness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<(f64, f64)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<ElementId>,
    #[serde(rename = "z_index", skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
}

/// One persisted element row, exactly as the storage boundary sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRow {
    pub id: ElementId,
    pub board_id: BoardId,
    pub kind: ElementType,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: ElementColor,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub properties: PropertyBag,
    pub created_by: UserId,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

impl ElementRow {
    pub fn from_element(element: &Element) -> Self {
        let mut bag = PropertyBag {
            z_index: Some(element.z_index),
            frame_id: element.frame_id,
            ..PropertyBag::default()
        };
        match &element.kind {
            ElementKind::Sticky { rotation, font_size }
            | ElementKind::Rectangle { rotation, font_size }
            | ElementKind::Circle { rotation, font_size }
            | ElementKind::Text { rotation, font_size } => {
                bag.rotation = Some(*rotation);
                bag.font_size = Some(*font_size);
            }
            ElementKind::Frame | ElementKind::Line => {}
            ElementKind::Freehand {
                points,
                stroke_width,
            } => {
                bag.points = Some(points.iter().map(|p| (p.x, p.y)).collect());
                bag.stroke_width = Some(*stroke_width);
            }
            ElementKind::Connector {
                from_id,
                to_id,
                route,
                line_style,
                thickness,
            } => {
                bag.from_id = Some(*from_id);
                bag.to_id = Some(*to_id);
                bag.route = Some(*route);
                bag.line_style = Some(*line_style);
                bag.thickness = Some(*thickness);
            }
        }
        Self {
            id: element.id,
            board_id: element.board_id,
            kind: element.element_type(),
            x: element.x,
            y: element.y,
            width: element.width,
            height: element.height,
            color: element.color,
            text: element.text.clone(),
            properties: bag,
            created_by: element.created_by,
            created_at: element.created_at,
            updated_at: element.updated_at,
        }
    }

    /// Rebuild the in-memory element, defaulting any absent bag keys.
    pub fn into_element(self) -> Element {
        let bag = &self.properties;
        let rotation = bag.rotation.unwrap_or(0.0);
        let font_size = bag.font_size.unwrap_or(DEFAULT_FONT_SIZE);
        let kind = match self.kind {
            ElementType::Sticky => ElementKind::Sticky {
                rotation,
                font_size,
            },
            ElementType::Rectangle => ElementKind::Rectangle {
                rotation,
                font_size,
            },
            ElementType::Circle => ElementKind::Circle {
                rotation,
                font_size,
            },
            ElementType::Text => ElementKind::Text {
                rotation,
                font_size,
            },
            ElementType::Frame => ElementKind::Frame,
            ElementType::Line => ElementKind::Line,
            ElementType::Freehand => ElementKind::Freehand {
                points: bag
                    .points
                    .as_deref()
                    .unwrap_or(&[])
                    .iter()
                    .map(|&(x, y)| Point::new(x, y))
                    .collect(),
                stroke_width: bag.stroke_width.unwrap_or(DEFAULT_STROKE_WIDTH),
            },
            ElementType::Connector => ElementKind::Connector {
                // A row missing an endpoint parses to a nil reference; the
                // connector is then inert rather than fatal.
                from_id: bag.from_id.unwrap_or_else(Uuid::nil),
                to_id: bag.to_id.unwrap_or_else(Uuid::nil),
                route: bag.route.unwrap_or_default(),
                line_style: bag.line_style.unwrap_or_default(),
                thickness: bag.thickness.unwrap_or(DEFAULT_CONNECTOR_THICKNESS),
            },
        };
        Element {
            id: self.id,
            board_id: self.board_id,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            color: self.color,
            text: self.text,
            z_index: bag.z_index.unwrap_or(0),
            frame_id: bag.frame_id,
            kind,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn some_if_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Sparse update: only fields that are present are applied, so concurrent
/// updates touching different fields interleave as last-write-wins per
/// field rather than per element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ElementPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ElementColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<ConnectorRoute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_style: Option<LineStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thickness: Option<f64>,
    /// Freehand points relative to the element origin; replaced wholesale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<(f64, f64)>>,
    #[serde(rename = "z_index", skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    /// Outer `None` leaves membership untouched; `Some(None)` clears it.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "some_if_present"
    )]
    pub frame_id: Option<Option<ElementId>>,
}

impl ElementPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Patch that moves an element to a new origin.
    pub fn move_to(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    /// Patch that rewrites the full box.
    pub fn place(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    /// Merge the present fields into `element`, refreshing `updated_at`.
    pub fn apply_to(&self, element: &mut Element) {
        if let Some(x) = self.x {
            element.x = x;
        }
        if let Some(y) = self.y {
            element.y = y;
        }
        if let Some(width) = self.width {
            element.width = width;
        }
        if let Some(height) = self.height {
            element.height = height;
        }
        if let Some(color) = self.color {
            element.color = color;
        }
        if let Some(text) = &self.text {
            element.text = text.clone();
        }
        if let Some(rotation) = self.rotation {
            element.set_rotation(rotation);
        }
        if let Some(size) = self.font_size {
            match &mut element.kind {
                ElementKind::Sticky { font_size, .. }
                | ElementKind::Rectangle { font_size, .. }
                | ElementKind::Circle { font_size, .. }
                | ElementKind::Text { font_size, .. } => *font_size = size,
                _ => {}
            }
        }
        if let ElementKind::Connector {
            route,
            line_style,
            thickness,
            ..
        } = &mut element.kind
        {
            if let Some(r) = self.route {
                *route = r;
            }
            if let Some(s) = self.line_style {
                *line_style = s;
            }
            if let Some(t) = self.thickness {
                *thickness = t;
            }
        }
        if let Some(pts) = &self.points {
            if let ElementKind::Freehand { points, .. } = &mut element.kind {
                *points = pts.iter().map(|&(x, y)| Point::new(x, y)).collect();
            }
        }
        if let Some(z) = self.z_index {
            element.z_index = z;
        }
        if let Some(frame_id) = self.frame_id {
            element.frame_id = frame_id;
        }
        element.touch();
    }

    /// Fold `later` over this patch; later's present fields win.
    pub fn merge(&mut self, later: Self) {
        self.x = later.x.or(self.x.take());
        self.y = later.y.or(self.y.take());
        self.width = later.width.or(self.width.take());
        self.height = later.height.or(self.height.take());
        self.color = later.color.or(self.color.take());
        self.text = later.text.or(self.text.take());
        self.rotation = later.rotation.or(self.rotation.take());
        self.font_size = later.font_size.or(self.font_size.take());
        self.route = later.route.or(self.route.take());
        self.line_style = later.line_style.or(self.line_style.take());
        self.thickness = later.thickness.or(self.thickness.take());
        self.points = later.points.or(self.points.take());
        self.z_index = later.z_index.or(self.z_index.take());
        self.frame_id = later.frame_id.or(self.frame_id.take());
    }
}
