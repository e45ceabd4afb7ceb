//! Board colors, stored as `#rrggbb` hex text on the wire.

use peniko::Color;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque RGB color carried by every element. Serializes as hex text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ElementColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (alpha is dropped).
    pub fn parse(text: &str) -> Option<Self> {
        let hex = text.trim().strip_prefix('#')?;
        // Byte slicing below requires ASCII.
        if !hex.is_ascii() {
            return None;
        }
        match hex.len() {
            3 => {
                let r = u8::from_str_radix(&hex[0..1], 16).ok()? * 17;
                let g = u8::from_str_radix(&hex[1..2], 16).ok()? * 17;
                let b = u8::from_str_radix(&hex[2..3], 16).ok()? * 17;
                Some(Self::new(r, g, b))
            }
            6 | 8 => {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                Some(Self::new(r, g, b))
            }
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Same color with the given alpha, for rendering.
    pub fn with_alpha(self, alpha: u8) -> Color {
        Color::from_rgba8(self.r, self.g, self.b, alpha)
    }
}

impl From<ElementColor> for Color {
    fn from(color: ElementColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, 255)
    }
}

impl From<Color> for ElementColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self::new(rgba.r, rgba.g, rgba.b)
    }
}

impl Serialize for ElementColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ElementColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).ok_or_else(|| D::Error::custom(format!("bad color {text:?}")))
    }
}

/// Muted default palette, one entry per element kind family.
pub mod palette {
    use super::ElementColor;

    pub const STICKY: ElementColor = ElementColor::new(0xfd, 0xe0, 0x47);
    pub const SHAPE: ElementColor = ElementColor::new(0x64, 0x74, 0x8b);
    pub const TEXT: ElementColor = ElementColor::new(0x1e, 0x29, 0x3b);
    pub const FRAME: ElementColor = ElementColor::new(0x94, 0xa3, 0xb8);
    pub const LINE: ElementColor = ElementColor::new(0x33, 0x41, 0x55);
    pub const STROKE: ElementColor = ElementColor::new(0x33, 0x41, 0x55);
    pub const CONNECTOR: ElementColor = ElementColor::new(0x64, 0x74, 0x8b);
}
