//! Rendering attribute primitives carried inside tool snapshots.

use peniko::Color;
use serde::{Deserialize, Serialize};

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub const fn yellow() -> Self {
        Self::new(255, 255, 0, 255)
    }

    /// Parse a `#rrggbb` or `#rgb` hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().strip_prefix('#')?;
        match hex.len() {
            3 => {
                let mut channels = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    channels[i] = u8::from_str_radix(&c.to_string(), 16).ok()? * 17;
                }
                Some(Self::new(channels[0], channels[1], channels[2], 255))
            }
            6 => {
                let r = u8::from_str_radix(hex.get(0..2)?, 16).ok()?;
                let g = u8::from_str_radix(hex.get(2..4)?, 16).ok()?;
                let b = u8::from_str_radix(hex.get(4..6)?, 16).ok()?;
                Some(Self::new(r, g, b, 255))
            }
            _ => None,
        }
    }

    /// Format as `#rrggbb`, dropping alpha.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// How a stroke combines with the pixels already on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeMode {
    /// Paint over existing content.
    #[default]
    SourceOver,
    /// Remove existing content under the stroke.
    DestinationOut,
    /// Darken existing content, used for highlighting.
    Multiply,
}

/// Shape drawn where two segments of a stroke meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineJoin {
    #[default]
    Round,
    Bevel,
    Miter,
}

/// Shape drawn at the open ends of a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineCap {
    #[default]
    Round,
    Butt,
    Square,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_parsing() {
        assert_eq!(SerializableColor::from_hex("#0076ff"), Some(SerializableColor::new(0, 0x76, 0xff, 255)));
        assert_eq!(SerializableColor::from_hex("#fff"), Some(SerializableColor::new(255, 255, 255, 255)));
        assert_eq!(SerializableColor::from_hex("0076ff"), None);
        assert_eq!(SerializableColor::from_hex("#12345"), None);
        assert_eq!(SerializableColor::from_hex("#gggggg"), None);
    }

    #[test]
    fn test_hex_formatting() {
        assert_eq!(SerializableColor::new(236, 236, 236, 255).to_hex(), "#ececec");
    }

    #[test]
    fn test_peniko_conversion() {
        let original = SerializableColor::new(12, 34, 56, 200);
        let color: Color = original.into();
        assert_eq!(SerializableColor::from(color), original);
    }

    #[test]
    fn test_composite_serialization() {
        let json = serde_json::to_string(&CompositeMode::DestinationOut).unwrap();
        assert_eq!(json, "\"destination_out\"");
    }
}
