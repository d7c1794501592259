// src/color.rs
//
// Straight-alpha RGBA color used for borders and backgrounds.

use crate::error::ThumbkitError;
use image::Rgba;
use std::fmt;
use std::str::FromStr;

/// An 8-bit, non-premultiplied RGBA color.
///
/// Parsed from anything CSS accepts: `#rgb`, `#rrggbbaa`, `rgb(..)`,
/// `hsl(..)`, named colors and `transparent`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn parse(value: &str) -> Result<Self, ThumbkitError> {
        let parsed = csscolorparser::parse(value.trim())
            .map_err(|e| ThumbkitError::invalid_color(value.to_string(), e.to_string()))?;
        let [r, g, b, a] = parsed.to_rgba8();
        Ok(Self { r, g, b, a })
    }

    pub fn is_opaque(&self) -> bool {
        self.a == 255
    }

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }

    pub(crate) fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

impl FromStr for Color {
    type Err = ThumbkitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Rgba<u8>> for Color {
    fn from(px: Rgba<u8>) -> Self {
        let [r, g, b, a] = px.0;
        Self { r, g, b, a }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(Color::parse("#ff0000").unwrap(), Color::rgb(255, 0, 0));
        assert_eq!(Color::parse("#0f0").unwrap(), Color::rgb(0, 255, 0));
        assert_eq!(
            Color::parse("#0000ff80").unwrap(),
            Color::rgba(0, 0, 255, 128)
        );
    }

    #[test]
    fn test_parse_named_and_transparent() {
        assert_eq!(Color::parse("white").unwrap(), Color::WHITE);
        assert_eq!(Color::parse(" black ").unwrap(), Color::BLACK);
        assert_eq!(Color::parse("transparent").unwrap().a, 0);
    }

    #[test]
    fn test_parse_functional() {
        assert_eq!(
            "rgb(10, 20, 30)".parse::<Color>().unwrap(),
            Color::rgb(10, 20, 30)
        );
    }

    #[test]
    fn test_parse_invalid() {
        let err = Color::parse("not-a-color").unwrap_err();
        assert!(matches!(err, ThumbkitError::InvalidColor { .. }));
    }

    #[test]
    fn test_display_roundtrips() {
        let c = Color::rgba(1, 2, 3, 4);
        assert_eq!(c.to_string(), "#01020304");
        assert_eq!(Color::parse(&c.to_string()).unwrap(), c);
    }
}
