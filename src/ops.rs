// src/ops.rs
//
// Output format selection.
// Parsing a format string is cheap and happens before any file is touched.

use crate::error::ThumbkitError;

/// Quality used by `save`/`output` when the caller has no preference.
pub const DEFAULT_QUALITY: u8 = 75;

/// Output format for encoding, with the quality knob each codec understands.
///
/// JPEG and WebP take quality 0-100 (higher is better). PNG takes a zlib-style
/// compression level 0-9 where 0 is best/slowest and 9 is fastest. GIF has no
/// quality parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Gif,
    WebP { quality: u8 },
    Png { compression_level: u8 },
}

impl OutputFormat {
    /// Map a format name plus caller quality onto an encoder configuration.
    ///
    /// Names are matched exactly (`jpg`, `jpeg`, `gif`, `webp`, `png`); anything
    /// else is rejected rather than defaulted.
    pub fn parse(format: &str, quality: u8) -> Result<Self, ThumbkitError> {
        let quality = quality.min(100);
        match format {
            "jpg" | "jpeg" => Ok(Self::Jpeg { quality }),
            "gif" => Ok(Self::Gif),
            "webp" => Ok(Self::WebP { quality }),
            "png" => Ok(Self::Png {
                compression_level: png_compression_level(quality),
            }),
            other => Err(ThumbkitError::unsupported_format(other.to_string())),
        }
    }

    /// Lowercase name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "jpeg",
            Self::Gif => "gif",
            Self::WebP { .. } => "webp",
            Self::Png { .. } => "png",
        }
    }

    /// Whether the encoder keeps every frame of an animated raster.
    pub fn supports_animation(&self) -> bool {
        matches!(self, Self::Gif | Self::WebP { .. })
    }
}

/// Scale quality 0-100 onto PNG compression levels 0-9, inverted so that
/// quality 100 maps to level 0.
pub fn png_compression_level(quality: u8) -> u8 {
    let scaled = ((quality.min(100) as f64 / 100.0) * 9.0).round() as u8;
    9 - scaled
}
