// src/engine.rs
//
// The core of thumbkit. A decoded raster is threaded through the stage
// kernels by `Image`, then handed to the encoder exactly once.
//
// This file is a facade over the decomposed modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Larger inputs are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod api;
mod canvas;
mod common;
mod config;
mod decoder;
mod encoder;
mod fallback;
mod io;
mod mask;
mod pipeline;
mod raster;

pub use api::Image;
pub use common::{run_with_panic_policy, EngineResult};
pub use config::EngineConfig;
pub use decoder::{check_dimensions, decode_raster, detect_format};
pub use encoder::{
    encode, encode_gif, encode_jpeg, encode_png, encode_webp_native, QualitySettings,
};
pub use fallback::{encode_webp, ExternalWebpEncoder, WebpStrategy};
pub use io::{ensure_parent_dir, Source};
pub use mask::{apply_rounded_mask, rounded_rect_path, MaskBounds};
pub use pipeline::{
    add_border, crop_to_fill, fast_resize_owned, flatten, rotate, rotated_dimensions,
    scale_alpha, thumbnail_dimensions, ResizeError,
};
pub use raster::Raster;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::error::ThumbkitError;
    use image::{DynamicImage, RgbImage};

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn create_png(width: u32, height: u32) -> Vec<u8> {
        let img = create_test_image(width, height);
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn create_jpeg(width: u32, height: u32) -> Vec<u8> {
        let rgba = create_test_image(width, height).to_rgba8();
        encode_jpeg(&rgba, 80).unwrap()
    }

    mod decode_tests {
        use super::*;

        #[test]
        fn test_jpeg_roundtrip_through_mozjpeg() {
            let img = Image::from_bytes_with_config(create_jpeg(64, 48), EngineConfig::default())
                .unwrap();
            assert_eq!((img.width(), img.height()), (64, 48));
            assert_eq!(img.source_format(), Some(image::ImageFormat::Jpeg));
            assert_eq!(img.frame_count(), 1);
        }

        #[test]
        fn test_png_decode() {
            let img = Image::from_bytes_with_config(create_png(10, 7), EngineConfig::default())
                .unwrap();
            assert_eq!((img.width(), img.height()), (10, 7));
            assert_eq!(img.source_format(), Some(image::ImageFormat::Png));
        }

        #[test]
        fn test_garbage_is_decode_error() {
            let err = Image::from_bytes_with_config(b"not an image at all", EngineConfig::default())
                .unwrap_err();
            assert!(matches!(err, ThumbkitError::DecodeFailed { .. }));
        }

        #[test]
        fn test_pixel_limit_from_config() {
            let config = EngineConfig::default().with_max_pixels(50);
            let err = Image::from_bytes_with_config(create_png(10, 10), config).unwrap_err();
            assert!(matches!(err, ThumbkitError::PixelCountExceedsLimit { .. }));
        }

        #[test]
        fn test_input_byte_limit_from_config() {
            let png = create_png(10, 10);
            let config = EngineConfig::default().with_max_input_bytes(8);
            let err = Image::from_bytes_with_config(&png, config).unwrap_err();
            assert!(matches!(err, ThumbkitError::InputTooLarge { .. }));
        }

        #[test]
        fn test_check_dimensions_limits() {
            assert!(check_dimensions(MAX_DIMENSION, 1).is_ok());
            assert!(check_dimensions(MAX_DIMENSION + 1, 1).is_err());
            assert!(check_dimensions(20_000, 20_000).is_err());
        }
    }

    mod pipeline_tests {
        use super::*;

        #[test]
        fn test_full_chain_to_png() {
            let bytes = Image::from_bytes_with_config(create_png(300, 200), EngineConfig::default())
                .unwrap()
                .crop(120, 120)
                .set_border(3, Color::rgb(20, 40, 60))
                .set_border_radius(20)
                .set_opacity(Some(0.8))
                .output("png", 75)
                .unwrap();

            let decoded = image::load_from_memory(&bytes).unwrap().into_rgba8();
            assert_eq!(decoded.dimensions(), (126, 126));
            assert_eq!(decoded.get_pixel(0, 0)[3], 0);
            // interior alpha is 255 * 0.8
            assert_eq!(decoded.get_pixel(63, 63)[3], 204);
        }

        #[test]
        fn test_source_from_bytes() {
            let source = Source::from_bytes(create_png(5, 5));
            let img = Image::from_source(&source, EngineConfig::default()).unwrap();
            assert_eq!((img.width(), img.height()), (5, 5));
        }
    }
}
