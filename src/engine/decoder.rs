// src/engine/decoder.rs
//
// Decoder operations: JPEG (mozjpeg), PNG (zune), WebP (libwebp), GIF and
// animated WebP (image crate, coalesced into full frames).

use crate::engine::common::run_with_panic_policy;
use crate::engine::config::EngineConfig;
use crate::engine::raster::Raster;
use crate::error::ThumbkitError;
use image::codecs::gif::GifDecoder;
use image::codecs::webp::WebPDecoder as ImageWebPDecoder;
use image::{
    AnimationDecoder, DynamicImage, Frame, GrayAlphaImage, GrayImage, ImageDecoder, ImageFormat,
    ImageReader, RgbImage, RgbaImage,
};
use mozjpeg::Decompress;
use std::io::Cursor;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

use crate::engine::MAX_DIMENSION;

type DecoderResult<T> = std::result::Result<T, ThumbkitError>;

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(ThumbkitError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            ThumbkitError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        let mut decompress = decompress.rgb().map_err(|e| {
            ThumbkitError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = decompress.width();
        let height = decompress.height();

        if width > MAX_DIMENSION as usize || height > MAX_DIMENSION as usize {
            return Err(ThumbkitError::dimension_exceeds_limit(
                width.max(height) as u32,
                MAX_DIMENSION,
            ));
        }
        let width_u32 = width as u32;
        let height_u32 = height as u32;
        check_dimensions(width_u32, height_u32)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            ThumbkitError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;

        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        let rgb_image =
            RgbImage::from_raw(width_u32, height_u32, flat_pixels).ok_or_else(|| {
                ThumbkitError::decode_failed("mozjpeg: failed to create image from raw data")
            })?;

        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

/// Decode with the image crate under the global panic policy.
pub fn decode_with_image_crate(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        image::load_from_memory(data)
            .map_err(|e| ThumbkitError::decode_failed(format!("decode failed: {e}")))
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default()
            .png_set_strip_to_8bit(true)
            .set_max_width(MAX_DIMENSION as usize)
            .set_max_height(MAX_DIMENSION as usize);
        let mut decoder = PngDecoder::new_with_options(Cursor::new(data), options);
        let pixels = decoder
            .decode()
            .map_err(|e| ThumbkitError::decode_failed(format!("png: decode failed: {e}")))?;

        let info = decoder
            .info()
            .ok_or_else(|| ThumbkitError::decode_failed("png: missing header info"))?;

        let width = info.width as u32;
        let height = info.height as u32;
        check_dimensions(width, height)?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(ThumbkitError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| ThumbkitError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| ThumbkitError::decode_failed("png: failed to build RGB image"))?,
            ColorSpace::RGBA => RgbaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(|| ThumbkitError::decode_failed("png: failed to build RGBA image"))?,
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| ThumbkitError::decode_failed("png: failed to build Luma image"))?,
            ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLumaA8)
                .ok_or_else(|| ThumbkitError::decode_failed("png: failed to build LumaA image"))?,
            other => {
                return Err(ThumbkitError::decode_failed(format!(
                    "png: unsupported colorspace {:?}",
                    other
                )))
            }
        };

        Ok(img)
    })
}

/// Decode a still WebP using libwebp.
pub fn decode_webp_libwebp(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:webp", || {
        let features = BitstreamFeatures::new(data).ok_or_else(|| {
            ThumbkitError::decode_failed("webp: failed to read bitstream features")
        })?;
        check_dimensions(features.width(), features.height())?;

        let decoded = WebPDecoder::new(data)
            .decode()
            .ok_or_else(|| ThumbkitError::decode_failed("webp: decode failed"))?;
        check_dimensions(decoded.width(), decoded.height())?;

        Ok(decoded.to_image())
    })
}

/// Decode every GIF frame, composited onto the full logical screen so that
/// disposal and partial-frame updates are already applied.
pub fn decode_gif_frames(data: &[u8]) -> DecoderResult<Vec<Frame>> {
    run_with_panic_policy("decode:gif", || {
        let decoder = GifDecoder::new(Cursor::new(data))
            .map_err(|e| ThumbkitError::decode_failed(format!("gif: {e}")))?;
        let (width, height) = decoder.dimensions();
        check_dimensions(width, height)?;
        decoder
            .into_frames()
            .collect_frames()
            .map_err(|e| ThumbkitError::decode_failed(format!("gif: frame decode failed: {e}")))
    })
}

/// Decode an animated WebP into full frames.
pub fn decode_webp_frames(data: &[u8]) -> DecoderResult<Vec<Frame>> {
    run_with_panic_policy("decode:webp:anim", || {
        let decoder = ImageWebPDecoder::new(Cursor::new(data))
            .map_err(|e| ThumbkitError::decode_failed(format!("webp (animated): {e}")))?;
        let (width, height) = decoder.dimensions();
        check_dimensions(width, height)?;
        decoder.into_frames().collect_frames().map_err(|e| {
            ThumbkitError::decode_failed(format!("webp (animated) decode failed: {e}"))
        })
    })
}

fn is_animated_webp(data: &[u8]) -> bool {
    BitstreamFeatures::new(data).is_some_and(|f| f.has_animation())
}

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Unified decode entrypoint:
/// - Enforce the configured input guards
/// - Detect format once (magic bytes)
/// - Route stills to the fastest decoder, animations to frame decoders
pub fn decode_raster(bytes: &[u8], config: &EngineConfig) -> DecoderResult<Raster> {
    config.enforce_source_len(bytes.len())?;
    if bytes.is_empty() {
        return Err(ThumbkitError::decode_failed("empty input"));
    }

    // Header-only size check before any pixel buffer is allocated
    ensure_dimensions_safe(bytes)?;

    let detected = detect_format(bytes);
    let raster = match detected {
        Some(ImageFormat::Jpeg) => {
            // CMYK and other exotic JPEGs are left to the image crate
            let img = decode_jpeg_mozjpeg(bytes).or_else(|e| {
                tracing::debug!(target: "thumbkit::decode", error = %e, "mozjpeg failed, retrying with image crate");
                decode_with_image_crate(bytes)
            })?;
            Raster::single(img.into_rgba8(), detected)
        }
        Some(ImageFormat::Png) => Raster::single(decode_png_zune(bytes)?.into_rgba8(), detected),
        Some(ImageFormat::WebP) if is_animated_webp(bytes) => {
            Raster::from_frames(decode_webp_frames(bytes)?, detected)?
        }
        Some(ImageFormat::WebP) => {
            Raster::single(decode_webp_libwebp(bytes)?.into_rgba8(), detected)
        }
        Some(ImageFormat::Gif) => Raster::from_frames(decode_gif_frames(bytes)?, detected)?,
        Some(other) => {
            return Err(ThumbkitError::decode_failed(format!(
                "unsupported input format: {other:?}"
            )))
        }
        None => {
            return Err(ThumbkitError::decode_failed(
                "unrecognized image data (expected JPEG, PNG, GIF or WebP)",
            ))
        }
    };

    let (width, height) = raster.dimensions();
    if width == 0 || height == 0 {
        return Err(ThumbkitError::decode_failed("image has zero width or height"));
    }
    config.enforce_pixels(width, height)?;

    tracing::debug!(
        target: "thumbkit::decode",
        format = ?detected,
        width,
        height,
        frames = raster.len(),
        "decoded"
    );
    Ok(raster)
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> DecoderResult<()> {
    use super::MAX_PIXELS;
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ThumbkitError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(ThumbkitError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Inspect encoded bytes and ensure the image dimensions are safe before decoding.
pub fn ensure_dimensions_safe(bytes: &[u8]) -> DecoderResult<()> {
    let cursor = Cursor::new(bytes);
    if let Ok(reader) = ImageReader::new(cursor).with_guessed_format() {
        if let Ok((width, height)) = reader.into_dimensions() {
            return check_dimensions(width, height);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::{Delay, GenericImageView, ImageFormat, Rgb, RgbImage, Rgba};

    fn encode_webp(width: u32, height: u32) -> Vec<u8> {
        let rgb: Vec<u8> = std::iter::repeat([10u8, 20u8, 30u8])
            .take((width * height) as usize)
            .flatten()
            .collect();
        let encoder = webp::Encoder::from_rgb(&rgb, width, height);
        encoder.encode_lossless().to_vec()
    }

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |_, _| Rgb([0, 0, 0]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn encode_gif(frames: &[[u8; 3]], width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut buf);
            encoder.set_repeat(Repeat::Infinite).unwrap();
            let frames = frames.iter().map(|c| {
                Frame::from_parts(
                    RgbaImage::from_pixel(width, height, Rgba([c[0], c[1], c[2], 255])),
                    0,
                    0,
                    Delay::from_numer_denom_ms(100, 1),
                )
            });
            encoder.encode_frames(frames).unwrap();
        }
        buf
    }

    #[test]
    fn test_ensure_dimensions_safe_allows_small_image() {
        let data = encode_png(64, 64);
        assert!(ensure_dimensions_safe(&data).is_ok());
    }

    #[test]
    fn test_ensure_dimensions_safe_rejects_large_image() {
        let width = crate::engine::MAX_DIMENSION + 1;
        let data = encode_png(width, 1);
        let err = ensure_dimensions_safe(&data).unwrap_err();
        assert!(matches!(err, ThumbkitError::DimensionExceedsLimit { .. }));
    }

    #[test]
    fn test_detect_format_jpeg_and_png() {
        let png = encode_png(2, 2);
        let jpeg = {
            let mut buf = Vec::new();
            DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])))
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
                .unwrap();
            buf
        };
        assert_eq!(detect_format(&png), Some(ImageFormat::Png));
        assert_eq!(detect_format(&jpeg), Some(ImageFormat::Jpeg));
    }

    #[test]
    fn test_decode_png_to_rgba_raster() {
        let png = encode_png(3, 1);
        let raster = decode_raster(&png, &EngineConfig::default()).unwrap();
        assert_eq!(raster.source_format(), Some(ImageFormat::Png));
        assert_eq!(raster.dimensions(), (3, 1));
        assert_eq!(raster.first().get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_decode_wide_png_up_to_dimension_limit() {
        let png = encode_png(20000, 2);
        let raster = decode_raster(&png, &EngineConfig::default()).unwrap();
        assert_eq!(raster.dimensions(), (20000, 2));
    }

    #[test]
    fn test_decode_jpeg_routes_to_mozjpeg() {
        let jpeg = {
            let mut buf = Vec::new();
            DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([9, 8, 7])))
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
                .unwrap();
            buf
        };
        let img = decode_jpeg_mozjpeg(&jpeg).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        let raster = decode_raster(&jpeg, &EngineConfig::default()).unwrap();
        assert_eq!(raster.source_format(), Some(ImageFormat::Jpeg));
        assert_eq!(raster.len(), 1);
    }

    #[test]
    fn test_decode_webp_routes_to_libwebp() {
        let webp = encode_webp(3, 2);
        let raster = decode_raster(&webp, &EngineConfig::default()).unwrap();
        assert_eq!(raster.source_format(), Some(ImageFormat::WebP));
        assert_eq!(raster.dimensions(), (3, 2));
        let pixel = raster.first().get_pixel(0, 0);
        assert_eq!(&pixel.0[..3], &[10, 20, 30]);
    }

    #[test]
    fn test_decode_gif_keeps_every_frame_in_order() {
        let gif = encode_gif(&[[255, 0, 0], [0, 255, 0], [0, 0, 255]], 8, 6);
        let raster = decode_raster(&gif, &EngineConfig::default()).unwrap();
        assert_eq!(raster.len(), 3);
        assert_eq!(raster.dimensions(), (8, 6));
        let dominant: Vec<usize> = raster
            .frames()
            .iter()
            .map(|f| {
                let px = f.buffer().get_pixel(4, 3).0;
                (0..3).max_by_key(|&i| px[i]).unwrap()
            })
            .collect();
        assert_eq!(dominant, vec![0, 1, 2]);
        assert_eq!(raster.delays_ms(), vec![100, 100, 100]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_raster(b"definitely not an image", &EngineConfig::default())
            .unwrap_err();
        assert!(matches!(err, ThumbkitError::DecodeFailed { .. }));
        let err = decode_raster(&[], &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, ThumbkitError::DecodeFailed { .. }));
    }

    #[test]
    fn test_decode_enforces_config_limits() {
        let png = encode_png(10, 10);
        let small_bytes = EngineConfig::default().with_max_input_bytes(8);
        assert!(matches!(
            decode_raster(&png, &small_bytes),
            Err(ThumbkitError::InputTooLarge { .. })
        ));
        let small_pixels = EngineConfig::default().with_max_pixels(99);
        assert!(matches!(
            decode_raster(&png, &small_pixels),
            Err(ThumbkitError::PixelCountExceedsLimit { .. })
        ));
    }
}
