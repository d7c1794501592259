// src/engine/pipeline.rs
//
// Stage kernels: thumbnail crop, rectangular border, opacity, rotation,
// flatten. Each takes a frame by value and returns the replacement frame.

use crate::color::Color;
use crate::engine::canvas;
use crate::engine::MAX_DIMENSION;
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops, imageops::FilterType, RgbaImage};
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};
use tracing::debug;

/// Error returned when the SIMD resizer and its fallback both fail.
#[derive(Debug, Clone)]
pub struct ResizeError {
    pub source_dims: (u32, u32),
    pub target_dims: (u32, u32),
    pub reason: String,
}

impl ResizeError {
    fn new(source_dims: (u32, u32), target_dims: (u32, u32), reason: impl Into<String>) -> Self {
        Self {
            source_dims,
            target_dims,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// GEOMETRY
// =============================================================================

/// Resolve the thumbnail box. A zero side is derived from the other side and
/// the original aspect ratio (truncating); both zero keeps the original size.
pub fn thumbnail_dimensions(orig_w: u32, orig_h: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    match (target_w, target_h) {
        (0, 0) => (orig_w, orig_h),
        (0, h) => {
            let w = (h as u64 * orig_w as u64 / orig_h.max(1) as u64) as u32;
            (w.max(1), h)
        }
        (w, 0) => {
            let h = (w as u64 * orig_h as u64 / orig_w.max(1) as u64) as u32;
            (w, h.max(1))
        }
        (w, h) => (w, h),
    }
}

/// Dimensions that cover the target box while keeping the aspect ratio.
pub(crate) fn calc_cover_resize_dimensions(
    orig_w: u32,
    orig_h: u32,
    target_w: u32,
    target_h: u32,
) -> (u32, u32) {
    if orig_w == 0 || orig_h == 0 {
        return (target_w.max(1), target_h.max(1));
    }
    let scale_w = target_w as f64 / orig_w as f64;
    let scale_h = target_h as f64 / orig_h as f64;
    let scale = scale_w.max(scale_h);
    let resize_w = ((orig_w as f64 * scale).ceil() as u32).max(target_w).max(1);
    let resize_h = ((orig_h as f64 * scale).ceil() as u32).max(target_h).max(1);
    (resize_w, resize_h)
}

fn crop_center(img: RgbaImage, target_w: u32, target_h: u32) -> RgbaImage {
    let crop_width = target_w.min(img.width()).max(1);
    let crop_height = target_h.min(img.height()).max(1);
    if crop_width == img.width() && crop_height == img.height() {
        return img;
    }
    let crop_x = (img.width() - crop_width) / 2;
    let crop_y = (img.height() - crop_height) / 2;
    imageops::crop_imm(&img, crop_x, crop_y, crop_width, crop_height).to_image()
}

/// Scale to fill the box, then trim the overflow evenly from both sides.
pub fn crop_to_fill(img: RgbaImage, target_w: u32, target_h: u32) -> RgbaImage {
    if img.dimensions() == (target_w, target_h) {
        return img;
    }
    let (src_w, src_h) = img.dimensions();
    let (resize_w, resize_h) = calc_cover_resize_dimensions(src_w, src_h, target_w, target_h);

    let resized = if (resize_w, resize_h) == (src_w, src_h) {
        img
    } else {
        match fast_resize_owned(img, resize_w, resize_h) {
            Ok(resized) => resized,
            Err(err) => {
                // Only reachable for degenerate sizes; keep the frame usable.
                tracing::warn!(target: "thumbkit::pipeline", reason = %err.reason, "resize failed");
                RgbaImage::new(resize_w, resize_h)
            }
        }
    };
    debug!(
        target: "thumbkit::pipeline",
        from_w = src_w, from_h = src_h, resize_w, resize_h, target_w, target_h,
        "thumbnail crop"
    );
    crop_center(resized, target_w, target_h)
}

// =============================================================================
// RESIZE (fast_image_resize with image crate fallback)
// =============================================================================

fn default_resize_options() -> ResizeOptions {
    ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
}

/// Resize an owned RGBA buffer, taking ownership of its pixels.
pub fn fast_resize_owned(
    img: RgbaImage,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<RgbaImage, ResizeError> {
    let (src_width, src_height) = img.dimensions();
    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(ResizeError::new(
            (src_width, src_height),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }

    let mut src_pixels = img.into_raw();
    let primary = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        src_pixels.as_mut_slice(),
        PixelType::U8x4,
    ) {
        Ok(src_image) => resize_with_source_image(src_image, dst_width, dst_height),
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let mut aligned = fir::images::Image::new(src_width, src_height, PixelType::U8x4);
            aligned.buffer_mut().copy_from_slice(&src_pixels);
            resize_with_source_image(aligned, dst_width, dst_height)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    primary
        .or_else(|err| {
            resize_with_image_crate_fallback(src_pixels, src_width, src_height, dst_width, dst_height)
                .map_err(|fallback_err| {
                    format!("{err}; image crate fallback failed: {fallback_err}")
                })
        })
        .map_err(|reason| {
            ResizeError::new((src_width, src_height), (dst_width, dst_height), reason)
        })
}

fn resize_with_image_crate_fallback(
    src_pixels: Vec<u8>,
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<RgbaImage, String> {
    let rgba = RgbaImage::from_raw(src_width, src_height, src_pixels)
        .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?;
    Ok(imageops::resize(&rgba, dst_width, dst_height, FilterType::Lanczos3))
}

fn is_fully_opaque(image: &fir::images::Image) -> bool {
    image.buffer().iter().skip(3).step_by(4).all(|&alpha| alpha == 255)
}

fn resize_with_source_image(
    mut src_image: fir::images::Image<'_>,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<RgbaImage, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, PixelType::U8x4);

    // Premultiply so transparent pixels do not bleed their color into edges
    let needs_premultiply = !is_fully_opaque(&src_image);
    let mul_div = MulDiv::default();
    if needs_premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &default_resize_options())
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    RgbaImage::from_raw(dst_width, dst_height, dst_image.into_vec())
        .ok_or_else(|| "failed to create rgba image from resized data".to_string())
}

// =============================================================================
// BORDER
// =============================================================================

/// Grow the canvas by `width` on every side, filling the new band with `color`.
pub fn add_border(img: RgbaImage, width: u32, color: Color) -> RgbaImage {
    if width == 0 {
        return img;
    }
    let (w, h) = img.dimensions();
    let grown = width.checked_mul(2);
    let framed_size = grown
        .and_then(|g| Some((w.checked_add(g)?, h.checked_add(g)?)))
        .filter(|&(fw, fh)| fw <= MAX_DIMENSION && fh <= MAX_DIMENSION);
    let Some((framed_w, framed_h)) = framed_size else {
        tracing::warn!(target: "thumbkit::pipeline", border = width, w, h, "border exceeds canvas limit, skipping");
        return img;
    };
    let mut framed = RgbaImage::from_pixel(framed_w, framed_h, color.to_rgba());
    imageops::replace(&mut framed, &img, width as i64, width as i64);
    framed
}

// =============================================================================
// ADJUSTMENT
// =============================================================================

/// Multiply every alpha value by `opacity`, clamped to the channel range.
pub fn scale_alpha(mut img: RgbaImage, opacity: f32) -> RgbaImage {
    for px in img.pixels_mut() {
        let scaled = (px.0[3] as f32 * opacity).round();
        px.0[3] = scaled.clamp(0.0, 255.0) as u8;
    }
    img
}

/// Bounding box of a `width x height` canvas rotated by `degrees`.
pub fn rotated_dimensions(width: u32, height: u32, degrees: f32) -> (u32, u32) {
    let rad = (degrees as f64).to_radians();
    let (sin, cos) = (rad.sin().abs(), rad.cos().abs());
    let w = width as f64;
    let h = height as f64;
    // Trim float noise so e.g. 45 degrees on a square is not one pixel too big
    let fit = |v: f64| ((v - 1e-6).ceil().max(1.0)) as u32;
    (fit(w * cos + h * sin), fit(w * sin + h * cos))
}

/// Rotate clockwise by `degrees`, growing the canvas to fit. Exposed
/// corners are transparent. Right angles are exact pixel transpositions.
pub fn rotate(img: RgbaImage, degrees: f32) -> RgbaImage {
    let normalized = degrees.rem_euclid(360.0);
    if normalized == 0.0 {
        return img;
    }
    if normalized == 90.0 {
        return imageops::rotate90(&img);
    }
    if normalized == 180.0 {
        return imageops::rotate180(&img);
    }
    if normalized == 270.0 {
        return imageops::rotate270(&img);
    }

    let (w, h) = img.dimensions();
    let (new_w, new_h) = rotated_dimensions(w, h, normalized);
    let (Some(src), Some(mut dst)) = (canvas::to_pixmap(&img), Pixmap::new(new_w, new_h)) else {
        tracing::warn!(target: "thumbkit::pipeline", w, h, new_w, new_h, "rotation canvas unavailable");
        return img;
    };

    let transform = Transform::from_translate(-(w as f32) / 2.0, -(h as f32) / 2.0)
        .post_concat(Transform::from_rotate(normalized))
        .post_concat(Transform::from_translate(new_w as f32 / 2.0, new_h as f32 / 2.0));
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    dst.draw_pixmap(0, 0, src.as_ref(), &paint, transform, None);
    canvas::from_pixmap(&dst)
}

// =============================================================================
// FLATTEN
// =============================================================================

/// Composite every frame, in order, over a solid background into one frame.
pub fn flatten<I>(frames: I, width: u32, height: u32, background: Color) -> RgbaImage
where
    I: IntoIterator<Item = RgbaImage>,
{
    let Some(mut base) = canvas::filled(width, height, background) else {
        return RgbaImage::from_pixel(width, height, background.to_rgba());
    };
    for frame in frames {
        if let Some(layer) = canvas::to_pixmap(&frame) {
            canvas::source_over(&mut base, &layer, 0, 0);
        }
    }
    canvas::from_pixmap(&base)
}
