// src/engine/canvas.rs
//
// Bridges between straight-alpha `RgbaImage` buffers and tiny-skia's
// premultiplied `Pixmap`, plus the two blend primitives the stages need.

use crate::color::Color;
use image::{Rgba, RgbaImage};
use tiny_skia::{ColorU8, Pixmap, PixmapPaint, Transform};

/// Fully transparent canvas. None when the size is zero or too large for tiny-skia.
pub fn blank(width: u32, height: u32) -> Option<Pixmap> {
    Pixmap::new(width, height)
}

/// Canvas filled with a solid color.
pub fn filled(width: u32, height: u32, color: Color) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(width, height)?;
    pixmap.fill(color.to_skia());
    Some(pixmap)
}

/// Premultiply an RGBA buffer into a new pixmap.
pub fn to_pixmap(img: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(img.width(), img.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(img.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}

/// Demultiply a pixmap back into a straight-alpha buffer.
pub fn from_pixmap(pixmap: &Pixmap) -> RgbaImage {
    let mut img = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in img.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    img
}

/// Draw `src` over `dst` at (x, y) with normal (source-over) compositing.
pub fn source_over(dst: &mut Pixmap, src: &Pixmap, x: i32, y: i32) {
    dst.draw_pixmap(
        x,
        y,
        src.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
}

/// Destination-in against a coverage mask: keep each pixel's color, clamp
/// its alpha to the mask's alpha at the same position.
///
/// Using the minimum (rather than the product) makes repeated application
/// with the same mask a no-op.
pub fn destination_in(img: &mut RgbaImage, mask: &Pixmap) {
    debug_assert_eq!(img.dimensions(), (mask.width(), mask.height()));
    for (px, m) in img.pixels_mut().zip(mask.pixels()) {
        px.0[3] = px.0[3].min(m.alpha());
    }
}
