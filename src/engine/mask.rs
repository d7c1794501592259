// src/engine/mask.rs
//
// Rounded-corner masking and the stroked border ring.
//
// Two passes over each frame:
// 1. fill a rounded rectangle into a transparent mask and clip the frame to
//    it with destination-in
// 2. when a border is set, stroke the same rounded path onto a fresh
//    transparent canvas and draw the clipped frame over it (source-over);
//    that canvas becomes the frame
//
// The rounded rectangle is inset by the border width on every side, or by a
// single pixel on the right/bottom when there is no border.

use crate::color::Color;
use crate::engine::canvas;
use image::RgbaImage;
use tiny_skia::{FillRule, Paint, Path, PathBuilder, Rect, Stroke, Transform};

// Control-point distance for approximating a quarter circle with one cubic.
const KAPPA: f32 = 0.552_284_8;

/// Inclusive pixel bounds of the rounded rectangle for a canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaskBounds {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl MaskBounds {
    /// Returns None when the inset leaves no pixels.
    pub fn for_canvas(width: u32, height: u32, border_width: u32) -> Option<Self> {
        let inset = border_width;
        let far_inset = if border_width > 0 { border_width + 1 } else { 1 };
        let right = width.checked_sub(far_inset)?;
        let bottom = height.checked_sub(far_inset)?;
        if right < inset || bottom < inset {
            return None;
        }
        Some(Self {
            left: inset,
            top: inset,
            right,
            bottom,
        })
    }

    /// Continuous rectangle covering the bounded pixels edge to edge.
    fn rect(&self) -> Option<Rect> {
        Rect::from_ltrb(
            self.left as f32,
            self.top as f32,
            (self.right + 1) as f32,
            (self.bottom + 1) as f32,
        )
    }
}

/// Rounded rectangle path; the radius is clamped to half the shorter side.
pub fn rounded_rect_path(rect: Rect, radius: f32) -> Option<Path> {
    let (l, t, r, b) = (rect.left(), rect.top(), rect.right(), rect.bottom());
    let radius = radius
        .max(0.0)
        .min(rect.width() / 2.0)
        .min(rect.height() / 2.0);
    if radius <= 0.0 {
        return Some(PathBuilder::from_rect(rect));
    }

    let k = radius * KAPPA;
    let mut pb = PathBuilder::new();
    pb.move_to(l + radius, t);
    pb.line_to(r - radius, t);
    pb.cubic_to(r - radius + k, t, r, t + radius - k, r, t + radius);
    pb.line_to(r, b - radius);
    pb.cubic_to(r, b - radius + k, r - radius + k, b, r - radius, b);
    pb.line_to(l + radius, b);
    pb.cubic_to(l + radius - k, b, l, b - radius + k, l, b - radius);
    pb.line_to(l, t + radius);
    pb.cubic_to(l, t + radius - k, l + radius - k, t, l + radius, t);
    pb.close();
    pb.finish()
}

fn shape_for(width: u32, height: u32, border_width: u32, radius: u32) -> Option<Path> {
    let bounds = MaskBounds::for_canvas(width, height, border_width)?;
    rounded_rect_path(bounds.rect()?, radius as f32)
}

/// Clip `img` to the rounded shape and, if `border` is given, draw the
/// stroked ring underneath. Canvas size never changes.
pub fn apply_rounded_mask(img: RgbaImage, radius: u32, border: Option<(u32, Color)>) -> RgbaImage {
    let (width, height) = img.dimensions();
    let border_width = border.map_or(0, |(w, _)| w);

    let Some(mut mask) = canvas::blank(width, height) else {
        tracing::warn!(target: "thumbkit::mask", width, height, "mask canvas unavailable, skipping");
        return img;
    };

    let shape = shape_for(width, height, border_width, radius);
    if let Some(path) = &shape {
        let mut paint = Paint::default();
        paint.set_color_rgba8(0, 0, 0, 255);
        paint.anti_alias = true;
        mask.fill_path(path, &paint, FillRule::Winding, Transform::identity(), None);
    }

    let mut clipped = img;
    canvas::destination_in(&mut clipped, &mask);

    let (Some((stroke_width, color)), Some(path)) = (border.filter(|(w, _)| *w > 0), shape)
    else {
        return clipped;
    };

    stroke_ring(clipped, &path, stroke_width, color)
}

fn stroke_ring(clipped: RgbaImage, path: &Path, stroke_width: u32, color: Color) -> RgbaImage {
    let (width, height) = clipped.dimensions();
    let (Some(mut ring), Some(top)) = (canvas::blank(width, height), canvas::to_pixmap(&clipped))
    else {
        return clipped;
    };

    let mut paint = Paint::default();
    paint.set_color(color.to_skia());
    paint.anti_alias = true;
    let stroke = Stroke {
        width: stroke_width as f32,
        ..Stroke::default()
    };
    ring.stroke_path(path, &paint, &stroke, Transform::identity(), None);

    canvas::source_over(&mut ring, &top, 0, 0);
    canvas::from_pixmap(&ring)
}
