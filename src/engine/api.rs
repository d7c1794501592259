// src/engine/api.rs
//
// `Image`: the owned value threaded through every stage.
// Each stage consumes the image and returns it, so calls chain:
//
// ```ignore
// let bytes = Image::from_bytes(&input)?
//     .crop(200, 0)
//     .set_border(4, Color::parse("#336699")?)
//     .set_border_radius(16)
//     .set_opacity(Some(0.9))
//     .output("png", DEFAULT_QUALITY)?;
// ```

use crate::color::Color;
use crate::engine::config::EngineConfig;
use crate::engine::io::{self, Source};
use crate::engine::raster::Raster;
use crate::engine::{decoder, encoder, mask, pipeline};
use crate::error::ThumbkitError;
use crate::ops::OutputFormat;
use image::{Frame, ImageFormat};
use std::path::Path;
use tracing::debug;

type ApiResult<T> = std::result::Result<T, ThumbkitError>;

#[derive(Clone, Debug)]
pub struct Image {
    raster: Raster,
    width: u32,
    height: u32,
    corner_radius: u32,
    border_width: u32,
    border_color: Option<Color>,
    config: EngineConfig,
}

impl Image {
    // =========================================================================
    // CONSTRUCTORS
    // =========================================================================

    /// Decode an encoded JPEG, PNG, GIF or WebP blob with the env-derived config.
    pub fn from_bytes(data: impl AsRef<[u8]>) -> ApiResult<Self> {
        Self::from_bytes_with_config(data, EngineConfig::from_env())
    }

    pub fn from_bytes_with_config(data: impl AsRef<[u8]>, config: EngineConfig) -> ApiResult<Self> {
        let raster = decoder::decode_raster(data.as_ref(), &config)?;
        Ok(Self::from_raster(raster, config))
    }

    /// Memory-map and decode a file.
    pub fn open(path: impl AsRef<Path>) -> ApiResult<Self> {
        Self::open_with_config(path, EngineConfig::from_env())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: EngineConfig) -> ApiResult<Self> {
        let source = Source::open(path.as_ref())?;
        Self::from_source(&source, config)
    }

    pub fn from_source(source: &Source, config: EngineConfig) -> ApiResult<Self> {
        let raster = decoder::decode_raster(source.as_bytes(), &config)?;
        Ok(Self::from_raster(raster, config))
    }

    fn from_raster(raster: Raster, config: EngineConfig) -> Self {
        let (width, height) = raster.dimensions();
        Self {
            raster,
            width,
            height,
            corner_radius: 0,
            border_width: 0,
            border_color: None,
            config,
        }
    }

    // =========================================================================
    // STAGES
    // =========================================================================

    /// Thumbnail crop: scale to fill `width x height`, trimming the overflow
    /// evenly. A zero side is derived from the other and the current aspect
    /// ratio; both zero leaves the image alone. Applies to every frame.
    pub fn crop(mut self, width: u32, height: u32) -> Self {
        let (target_w, target_h) =
            pipeline::thumbnail_dimensions(self.width, self.height, width, height);
        if (target_w, target_h) == (self.width, self.height) {
            return self;
        }
        self.raster = self
            .raster
            .map_frames(|frame| pipeline::crop_to_fill(frame, target_w, target_h));
        self.sync_dimensions();
        self
    }

    /// Record a border. Without a corner radius the border is drawn right
    /// away as a rectangular frame that grows the canvas by `width` on each
    /// side; with one, drawing is left to the rounded mask.
    pub fn set_border(mut self, width: u32, color: Color) -> Self {
        self.border_width = width;
        self.border_color = Some(color);
        if self.corner_radius > 0 || width == 0 {
            return self;
        }
        self.raster = self
            .raster
            .map_frames(|frame| pipeline::add_border(frame, width, color));
        self.sync_dimensions();
        debug!(
            target: "thumbkit::pipeline",
            border = width,
            width = self.width,
            height = self.height,
            "rectangular border"
        );
        self
    }

    /// Clip to a rounded rectangle and, when a border is recorded, stroke it
    /// along the same rounded path. The canvas size does not change.
    pub fn set_border_radius(mut self, radius: u32) -> Self {
        self.corner_radius = radius;
        let border = match (self.border_width, self.border_color) {
            (w, Some(color)) if w > 0 => Some((w, color)),
            _ => None,
        };
        self.raster = self
            .raster
            .map_frames(|frame| mask::apply_rounded_mask(frame, radius, border));
        debug!(
            target: "thumbkit::mask",
            radius,
            border_width = self.border_width,
            width = self.width,
            height = self.height,
            "rounded mask"
        );
        self
    }

    /// Scale alpha by `opacity`. `None` and exactly `1.0` are no-ops; values
    /// outside `[0, 1]` saturate per channel.
    pub fn set_opacity(mut self, opacity: Option<f32>) -> Self {
        let Some(opacity) = opacity.filter(|o| *o != 1.0) else {
            return self;
        };
        self.raster = self
            .raster
            .map_frames(|frame| pipeline::scale_alpha(frame, opacity));
        self
    }

    /// Rotate clockwise by `degrees`, growing the canvas and leaving the
    /// exposed corners transparent. `None`, `0` and non-finite angles are no-ops.
    pub fn set_rotation(mut self, degrees: Option<f32>) -> Self {
        let Some(degrees) = degrees.filter(|d| d.is_finite() && *d != 0.0) else {
            return self;
        };
        self.raster = self
            .raster
            .map_frames(|frame| pipeline::rotate(frame, degrees));
        self.sync_dimensions();
        debug!(
            target: "thumbkit::pipeline",
            degrees,
            width = self.width,
            height = self.height,
            "rotated"
        );
        self
    }

    /// Composite every frame over a solid background, collapsing the
    /// sequence into a single frame.
    pub fn set_background(mut self, color: Color) -> Self {
        let (width, height) = (self.width, self.height);
        let frames = self.raster.frames().len();
        let layers: Vec<_> = self
            .raster
            .frames()
            .iter()
            .map(|frame| frame.buffer().clone())
            .collect();
        let flat = pipeline::flatten(layers, width, height, color);
        self.raster = self.raster.collapse(flat);
        debug!(target: "thumbkit::pipeline", %color, opaque = color.is_opaque(), frames, "flattened");
        self
    }

    // =========================================================================
    // OUTPUT
    // =========================================================================

    /// Encode and either return the bytes (`path` is `None` or empty) or
    /// write them to `path`, creating its parent directory first.
    ///
    /// The format name is checked before anything touches the filesystem.
    pub fn save(
        self,
        path: Option<&Path>,
        format: &str,
        quality: u8,
    ) -> ApiResult<Option<Vec<u8>>> {
        let format = OutputFormat::parse(format, quality)?;
        let path = path.filter(|p| !p.as_os_str().is_empty());
        if let Some(path) = path {
            io::ensure_parent_dir(path)?;
        }

        let bytes = self.encode(format)?;
        match path {
            Some(path) => {
                io::write_output(path, &bytes)?;
                debug!(target: "thumbkit::io", path = %path.display(), bytes = bytes.len(), "saved");
                Ok(None)
            }
            None => Ok(Some(bytes)),
        }
    }

    /// Encode to bytes.
    pub fn output(self, format: &str, quality: u8) -> ApiResult<Vec<u8>> {
        let format = OutputFormat::parse(format, quality)?;
        self.encode(format)
    }

    fn encode(self, format: OutputFormat) -> ApiResult<Vec<u8>> {
        encoder::encode(&self.raster, format, &self.config)
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame_count(&self) -> usize {
        self.raster.len()
    }

    pub fn frames(&self) -> &[Frame] {
        self.raster.frames()
    }

    pub fn source_format(&self) -> Option<ImageFormat> {
        self.raster.source_format()
    }

    pub fn corner_radius(&self) -> u32 {
        self.corner_radius
    }

    pub fn border_width(&self) -> u32 {
        self.border_width
    }

    pub fn border_color(&self) -> Option<Color> {
        self.border_color
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// SHA-256 hex digest of the current pixels of every frame.
    pub fn signature(&self) -> String {
        self.raster.signature()
    }

    fn sync_dimensions(&mut self) {
        let (width, height) = self.raster.dimensions();
        self.width = width;
        self.height = height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn create_test_image(width: u32, height: u32) -> Image {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        Image::from_raster(Raster::single(img, None), EngineConfig::default())
    }

    fn pixel(img: &Image, x: u32, y: u32) -> [u8; 4] {
        img.frames()[0].buffer().get_pixel(x, y).0
    }

    mod stage_tests {
        use super::*;

        #[test]
        fn test_crop_derives_missing_side() {
            let img = create_test_image(400, 200).crop(100, 0);
            assert_eq!((img.width(), img.height()), (100, 50));
            assert_eq!(img.frames()[0].buffer().dimensions(), (100, 50));
        }

        #[test]
        fn test_crop_zero_zero_is_noop() {
            let img = create_test_image(30, 20);
            let sig = img.signature();
            let img = img.crop(0, 0);
            assert_eq!((img.width(), img.height()), (30, 20));
            assert_eq!(img.signature(), sig);
        }

        #[test]
        fn test_border_without_radius_grows_canvas() {
            let img = create_test_image(20, 10).set_border(2, Color::rgb(255, 0, 0));
            assert_eq!((img.width(), img.height()), (24, 14));
            assert_eq!(pixel(&img, 0, 0), [255, 0, 0, 255]);
            assert_eq!(img.border_width(), 2);
            assert_eq!(img.border_color(), Some(Color::rgb(255, 0, 0)));
        }

        #[test]
        fn test_oversized_border_keeps_canvas() {
            let img = create_test_image(6, 4).set_border(u32::MAX / 2 + 1, Color::BLACK);
            assert_eq!((img.width(), img.height()), (6, 4));
            assert_eq!(img.frames()[0].buffer().dimensions(), (6, 4));
        }

        #[test]
        fn test_border_after_radius_only_records() {
            let img = create_test_image(20, 20).set_border_radius(5);
            let sig = img.signature();
            let img = img.set_border(3, Color::BLACK);
            assert_eq!((img.width(), img.height()), (20, 20));
            assert_eq!(img.signature(), sig);
            assert_eq!(img.border_width(), 3);
        }

        #[test]
        fn test_radius_keeps_canvas_and_clears_corner() {
            let img = create_test_image(50, 50).set_border_radius(10);
            assert_eq!((img.width(), img.height()), (50, 50));
            assert_eq!(pixel(&img, 0, 0)[3], 0);
            assert_eq!(pixel(&img, 25, 25)[3], 255);
            assert_eq!(img.corner_radius(), 10);
        }

        #[test]
        fn test_border_then_radius_strokes_ring() {
            let img = create_test_image(60, 60)
                .set_border(4, Color::rgb(0, 255, 0))
                .set_border_radius(12);
            assert_eq!((img.width(), img.height()), (68, 68));
            // inside the ring band on the left edge, mid height
            assert_eq!(pixel(&img, 3, 34), [0, 255, 0, 255]);
            assert_eq!(pixel(&img, 0, 0)[3], 0);
        }

        #[test]
        fn test_opacity_noops() {
            let img = create_test_image(8, 8);
            let sig = img.signature();
            let img = img.set_opacity(None).set_opacity(Some(1.0));
            assert_eq!(img.signature(), sig);
        }

        #[test]
        fn test_opacity_zero_applies() {
            let img = create_test_image(8, 8).set_opacity(Some(0.0));
            assert_eq!(pixel(&img, 4, 4)[3], 0);
        }

        #[test]
        fn test_rotation_noops_and_right_angle() {
            let img = create_test_image(30, 10);
            let sig = img.signature();
            let img = img.set_rotation(None).set_rotation(Some(0.0));
            assert_eq!(img.signature(), sig);

            let img = img.set_rotation(Some(90.0));
            assert_eq!((img.width(), img.height()), (10, 30));
        }

        #[test]
        fn test_rotation_ignores_non_finite_angles() {
            let img = create_test_image(30, 10);
            let sig = img.signature();
            let img = img
                .set_rotation(Some(f32::NAN))
                .set_rotation(Some(f32::INFINITY))
                .set_rotation(Some(f32::NEG_INFINITY));
            assert_eq!((img.width(), img.height()), (30, 10));
            assert_eq!(img.signature(), sig);
        }

        #[test]
        fn test_rotation_free_angle_grows() {
            let img = create_test_image(30, 30).set_rotation(Some(30.0));
            assert!(img.width() > 30 && img.height() > 30);
            assert_eq!(pixel(&img, 0, 0)[3], 0);
        }

        #[test]
        fn test_background_flattens_transparency() {
            let img = create_test_image(40, 40)
                .set_border_radius(15)
                .set_background(Color::WHITE);
            assert_eq!(pixel(&img, 0, 0), [255, 255, 255, 255]);
            assert_eq!(img.frame_count(), 1);
        }
    }

    mod output_tests {
        use super::*;

        #[test]
        fn test_output_each_format() {
            let base = create_test_image(32, 32);
            let jpeg = base.clone().output("jpg", 80).unwrap();
            assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
            let jpeg = base.clone().output("jpeg", 80).unwrap();
            assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
            let png = base.clone().output("png", 100).unwrap();
            assert_eq!(&png[1..4], b"PNG");
            let gif = base.clone().output("gif", 0).unwrap();
            assert_eq!(&gif[0..3], b"GIF");
            let webp = base.output("webp", 75).unwrap();
            assert_eq!(&webp[8..12], b"WEBP");
        }

        #[test]
        fn test_unsupported_and_case_sensitive() {
            let err = create_test_image(4, 4).output("bmp", 75).unwrap_err();
            assert!(matches!(err, ThumbkitError::UnsupportedFormat { .. }));
            assert_eq!(err.to_string(), "Invalid output type given: bmp");
            let err = create_test_image(4, 4).output("PNG", 75).unwrap_err();
            assert!(matches!(err, ThumbkitError::UnsupportedFormat { .. }));
        }

        #[test]
        fn test_save_without_path_returns_bytes() {
            let bytes = create_test_image(4, 4).save(None, "png", 50).unwrap();
            assert!(bytes.is_some_and(|b| !b.is_empty()));
            let bytes = create_test_image(4, 4)
                .save(Some(Path::new("")), "png", 50)
                .unwrap();
            assert!(bytes.is_some());
        }

        #[test]
        fn test_save_writes_and_creates_parent() {
            let dir = tempfile::tempdir().unwrap();
            let target = dir.path().join("deep/er/thumb.png");
            let result = create_test_image(6, 6)
                .save(Some(target.as_path()), "png", 75)
                .unwrap();
            assert!(result.is_none());
            let decoded = image::open(&target).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (6, 6));
        }

        #[test]
        fn test_save_unsupported_touches_nothing() {
            let dir = tempfile::tempdir().unwrap();
            let target = dir.path().join("new/out.bmp");
            let err = create_test_image(4, 4)
                .save(Some(target.as_path()), "bmp", 75)
                .unwrap_err();
            assert!(matches!(err, ThumbkitError::UnsupportedFormat { .. }));
            assert!(!dir.path().join("new").exists());
        }
    }
}
