// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg), PNG (image + oxipng), GIF (image),
// WebP (libwebp, still and animated) with quality settings.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::config::EngineConfig;
use crate::engine::fallback;
use crate::engine::raster::{delay_ms, Raster};
use crate::error::ThumbkitError;
use crate::ops::OutputFormat;
use image::buffer::ConvertBuffer;
use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, Frame, ImageEncoder, RgbImage, RgbaImage};
use mozjpeg::{ColorSpace, Compress, ScanMode};

use crate::engine::MAX_DIMENSION;

/// Derives per-codec knobs from a 0-100 quality value. Bands:
/// - High (>=85)
/// - Balanced (70-84)
/// - Fast (50-69)
/// - Fastest (<50)
///
/// WebP filter strength keeps its own 80/60 thresholds.
#[derive(Debug, Clone, Copy)]
pub struct QualitySettings {
    quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
    Fastest,
}

impl QualitySettings {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100) as f32,
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85.0 {
            QualityBand::High
        } else if self.quality >= 70.0 {
            QualityBand::Balanced
        } else if self.quality >= 50.0 {
            QualityBand::Fast
        } else {
            QualityBand::Fastest
        }
    }

    pub fn webp_method(&self) -> i32 {
        4
    }

    pub fn webp_pass(&self) -> i32 {
        1
    }

    pub fn webp_preprocessing(&self) -> i32 {
        0
    }

    pub fn webp_sns_strength(&self) -> i32 {
        match self.band() {
            QualityBand::High => 50,
            QualityBand::Balanced => 70,
            QualityBand::Fast | QualityBand::Fastest => 80,
        }
    }

    pub fn webp_filter_strength(&self) -> i32 {
        if self.quality >= 80.0 {
            20
        } else if self.quality >= 60.0 {
            30
        } else {
            40
        }
    }

    pub fn webp_filter_sharpness(&self) -> i32 {
        match self.band() {
            QualityBand::High => 2,
            QualityBand::Balanced | QualityBand::Fast | QualityBand::Fastest => 0,
        }
    }

    /// JPEG smoothing factor; low qualities smooth more to hide blocking.
    pub fn jpeg_smoothing(&self) -> u8 {
        if self.quality >= 90.0 {
            0
        } else if self.quality >= 70.0 {
            5
        } else if self.quality >= 60.0 {
            10
        } else {
            18
        }
    }

    fn webp_config(&self) -> EngineResult<webp::WebPConfig> {
        let mut config = webp::WebPConfig::new()
            .map_err(|_| ThumbkitError::internal_panic("failed to create WebPConfig"))?;
        config.quality = self.quality;
        config.method = self.webp_method();
        config.pass = self.webp_pass();
        config.preprocessing = self.webp_preprocessing();
        config.sns_strength = self.webp_sns_strength();
        config.autofilter = 1;
        config.filter_strength = self.webp_filter_strength();
        config.filter_sharpness = self.webp_filter_sharpness();
        Ok(config)
    }
}

/// Encode a raster in the requested format.
///
/// JPEG and PNG carry a single frame, so animated rasters contribute their
/// first frame. WebP goes through the native/external strategy.
pub fn encode(raster: &Raster, format: OutputFormat, config: &EngineConfig) -> EngineResult<Vec<u8>> {
    if raster.is_animated() && !format.supports_animation() {
        tracing::debug!(
            target: "thumbkit::encode",
            format = format.name(),
            frames = raster.len(),
            "format is single-frame, encoding first frame"
        );
    }

    let bytes = match format {
        OutputFormat::Jpeg { quality } => encode_jpeg(raster.first(), quality)?,
        OutputFormat::Png { compression_level } => encode_png(raster.first(), compression_level)?,
        OutputFormat::Gif => encode_gif(raster.frames())?,
        OutputFormat::WebP { quality } => fallback::encode_webp(raster, quality, config)?,
    };

    tracing::debug!(
        target: "thumbkit::encode",
        format = format.name(),
        bytes = bytes.len(),
        "encoded"
    );
    Ok(bytes)
}

/// Encode to JPEG using mozjpeg. Alpha is discarded.
pub fn encode_jpeg(img: &RgbaImage, quality: u8) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let settings = QualitySettings::new(quality);
        let rgb: RgbImage = img.convert();
        let (w, h) = rgb.dimensions();

        if w == 0 || h == 0 {
            return Err(ThumbkitError::encode_failed(
                "jpeg",
                "image has zero width or height",
            ));
        }
        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(ThumbkitError::dimension_exceeds_limit(
                w.max(h),
                MAX_DIMENSION,
            ));
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(settings.quality());
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        comp.set_smoothing_factor(settings.jpeg_smoothing());

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);
        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                ThumbkitError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to start compress: {e:?}"),
                )
            })?;

            let stride = w as usize * 3;
            for row in rgb.as_raw().chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    ThumbkitError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                ThumbkitError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }
        Ok(output)
    })
}

/// oxipng preset for a zlib-style level; None at the fastest level.
pub(crate) fn oxipng_preset(compression_level: u8) -> Option<u8> {
    let level = compression_level.min(9);
    if level == 9 {
        return None;
    }
    Some((9 - level) * 6 / 9)
}

/// Encode to PNG. `compression_level` runs 0 (smallest) to 9 (fastest);
/// anything below 9 is re-compressed losslessly with oxipng.
pub fn encode_png(img: &RgbaImage, compression_level: u8) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let compression = match compression_level.min(9) {
            9 => CompressionType::Fast,
            0..=2 => CompressionType::Best,
            _ => CompressionType::Default,
        };

        let mut buf = Vec::new();
        PngEncoder::new_with_quality(&mut buf, compression, FilterType::Adaptive)
            .write_image(
                img.as_raw(),
                img.width(),
                img.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| ThumbkitError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        let Some(preset) = oxipng_preset(compression_level) else {
            return Ok(buf);
        };

        let mut options = oxipng::Options::from_preset(preset);
        options.strip = oxipng::StripChunks::Safe;
        oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            ThumbkitError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })
    })
}

/// Encode every frame, in order, as a looping GIF.
pub fn encode_gif(frames: &[Frame]) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:gif", || {
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut buf);
            encoder
                .set_repeat(Repeat::Infinite)
                .map_err(|e| ThumbkitError::encode_failed("gif", e.to_string()))?;
            encoder
                .encode_frames(frames.iter().cloned())
                .map_err(|e| ThumbkitError::encode_failed("gif", format!("GIF encode failed: {e}")))?;
        }
        Ok(buf)
    })
}

/// Encode with the in-process libwebp. Multi-frame rasters become an
/// animated WebP with the original frame timings.
pub fn encode_webp_native(raster: &Raster, quality: u8) -> EngineResult<Vec<u8>> {
    if raster.is_animated() {
        encode_webp_animated(raster.frames(), quality)
    } else {
        encode_webp_still(raster.first(), quality)
    }
}

fn encode_webp_still(img: &RgbaImage, quality: u8) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:webp", || {
        let (w, h) = img.dimensions();
        let config = QualitySettings::new(quality).webp_config()?;
        let encoder = webp::Encoder::from_rgba(img.as_raw(), w, h);
        let mem = encoder.encode_advanced(&config).map_err(|e| {
            ThumbkitError::encode_failed("webp", format!("WebP encode failed: {e:?}"))
        })?;
        Ok(mem.to_vec())
    })
}

fn encode_webp_animated(frames: &[Frame], quality: u8) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:webp:anim", || {
        let Some(first) = frames.first() else {
            return Err(ThumbkitError::encode_failed("webp", "no frames to encode"));
        };
        let (w, h) = first.buffer().dimensions();
        let config = QualitySettings::new(quality).webp_config()?;

        let mut encoder = webp::AnimEncoder::new(w, h, &config);
        encoder.set_loop_count(0);
        let mut timestamp: i32 = 0;
        for frame in frames {
            let buf = frame.buffer();
            encoder.add_frame(webp::AnimFrame::from_rgba(
                buf.as_raw(),
                buf.width(),
                buf.height(),
                timestamp,
            ));
            timestamp = timestamp.saturating_add(delay_ms(frame.delay()) as i32);
        }

        let mem = encoder.try_encode().map_err(|e| {
            ThumbkitError::encode_failed("webp", format!("animated WebP encode failed: {e:?}"))
        })?;
        Ok(mem.to_vec())
    })
}
