#![no_main]

//! Fuzz target for the per-format encoders.
//! Covers JPEG (mozjpeg), PNG (image + oxipng), GIF and WebP encoding paths.

use arbitrary::{Arbitrary, Unstructured};
use image::RgbaImage;
use libfuzzer_sys::fuzz_target;
use thumbkit::engine::{encode, Raster};
use thumbkit::{EngineConfig, OutputFormat};

#[derive(Arbitrary, Debug)]
struct EncodeSeed {
    format: u8,
    quality: u8,
    width: u8,
    height: u8,
}

fn build_image(data: &[u8], width: u8, height: u8) -> RgbaImage {
    // Limit dimensions to avoid OOM (max 128x128 = 64KB RGBA)
    let w = (width as u32 % 128).max(1);
    let h = (height as u32 % 128).max(1);
    let mut buffer = vec![0u8; (w * h * 4) as usize];
    for (i, byte) in buffer.iter_mut().enumerate() {
        *byte = data.get(i % data.len().max(1)).copied().unwrap_or(128);
    }
    RgbaImage::from_raw(w, h, buffer).unwrap_or_else(|| RgbaImage::new(1, 1))
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let mut unstructured = Unstructured::new(data);
    let seed: EncodeSeed = match EncodeSeed::arbitrary(&mut unstructured) {
        Ok(s) => s,
        Err(_) => return,
    };

    let raster = Raster::single(build_image(data, seed.width, seed.height), None);
    let name = ["jpg", "png", "gif", "webp"][seed.format as usize % 4];
    let Ok(format) = OutputFormat::parse(name, seed.quality) else {
        return;
    };
    // Only native paths here; the external encoder is not fuzzed
    let _ = encode(&raster, format, &EngineConfig::default());
});
