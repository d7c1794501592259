#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use image::{Rgba, RgbaImage};
use libfuzzer_sys::fuzz_target;
use thumbkit::{Color, EngineConfig, Image};

#[derive(Arbitrary, Debug)]
struct StageSeed {
    kind: u8,
    a: u16,
    b: u16,
    value: f32,
    rgba: [u8; 4],
}

fn build_png(data: &[u8]) -> Vec<u8> {
    let width = data.first().copied().unwrap_or(0) as u32 % 64 + 1;
    let height = data.get(1).copied().unwrap_or(0) as u32 % 64 + 1;
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let i = (y * width + x) as usize;
        let v = data.get(i % data.len().max(1)).copied().unwrap_or(0);
        Rgba([v, v.wrapping_mul(3), v.wrapping_add(91), v | 0x0f])
    });
    let mut buf = Vec::new();
    let _ = img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png);
    buf
}

fn apply(img: Image, seed: &StageSeed) -> Image {
    let color = Color::rgba(seed.rgba[0], seed.rgba[1], seed.rgba[2], seed.rgba[3]);
    match seed.kind % 6 {
        0 => img.crop(seed.a as u32 % 257, seed.b as u32 % 257),
        1 => img.set_border(seed.a as u32 % 17, color),
        2 => img.set_border_radius(seed.a as u32 % 200),
        3 => img.set_opacity(seed.value.is_finite().then_some(seed.value)),
        4 => img.set_rotation(seed.value.is_finite().then_some(seed.value % 720.0)),
        _ => img.set_background(color),
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let mut unstructured = Unstructured::new(data);
    let seeds: Vec<StageSeed> = match Vec::arbitrary(&mut unstructured) {
        Ok(v) => v,
        Err(_) => return,
    };

    let config = EngineConfig::default().with_native_webp(true);
    let Ok(mut img) = Image::from_bytes_with_config(build_png(data), config) else {
        return;
    };
    for seed in seeds.iter().take(12) {
        img = apply(img, seed);
        // Canvas size must track the raster after every stage
        assert_eq!(img.frames()[0].buffer().dimensions(), (img.width(), img.height()));
        if img.width() > 2048 || img.height() > 2048 {
            return;
        }
    }
    let _ = img.output("png", 9);
});
