#![no_main]

use libfuzzer_sys::fuzz_target;
use thumbkit::engine::{decode_raster, Source};
use thumbkit::EngineConfig;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // Keep decoded canvases small enough for the fuzzer's RSS limit
    let config = EngineConfig::default()
        .with_max_input_bytes(1 << 20)
        .with_max_pixels(4_000_000);
    let source = Source::from_bytes(data.to_vec());
    let _ = decode_raster(source.as_bytes(), &config);
});
