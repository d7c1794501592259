// lib.rs
//
// thumbkit: a thumbnail compositing engine
//
// One owned image value is threaded through a fixed set of stages:
// - crop-to-fill thumbnailing (frame by frame for animations)
// - rectangular or rounded borders
// - rounded-corner masking (destination-in)
// - opacity and free-angle rotation
// - background flattening
// and consumed by a single encode to JPEG, PNG, GIF or WebP.

// Memory allocator optimization - jemalloc for better performance
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod color;
pub mod engine;
pub mod error;
pub mod ops;

pub use color::Color;
pub use engine::{EngineConfig, Image};
pub use error::{ErrorCategory, ThumbkitError};
pub use ops::{OutputFormat, DEFAULT_QUALITY};

/// Result alias used across the public API.
pub type Result<T> = std::result::Result<T, ThumbkitError>;

/// Get library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Input formats the decoder accepts
pub fn supported_input_formats() -> &'static [&'static str] {
    &["jpeg", "jpg", "png", "gif", "webp"]
}

/// Output format names accepted by `Image::save` / `Image::output`
pub fn supported_output_formats() -> &'static [&'static str] {
    &["jpg", "jpeg", "gif", "webp", "png"]
}
