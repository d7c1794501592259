// src/engine/config.rs
//
// Engine configuration: scratch space and external encoder for the WebP
// fallback, plus input guards enforced at decode time.

use crate::engine::MAX_PIXELS;
use crate::error::ThumbkitError;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};

const DEFAULT_CWEBP: &str = "cwebp";

struct EnvDefaults {
    scratch_dir: Option<PathBuf>,
    cwebp_program: Option<PathBuf>,
    native_webp: Option<bool>,
}

// Read once per process; later env changes do not affect new images.
static ENV_DEFAULTS: Lazy<EnvDefaults> = Lazy::new(|| EnvDefaults {
    scratch_dir: std::env::var_os("THUMBKIT_SCRATCH_DIR").map(PathBuf::from),
    cwebp_program: std::env::var_os("THUMBKIT_CWEBP").map(PathBuf::from),
    native_webp: std::env::var("THUMBKIT_NATIVE_WEBP")
        .ok()
        .and_then(|raw| parse_switch(&raw)),
});

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Directory holding the fallback encoder's scratch file pair.
    pub scratch_dir: PathBuf,
    /// External WebP encoder invoked when native encoding fails.
    pub cwebp_program: PathBuf,
    /// Attempt the in-process WebP encoder before shelling out.
    pub native_webp: bool,
    /// Reject encoded inputs larger than this many bytes.
    pub max_input_bytes: Option<u64>,
    /// Reject decoded canvases with more pixels than this.
    pub max_pixels: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir(),
            cwebp_program: PathBuf::from(DEFAULT_CWEBP),
            native_webp: true,
            max_input_bytes: None,
            max_pixels: MAX_PIXELS,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `THUMBKIT_SCRATCH_DIR`, `THUMBKIT_CWEBP` and
    /// `THUMBKIT_NATIVE_WEBP`.
    pub fn from_env() -> Self {
        let env = &*ENV_DEFAULTS;
        let mut config = Self::default();
        if let Some(dir) = &env.scratch_dir {
            config.scratch_dir = dir.clone();
        }
        if let Some(program) = &env.cwebp_program {
            config.cwebp_program = program.clone();
        }
        if let Some(native) = env.native_webp {
            config.native_webp = native;
        }
        config
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_cwebp_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.cwebp_program = program.into();
        self
    }

    pub fn with_native_webp(mut self, enabled: bool) -> Self {
        self.native_webp = enabled;
        self
    }

    pub fn with_max_input_bytes(mut self, max: u64) -> Self {
        self.max_input_bytes = Some(max);
        self
    }

    pub fn with_max_pixels(mut self, max: u64) -> Self {
        self.max_pixels = max;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn enforce_source_len(&self, len: usize) -> Result<(), ThumbkitError> {
        if let Some(max) = self.max_input_bytes {
            if len as u64 > max {
                return Err(ThumbkitError::input_too_large(len as u64, max));
            }
        }
        Ok(())
    }

    pub fn enforce_pixels(&self, width: u32, height: u32) -> Result<(), ThumbkitError> {
        let pixels = width as u64 * height as u64;
        if pixels > self.max_pixels {
            return Err(ThumbkitError::pixel_count_exceeds_limit(
                pixels,
                self.max_pixels,
            ));
        }
        Ok(())
    }
}
