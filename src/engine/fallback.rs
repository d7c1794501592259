// src/engine/fallback.rs
//
// WebP encode strategy. The in-process libwebp encoder is tried first; if it
// fails (or is disabled in the config) the raster is handed to an external
// `cwebp` process through a pair of scratch files named after the content
// signature. Both scratch files are removed when this module returns.

use crate::engine::common::EngineResult;
use crate::engine::config::EngineConfig;
use crate::engine::encoder;
use crate::engine::io;
use crate::engine::raster::Raster;
use crate::error::ThumbkitError;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Which encoder produced (or will produce) the WebP bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebpStrategy {
    Native,
    External(ExternalWebpEncoder),
}

impl WebpStrategy {
    pub fn encode(&self, raster: &Raster, quality: u8) -> EngineResult<Vec<u8>> {
        match self {
            WebpStrategy::Native => encoder::encode_webp_native(raster, quality),
            WebpStrategy::External(external) => external.encode(raster, quality),
        }
    }
}

/// Encode to WebP, falling back to the external encoder when the native one
/// fails. A failure of the external encoder is returned as-is.
pub fn encode_webp(raster: &Raster, quality: u8, config: &EngineConfig) -> EngineResult<Vec<u8>> {
    if config.native_webp {
        match WebpStrategy::Native.encode(raster, quality) {
            Ok(bytes) => return Ok(bytes),
            Err(err) => {
                warn!(
                    target: "thumbkit::webp",
                    error = %err,
                    "native WebP encode failed, falling back to external encoder"
                );
            }
        }
    } else {
        debug!(target: "thumbkit::webp", "native WebP disabled, using external encoder");
    }

    WebpStrategy::External(ExternalWebpEncoder::from_config(config)).encode(raster, quality)
}

/// A `cwebp`-compatible program run against scratch files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalWebpEncoder {
    program: PathBuf,
    scratch_dir: PathBuf,
}

impl ExternalWebpEncoder {
    pub fn new(program: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.cwebp_program, config.scratch_dir())
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// `-quiet -metadata none -q <quality> <input> -o <output>`
    pub fn arguments(quality: u8, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-quiet".into(),
            "-metadata".into(),
            "none".into(),
            "-q".into(),
            quality.min(100).to_string().into(),
            input.as_os_str().to_owned(),
            "-o".into(),
            output.as_os_str().to_owned(),
        ]
    }

    pub fn encode(&self, raster: &Raster, quality: u8) -> EngineResult<Vec<u8>> {
        io::ensure_dir(&self.scratch_dir)?;
        let signature = raster.signature();

        // cwebp reads stills only, so an animation is reduced to its first frame
        if raster.is_animated() {
            warn!(
                target: "thumbkit::webp",
                frames = raster.len(),
                "external encoder keeps only the first frame"
            );
        }
        let input_bytes = encoder::encode_png(raster.first(), 9)?;

        let mut input = self.scratch_file(&format!("temp-{signature}-"), "png")?;
        input
            .write_all(&input_bytes)
            .and_then(|()| input.flush())
            .map_err(|e| self.failure(format!("failed to write scratch input: {e}")))?;
        let output = self.scratch_file(&format!("output-{signature}-"), "webp")?;

        let args = Self::arguments(quality, input.path(), output.path());
        debug!(
            target: "thumbkit::webp",
            program = %self.program.display(),
            input = %input.path().display(),
            output = %output.path().display(),
            quality,
            "running external WebP encoder"
        );

        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| self.failure(format!("failed to spawn: {e}")))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(self.failure(format!(
                "exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        let bytes = std::fs::read(output.path())
            .map_err(|e| self.failure(format!("failed to read output: {e}")))?;
        if bytes.is_empty() {
            return Err(self.failure("produced no output"));
        }
        Ok(bytes)
    }

    fn scratch_file(&self, prefix: &str, ext: &str) -> EngineResult<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(prefix)
            .suffix(&format!(".{ext}"))
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| self.failure(format!("failed to create scratch file: {e}")))
    }

    fn failure(&self, message: impl Into<String>) -> ThumbkitError {
        ThumbkitError::external_encoder_failed(
            self.program.to_string_lossy().to_string(),
            message.into(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn raster() -> Raster {
        Raster::single(RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255])), None)
    }

    fn scratch_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn arguments_follow_cwebp_convention() {
        let args = ExternalWebpEncoder::arguments(80, Path::new("/s/in.png"), Path::new("/s/out.webp"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            ["-quiet", "-metadata", "none", "-q", "80", "/s/in.png", "-o", "/s/out.webp"]
        );
    }

    #[test]
    fn native_strategy_encodes() {
        let bytes = WebpStrategy::Native.encode(&raster(), 75).unwrap();
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[test]
    fn missing_program_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = ExternalWebpEncoder::new("/nonexistent/thumbkit-cwebp", dir.path());
        let err = encoder.encode(&raster(), 75).unwrap_err();
        assert!(matches!(err, ThumbkitError::ExternalEncoderFailed { .. }));
        assert_eq!(scratch_entries(dir.path()), 0);
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_reports_status_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = ExternalWebpEncoder::new("false", dir.path());
        let err = encoder.encode(&raster(), 75).unwrap_err();
        assert!(err.to_string().contains("exited with"));
        assert_eq!(scratch_entries(dir.path()), 0);
    }

    #[cfg(unix)]
    #[test]
    fn empty_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // `true` succeeds without writing anything
        let encoder = ExternalWebpEncoder::new("true", dir.path());
        let err = encoder.encode(&raster(), 75).unwrap_err();
        assert!(err.to_string().contains("produced no output"));
        assert_eq!(scratch_entries(dir.path()), 0);
    }

    #[test]
    fn scratch_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("nested/scratch");
        let encoder = ExternalWebpEncoder::new("/nonexistent/thumbkit-cwebp", &scratch);
        assert!(encoder.encode(&raster(), 75).is_err());
        assert!(scratch.is_dir());
        assert_eq!(scratch_entries(&scratch), 0);
    }

    #[test]
    fn from_config_uses_configured_program() {
        let config = EngineConfig::default().with_cwebp_program("/opt/bin/cwebp");
        let encoder = ExternalWebpEncoder::from_config(&config);
        assert_eq!(encoder.program(), Path::new("/opt/bin/cwebp"));
    }
}
