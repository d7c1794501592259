// src/error.rs
//
// Unified error handling for thumbkit
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input, recoverable
// - CodecError: Format/encoding issues
// - ResourceLimit: Memory/dimension limits
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy for callers that route errors by class rather than variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    UserError,
    /// Format/encoding issues
    CodecError,
    /// Memory/dimension limits
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

/// thumbkit error types
#[derive(Debug, Error)]
pub enum ThumbkitError {
    // File I/O Errors
    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Can't create directory '{path}': {source}")]
    DirectoryCreationFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Decode Errors
    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Input of {len} bytes exceeds maximum {max}")]
    InputTooLarge { len: u64, max: u64 },

    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Argument Errors
    #[error("Invalid output type given: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Invalid color '{value}': {reason}")]
    InvalidColor {
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("External encoder '{program}' failed: {message}")]
    ExternalEncoderFailed {
        program: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

fn clone_io(source: &std::io::Error) -> std::io::Error {
    std::io::Error::new(source.kind(), source.to_string())
}

impl Clone for ThumbkitError {
    fn clone(&self) -> Self {
        match self {
            Self::FileReadFailed { path, source } => Self::FileReadFailed {
                path: path.clone(),
                source: clone_io(source),
            },
            Self::FileWriteFailed { path, source } => Self::FileWriteFailed {
                path: path.clone(),
                source: clone_io(source),
            },
            Self::DirectoryCreationFailed { path, source } => Self::DirectoryCreationFailed {
                path: path.clone(),
                source: clone_io(source),
            },
            Self::DecodeFailed { message } => Self::DecodeFailed {
                message: message.clone(),
            },
            Self::InputTooLarge { len, max } => Self::InputTooLarge {
                len: *len,
                max: *max,
            },
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::UnsupportedFormat { format } => Self::UnsupportedFormat {
                format: format.clone(),
            },
            Self::InvalidColor { value, reason } => Self::InvalidColor {
                value: value.clone(),
                reason: reason.clone(),
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::ExternalEncoderFailed { program, message } => Self::ExternalEncoderFailed {
                program: program.clone(),
                message: message.clone(),
            },
            Self::InternalPanic { message } => Self::InternalPanic {
                message: message.clone(),
            },
        }
    }
}

// Constructor Helpers
impl ThumbkitError {
    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn file_write_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn directory_creation_failed(
        path: impl Into<Cow<'static, str>>,
        source: std::io::Error,
    ) -> Self {
        Self::DirectoryCreationFailed {
            path: path.into(),
            source,
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn input_too_large(len: u64, max: u64) -> Self {
        Self::InputTooLarge { len, max }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn invalid_color(
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidColor {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn external_encoder_failed(
        program: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ExternalEncoderFailed {
            program: program.into(),
            message: message.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FileReadFailed { .. }
            | Self::FileWriteFailed { .. }
            | Self::DirectoryCreationFailed { .. }
            | Self::UnsupportedFormat { .. }
            | Self::InvalidColor { .. } => ErrorCategory::UserError,

            Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::ExternalEncoderFailed { .. } => ErrorCategory::CodecError,

            Self::InputTooLarge { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. } => ErrorCategory::ResourceLimit,

            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }

    /// True when the error came from a codec (native or external).
    pub fn is_encode_error(&self) -> bool {
        matches!(
            self,
            Self::EncodeFailed { .. } | Self::ExternalEncoderFailed { .. }
        )
    }
}
