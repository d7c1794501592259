// src/engine/common.rs
//
// Common utilities shared across engine modules.

use crate::error::ThumbkitError;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type EngineResult<T> = std::result::Result<T, ThumbkitError>;

/// Run a codec call and turn any panic inside it into `InternalPanic`.
///
/// Third-party codecs (mozjpeg in particular) report some errors by
/// unwinding; the label names the call site in the resulting error.
pub fn run_with_panic_policy<T, F>(label: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::warn!(target: "thumbkit::panic", %label, %detail, "codec panicked");
            Err(ThumbkitError::internal_panic(format!("{label}: {detail}")))
        }
    }
}
