// src/engine/io.rs
//
// I/O operations: Source enum, output directory creation, output writes

use crate::error::ThumbkitError;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Image source - in-memory data or a memory-mapped file.
#[derive(Clone, Debug)]
pub enum Source {
    /// In-memory image data
    Memory(Arc<Vec<u8>>),
    /// Memory-mapped file (zero-copy access)
    Mapped(Arc<Mmap>),
}

impl Source {
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Source::Memory(Arc::new(data.into()))
    }

    /// Memory-map a file. Empty files are read as an empty buffer since
    /// zero-length mappings are rejected by the OS.
    pub fn open(path: &Path) -> Result<Self, ThumbkitError> {
        let display = path.to_string_lossy().to_string();
        let file =
            File::open(path).map_err(|e| ThumbkitError::file_read_failed(display.clone(), e))?;
        let len = file
            .metadata()
            .map_err(|e| ThumbkitError::file_read_failed(display.clone(), e))?
            .len();
        if len == 0 {
            return Ok(Source::Memory(Arc::new(Vec::new())));
        }
        // SAFETY: the mapping is read-only and lives as long as this Source.
        // Concurrent truncation by another process is outside our contract.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| ThumbkitError::file_read_failed(display, e))?;
        Ok(Source::Mapped(Arc::new(mmap)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Source::Memory(data) => data.as_slice(),
            Source::Mapped(mmap) => mmap.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Create the parent directory of `path` (mode 0755, recursive) if missing.
pub fn ensure_parent_dir(path: &Path) -> Result<(), ThumbkitError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

/// Create `dir` (mode 0755, recursive) if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), ThumbkitError> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(dir).map_err(|e| {
        ThumbkitError::directory_creation_failed(dir.to_string_lossy().to_string(), e)
    })?;
    tracing::debug!(target: "thumbkit::io", dir = %dir.display(), "created directory");
    Ok(())
}

/// Write encoded bytes to `path`, replacing any existing file.
pub fn write_output(path: &Path, data: &[u8]) -> Result<(), ThumbkitError> {
    std::fs::write(path, data)
        .map_err(|e| ThumbkitError::file_write_failed(path.to_string_lossy().to_string(), e))
}
