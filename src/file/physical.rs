//! Memory-mapped archive backend.
//!
//! Archives routinely reach many gigabytes; mapping them keeps random access through a table
//! of contents cheap and lets parallel scans share the page cache.

use super::Backend;
use crate::{
    Error::{Error, FileError},
    Result,
};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A read-only memory-mapped file
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Maps the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened, or
    /// [`crate::Error::Error`] if mapping fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(FileError)?;

        // Safety: callers must not truncate the archive while it is mapped
        let data = unsafe { Mmap::map(&file) }
            .map_err(|error| Error(format!("cannot map {}: {}", path.display(), error)))?;

        log::debug!("Mapped {} ({} bytes)", path.display(), data.len());
        Ok(Physical { data })
    }
}

impl Backend for Physical {
    fn data(&self) -> &[u8] {
        &self.data
    }
}
