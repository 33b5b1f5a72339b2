//! Self-cleaning output files for archive-mutating operations.
//!
//! [`Output`] streams bytes into its target path and deletes the file again when it is dropped
//! without [`Output::finalize`] having succeeded. Every archive verb writes through it, so an
//! error anywhere in the pipeline never leaves a truncated archive behind.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::{Error, Result};

/// A buffered output file that is removed unless finalized.
pub struct Output {
    writer: Option<BufWriter<File>>,

    target_path: PathBuf,

    written: u64,
}

impl Output {
    /// Creates (or truncates) `target_path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be created.
    pub fn create<P: AsRef<Path>>(target_path: P) -> Result<Self> {
        let target_path = target_path.as_ref().to_path_buf();

        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&target_path)?;

        Ok(Self {
            writer: Some(BufWriter::new(file)),
            target_path,
            written: 0,
        })
    }

    /// Appends `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] on write failure.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::Error(format!(
                "{} has already been finalized",
                self.target_path.display()
            )));
        };
        writer.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Number of bytes written so far
    #[must_use]
    pub fn size(&self) -> u64 {
        self.written
    }

    /// Path of the file being written
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Flushes and keeps the file.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if flushing fails; the file is removed in that case.
    pub fn finalize(mut self) -> Result<PathBuf> {
        let Some(writer) = self.writer.take() else {
            return Err(Error::Error(format!(
                "{} has already been finalized",
                self.target_path.display()
            )));
        };

        let file = match writer.into_inner() {
            Ok(file) => file,
            Err(error) => {
                let _ = std::fs::remove_file(&self.target_path);
                return Err(Error::FileError(error.into_error()));
            }
        };
        if let Err(error) = file.sync_all() {
            let _ = std::fs::remove_file(&self.target_path);
            return Err(Error::FileError(error));
        }

        Ok(std::mem::take(&mut self.target_path))
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            // Release the handle before removing the incomplete file
            drop(writer);
            let _ = std::fs::remove_file(&self.target_path);
        }
    }
}
