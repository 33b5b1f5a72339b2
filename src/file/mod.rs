//! Byte-level access to method-context data.
//!
//! # Key Components
//!
//! - [`Backend`] - abstraction over where archive bytes live
//! - [`Physical`] - memory-mapped file backend
//! - [`Memory`] - owned buffer backend
//! - [`Parser`] / [`Writer`] - read and write cursors
//! - [`Output`] - output file that deletes itself unless finalized

pub mod io;
pub mod parser;
pub mod writer;

mod memory;
mod output;
mod physical;

pub use memory::Memory;
pub use output::Output;
pub use parser::Parser;
pub use physical::Physical;
pub use writer::Writer;

use crate::{Error::OutOfBounds, Result};

/// Where archive bytes live.
///
/// Implementations only expose their bytes; bounds-checked slicing is shared. Backends are
/// `Send + Sync` so a table of contents can hash records from several threads.
pub trait Backend: Send + Sync {
    /// All bytes
    fn data(&self) -> &[u8];

    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let data = self.data();
        match offset.checked_add(len) {
            Some(end) if end <= data.len() => Ok(&data[offset..end]),
            _ => Err(OutOfBounds),
        }
    }

    /// Total length
    fn len(&self) -> usize {
        self.data().len()
    }

    /// True if there is no data
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
