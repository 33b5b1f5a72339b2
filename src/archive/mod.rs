//! `.mch` archives: concatenated method contexts and the tools around them.
//!
//! An archive is nothing but serialized method contexts back to back. Each record starts with
//! its own length, so the archive can be walked without parsing any packets; [`Archive::iter`]
//! does exactly that and numbers the records from 1, the numbering `.mcl` lists and reports use.
//!
//! # Key Components
//!
//! - [`Archive`] - a memory-mapped or in-memory archive
//! - [`TableOfContents`] - the `.mct` random-access index
//! - [`MclList`] - `.mcl` selections of record numbers
//! - Mutating verbs: [`concat`], [`merge`], [`copy`], [`strip`], [`fracture`], [`remove_dup`]
//! - Read-only reports: [`integrity_check`], [`stat`], [`dump`], [`method_call_counts`],
//!   [`dump_toc`]
//!
//! Every verb that writes an archive goes through [`crate::file::Output`]: if anything fails,
//! the partially written file is removed.

mod mcl;
mod ops;
mod report;
mod toc;

pub use mcl::MclList;
pub use ops::{concat, copy, fracture, merge, remove_dup, strip, MergeOptions, MergeStats};
pub use report::{dump, dump_toc, integrity_check, method_call_counts, stat, IntegrityReport};
pub use toc::{toc_path_for, TableOfContents, TocEntry, TOC_MAGIC};

use std::path::{Path, PathBuf};

use crate::{
    file::{Backend, Memory, Physical},
    methodcontext::{MethodContext, MethodContextHash},
    Result,
};

/// A sequence of serialized method contexts.
pub struct Archive {
    data: Box<dyn Backend>,
    path: Option<PathBuf>,
}

impl Archive {
    /// Memory-maps the archive at `path`.
    ///
    /// # Errors
    /// [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn open(path: impl AsRef<Path>) -> Result<Archive> {
        let path = path.as_ref();
        let input = Physical::new(path)?;
        Ok(Archive {
            data: Box::new(input),
            path: Some(path.to_path_buf()),
        })
    }

    /// An archive over bytes already in memory.
    #[must_use]
    pub fn from_mem(data: Vec<u8>) -> Archive {
        Archive {
            data: Box::new(Memory::new(data)),
            path: None,
        }
    }

    /// Path the archive was opened from, `None` for in-memory archives
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// All archive bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// `len` bytes at `offset`.
    ///
    /// # Errors
    /// [`crate::Error::OutOfBounds`] if the range is outside the archive.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }

    /// Archive size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an archive without records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Walks the records in file order.
    ///
    /// The iterator yields an error and stops at the first record whose framing is damaged,
    /// since nothing after it can be located.
    #[must_use]
    pub fn iter(&self) -> ArchiveIter<'_> {
        ArchiveIter {
            data: self.data(),
            offset: 0,
            number: 0,
            done: false,
        }
    }
}

impl<'a> IntoIterator for &'a Archive {
    type Item = Result<McEntry<'a>>;
    type IntoIter = ArchiveIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One record of an archive, not yet parsed.
#[derive(Debug, Clone, Copy)]
pub struct McEntry<'a> {
    /// 1-based position in the archive
    pub number: u32,
    /// Byte offset of the record
    pub offset: u64,
    /// The serialized record
    pub data: &'a [u8],
}

impl McEntry<'_> {
    /// Parses the record.
    ///
    /// # Errors
    /// [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for a damaged record.
    pub fn context(&self) -> Result<MethodContext> {
        MethodContext::from_bytes(self.data)
    }

    /// Identity hash of the record bytes
    #[must_use]
    pub fn hash(&self) -> MethodContextHash {
        MethodContextHash::of_bytes(self.data)
    }
}

/// Iterator over the records of an [`Archive`].
pub struct ArchiveIter<'a> {
    data: &'a [u8],
    offset: usize,
    number: u32,
    done: bool,
}

impl<'a> Iterator for ArchiveIter<'a> {
    type Item = Result<McEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.data.len() {
            return None;
        }

        let rest = &self.data[self.offset..];
        let length = match MethodContext::record_len(rest) {
            Ok(length) => length,
            Err(error) => {
                log::warn!(
                    "Damaged record framing at offset {} after record #{}: {}",
                    self.offset,
                    self.number,
                    error
                );
                self.done = true;
                return Some(Err(error));
            }
        };

        self.number += 1;
        let entry = McEntry {
            number: self.number,
            offset: self.offset as u64,
            data: &rest[..length],
        };
        self.offset += length;
        Some(Ok(entry))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::corinfo::MethodHandle;

    pub(crate) fn sample(attribs: u32) -> MethodContext {
        let mut mc = MethodContext::new();
        mc.rec_get_method_attribs(MethodHandle(0x3000), attribs);
        mc.rec_get_method_name(MethodHandle(0x3000), "Main");
        mc
    }

    pub(crate) fn archive_bytes(contexts: &[MethodContext]) -> Vec<u8> {
        contexts
            .iter()
            .flat_map(|mc| mc.to_bytes().unwrap())
            .collect()
    }

    #[test]
    fn walks_records() {
        let contexts = [sample(1), sample(2), sample(3)];
        let archive = Archive::from_mem(archive_bytes(&contexts));
        let entries: Vec<_> = archive.iter().collect::<Result<_>>().unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].offset, 0);
        assert_eq!(entries[1].offset, entries[0].data.len() as u64);
        for (entry, mc) in entries.iter().zip(&contexts) {
            assert_eq!(entry.context().unwrap(), *mc);
            assert_eq!(entry.hash(), mc.hash().unwrap());
        }
        assert_eq!(
            entries.iter().map(|e| e.number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn stops_at_damaged_framing() {
        let mut data = archive_bytes(&[sample(1), sample(2)]);
        let first = sample(1).to_bytes().unwrap().len();
        data[first] = b'x';
        let archive = Archive::from_mem(data);

        let results: Vec<_> = archive.iter().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn truncated_tail() {
        let mut data = archive_bytes(&[sample(1), sample(2)]);
        data.truncate(data.len() - 1);
        let archive = Archive::from_mem(data);
        let results: Vec<_> = archive.iter().collect();
        assert!(matches!(results[1], Err(crate::Error::OutOfBounds)));
    }

    #[test]
    fn empty_archive() {
        let archive = Archive::from_mem(Vec::new());
        assert!(archive.is_empty());
        assert_eq!(archive.iter().count(), 0);
    }
}
