//! `.mct` tables of contents.
//!
//! Layout, all little-endian:
//!
//! | field        | size | notes                                   |
//! |--------------|------|-----------------------------------------|
//! | magic        | 4    | `MCT1`                                  |
//! | archive_len  | 8    | size of the archive the index describes |
//! | count        | 4    | number of entries                       |
//! | entries      | 32×n | `u32 number, u64 offset, u32 length, [u8; 16] hash` |
//!
//! The archive length is what makes a stale index detectable: appending to or rewriting the
//! archive changes it, and [`TableOfContents::validate`] refuses the mismatch.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::{
    archive::Archive,
    file::{Output, Parser, Writer},
    methodcontext::{MethodContext, MethodContextHash},
    Error, Result,
};

/// Magic bytes at the start of every `.mct` file
pub const TOC_MAGIC: [u8; 4] = *b"MCT1";

const TOC_HEADER_SIZE: usize = 16;
const TOC_ENTRY_SIZE: usize = 32;

/// Where one method context lives in its archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocEntry {
    /// 1-based record number
    pub number: u32,
    /// Byte offset in the archive
    pub offset: u64,
    /// Record length in bytes
    pub length: u32,
    /// Identity hash of the record bytes
    pub hash: MethodContextHash,
}

/// Random-access index over an archive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableOfContents {
    archive_len: u64,
    entries: Vec<TocEntry>,
}

impl TableOfContents {
    /// Indexes `archive`.
    ///
    /// Records are located with one sequential pass over their framing; hashing then runs in
    /// parallel.
    ///
    /// # Errors
    /// Format errors from damaged framing, or [`Error::Malformed`] for a record too large to
    /// index.
    pub fn build(archive: &Archive) -> Result<Self> {
        let frames = archive.iter().collect::<Result<Vec<_>>>()?;

        let entries = frames
            .par_iter()
            .map(|entry| {
                let Ok(length) = u32::try_from(entry.data.len()) else {
                    return Err(malformed_error!(
                        "Record #{} is {} bytes long",
                        entry.number,
                        entry.data.len()
                    ));
                };
                Ok(TocEntry {
                    number: entry.number,
                    offset: entry.offset,
                    length,
                    hash: entry.hash(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!("Indexed {} method contexts", entries.len());
        Ok(TableOfContents {
            archive_len: archive.len() as u64,
            entries,
        })
    }

    /// Number of indexed records
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the archive had no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the archive this index was built for
    #[must_use]
    pub fn archive_len(&self) -> u64 {
        self.archive_len
    }

    /// All entries in archive order
    #[must_use]
    pub fn entries(&self) -> &[TocEntry] {
        &self.entries
    }

    /// The entry of record `number` (1-based)
    #[must_use]
    pub fn find(&self, number: u32) -> Option<&TocEntry> {
        self.entries
            .binary_search_by_key(&number, |entry| entry.number)
            .ok()
            .map(|index| &self.entries[index])
    }

    /// Serializes the index.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer =
            Writer::with_capacity(TOC_HEADER_SIZE + self.entries.len() * TOC_ENTRY_SIZE);
        writer.write_bytes(&TOC_MAGIC);
        writer.write_le::<u64>(self.archive_len);
        #[allow(clippy::cast_possible_truncation)]
        let count = self.entries.len() as u32;
        writer.write_le::<u32>(count);
        for entry in &self.entries {
            writer.write_le::<u32>(entry.number);
            writer.write_le::<u64>(entry.offset);
            writer.write_le::<u32>(entry.length);
            writer.write_bytes(entry.hash.as_bytes());
        }
        writer.into_inner()
    }

    /// Parses a serialized index.
    ///
    /// # Errors
    /// [`Error::Malformed`] or [`Error::OutOfBounds`] for damaged input.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        if parser.read_bytes(TOC_MAGIC.len())? != TOC_MAGIC {
            return Err(malformed_error!("Not a table of contents"));
        }
        let archive_len = parser.read_le::<u64>()?;
        let count = parser.read_le::<u32>()? as usize;
        if parser.remaining() != count * TOC_ENTRY_SIZE {
            return Err(malformed_error!(
                "Table of contents claims {} entries but holds {} bytes",
                count,
                parser.remaining()
            ));
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let number = parser.read_le::<u32>()?;
            let offset = parser.read_le::<u64>()?;
            let length = parser.read_le::<u32>()?;
            let mut hash = [0_u8; 16];
            hash.copy_from_slice(parser.read_bytes(16)?);

            if entries
                .last()
                .is_some_and(|previous: &TocEntry| previous.number >= number)
            {
                return Err(malformed_error!(
                    "Table of contents entry {} out of order",
                    number
                ));
            }
            entries.push(TocEntry {
                number,
                offset,
                length,
                hash: MethodContextHash(hash),
            });
        }

        Ok(TableOfContents {
            archive_len,
            entries,
        })
    }

    /// Writes the index to `path`.
    ///
    /// # Errors
    /// I/O failures; no file is left behind in that case.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut output = Output::create(path)?;
        output.write_all(&self.to_bytes())?;
        output.finalize()?;
        Ok(())
    }

    /// Reads an index from `path`.
    ///
    /// # Errors
    /// I/O failures or a damaged index.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }

    /// Checks that the index describes `archive`.
    ///
    /// # Errors
    /// [`Error::StaleToc`] if the archive size changed since the index was built.
    pub fn validate(&self, archive: &Archive) -> Result<()> {
        let actual = archive.len() as u64;
        if actual != self.archive_len {
            return Err(Error::StaleToc {
                expected: self.archive_len,
                actual,
            });
        }
        Ok(())
    }

    /// Parses the `index`-th (0-based) record without scanning the archive.
    ///
    /// # Errors
    /// [`Error::StaleToc`], [`Error::OutOfBounds`] for an index past the end, or format errors.
    pub fn read_context(&self, archive: &Archive, index: usize) -> Result<MethodContext> {
        self.validate(archive)?;
        let Some(entry) = self.entries.get(index) else {
            return Err(Error::OutOfBounds);
        };
        let Ok(offset) = usize::try_from(entry.offset) else {
            return Err(Error::OutOfBounds);
        };
        MethodContext::from_bytes(archive.data_slice(offset, entry.length as usize)?)
    }
}

/// The conventional index path for an archive: `<archive>.mct`.
///
/// ```rust
/// use std::path::PathBuf;
/// use superpmi::archive::toc_path_for;
///
/// assert_eq!(toc_path_for("run/all.mch"), PathBuf::from("run/all.mch.mct"));
/// ```
pub fn toc_path_for(archive: impl AsRef<Path>) -> PathBuf {
    let mut path = archive.as_ref().as_os_str().to_os_string();
    path.push(".mct");
    PathBuf::from(path)
}
