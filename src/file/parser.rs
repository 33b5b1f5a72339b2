//! Bounds-checked read cursor over record bytes.
//!
//! The [`crate::file::parser::Parser`] keeps a position inside a borrowed byte slice and
//! offers little-endian reads, length-prefixed buffers and cheap look-ahead. Every method
//! validates the remaining length first, so malformed or truncated records surface as
//! [`crate::Error::OutOfBounds`] instead of panics.
//!
//! # Examples
//!
//! ```rust
//! use superpmi::Parser;
//!
//! let data = [0x02, 0x00, 0x00, 0x00, 0xAA, 0xBB];
//! let mut parser = Parser::new(&data);
//! assert_eq!(parser.read_prefixed_bytes()?, &[0xAA, 0xBB]);
//! assert!(!parser.has_more_data());
//! # Ok::<(), superpmi::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, WireIO},
    Error::OutOfBounds,
    Result,
};

/// A cursor over a byte slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new `Parser` positioned at the start of `data`
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying slice
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the underlying slice is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True if unread bytes remain
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Number of unread bytes
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Current position
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The full underlying slice
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Moves the cursor to `pos`; seeking to the very end is allowed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies past the end.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Skips `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        self.ensure_remaining(step)?;
        self.position += step;
        Ok(())
    }

    /// Fails unless at least `needed` bytes remain.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `needed` bytes remain.
    pub fn ensure_remaining(&self, needed: usize) -> Result<()> {
        if needed > self.remaining() {
            return Err(OutOfBounds);
        }
        Ok(())
    }

    /// Reads a value without moving the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
    pub fn peek_le<T: WireIO>(&self) -> Result<T> {
        let mut temp_position = self.position;
        read_le_at::<T>(self.data, &mut temp_position)
    }

    /// Reads a little-endian value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
    pub fn read_le<T: WireIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Borrows the next `length` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        self.ensure_remaining(length)?;
        let start = self.position;
        self.position += length;
        Ok(&self.data[start..self.position])
    }

    /// Reads a `u32` length followed by that many bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the buffer is truncated.
    pub fn read_prefixed_bytes(&mut self) -> Result<&'a [u8]> {
        let saved = self.position;
        let length = self.read_le::<u32>()? as usize;
        match self.read_bytes(length) {
            Ok(bytes) => Ok(bytes),
            Err(error) => {
                self.position = saved;
                Err(error)
            }
        }
    }

    /// Runs `f`, restoring the position if it fails.
    ///
    /// # Errors
    /// Whatever `f` returns.
    pub fn transactional<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved_position = self.position;
        let result = f(self);
        if result.is_err() {
            self.position = saved_position;
        }
        result
    }
}
