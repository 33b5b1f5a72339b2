//! Growable write cursor, the counterpart of [`crate::file::Parser`].
//!
//! Records are built front to back; section lengths that are only known once the section is
//! complete are reserved with [`Writer::reserve_u32`] and filled in with [`Writer::patch_u32`].

use crate::{
    file::io::{write_le_at, WireIO},
    Result,
};

/// An append-only little-endian byte sink.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    data: Vec<u8>,
}

impl Writer {
    /// Create an empty `Writer`
    #[must_use]
    pub fn new() -> Self {
        Writer { data: Vec::new() }
    }

    /// Create an empty `Writer` with pre-allocated capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Writer {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if nothing has been written
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends a little-endian value
    pub fn write_le<T: WireIO>(&mut self, value: T) {
        self.data.extend_from_slice(value.to_le_bytes().as_ref());
    }

    /// Appends raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Appends a `u32` length prefix followed by `bytes`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `bytes` is longer than `u32::MAX`.
    pub fn write_prefixed_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let Ok(length) = u32::try_from(bytes.len()) else {
            return Err(malformed_error!("Buffer of {} bytes is too large", bytes.len()));
        };
        self.write_le(length);
        self.write_bytes(bytes);
        Ok(())
    }

    /// Appends a zero `u32` placeholder and returns its position.
    pub fn reserve_u32(&mut self) -> usize {
        let position = self.data.len();
        self.write_le(0_u32);
        position
    }

    /// Overwrites the `u32` at `position`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `position` was not previously written.
    pub fn patch_u32(&mut self, position: usize, value: u32) -> Result<()> {
        let mut offset = position;
        write_le_at(&mut self.data, &mut offset, value)
    }

    /// Fills the placeholder at `position` with the number of bytes written after it.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the section exceeds `u32::MAX` bytes.
    pub fn patch_length_since(&mut self, position: usize) -> Result<()> {
        let length = self.data.len() - position - std::mem::size_of::<u32>();
        let Ok(length) = u32::try_from(length) else {
            return Err(malformed_error!("Section of {} bytes is too large", length));
        };
        self.patch_u32(position, length)
    }

    /// The bytes written so far
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the writer, returning its bytes
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}
