//! Little-endian primitive encoding for method-context records.
//!
//! Every integer in the `.mc`, `.mch` and `.mct` formats is little-endian regardless of the
//! architecture that captured it. This module provides the bounds-checked primitives the
//! [`crate::file::Parser`] and [`crate::file::Writer`] cursors are built on.
//!
//! # Key Components
//!
//! - [`crate::file::io::WireIO`] - fixed-width types that can be read and written
//! - [`crate::file::io::read_le`] / [`crate::file::io::read_le_at`] - bounds-checked reads
//! - [`crate::file::io::write_le_at`] - bounds-checked in-place writes (length back-patching)
//!
//! # Examples
//!
//! ```rust
//! use superpmi::file::io::{read_le, read_le_at};
//!
//! let data = [0x01, 0x00, 0x00, 0x00, 0xFF, 0xFF];
//! assert_eq!(read_le::<u32>(&data)?, 1);
//!
//! let mut offset = 4;
//! assert_eq!(read_le_at::<u16>(&data, &mut offset)?, 0xFFFF);
//! assert_eq!(offset, 6);
//! # Ok::<(), superpmi::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Fixed-width values with a little-endian wire form.
pub trait WireIO: Sized + Copy {
    /// Byte array representation of `Self`
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decodes from little-endian bytes
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encodes into little-endian bytes
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_wire_io {
    ($($ty:ty),*) => {$(
        impl WireIO for $ty {
            type Bytes = [u8; std::mem::size_of::<$ty>()];

            fn from_le_bytes(bytes: Self::Bytes) -> Self {
                <$ty>::from_le_bytes(bytes)
            }

            fn to_le_bytes(self) -> Self::Bytes {
                <$ty>::to_le_bytes(self)
            }
        }
    )*};
}

impl_wire_io!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Reads a little-endian value from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le<T: WireIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a little-endian value at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit; `offset` is left untouched.
pub fn read_le_at<T: WireIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Writes `value` in little-endian at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit into `data`.
pub fn write_le_at<T: WireIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_le_widths() {
        assert_eq!(read_le::<u8>(&TEST_BUFFER).unwrap(), 0x01);
        assert_eq!(read_le::<u16>(&TEST_BUFFER).unwrap(), 0x0201);
        assert_eq!(read_le::<u32>(&TEST_BUFFER).unwrap(), 0x0403_0201);
        assert_eq!(read_le::<u64>(&TEST_BUFFER).unwrap(), 0x0807_0605_0403_0201);
        assert_eq!(read_le::<i32>(&[0xFF, 0xFF, 0xFF, 0xFF]).unwrap(), -1);
    }

    #[test]
    fn read_le_at_advances() {
        let mut offset = 2;
        assert_eq!(read_le_at::<u16>(&TEST_BUFFER, &mut offset).unwrap(), 0x0403);
        assert_eq!(offset, 4);
        assert_eq!(read_le_at::<u32>(&TEST_BUFFER, &mut offset).unwrap(), 0x0807_0605);
        assert_eq!(offset, 8);
    }

    #[test]
    fn read_out_of_bounds() {
        let mut offset = 6;
        assert!(matches!(
            read_le_at::<u32>(&TEST_BUFFER, &mut offset),
            Err(OutOfBounds)
        ));
        assert_eq!(offset, 6);

        let mut offset = usize::MAX;
        assert!(read_le_at::<u8>(&TEST_BUFFER, &mut offset).is_err());
    }

    #[test]
    fn write_le_at_patches() {
        let mut data = [0_u8; 6];
        let mut offset = 2;
        write_le_at(&mut data, &mut offset, 0xAABB_CCDD_u32).unwrap();
        assert_eq!(data, [0, 0, 0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(offset, 6);
        assert!(write_le_at(&mut data, &mut offset, 1_u8).is_err());
    }
}
