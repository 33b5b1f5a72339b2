//! Lightweight maps: the storage behind every recorded JIT-EE query.
//!
//! A method context is a set of named maps, one per JIT-EE entry point. Two shapes exist:
//!
//! - [`LightWeightMap`] - append-only `(key, value)` records with hashed key lookup
//! - [`DenseLightWeightMap`] - append-only values addressed by position
//!
//! Both own a [`BufferPool`], an arena of variable-length byte buffers referenced by `u32`
//! index from the fixed-size records. Buffers are only deduplicated when the caller asks for
//! it through [`LightWeightMap::contains`].
//!
//! # Wire form
//!
//! Everything stored in a map implements [`Packable`]: fixed-width little-endian fields packed
//! in declaration order. A map packs as its buffer pool, a `u32` record count and the records.
//!
//! ```rust
//! use superpmi::lwm::{LightWeightMap, Packable};
//! use superpmi::{Parser, Writer};
//!
//! let mut map: LightWeightMap<u64, u32> = LightWeightMap::new();
//! map.add(0x1000, 7);
//!
//! let mut writer = Writer::new();
//! map.pack(&mut writer)?;
//! let bytes = writer.into_inner();
//! let copy = LightWeightMap::<u64, u32>::unpack(&mut Parser::new(&bytes))?;
//! assert_eq!(copy.get(&0x1000), Some(&7));
//! # Ok::<(), superpmi::Error>(())
//! ```

mod buffer;
mod dense;
mod lightweightmap;

pub use buffer::{BufferPool, NO_BUFFER};
pub use dense::DenseLightWeightMap;
pub use lightweightmap::LightWeightMap;

use crate::{
    file::{Parser, Writer},
    Result,
};

/// Fixed-layout wire encoding used for every key, value and map.
pub trait Packable: Sized {
    /// Appends the wire form of `self`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a contained buffer cannot be represented.
    fn pack(&self, writer: &mut Writer) -> Result<()>;

    /// Reads one value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] or [`crate::Error::Malformed`] on bad input.
    fn unpack(parser: &mut Parser<'_>) -> Result<Self>;
}

/// A serializable collection of records that can report its size.
pub trait PacketMap: Packable {
    /// Number of records held
    fn count(&self) -> usize;
}

macro_rules! impl_packable_int {
    ($($ty:ty),*) => {$(
        impl Packable for $ty {
            fn pack(&self, writer: &mut Writer) -> Result<()> {
                writer.write_le(*self);
                Ok(())
            }

            fn unpack(parser: &mut Parser<'_>) -> Result<Self> {
                parser.read_le::<$ty>()
            }
        }
    )*};
}

impl_packable_int!(u8, u16, u32, u64, i32, i64);

impl Packable for bool {
    fn pack(&self, writer: &mut Writer) -> Result<()> {
        writer.write_le(u8::from(*self));
        Ok(())
    }

    fn unpack(parser: &mut Parser<'_>) -> Result<Self> {
        match parser.read_le::<u8>()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(malformed_error!("Invalid bool value {}", other)),
        }
    }
}

impl<A: Packable, B: Packable> Packable for (A, B) {
    fn pack(&self, writer: &mut Writer) -> Result<()> {
        self.0.pack(writer)?;
        self.1.pack(writer)
    }

    fn unpack(parser: &mut Parser<'_>) -> Result<Self> {
        Ok((A::unpack(parser)?, B::unpack(parser)?))
    }
}

impl<A: Packable, B: Packable, C: Packable> Packable for (A, B, C) {
    fn pack(&self, writer: &mut Writer) -> Result<()> {
        self.0.pack(writer)?;
        self.1.pack(writer)?;
        self.2.pack(writer)
    }

    fn unpack(parser: &mut Parser<'_>) -> Result<Self> {
        Ok((A::unpack(parser)?, B::unpack(parser)?, C::unpack(parser)?))
    }
}

/// Writes one packet: `u16 id`, `u32 body length`, body.
pub(crate) fn write_packet<M: Packable>(writer: &mut Writer, id: u16, map: &M) -> Result<()> {
    writer.write_le(id);
    let slot = writer.reserve_u32();
    map.pack(writer)?;
    writer.patch_length_since(slot)
}

/// Decodes a packet body, requiring it to be consumed completely.
pub(crate) fn read_packet_body<M: Packable>(body: &[u8]) -> Result<M> {
    let mut parser = Parser::new(body);
    let map = M::unpack(&mut parser)?;
    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after packet body",
            parser.remaining()
        ));
    }
    Ok(map)
}

/// Caps a record count read from input to what the remaining bytes could possibly hold.
pub(crate) fn bounded_capacity(count: u32, parser: &Parser<'_>) -> usize {
    (count as usize).min(parser.remaining())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_rejects_garbage() {
        let mut parser = Parser::new(&[2]);
        assert!(bool::unpack(&mut parser).is_err());

        let mut parser = Parser::new(&[1, 0]);
        assert!(bool::unpack(&mut parser).unwrap());
        assert!(!bool::unpack(&mut parser).unwrap());
    }

    #[test]
    fn tuple_layout() {
        let mut writer = Writer::new();
        (0x0102_u16, 0x03_u8, -1_i32).pack(&mut writer).unwrap();
        assert_eq!(writer.as_slice(), &[0x02, 0x01, 0x03, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn packet_body_must_be_consumed() {
        let mut writer = Writer::new();
        7_u32.pack(&mut writer).unwrap();
        writer.write_le(0_u8);
        assert!(read_packet_body::<u32>(writer.as_slice()).is_err());
        assert_eq!(read_packet_body::<u32>(&writer.as_slice()[..4]).unwrap(), 7);
    }

    #[test]
    fn packet_framing() {
        let mut writer = Writer::new();
        write_packet(&mut writer, 3, &0xAABB_u16).unwrap();
        assert_eq!(writer.as_slice(), &[3, 0, 2, 0, 0, 0, 0xBB, 0xAA]);
    }
}
