//! Position-addressed variant of the lightweight map.

use crate::{
    file::{Parser, Writer},
    lwm::{bounded_capacity, BufferPool, Packable, PacketMap},
    Error::OutOfBounds,
    Result,
};

/// Append-only array of values, keyed implicitly by position.
#[derive(Debug, Clone)]
pub struct DenseLightWeightMap<V> {
    buffers: BufferPool,
    values: Vec<V>,
}

impl<V> Default for DenseLightWeightMap<V> {
    fn default() -> Self {
        DenseLightWeightMap {
            buffers: BufferPool::default(),
            values: Vec::new(),
        }
    }
}

impl<V> DenseLightWeightMap<V> {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` and returns its position.
    pub fn append(&mut self, value: V) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let position = self.values.len() as u32;
        self.values.push(value);
        position
    }

    /// The value at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `index >= count()`.
    pub fn get(&self, index: u32) -> Result<&V> {
        self.values.get(index as usize).ok_or(OutOfBounds)
    }

    /// Appends a buffer to this map's pool and returns its index.
    pub fn add_buffer(&mut self, bytes: &[u8]) -> u32 {
        self.buffers.add_buffer(bytes)
    }

    /// Index of an existing buffer byte-identical to `bytes`.
    #[must_use]
    pub fn contains(&self, bytes: &[u8]) -> Option<u32> {
        self.buffers.contains(bytes)
    }

    /// The buffer at `index`.
    #[must_use]
    pub fn get_buffer(&self, index: u32) -> Option<&[u8]> {
        self.buffers.get_buffer(index)
    }

    /// The buffer pool of this map
    #[must_use]
    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    /// Number of values
    #[must_use]
    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// True if nothing was appended
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in append order
    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.values.iter()
    }
}

impl<V: PartialEq> PartialEq for DenseLightWeightMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.buffers == other.buffers && self.values == other.values
    }
}

impl<V: Packable> Packable for DenseLightWeightMap<V> {
    fn pack(&self, writer: &mut Writer) -> Result<()> {
        self.buffers.pack(writer)?;
        #[allow(clippy::cast_possible_truncation)]
        writer.write_le(self.values.len() as u32);
        for value in &self.values {
            value.pack(writer)?;
        }
        Ok(())
    }

    fn unpack(parser: &mut Parser<'_>) -> Result<Self> {
        let buffers = BufferPool::unpack(parser)?;
        let count = parser.read_le::<u32>()?;
        let mut values = Vec::with_capacity(bounded_capacity(count, parser));
        for _ in 0..count {
            values.push(V::unpack(parser)?);
        }
        Ok(DenseLightWeightMap { buffers, values })
    }
}

impl<V: Packable> PacketMap for DenseLightWeightMap<V> {
    fn count(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_bounds() {
        let mut map: DenseLightWeightMap<u64> = DenseLightWeightMap::new();
        assert!(matches!(map.get(0), Err(OutOfBounds)));

        for (expected, handle) in [0x100_u64, 0x200, 0x300].into_iter().enumerate() {
            assert_eq!(map.append(handle) as usize, expected);
        }

        assert_eq!(map.count(), 3);
        assert_eq!(*map.get(0).unwrap(), 0x100);
        assert_eq!(*map.get(2).unwrap(), 0x300);
        assert!(matches!(map.get(3), Err(OutOfBounds)));
        assert!(matches!(map.get(u32::MAX), Err(OutOfBounds)));
    }

    #[test]
    fn pack_roundtrip() {
        let mut map: DenseLightWeightMap<u32> = DenseLightWeightMap::new();
        let buffer = map.add_buffer(b"code");
        map.append(buffer);
        map.append(42);

        let mut writer = Writer::new();
        map.pack(&mut writer).unwrap();
        let bytes = writer.into_inner();
        let copy = DenseLightWeightMap::<u32>::unpack(&mut Parser::new(&bytes)).unwrap();

        assert_eq!(copy, map);
        assert_eq!(copy.get_buffer(*copy.get(0).unwrap()), Some(&b"code"[..]));
        assert_eq!(copy.iter().copied().collect::<Vec<_>>(), vec![0, 42]);
    }
}
