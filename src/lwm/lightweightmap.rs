//! Append-only key/value store with hashed key lookup.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::{
    file::{Parser, Writer},
    lwm::{bounded_capacity, BufferPool, Packable, PacketMap},
    Result,
};

/// Ordered sequence of `(key, value)` records.
///
/// Keys are not unique: [`LightWeightMap::add`] always appends, and callers that want
/// "record once" semantics check [`LightWeightMap::get_index`] first. Lookups by key return the
/// first record with that key; [`LightWeightMap::get_nth`] reaches later ones, which is how
/// queries whose answer may change during a compilation are replayed in order.
///
/// Record indices returned by [`LightWeightMap::add`] and buffer indices returned by
/// [`LightWeightMap::add_buffer`] are stable for the lifetime of the map.
#[derive(Debug, Clone)]
pub struct LightWeightMap<K, V> {
    buffers: BufferPool,
    keys: Vec<K>,
    values: Vec<V>,
    index: FxHashMap<K, Vec<u32>>,
}

impl<K, V> Default for LightWeightMap<K, V> {
    fn default() -> Self {
        LightWeightMap {
            buffers: BufferPool::default(),
            keys: Vec::new(),
            values: Vec::new(),
            index: FxHashMap::default(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> LightWeightMap<K, V> {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and returns its index.
    pub fn add(&mut self, key: K, value: V) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let position = self.keys.len() as u32;
        self.index.entry(key.clone()).or_default().push(position);
        self.keys.push(key);
        self.values.push(value);
        position
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

    /// Adds `bytes` unless an identical buffer is already present.
    pub fn add_buffer_dedup(&mut self, bytes: &[u8]) -> u32 {
        match self.contains(bytes) {
            Some(index) => index,
            None => self.add_buffer(bytes),
        }
    }

    /// The buffer at `index`.
    #[must_use]
    pub fn get_buffer(&self, index: u32) -> Option<&[u8]> {
        self.buffers.get_buffer(index)
    }

    /// This map's buffer pool
    #[must_use]
    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    /// Index of the first record with `key`.
    #[must_use]
    pub fn get_index(&self, key: &K) -> Option<u32> {
        self.index.get(key).and_then(|hits| hits.first().copied())
    }

    /// True if at least one record has `key`
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Value of the first record with `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.get_index(key)
            .and_then(|position| self.values.get(position as usize))
    }

    /// Value of the `n`-th (0-based) record with `key`.
    #[must_use]
    pub fn get_nth(&self, key: &K, n: usize) -> Option<&V> {
        let position = *self.index.get(key)?.get(n)?;
        self.values.get(position as usize)
    }

    /// Number of records with `key`
    #[must_use]
    pub fn occurrences(&self, key: &K) -> usize {
        self.index.get(key).map_or(0, Vec::len)
    }

    /// The record at `position`.
    #[must_use]
    pub fn get_by_index(&self, position: u32) -> Option<(&K, &V)> {
        let position = position as usize;
        Some((self.keys.get(position)?, self.values.get(position)?))
    }

    /// Number of records
    #[must_use]
    pub fn count(&self) -> usize {
        self.keys.len()
    }

    /// True if no record was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.keys.iter().zip(self.values.iter())
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for LightWeightMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.buffers == other.buffers && self.keys == other.keys && self.values == other.values
    }
}

impl<K, V> Packable for LightWeightMap<K, V>
where
    K: Packable + Eq + Hash + Clone,
    V: Packable,
{
    fn pack(&self, writer: &mut Writer) -> Result<()> {
        self.buffers.pack(writer)?;
        #[allow(clippy::cast_possible_truncation)]
        writer.write_le(self.keys.len() as u32);
        for (key, value) in self.iter() {
            key.pack(writer)?;
            value.pack(writer)?;
        }
        Ok(())
    }

    fn unpack(parser: &mut Parser<'_>) -> Result<Self> {
        let buffers = BufferPool::unpack(parser)?;
        let count = parser.read_le::<u32>()?;
        let capacity = bounded_capacity(count, parser);
        let mut map = LightWeightMap {
            buffers,
            keys: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            index: FxHashMap::default(),
        };
        for _ in 0..count {
            let key = K::unpack(parser)?;
            let value = V::unpack(parser)?;
            map.add(key, value);
        }
        Ok(map)
    }
}

impl<K, V> PacketMap for LightWeightMap<K, V>
where
    K: Packable + Eq + Hash + Clone,
    V: Packable,
{
    fn count(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_lookup() {
        let mut map: LightWeightMap<u64, u32> = LightWeightMap::new();
        assert!(map.is_empty());
        assert_eq!(map.get(&1), None);

        assert_eq!(map.add(1, 10), 0);
        assert_eq!(map.add(2, 20), 1);
        assert_eq!(map.add(1, 11), 2);

        assert_eq!(map.count(), 3);
        assert_eq!(map.get(&1), Some(&10));
        assert_eq!(map.get_nth(&1, 1), Some(&11));
        assert_eq!(map.get_nth(&1, 2), None);
        assert_eq!(map.occurrences(&1), 2);
        assert_eq!(map.get_index(&2), Some(1));
        assert_eq!(map.get_by_index(2), Some((&1, &11)));
        assert!(map.contains_key(&2));
        assert!(!map.contains_key(&3));
    }

    #[test]
    fn insertion_order_preserved() {
        let mut map: LightWeightMap<u32, u32> = LightWeightMap::new();
        for key in [5, 3, 9, 1] {
            map.add(key, key * 2);
        }
        let keys: Vec<u32> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![5, 3, 9, 1]);
    }

    #[test]
    fn buffers_are_indexed() {
        let mut map: LightWeightMap<u64, u32> = LightWeightMap::new();
        let sig = map.add_buffer(&[0x20, 0x01, 0x08]);
        assert_eq!(map.contains(&[0x20, 0x01, 0x08]), Some(sig));

        let again = map.add_buffer(&[0x20, 0x01, 0x08]);
        assert_ne!(sig, again);
        assert_eq!(map.add_buffer_dedup(&[0x20, 0x01, 0x08]), again);
        assert_eq!(map.buffers().count(), 2);
    }

    #[test]
    fn pack_roundtrip_keeps_order_and_buffers() {
        let mut map: LightWeightMap<(u64, u32), u32> = LightWeightMap::new();
        let buffer = map.add_buffer(b"il");
        map.add((0x10, 1), buffer);
        map.add((0x08, 2), 7);
        map.add((0x10, 1), 9);

        let mut writer = Writer::new();
        map.pack(&mut writer).unwrap();
        let bytes = writer.into_inner();
        let copy = LightWeightMap::<(u64, u32), u32>::unpack(&mut Parser::new(&bytes)).unwrap();

        assert_eq!(copy, map);
        assert_eq!(copy.get_nth(&(0x10, 1), 1), Some(&9));
        assert_eq!(copy.get_buffer(buffer), Some(&b"il"[..]));
    }

    #[test]
    fn truncated_records() {
        let mut map: LightWeightMap<u64, u64> = LightWeightMap::new();
        map.add(1, 2);
        let mut writer = Writer::new();
        map.pack(&mut writer).unwrap();
        let bytes = writer.into_inner();
        let result = LightWeightMap::<u64, u64>::unpack(&mut Parser::new(&bytes[..bytes.len() - 1]));
        assert!(result.is_err());
    }
}
