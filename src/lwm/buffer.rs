//! Arena of variable-length byte buffers owned by a single map.

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};

use crate::{
    file::{Parser, Writer},
    lwm::{bounded_capacity, Packable},
    Result,
};

/// Buffer reference meaning "no buffer recorded".
pub const NO_BUFFER: u32 = u32::MAX;

/// Append-only storage for byte buffers, referenced by stable `u32` indices.
///
/// All buffers live in one contiguous allocation and are released together with the owning map.
/// A content hash index makes [`BufferPool::contains`] independent of the number of buffers.
#[derive(Debug, Clone, Default)]
pub struct BufferPool {
    data: Vec<u8>,
    spans: Vec<(usize, usize)>,
    lookup: FxHashMap<u64, Vec<u32>>,
}

fn content_hash(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    bytes.hash(&mut hasher);
    hasher.finish()
}

impl BufferPool {
    /// Create an empty pool
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a copy of `bytes` and returns its index. Never deduplicates.
    pub fn add_buffer(&mut self, bytes: &[u8]) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let index = self.spans.len() as u32;
        let start = self.data.len();
        self.data.extend_from_slice(bytes);
        self.spans.push((start, bytes.len()));
        self.lookup
            .entry(content_hash(bytes))
            .or_default()
            .push(index);
        index
    }

    /// Index of a buffer byte-identical to `bytes`.
    ///
    /// When several identical buffers exist the most recently added one is returned, so a
    /// lookup right after [`BufferPool::add_buffer`] yields the index that call returned.
    #[must_use]
    pub fn contains(&self, bytes: &[u8]) -> Option<u32> {
        let candidates = self.lookup.get(&content_hash(bytes))?;
        candidates
            .iter()
            .rev()
            .find(|&&index| self.get_buffer(index) == Some(bytes))
            .copied()
    }

    /// The buffer at `index`, or `None` for [`NO_BUFFER`] and unknown indices.
    #[must_use]
    pub fn get_buffer(&self, index: u32) -> Option<&[u8]> {
        let (start, len) = *self.spans.get(index as usize)?;
        Some(&self.data[start..start + len])
    }

    /// Number of buffers
    #[must_use]
    pub fn count(&self) -> usize {
        self.spans.len()
    }

    /// True if no buffer was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Total payload bytes across all buffers
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.data.len()
    }
}

impl PartialEq for BufferPool {
    fn eq(&self, other: &Self) -> bool {
        self.spans.len() == other.spans.len()
            && (0..self.spans.len()).all(|index| {
                #[allow(clippy::cast_possible_truncation)]
                let index = index as u32;
                self.get_buffer(index) == other.get_buffer(index)
            })
    }
}

impl Packable for BufferPool {
    fn pack(&self, writer: &mut Writer) -> Result<()> {
        #[allow(clippy::cast_possible_truncation)]
        writer.write_le(self.spans.len() as u32);
        for &(start, len) in &self.spans {
            writer.write_prefixed_bytes(&self.data[start..start + len])?;
        }
        Ok(())
    }

    fn unpack(parser: &mut Parser<'_>) -> Result<Self> {
        let count = parser.read_le::<u32>()?;
        let mut pool = BufferPool {
            spans: Vec::with_capacity(bounded_capacity(count, parser)),
            ..BufferPool::default()
        };
        for _ in 0..count {
            let bytes = parser.read_prefixed_bytes()?;
            pool.add_buffer(bytes);
        }
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_get() {
        let mut pool = BufferPool::new();
        let a = pool.add_buffer(b"sig-a");
        let b = pool.add_buffer(b"");
        let c = pool.add_buffer(b"sig-c");

        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(pool.get_buffer(a), Some(&b"sig-a"[..]));
        assert_eq!(pool.get_buffer(b), Some(&b""[..]));
        assert_eq!(pool.get_buffer(NO_BUFFER), None);
        assert_eq!(pool.count(), 3);
        assert_eq!(pool.total_bytes(), 10);
    }

    #[test]
    fn contains_finds_latest_identical() {
        let mut pool = BufferPool::new();
        assert_eq!(pool.contains(b"x"), None);

        let first = pool.add_buffer(b"x");
        assert_eq!(pool.contains(b"x"), Some(first));

        let second = pool.add_buffer(b"x");
        assert_ne!(first, second);
        assert_eq!(pool.contains(b"x"), Some(second));
        assert_eq!(pool.contains(b"y"), None);
    }

    #[test]
    fn pack_roundtrip() {
        let mut pool = BufferPool::new();
        pool.add_buffer(&[1, 2, 3]);
        pool.add_buffer(&[]);
        pool.add_buffer(&[1, 2, 3]);

        let mut writer = Writer::new();
        pool.pack(&mut writer).unwrap();
        let bytes = writer.into_inner();
        let copy = BufferPool::unpack(&mut Parser::new(&bytes)).unwrap();

        assert_eq!(copy, pool);
        assert_eq!(copy.contains(&[1, 2, 3]), Some(2));
    }

    #[test]
    fn truncated_pool() {
        let bytes = [2, 0, 0, 0, 1, 0, 0, 0, 0xAA];
        assert!(BufferPool::unpack(&mut Parser::new(&bytes)).is_err());
    }
}
