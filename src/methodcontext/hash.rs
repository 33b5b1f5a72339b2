//! Identity fingerprints of serialized method contexts.

use std::fmt;

use md5::{Digest, Md5};

/// A 128-bit MD5 fingerprint of a method context's serialized bytes.
///
/// Two contexts hash identically exactly when their serialized forms are byte-identical (modulo
/// MD5 collisions), which is what merge deduplication relies on. The digest is never persisted
/// as an interchange format except inside `.mct` files built by this crate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MethodContextHash(pub [u8; 16]);

impl MethodContextHash {
    /// Fingerprint of `data`.
    ///
    /// ```rust
    /// use superpmi::MethodContextHash;
    ///
    /// let hash = MethodContextHash::of_bytes(b"");
    /// assert_eq!(hash.to_string(), "d41d8cd98f00b204e9800998ecf8427e");
    /// ```
    #[must_use]
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(data);
        MethodContextHash(hasher.finalize().into())
    }

    /// The raw digest
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for MethodContextHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for MethodContextHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodContextHash({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        let hash = MethodContextHash::of_bytes(b"abc");
        assert_eq!(hash.to_string(), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(hash.as_bytes()[0], 0x90);
    }

    #[test]
    fn distinct_inputs() {
        assert_ne!(
            MethodContextHash::of_bytes(&[1, 2, 3]),
            MethodContextHash::of_bytes(&[1, 2, 4])
        );
        assert_eq!(
            MethodContextHash::of_bytes(&[1, 2, 3]),
            MethodContextHash::of_bytes(&[1, 2, 3])
        );
    }
}
