use super::Backend;

/// Archive bytes held in memory, for archives built on the fly and for tests.
#[derive(Debug, Default)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Wraps `data`
    #[must_use]
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }

    /// Gives the bytes back
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Backend for Memory {
    fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error::OutOfBounds;

    #[test]
    fn slices() {
        let mut data = b"mc\x04\x00\x00\x00".to_vec();
        data.extend_from_slice(&[0xBB; 4]);
        let memory = Memory::new(data);

        assert_eq!(memory.len(), 10);
        assert_eq!(memory.data_slice(0, 2).unwrap(), b"mc");
        assert_eq!(memory.data_slice(6, 4).unwrap(), &[0xBB; 4]);
        assert!(memory.data_slice(10, 0).unwrap().is_empty());
        assert_eq!(memory.into_inner().len(), 10);
    }

    #[test]
    fn out_of_range() {
        let memory = Memory::new(vec![0x00; 100]);

        assert!(matches!(memory.data_slice(usize::MAX, 1), Err(OutOfBounds)));
        assert!(matches!(memory.data_slice(100, 1), Err(OutOfBounds)));
        assert!(matches!(memory.data_slice(99, 2), Err(OutOfBounds)));
        assert!(Memory::default().is_empty());
    }
}
