//! Inbound buffer reassembly.
//!
//! Fragments arrive in any order; each is copied straight into its slot of a
//! preallocated region and marked in a presence bitmap. The region is always
//! `chunk_size * total_chunks` long, the 4-byte length prefix written by the
//! sender tells how much of it is payload.

use crate::error::{Result, StreamError};
use crate::header::LENGTH_PREFIX_SIZE;

pub struct FragmentAssembler {
    buffer: Box<[u8]>,
    /// Presence bitmap, 1 bit per fragment
    received_mask: Box<[u64]>,
    chunk_size: usize,
    total_chunks: u32,
    received: u32,
}

impl FragmentAssembler {
    pub fn new(chunk_size: usize, total_chunks: u32) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StreamError::InvalidChunkSize(chunk_size));
        }
        if total_chunks == 0 {
            return Err(StreamError::EmptyPayload);
        }
        let words = (total_chunks as usize).div_ceil(64);
        Ok(Self {
            buffer: vec![0u8; chunk_size * total_chunks as usize].into_boxed_slice(),
            received_mask: vec![0u64; words].into_boxed_slice(),
            chunk_size,
            total_chunks,
            received: 0,
        })
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    #[inline]
    pub fn received_chunks(&self) -> u32 {
        self.received
    }

    fn check_index(&self, index: u32) -> Result<()> {
        if index >= self.total_chunks {
            return Err(StreamError::IndexOutOfRange {
                index,
                total: self.total_chunks,
            });
        }
        Ok(())
    }

    pub fn is_fragment_received(&self, index: u32) -> Result<bool> {
        self.check_index(index)?;
        let i = index as usize;
        Ok(self.received_mask[i >> 6] & (1u64 << (i & 63)) != 0)
    }

    /// Copy a full `chunk_size` fragment into place. Each index is accepted once.
    pub fn add_fragment(&mut self, index: u32, bytes: &[u8]) -> Result<()> {
        self.check_index(index)?;
        if bytes.len() != self.chunk_size {
            return Err(StreamError::FragmentSize {
                expected: self.chunk_size,
                got: bytes.len(),
            });
        }
        if self.is_fragment_received(index)? {
            return Err(StreamError::DuplicateFragment(index));
        }

        let i = index as usize;
        let offset = i * self.chunk_size;
        self.buffer[offset..offset + self.chunk_size].copy_from_slice(bytes);
        self.received_mask[i >> 6] |= 1u64 << (i & 63);
        self.received += 1;
        Ok(())
    }

    #[inline]
    pub fn is_fully_received(&self) -> bool {
        self.received == self.total_chunks
    }

    /// The whole region, padding included.
    pub fn assembled(&self) -> Result<&[u8]> {
        if !self.is_fully_received() {
            return Err(StreamError::Incomplete {
                received: self.received,
                total: self.total_chunks,
            });
        }
        Ok(&self.buffer)
    }

    /// Strip the length prefix and padding, returning the logical payload.
    pub fn into_payload(self) -> Result<Vec<u8>> {
        let region = self.assembled()?;
        if region.len() < LENGTH_PREFIX_SIZE {
            return Err(StreamError::Malformed("assembled buffer shorter than prefix"));
        }
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&region[..LENGTH_PREFIX_SIZE]);
        let len = u32::from_le_bytes(prefix) as usize;
        let end = LENGTH_PREFIX_SIZE
            .checked_add(len)
            .filter(|&end| end <= region.len())
            .ok_or(StreamError::Malformed("length prefix exceeds assembled buffer"))?;

        let mut bytes = self.buffer.into_vec();
        bytes.truncate(end);
        bytes.drain(..LENGTH_PREFIX_SIZE);
        Ok(bytes)
    }
}

impl std::fmt::Debug for FragmentAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentAssembler")
            .field("chunk_size", &self.chunk_size)
            .field("received", &self.received)
            .field("total_chunks", &self.total_chunks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::frame_payload;

    fn chunks(bytes: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
        bytes
            .chunks(chunk_size)
            .map(|c| {
                let mut padded = c.to_vec();
                padded.resize(chunk_size, 0);
                padded
            })
            .collect()
    }

    #[test]
    fn test_rejects_invalid_sizes() {
        assert!(FragmentAssembler::new(0, 4).is_err());
        assert!(FragmentAssembler::new(16, 0).is_err());
    }

    #[test]
    fn test_fully_received_only_after_all_unique() {
        let mut asm = FragmentAssembler::new(4, 3).unwrap();
        asm.add_fragment(2, &[3; 4]).unwrap();
        assert!(!asm.is_fully_received());
        asm.add_fragment(0, &[1; 4]).unwrap();
        assert!(!asm.is_fully_received());
        assert!(asm.add_fragment(0, &[1; 4]).is_err());
        assert_eq!(asm.received_chunks(), 2);
        asm.add_fragment(1, &[2; 4]).unwrap();
        assert!(asm.is_fully_received());
        assert_eq!(asm.assembled().unwrap(), &[1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]);
    }

    #[test]
    fn test_duplicate_fragment_fails() {
        let mut asm = FragmentAssembler::new(2, 2).unwrap();
        asm.add_fragment(1, &[9, 9]).unwrap();
        assert!(matches!(
            asm.add_fragment(1, &[9, 9]),
            Err(StreamError::DuplicateFragment(1))
        ));
    }

    #[test]
    fn test_wrong_length_and_index() {
        let mut asm = FragmentAssembler::new(4, 2).unwrap();
        assert!(matches!(
            asm.add_fragment(0, &[1, 2, 3]),
            Err(StreamError::FragmentSize { expected: 4, got: 3 })
        ));
        assert!(matches!(
            asm.add_fragment(2, &[0; 4]),
            Err(StreamError::IndexOutOfRange { index: 2, total: 2 })
        ));
        assert!(asm.is_fragment_received(5).is_err());
    }

    #[test]
    fn test_assembled_fails_before_complete() {
        let asm = FragmentAssembler::new(4, 2).unwrap();
        assert!(matches!(
            asm.assembled(),
            Err(StreamError::Incomplete { received: 0, total: 2 })
        ));
    }

    #[test]
    fn test_reverse_order_matches_source() {
        let payload: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();
        let framed = frame_payload(&payload);
        let parts = chunks(&framed, 64);

        let mut asm = FragmentAssembler::new(64, parts.len() as u32).unwrap();
        for (i, part) in parts.iter().enumerate().rev() {
            assert!(!asm.is_fragment_received(i as u32).unwrap());
            asm.add_fragment(i as u32, part).unwrap();
            assert!(asm.is_fragment_received(i as u32).unwrap());
        }
        assert_eq!(&asm.assembled().unwrap()[..framed.len()], &framed[..]);
        assert_eq!(asm.into_payload().unwrap(), payload);
    }

    #[test]
    fn test_many_fragments_bitmap() {
        // More than one bitmap word.
        let mut asm = FragmentAssembler::new(1, 130).unwrap();
        for i in (0..130).step_by(2) {
            asm.add_fragment(i, &[i as u8]).unwrap();
        }
        assert!(asm.is_fragment_received(128).unwrap());
        assert!(!asm.is_fragment_received(129).unwrap());
        assert_eq!(asm.received_chunks(), 65);
    }

    #[test]
    fn test_bad_length_prefix() {
        let mut asm = FragmentAssembler::new(8, 1).unwrap();
        asm.add_fragment(0, &[100, 0, 0, 0, 1, 2, 3, 4]).unwrap();
        assert!(matches!(asm.into_payload(), Err(StreamError::Malformed(_))));
    }
}
