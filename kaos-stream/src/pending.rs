//! Outbound buffer chunk tracking.
//!
//! A `PendingBuffer` owns the framed bytes of one stream and remembers, per
//! chunk, whether it is waiting to be sent, in flight or delivered. Chunk
//! states are packed 2 bits each so multi-megabyte buffers stay small.

use crate::error::{Result, StreamError};
use crate::handle::StreamHandle;
use crate::ring::RingBuffer;

/// Per-chunk send state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkState {
    Waiting = 0,
    OnFlight = 1,
    Delivered = 2,
}

impl ChunkState {
    #[inline]
    fn from_bits(bits: u8) -> Self {
        match bits {
            1 => ChunkState::OnFlight,
            2 => ChunkState::Delivered,
            _ => ChunkState::Waiting,
        }
    }
}

const STATE_BITS: usize = 2;
const STATES_PER_BYTE: usize = 8 / STATE_BITS;
const STATE_MASK: u8 = (1 << STATE_BITS) - 1;

/// Packed 2-bit chunk state array. All chunks start `Waiting`.
#[derive(Debug, Clone)]
pub struct ChunkStates {
    bits: Box<[u8]>,
    len: usize,
}

impl ChunkStates {
    pub fn new(len: usize) -> Self {
        Self {
            bits: vec![0u8; len.div_ceil(STATES_PER_BYTE)].into_boxed_slice(),
            len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> ChunkState {
        let shift = (index % STATES_PER_BYTE) * STATE_BITS;
        ChunkState::from_bits((self.bits[index / STATES_PER_BYTE] >> shift) & STATE_MASK)
    }

    #[inline]
    pub fn set(&mut self, index: usize, state: ChunkState) {
        let shift = (index % STATES_PER_BYTE) * STATE_BITS;
        let byte = &mut self.bits[index / STATES_PER_BYTE];
        *byte = (*byte & !(STATE_MASK << shift)) | ((state as u8) << shift);
    }
}

/// One outbound buffer split into `chunk_size` chunks.
pub struct PendingBuffer {
    handle: StreamHandle,
    bytes: Vec<u8>,
    chunk_size: usize,
    total_chunks: u32,
    states: ChunkStates,
    delivered: u32,
    /// Times a packet carrying one of our chunks was lost (diagnostic)
    dropped: u32,
    waiting: RingBuffer<u32>,
}

impl PendingBuffer {
    /// Split `bytes` into chunks of `chunk_size`. The last chunk may be shorter.
    pub fn new(bytes: Vec<u8>, chunk_size: usize) -> Result<Self> {
        if bytes.is_empty() {
            return Err(StreamError::EmptyPayload);
        }
        if chunk_size == 0 {
            return Err(StreamError::InvalidChunkSize(chunk_size));
        }

        let chunks = bytes.len().div_ceil(chunk_size);
        let total_chunks = u32::try_from(chunks).map_err(|_| StreamError::PayloadTooLarge {
            chunks,
            max: u32::MAX as usize,
        })?;

        let mut waiting = RingBuffer::with_capacity(chunks);
        for index in 0..total_chunks {
            waiting.push_growing(index);
        }

        Ok(Self {
            handle: StreamHandle::default(),
            bytes,
            chunk_size,
            total_chunks,
            states: ChunkStates::new(chunks),
            delivered: 0,
            dropped: 0,
            waiting,
        })
    }

    pub fn with_handle(mut self, handle: StreamHandle) -> Self {
        self.handle = handle;
        self
    }

    #[inline]
    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    #[inline]
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    #[inline]
    pub fn delivered_chunks(&self) -> u32 {
        self.delivered
    }

    #[inline]
    pub fn dropped_chunks(&self) -> u32 {
        self.dropped
    }

    pub(crate) fn record_drop(&mut self) {
        self.dropped += 1;
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Length of the framed bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn check_index(&self, index: u32) -> Result<usize> {
        if index >= self.total_chunks {
            return Err(StreamError::IndexOutOfRange {
                index,
                total: self.total_chunks,
            });
        }
        Ok(index as usize)
    }

    pub fn state(&self, index: u32) -> Result<ChunkState> {
        let i = self.check_index(index)?;
        Ok(self.states.get(i))
    }

    /// Set a chunk state, keeping the delivered count exact.
    pub fn set_state(&mut self, index: u32, state: ChunkState) -> Result<()> {
        let i = self.check_index(index)?;
        let prev = self.states.get(i);
        if prev == state {
            return Ok(());
        }
        if state == ChunkState::Delivered {
            self.delivered += 1;
        } else if prev == ChunkState::Delivered {
            self.delivered -= 1;
        }
        self.states.set(i, state);
        Ok(())
    }

    /// Exact bytes of chunk `index`.
    pub fn chunk(&self, index: u32) -> Result<&[u8]> {
        let i = self.check_index(index)?;
        let start = i * self.chunk_size;
        let end = (start + self.chunk_size).min(self.bytes.len());
        Ok(&self.bytes[start..end])
    }

    /// Next chunk eligible for sending.
    #[inline]
    pub fn next_waiting(&self) -> Option<u32> {
        self.waiting.peek().ok().copied()
    }

    pub fn pop_waiting(&mut self) -> Option<u32> {
        self.waiting.pop().ok()
    }

    /// Queue a chunk (again) for sending.
    pub fn push_waiting(&mut self, index: u32) {
        self.waiting.push_growing(index);
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    #[inline]
    pub fn is_delivered(&self) -> bool {
        self.delivered == self.total_chunks
    }
}

impl std::fmt::Debug for PendingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingBuffer")
            .field("handle", &self.handle)
            .field("len", &self.bytes.len())
            .field("total_chunks", &self.total_chunks)
            .field("delivered", &self.delivered)
            .field("dropped", &self.dropped)
            .finish()
    }
}
