//! Send window: one envelope per chunk packet still awaiting an ack.
//!
//! Envelopes are pushed in sequence order and resolved from the front, either
//! by an ack that covers them or by expiring.

use crate::handle::StreamHandle;
use crate::ring::RingBuffer;
use std::time::Duration;

/// One chunk carried by a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRef {
    pub handle: StreamHandle,
    pub index: u32,
}

/// Bookkeeping for one sent packet.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub sequence: u32,
    /// Bytes put on the wire
    pub size: usize,
    pub chunks: Vec<ChunkRef>,
    /// Sender clock value after which the packet counts as lost
    pub expires_at: Duration,
}

impl Envelope {
    #[inline]
    pub fn is_expired(&self, now: Duration) -> bool {
        now >= self.expires_at
    }
}

pub struct SendWindow {
    envelopes: RingBuffer<Envelope>,
}

impl SendWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            envelopes: RingBuffer::with_capacity(capacity),
        }
    }

    /// Append a newly sent packet. Sequences must be increasing.
    pub fn push(&mut self, envelope: Envelope) {
        debug_assert!(self
            .newest_sequence()
            .map_or(true, |newest| envelope.sequence > newest));
        self.envelopes.push_growing(envelope);
    }

    pub fn front(&self) -> Option<&Envelope> {
        self.envelopes.peek().ok()
    }

    pub fn pop_front(&mut self) -> Option<Envelope> {
        self.envelopes.pop().ok()
    }

    /// Pop the oldest envelope if it has expired at `now`.
    pub fn pop_expired(&mut self, now: Duration) -> Option<Envelope> {
        if self.front()?.is_expired(now) {
            self.pop_front()
        } else {
            None
        }
    }

    /// Pop the oldest envelope if an ack for `sequence` covers it.
    pub fn pop_covered(&mut self, sequence: u32) -> Option<Envelope> {
        if self.front()?.sequence <= sequence {
            self.pop_front()
        } else {
            None
        }
    }

    pub fn newest_sequence(&self) -> Option<u32> {
        self.envelopes.peek_last().ok().map(|e| e.sequence)
    }

    /// Bytes of all outstanding packets.
    pub fn bytes(&self) -> usize {
        self.envelopes.iter().map(|e| e.size).sum()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.envelopes.capacity()
    }
}

impl std::fmt::Debug for SendWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendWindow")
            .field("len", &self.len())
            .field("newest_sequence", &self.newest_sequence())
            .finish()
    }
}
