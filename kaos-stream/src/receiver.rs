//! Receiver side of a stream connection.
//!
//! Fragments are reassembled per stream handle. Completed buffers are handed
//! out strictly in handle order: a finished buffer waits until every buffer
//! started before it has been delivered.
//!
//! Acks are batched: packets only update the sliding mask and one ack goes out
//! per tick. If more than 64 packets arrive between ticks, the oldest could no
//! longer be described by a single mask, so the current state is queued as an
//! extra ack first.

use crate::assembler::FragmentAssembler;
use crate::error::{Result, StreamError};
use crate::handle::StreamHandle;
use crate::header::{decode_chunk_packet, AckHeader, Fragment, ACK_MASK_BITS};
use crate::transport::PacketSink;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    pub packets: u64,
    /// Fragments added to an assembler
    pub fragments: u64,
    /// Fragments already received
    pub duplicate_fragments: u64,
    /// Fragments of buffers that were already delivered
    pub stale_fragments: u64,
    pub acks_sent: u64,
    pub buffers_delivered: u64,
}

pub struct Receiver {
    chunk_size: usize,
    assemblers: BTreeMap<StreamHandle, FragmentAssembler>,
    next_expected: StreamHandle,
    last_sequence: u32,
    ack_mask: u64,
    ack_pending: bool,
    /// First newer-than-last sequence since the previous ack went out
    oldest_unreported: Option<u32>,
    backlog: Vec<AckHeader>,
    /// Zero-padding scratch for short trailing chunks
    padded: Vec<u8>,
    received: VecDeque<(StreamHandle, Vec<u8>)>,
    stats: ReceiveStats,
}

impl Receiver {
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StreamError::InvalidChunkSize(chunk_size));
        }
        Ok(Self {
            chunk_size,
            assemblers: BTreeMap::new(),
            next_expected: StreamHandle::FIRST,
            last_sequence: 0,
            ack_mask: 0,
            ack_pending: false,
            oldest_unreported: None,
            backlog: Vec::new(),
            padded: Vec::with_capacity(chunk_size),
            received: VecDeque::new(),
            stats: ReceiveStats::default(),
        })
    }

    /// Reject a fragment that cannot belong to a well-formed stream.
    fn check_fragment(&self, fragment: &Fragment<'_>) -> Result<()> {
        let header = &fragment.header;
        let total = header.total_chunks() as u32;
        if total == 0 {
            return Err(StreamError::Malformed("fragment with zero total chunks"));
        }
        if header.chunk_index() >= total {
            return Err(StreamError::IndexOutOfRange {
                index: header.chunk_index(),
                total,
            });
        }
        let len = fragment.bytes.len();
        let last = header.chunk_index() == total - 1;
        // Only the trailing chunk of a buffer may be short.
        if len == 0 || len > self.chunk_size || (len < self.chunk_size && !last) {
            return Err(StreamError::FragmentSize {
                expected: self.chunk_size,
                got: len,
            });
        }
        let known = self.assemblers.get(&StreamHandle(header.handle()));
        if known.is_some_and(|assembler| assembler.total_chunks() != total) {
            return Err(StreamError::Malformed("total chunk count changed"));
        }
        Ok(())
    }

    /// Process one chunk packet.
    ///
    /// A malformed packet is rejected as a whole before any state changes.
    pub fn handle_chunk_packet(&mut self, packet: &[u8]) -> Result<()> {
        let (sequence, fragments) = decode_chunk_packet(packet)?;
        if sequence == 0 {
            return Err(StreamError::Malformed("packet sequence 0"));
        }
        let mut totals: BTreeMap<StreamHandle, u32> = BTreeMap::new();
        for fragment in &fragments {
            self.check_fragment(fragment)?;
            let total = fragment.header.total_chunks() as u32;
            let seen = *totals
                .entry(StreamHandle(fragment.header.handle()))
                .or_insert(total);
            if seen != total {
                return Err(StreamError::Malformed("total chunk count changed"));
            }
        }

        self.stats.packets += 1;
        trace_trace!("[RECV] packet {} ({} fragments)", sequence, fragments.len());

        let mut completed = false;
        for fragment in &fragments {
            let handle = StreamHandle(fragment.header.handle());
            if handle < self.next_expected {
                self.stats.stale_fragments += 1;
                continue;
            }

            let total = fragment.header.total_chunks() as u32;
            let assembler = match self.assemblers.entry(handle) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(FragmentAssembler::new(self.chunk_size, total)?),
            };

            let index = fragment.header.chunk_index();
            if assembler.is_fragment_received(index)? {
                self.stats.duplicate_fragments += 1;
                continue;
            }
            if fragment.bytes.len() == self.chunk_size {
                assembler.add_fragment(index, fragment.bytes)?;
            } else {
                self.padded.clear();
                self.padded.extend_from_slice(fragment.bytes);
                self.padded.resize(self.chunk_size, 0);
                assembler.add_fragment(index, &self.padded)?;
            }
            self.stats.fragments += 1;
            completed |= assembler.is_fully_received();
        }

        self.record_sequence(sequence);
        if completed {
            self.deliver_ready()?;
        }
        Ok(())
    }

    fn record_sequence(&mut self, sequence: u32) {
        self.ack_pending = true;

        if sequence > self.last_sequence {
            match self.oldest_unreported {
                Some(oldest) if sequence - oldest >= ACK_MASK_BITS => {
                    self.backlog
                        .push(AckHeader::new(self.last_sequence, self.ack_mask));
                    self.oldest_unreported = Some(sequence);
                }
                None => self.oldest_unreported = Some(sequence),
                _ => {}
            }

            let distance = sequence - self.last_sequence;
            self.ack_mask = if distance >= ACK_MASK_BITS {
                1
            } else {
                (self.ack_mask << distance) | 1
            };
            self.last_sequence = sequence;
        } else {
            let distance = self.last_sequence - sequence;
            if distance < ACK_MASK_BITS {
                self.ack_mask |= 1u64 << distance;
            }
        }
    }

    /// Hand out completed buffers in handle order.
    fn deliver_ready(&mut self) -> Result<()> {
        while self
            .assemblers
            .get(&self.next_expected)
            .is_some_and(FragmentAssembler::is_fully_received)
        {
            let handle = self.next_expected;
            self.next_expected = handle.next();
            let Some(assembler) = self.assemblers.remove(&handle) else {
                break;
            };
            let payload = assembler.into_payload()?;
            trace_debug!("[DELIVER] stream {} received ({} bytes)", handle, payload.len());
            self.stats.buffers_delivered += 1;
            self.received.push_back((handle, payload));
        }
        Ok(())
    }

    /// Send queued acks. Returns how many went out.
    pub fn tick<S: PacketSink + ?Sized>(&mut self, sink: &mut S) -> usize {
        let mut sent = 0;
        for ack in self.backlog.drain(..) {
            if let Err(_e) = sink.send_packet(&ack.to_packet()) {
                trace_warn!("[ACK] send failed: {}", _e);
            }
            sent += 1;
        }

        if self.ack_pending {
            let ack = AckHeader::new(self.last_sequence, self.ack_mask);
            if let Err(_e) = sink.send_packet(&ack.to_packet()) {
                trace_warn!("[ACK] send failed: {}", _e);
            }
            trace_trace!("[ACK] sent {} mask {:#018x}", self.last_sequence, self.ack_mask);
            self.ack_pending = false;
            self.oldest_unreported = None;
            sent += 1;
        }

        self.stats.acks_sent += sent as u64;
        sent
    }

    /// Next completed buffer, in stream order.
    pub fn poll_received(&mut self) -> Option<(StreamHandle, Vec<u8>)> {
        self.received.pop_front()
    }

    pub fn next_expected(&self) -> StreamHandle {
        self.next_expected
    }

    pub fn last_sequence(&self) -> u32 {
        self.last_sequence
    }

    pub fn ack_mask(&self) -> u64 {
        self.ack_mask
    }

    pub fn has_pending_ack(&self) -> bool {
        self.ack_pending || !self.backlog.is_empty()
    }

    /// Buffers with at least one fragment that are not yet delivered.
    pub fn assembling(&self) -> usize {
        self.assemblers.len()
    }

    pub fn stats(&self) -> &ReceiveStats {
        &self.stats
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("next_expected", &self.next_expected)
            .field("last_sequence", &self.last_sequence)
            .field("assembling", &self.assemblers.len())
            .finish()
    }
}
