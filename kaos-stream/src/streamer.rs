//! Sender side of a stream connection.
//!
//! Every tick the streamer expires stale packets, lets the congestion window
//! grow, then packs waiting chunks into packets until the window is full.
//! Chunks are taken buffer by buffer in stream order; a packet keeps filling
//! with the next buffer's chunks while they fit, so short trailing chunks of
//! several buffers share one packet.
//!
//! Acks resolve packets from the front of the send window. A resolved packet
//! either marks its chunks delivered or puts them back in their buffer's
//! waiting queue.

use crate::config::StreamConfig;
use crate::congestion::{CongestionController, ConnectionStreamStatus};
use crate::error::{Result, StreamError};
use crate::handle::StreamHandle;
use crate::header::{varint_len, AckHeader, FragmentHeader, MessageType, PacketWriter};
use crate::pending::{ChunkState, PendingBuffer};
use crate::pool::ArrayPool;
use crate::transport::PacketSink;
use crate::window::{ChunkRef, Envelope};
use std::collections::VecDeque;
use std::time::Duration;

/// What one `tick` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub packets_sent: usize,
    pub chunks_sent: usize,
    /// Packets carrying more than one chunk
    pub batched_packets: usize,
    pub bytes_sent: usize,
    pub expired: usize,
}

/// Cumulative ack handling counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckStats {
    pub acks: u64,
    /// Acks at or below the newest one already processed
    pub duplicate_acks: u64,
    /// Packets acknowledged
    pub delivered: u64,
    /// Packets an ack reported missing
    pub lost: u64,
    /// Packets that timed out before any ack covered them
    pub expired: u64,
}

/// Packet being filled during a tick.
struct OpenPacket {
    buf: Vec<u8>,
    sequence: u32,
    count_at: usize,
    chunks: Vec<ChunkRef>,
}

pub struct Streamer {
    config: StreamConfig,
    chunk_size: usize,
    status: ConnectionStreamStatus,
    pool: ArrayPool<u8>,
    next_sequence: u32,
    last_acked: u32,
    /// Sum of all tick deltas
    clock: Duration,
    rtt: Option<Duration>,
    delivered: VecDeque<StreamHandle>,
    stats: AckStats,
}

impl Streamer {
    pub fn new(config: StreamConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            chunk_size: config.chunk_size(),
            status: ConnectionStreamStatus::new(&config),
            pool: ArrayPool::new(config.max_packet_size, config.pool_capacity),
            next_sequence: 1,
            last_acked: 0,
            clock: Duration::ZERO,
            rtt: None,
            delivered: VecDeque::new(),
            stats: AckStats::default(),
            config,
        })
    }

    /// Queue a buffer for sending. Its chunk size must match the config.
    pub fn begin(&mut self, buffer: PendingBuffer) -> Result<()> {
        if buffer.chunk_size() != self.chunk_size {
            return Err(StreamError::InvalidChunkSize(buffer.chunk_size()));
        }
        if buffer.total_chunks() > u16::MAX as u32 {
            return Err(StreamError::PayloadTooLarge {
                chunks: buffer.total_chunks() as usize,
                max: u16::MAX as usize,
            });
        }
        let handle = buffer.handle();
        if self.status.pending.contains_key(&handle) {
            return Err(StreamError::DuplicateHandle(handle.get()));
        }
        trace_debug!(
            "[SEND] begin stream {} ({} bytes, {} chunks)",
            handle,
            buffer.len(),
            buffer.total_chunks()
        );
        self.status.pending.insert(handle, buffer);
        Ok(())
    }

    /// Advance the clock by `dt` and send what the window allows.
    pub fn tick<S: PacketSink + ?Sized>(
        &mut self,
        dt: Duration,
        rtt: Option<Duration>,
        sink: &mut S,
    ) -> TickStats {
        self.clock += dt;
        self.rtt = rtt.filter(|r| !r.is_zero());

        let mut stats = TickStats::default();
        while let Some(envelope) = self.status.send_window.pop_expired(self.clock) {
            trace_debug!(
                "[EXPIRE] packet {} ({} chunks)",
                envelope.sequence,
                envelope.chunks.len()
            );
            stats.expired += 1;
            self.stats.expired += 1;
            self.resolve(envelope, false);
        }

        self.status.congestion.on_tick(dt, self.rtt);
        self.send_chunks(sink, &mut stats);
        stats
    }

    fn send_chunks<S: PacketSink + ?Sized>(&mut self, sink: &mut S, stats: &mut TickStats) {
        let min_packet = Self::packet_header_len(self.next_sequence) + FragmentHeader::SIZE + 1;
        if self.status.congestion.sendable_bytes() < min_packet {
            return;
        }

        let max_packets = self.config.max_packets_per_tick.unwrap_or(usize::MAX);
        let handles: Vec<StreamHandle> = self
            .status
            .pending
            .iter()
            .filter(|(_, buffer)| buffer.next_waiting().is_some())
            .map(|(handle, _)| *handle)
            .collect();

        let mut open: Option<OpenPacket> = None;
        'buffers: for handle in handles {
            loop {
                let Some(buffer) = self.status.pending.get(&handle) else {
                    break;
                };
                let Some(index) = buffer.next_waiting() else {
                    break;
                };
                let Ok(chunk) = buffer.chunk(index) else {
                    break;
                };
                let needed = FragmentHeader::SIZE + chunk.len();
                let sendable = self.status.congestion.sendable_bytes();

                if let Some(packet) = &open {
                    let total = packet.buf.len() + needed;
                    if total > self.config.max_packet_size || total > sendable {
                        if let Some(packet) = open.take() {
                            self.flush(packet, sink, stats);
                        }
                        continue;
                    }
                } else {
                    if stats.packets_sent >= max_packets {
                        break 'buffers;
                    }
                    let total = Self::packet_header_len(self.next_sequence) + needed;
                    if total > self.config.max_packet_size || total > sendable {
                        // Try the next buffer, its chunk may be shorter.
                        break;
                    }
                    open = Some(self.open_packet());
                }

                let Some(packet) = open.as_mut() else {
                    break;
                };
                let Some(buffer) = self.status.pending.get_mut(&handle) else {
                    break;
                };
                let Ok(bytes) = buffer.chunk(index) else {
                    break;
                };
                let header = FragmentHeader::new(
                    handle.get(),
                    buffer.total_chunks() as u16,
                    index,
                    bytes.len() as u32,
                );
                let mut writer = PacketWriter::resume(&mut packet.buf);
                writer.put_pod(&header);
                writer.put_bytes(bytes);
                packet.chunks.push(ChunkRef { handle, index });

                buffer.pop_waiting();
                if buffer.set_state(index, ChunkState::OnFlight).is_err() {
                    break;
                }
            }
        }

        if let Some(packet) = open.take() {
            self.flush(packet, sink, stats);
        }
    }

    #[inline]
    fn packet_header_len(sequence: u32) -> usize {
        1 + varint_len(sequence) + 2
    }

    fn open_packet(&mut self) -> OpenPacket {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let mut buf = self.pool.acquire();
        let mut writer = PacketWriter::new(&mut buf);
        writer.put_u8(MessageType::Chunk as u8);
        writer.put_varint(sequence);
        let count_at = writer.reserve_u16();
        OpenPacket {
            buf,
            sequence,
            count_at,
            chunks: Vec::new(),
        }
    }

    fn flush<S: PacketSink + ?Sized>(
        &mut self,
        packet: OpenPacket,
        sink: &mut S,
        stats: &mut TickStats,
    ) {
        let OpenPacket {
            mut buf,
            sequence,
            count_at,
            chunks,
        } = packet;
        PacketWriter::resume(&mut buf).patch_u16(count_at, chunks.len() as u16);

        // A failed send is left to expire and be resent.
        if let Err(_e) = sink.send_packet(&buf) {
            trace_warn!("[SEND] packet {} not sent: {}", sequence, _e);
        }

        let size = buf.len();
        trace_trace!(
            "[SEND] packet {} ({} bytes, {} chunks)",
            sequence,
            size,
            chunks.len()
        );
        stats.packets_sent += 1;
        stats.chunks_sent += chunks.len();
        stats.bytes_sent += size;
        if chunks.len() > 1 {
            stats.batched_packets += 1;
        }

        self.status.congestion.on_send(size);
        self.status.send_window.push(Envelope {
            sequence,
            size,
            chunks,
            expires_at: self.clock + self.expiration(),
        });
        debug_assert_eq!(
            self.status.send_window.bytes(),
            self.status.congestion.bytes_in_flight()
        );
        self.pool.release(buf);
    }

    fn expiration(&self) -> Duration {
        self.rtt
            .map_or(self.config.fallback_rtt, |rtt| rtt * 2)
            .max(self.config.min_expiration)
    }

    /// Process an ack from the receiver.
    ///
    /// Returns false for a stale ack (sequence not newer than the last one).
    pub fn handle_ack(&mut self, ack: &AckHeader) -> Result<bool> {
        let sequence = ack.sequence();
        if sequence <= self.last_acked {
            self.stats.duplicate_acks += 1;
            trace_trace!("[ACK] stale ack {} (last {})", sequence, self.last_acked);
            return Ok(false);
        }
        if sequence >= self.next_sequence {
            return Err(StreamError::Malformed("ack for a packet never sent"));
        }

        self.last_acked = sequence;
        self.stats.acks += 1;
        trace_trace!("[ACK] {} mask {:#018x}", sequence, ack.mask());

        while let Some(envelope) = self.status.send_window.pop_covered(sequence) {
            let delivered = ack.acknowledges(envelope.sequence);
            if delivered {
                self.stats.delivered += 1;
            } else {
                self.stats.lost += 1;
                trace_debug!("[LOSS] packet {} missing from ack {}", envelope.sequence, sequence);
            }
            self.resolve(envelope, delivered);
        }
        Ok(true)
    }

    fn resolve(&mut self, envelope: Envelope, delivered: bool) {
        let congestion = &mut self.status.congestion;
        congestion.on_resolved(envelope.size);
        if delivered {
            congestion.on_delivered(envelope.sequence, self.rtt);
        } else {
            congestion.on_lost(envelope.sequence, self.next_sequence);
        }

        for chunk in &envelope.chunks {
            let Some(buffer) = self.status.pending.get_mut(&chunk.handle) else {
                trace_warn!("[ACK] packet {} refers to unknown stream {}", envelope.sequence, chunk.handle);
                continue;
            };
            // Envelope chunks were validated when they were packed.
            if delivered {
                let updated = buffer.set_state(chunk.index, ChunkState::Delivered);
                debug_assert!(updated.is_ok(), "chunk {} of {}", chunk.index, chunk.handle);
            } else if buffer.state(chunk.index).ok() == Some(ChunkState::OnFlight) {
                buffer.record_drop();
                let updated = buffer.set_state(chunk.index, ChunkState::Waiting);
                debug_assert!(updated.is_ok(), "chunk {} of {}", chunk.index, chunk.handle);
                buffer.push_waiting(chunk.index);
            }
        }

        if !delivered {
            return;
        }
        for chunk in &envelope.chunks {
            let done = self
                .status
                .pending
                .get(&chunk.handle)
                .is_some_and(PendingBuffer::is_delivered);
            if done {
                self.status.pending.remove(&chunk.handle);
                self.delivered.push_back(chunk.handle);
                trace_debug!("[DELIVER] stream {} acknowledged", chunk.handle);
            }
        }
    }

    /// Next fully acknowledged stream.
    pub fn poll_delivered(&mut self) -> Option<StreamHandle> {
        self.delivered.pop_front()
    }

    pub fn congestion(&self) -> &CongestionController {
        &self.status.congestion
    }

    pub fn status(&self) -> &ConnectionStreamStatus {
        &self.status
    }

    pub fn pending(&self, handle: StreamHandle) -> Option<&PendingBuffer> {
        self.status.pending.get(&handle)
    }

    pub fn pending_count(&self) -> usize {
        self.status.pending.len()
    }

    /// Packets sent and not yet resolved.
    pub fn in_flight_packets(&self) -> usize {
        self.status.send_window.len()
    }

    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn ack_stats(&self) -> &AckStats {
        &self.stats
    }

    pub fn pool(&self) -> &ArrayPool<u8> {
        &self.pool
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// No buffers left and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.status.is_idle()
    }
}

impl std::fmt::Debug for Streamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Streamer")
            .field("next_sequence", &self.next_sequence)
            .field("last_acked", &self.last_acked)
            .field("window", &self.status.congestion.window())
            .field("in_flight", &self.status.congestion.bytes_in_flight())
            .field("pending", &self.status.pending.len())
            .finish()
    }
}
