//! Wire layout for chunk and ack packets.
//!
//! ```text
//! Chunk packet
//!   u8        message type (1)
//!   varint    packet sequence (LEB128, 1-5 bytes)
//!   u16       fragment count (reserved, patched when the packet is sent)
//!   repeated:
//!     FragmentHeader (14 bytes)
//!     [u8; len] chunk bytes
//!
//! Ack packet
//!   u8        message type (2)
//!   AckHeader (12 bytes)
//! ```
//!
//! Fixed-width fields are little-endian.

use crate::error::{Result, StreamError};
use bytemuck::{Pod, Zeroable};

/// Leading little-endian u32 of every streamed buffer: logical payload length.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Bits in the ack mask.
pub const ACK_MASK_BITS: u32 = u64::BITS;

/// Longest LEB128 encoding of a u32.
pub const MAX_VARINT_LEN: usize = 5;

/// Worst-case chunk packet header: type + varint sequence + fragment count.
pub const CHUNK_PACKET_OVERHEAD: usize = 1 + MAX_VARINT_LEN + 2;

/// Message types, first byte of every packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Chunk = 1,
    Ack = 2,
}

impl TryFrom<u8> for MessageType {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(MessageType::Chunk),
            2 => Ok(MessageType::Ack),
            other => Err(StreamError::UnknownMessageType(other)),
        }
    }
}

/// Per-fragment header (14 bytes)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FragmentHeader {
    handle: u32,
    total_chunks: u16,
    chunk_index: u32,
    len: u32,
}

impl FragmentHeader {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(handle: u32, total_chunks: u16, chunk_index: u32, len: u32) -> Self {
        Self {
            handle: handle.to_le(),
            total_chunks: total_chunks.to_le(),
            chunk_index: chunk_index.to_le(),
            len: len.to_le(),
        }
    }

    #[inline]
    pub fn handle(&self) -> u32 {
        u32::from_le(self.handle)
    }

    #[inline]
    pub fn total_chunks(&self) -> u16 {
        u16::from_le(self.total_chunks)
    }

    #[inline]
    pub fn chunk_index(&self) -> u32 {
        u32::from_le(self.chunk_index)
    }

    #[inline]
    pub fn len(&self) -> u32 {
        u32::from_le(self.len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Selective acknowledgment (12 bytes).
///
/// Bit `k` of `mask` acknowledges packet `sequence - k`.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct AckHeader {
    sequence: u32,
    mask: u64,
}

impl AckHeader {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(sequence: u32, mask: u64) -> Self {
        Self {
            sequence: sequence.to_le(),
            mask: mask.to_le(),
        }
    }

    #[inline]
    pub fn sequence(&self) -> u32 {
        u32::from_le(self.sequence)
    }

    #[inline]
    pub fn mask(&self) -> u64 {
        u64::from_le(self.mask)
    }

    /// Whether `sequence` is marked received by this ack.
    pub fn acknowledges(&self, sequence: u32) -> bool {
        let Some(distance) = self.sequence().checked_sub(sequence) else {
            return false;
        };
        distance < ACK_MASK_BITS && self.mask() & (1u64 << distance) != 0
    }

    /// Encode as a complete ack packet.
    pub fn to_packet(&self) -> [u8; 1 + Self::SIZE] {
        let mut packet = [0u8; 1 + Self::SIZE];
        packet[0] = MessageType::Ack as u8;
        packet[1..].copy_from_slice(bytemuck::bytes_of(self));
        packet
    }
}

/// Prepend the little-endian length prefix.
pub fn frame_payload(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    framed.extend_from_slice(payload);
    framed
}

/// Bytes needed to encode `value` as LEB128.
#[inline]
pub fn varint_len(value: u32) -> usize {
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0xfff_ffff => 4,
        _ => 5,
    }
}

/// Appends fields to a packet buffer.
pub struct PacketWriter<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> PacketWriter<'a> {
    /// Clears `buf` and writes from the start.
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        buf.clear();
        Self { buf }
    }

    /// Continue appending after the existing contents of `buf`.
    pub fn resume(buf: &'a mut Vec<u8>) -> Self {
        Self { buf }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_varint(&mut self, mut value: u32) {
        while value >= 0x80 {
            self.buf.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    /// Reserve a u16 to be filled in later, returns its offset.
    pub fn reserve_u16(&mut self) -> usize {
        let offset = self.buf.len();
        self.buf.extend_from_slice(&[0, 0]);
        offset
    }

    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        self.buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn put_pod<T: Pod>(&mut self, value: &T) {
        self.buf.extend_from_slice(bytemuck::bytes_of(value));
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

/// Bounds-checked cursor over a received packet.
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(StreamError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.get_bytes(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let b = self.get_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_varint(&mut self) -> Result<u32> {
        let mut value: u32 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.get_u8()?;
            value |= ((byte & 0x7f) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(StreamError::Malformed("varint longer than 5 bytes"))
    }

    pub fn get_pod<T: Pod>(&mut self) -> Result<T> {
        let bytes = self.get_bytes(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    pub fn message_type(&mut self) -> Result<MessageType> {
        MessageType::try_from(self.get_u8()?)
    }

    /// Read the message type and fail unless it is `expected`.
    pub fn expect_type(&mut self, expected: MessageType) -> Result<()> {
        if self.message_type()? != expected {
            return Err(StreamError::Malformed("unexpected message type"));
        }
        Ok(())
    }
}

/// Decoded view of one fragment inside a chunk packet.
#[derive(Debug, Clone, Copy)]
pub struct Fragment<'a> {
    pub header: FragmentHeader,
    pub bytes: &'a [u8],
}

/// Parse a whole chunk packet into its sequence and fragments.
pub fn decode_chunk_packet(packet: &[u8]) -> Result<(u32, Vec<Fragment<'_>>)> {
    let mut reader = PacketReader::new(packet);
    reader.expect_type(MessageType::Chunk)?;
    let sequence = reader.get_varint()?;
    let count = reader.get_u16()?;
    let mut fragments = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let header: FragmentHeader = reader.get_pod()?;
        let bytes = reader.get_bytes(header.len() as usize)?;
        fragments.push(Fragment { header, bytes });
    }
    Ok((sequence, fragments))
}

/// Parse an ack packet.
pub fn decode_ack_packet(packet: &[u8]) -> Result<AckHeader> {
    let mut reader = PacketReader::new(packet);
    reader.expect_type(MessageType::Ack)?;
    reader.get_pod()
}
