//! # kaos-stream
//!
//! Reliable, ordered streaming of large buffers over unreliable datagrams.
//!
//! ## Features
//!
//! - **Chunked**: Buffers of any size are split into packet-sized chunks
//! - **Batched**: Short trailing chunks of several buffers share one packet
//! - **Selective acks**: 64-bit sliding ack mask, one ack per tick
//! - **Congestion controlled**: Slow start and congestion avoidance over a byte window
//! - **Ordered**: Completed buffers are delivered in the order streams were started
//!
//! ## Usage
//!
//! The core is transport-agnostic and tick-driven. Anything implementing
//! `PacketSink` + `RttProvider` can carry it:
//!
//! ```rust,ignore
//! use kaos_stream::{StreamConfig, StreamConnection, StreamEvent, UdpTransport};
//!
//! let transport = UdpTransport::bind(local, peer)?;
//! let mut conn = StreamConnection::new(StreamConfig::default(), transport)?;
//! conn.begin_stream(&payload)?;
//!
//! loop {
//!     conn.tick(dt);
//!     while let Some(n) = conn.transport().recv_into(&mut buf)? {
//!         conn.handle_packet(&buf[..n])?;
//!     }
//!     while let Some(event) = conn.poll_event() { /* ... */ }
//! }
//! ```
//!
//! ## Protocol
//!
//! - Chunk packets carry a varint sequence and one or more fragments
//! - Ack packets carry the newest sequence plus a mask of the 63 before it
//! - Unacked packets expire after 2x RTT and their chunks are resent
//! - A loss halves the slow-start threshold and restarts slow start

// Tracing macros - no-op when feature disabled
#[cfg(feature = "tracing")]
macro_rules! trace_debug { ($($arg:tt)*) => { tracing::debug!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug { ($($arg:tt)*) => {} }

#[cfg(feature = "tracing")]
macro_rules! trace_warn { ($($arg:tt)*) => { tracing::warn!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn { ($($arg:tt)*) => {} }

#[cfg(feature = "tracing")]
macro_rules! trace_trace { ($($arg:tt)*) => { tracing::trace!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_trace { ($($arg:tt)*) => {} }

mod assembler;
mod config;
pub mod congestion;
mod connection;
mod error;
mod handle;
pub mod header;
mod pending;
mod pool;
mod receiver;
mod ring;
mod streamer;
mod transport;
mod udp;
mod window;

pub use assembler::FragmentAssembler;
pub use config::StreamConfig;
pub use congestion::{CongestionController, CongestionState, ConnectionStreamStatus};
pub use connection::{StreamConnection, StreamEvent};
pub use error::{Result, StreamError};
pub use handle::StreamHandle;
pub use header::{AckHeader, FragmentHeader, MessageType};
pub use pending::{ChunkState, ChunkStates, PendingBuffer};
pub use pool::ArrayPool;
pub use receiver::{ReceiveStats, Receiver};
pub use ring::RingBuffer;
pub use streamer::{AckStats, Streamer, TickStats};
pub use transport::{PacketSink, RttProvider};
pub use udp::UdpTransport;
pub use window::{ChunkRef, Envelope, SendWindow};
