//! Error types for kaos-stream.

use std::io;

/// Result type for kaos-stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Streaming errors.
///
/// Precondition violations (bad index, duplicate fragment, invalid sizes) and
/// structurally invalid packets end up here. Loss, duplication and reordering
/// never do: the protocol absorbs them.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// IO error from a transport adapter.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    Config(String),

    /// Tried to stream or chunk an empty payload.
    #[error("empty payload")]
    EmptyPayload,

    /// Chunk size must be greater than zero.
    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// Payload needs more chunks than the wire format can describe.
    #[error("payload too large: {chunks} chunks (max {max})")]
    PayloadTooLarge { chunks: usize, max: usize },

    /// A buffer with this stream handle is already being sent.
    #[error("stream handle {0} already in use")]
    DuplicateHandle(u32),

    /// Chunk or fragment index outside `0..total`.
    #[error("index {index} out of range (total {total})")]
    IndexOutOfRange { index: u32, total: u32 },

    /// Fragment was already added to the assembler.
    #[error("fragment {0} already received")]
    DuplicateFragment(u32),

    /// Fragment slice length does not match the assembler chunk size.
    #[error("fragment length {got} != chunk size {expected}")]
    FragmentSize { expected: usize, got: usize },

    /// Assembled buffer requested before every fragment arrived.
    #[error("buffer incomplete: {received}/{total} fragments")]
    Incomplete { received: u32, total: u32 },

    /// Pop or peek on an empty queue.
    #[error("queue empty")]
    QueueEmpty,

    /// Push on a full queue.
    #[error("queue full (capacity {0})")]
    QueueFull(usize),

    /// Resize must grow the queue.
    #[error("invalid resize: {new} <= {current}")]
    InvalidResize { current: usize, new: usize },

    /// Packet ended before a field could be read.
    #[error("truncated packet: need {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// First byte is not a known message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    /// Packet parsed but its contents are inconsistent.
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
}
