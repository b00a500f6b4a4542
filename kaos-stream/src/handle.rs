use std::fmt;

/// Identifier of one streamed buffer.
///
/// Assigned per connection in increasing order starting at 1; the receiver
/// delivers completed buffers in handle order. Wraparound is not handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamHandle(pub u32);

impl StreamHandle {
    pub const FIRST: StreamHandle = StreamHandle(1);

    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn next(self) -> StreamHandle {
        StreamHandle(self.0 + 1)
    }
}

impl From<u32> for StreamHandle {
    fn from(value: u32) -> Self {
        StreamHandle(value)
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
