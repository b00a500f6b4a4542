//! Stream tuning knobs.

use crate::error::{Result, StreamError};
use crate::header::{FragmentHeader, CHUNK_PACKET_OVERHEAD};
use std::time::Duration;

/// Per-connection streaming configuration.
///
/// `initial_window` is the congestion window unit: the window starts there,
/// grows by that much per acked packet in slow start and per RTT in
/// congestion avoidance, and is reset to it on loss.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Largest chunk packet the sender emits, headers included
    pub max_packet_size: usize,
    pub initial_window: usize,
    pub initial_ssthresh: usize,
    pub max_window: usize,
    /// Initial envelope ring capacity (grows on demand)
    pub send_window_capacity: usize,
    /// Packets sent per tick at most, `None` for unbounded
    pub max_packets_per_tick: Option<usize>,
    /// Envelope expiration while RTT is unknown
    pub fallback_rtt: Duration,
    /// Floor for RTT-derived expiration
    pub min_expiration: Duration,
    /// Preallocated packet buffers
    pub pool_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_packet_size: 1231,
            initial_window: 1231,
            initial_ssthresh: usize::MAX,
            max_window: 1024 * 1024,
            send_window_capacity: 1024,
            max_packets_per_tick: Some(512),
            fallback_rtt: Duration::from_millis(500),
            min_expiration: Duration::from_millis(100),
            pool_capacity: 64,
        }
    }
}

impl StreamConfig {
    /// Sets the packet size and moves the initial window along with it.
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self.initial_window = size;
        self
    }

    pub fn with_initial_window(mut self, window: usize) -> Self {
        self.initial_window = window;
        self
    }

    pub fn with_ssthresh(mut self, ssthresh: usize) -> Self {
        self.initial_ssthresh = ssthresh;
        self
    }

    pub fn with_max_window(mut self, max_window: usize) -> Self {
        self.max_window = max_window;
        self
    }

    pub fn with_send_window_capacity(mut self, capacity: usize) -> Self {
        self.send_window_capacity = capacity;
        self
    }

    pub fn with_max_packets_per_tick(mut self, cap: Option<usize>) -> Self {
        self.max_packets_per_tick = cap;
        self
    }

    pub fn with_fallback_rtt(mut self, rtt: Duration) -> Self {
        self.fallback_rtt = rtt;
        self
    }

    pub fn with_min_expiration(mut self, floor: Duration) -> Self {
        self.min_expiration = floor;
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Payload bytes per chunk: a single-fragment packet with the longest
    /// sequence encoding still fits `max_packet_size`.
    pub fn chunk_size(&self) -> usize {
        self.max_packet_size
            .saturating_sub(CHUNK_PACKET_OVERHEAD + FragmentHeader::SIZE)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size() == 0 {
            return Err(StreamError::Config(format!(
                "max_packet_size {} leaves no room for chunk bytes",
                self.max_packet_size
            )));
        }
        if self.initial_window < self.max_packet_size {
            return Err(StreamError::Config(format!(
                "initial_window {} < max_packet_size {}",
                self.initial_window, self.max_packet_size
            )));
        }
        if self.max_window < self.initial_window {
            return Err(StreamError::Config(format!(
                "max_window {} < initial_window {}",
                self.max_window, self.initial_window
            )));
        }
        if self.send_window_capacity == 0 || self.pool_capacity == 0 {
            return Err(StreamError::Config("capacities must be > 0".into()));
        }
        if self.max_packets_per_tick == Some(0) {
            return Err(StreamError::Config("max_packets_per_tick must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = StreamConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunk_size(), 1231 - 8 - 14);
        assert_eq!(config.initial_window, config.max_packet_size);
    }

    #[test]
    fn test_tiny_packet_rejected() {
        let config = StreamConfig::default().with_max_packet_size(22);
        assert_eq!(config.chunk_size(), 0);
        assert!(matches!(config.validate(), Err(StreamError::Config(_))));

        StreamConfig::default().with_max_packet_size(23).validate().unwrap();
    }

    #[test]
    fn test_window_bounds() {
        let small = StreamConfig::default().with_initial_window(100);
        assert!(small.validate().is_err());

        let capped = StreamConfig::default().with_max_window(1000);
        assert!(capped.validate().is_err());
    }

    #[test]
    fn test_zero_caps_rejected() {
        assert!(StreamConfig::default().with_pool_capacity(0).validate().is_err());
        assert!(StreamConfig::default()
            .with_send_window_capacity(0)
            .validate()
            .is_err());
        assert!(StreamConfig::default()
            .with_max_packets_per_tick(Some(0))
            .validate()
            .is_err());
        StreamConfig::default()
            .with_max_packets_per_tick(None)
            .validate()
            .unwrap();
    }
}
