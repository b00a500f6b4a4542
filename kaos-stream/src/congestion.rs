//! Congestion control (slow start / congestion avoidance).
//!
//! Window accounting is in bytes. The window grows by one unit (`W0`, the
//! initial window) per acknowledged packet while in slow start, and by one
//! unit per RTT in congestion avoidance. A loss halves the threshold and
//! restarts slow start from `W0`.
//!
//! Packets sent before the last reset are fenced off: their acks and losses
//! no longer move the window, so one burst of loss causes a single reset.

use crate::config::StreamConfig;
use crate::handle::StreamHandle;
use crate::pending::PendingBuffer;
use crate::window::SendWindow;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionState {
    SlowStart,
    CongestionAvoidance,
}

/// Byte-based congestion controller
#[derive(Debug, Clone)]
pub struct CongestionController {
    window: usize,
    initial_window: usize,
    max_window: usize,
    ssthresh: usize,
    state: CongestionState,
    bytes_in_flight: usize,
    /// Time left until the next additive increase
    increase_timer: Duration,
    /// Oldest packet sequence still allowed to move the window
    min_valid_sequence: u32,
}

impl CongestionController {
    pub fn new(initial_window: usize, max_window: usize, ssthresh: usize) -> Self {
        Self {
            window: initial_window,
            initial_window,
            max_window,
            ssthresh,
            state: CongestionState::SlowStart,
            bytes_in_flight: 0,
            increase_timer: Duration::ZERO,
            min_valid_sequence: 0,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(
            config.initial_window,
            config.max_window,
            config.initial_ssthresh,
        )
    }

    #[inline]
    pub fn window(&self) -> usize {
        self.window
    }

    #[inline]
    pub fn initial_window(&self) -> usize {
        self.initial_window
    }

    #[inline]
    pub fn ssthresh(&self) -> usize {
        self.ssthresh
    }

    #[inline]
    pub fn state(&self) -> CongestionState {
        self.state
    }

    #[inline]
    pub fn bytes_in_flight(&self) -> usize {
        self.bytes_in_flight
    }

    #[inline]
    pub fn min_valid_sequence(&self) -> u32 {
        self.min_valid_sequence
    }

    /// Bytes that may still be put on the wire.
    #[inline]
    pub fn sendable_bytes(&self) -> usize {
        self.window.saturating_sub(self.bytes_in_flight)
    }

    #[inline]
    pub fn on_send(&mut self, size: usize) {
        self.bytes_in_flight += size;
    }

    /// An envelope left the send window (acked, lost or expired).
    #[inline]
    pub fn on_resolved(&mut self, size: usize) {
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(size);
    }

    fn grow(&mut self) {
        self.window = (self.window + self.initial_window).min(self.max_window);
    }

    /// Additive increase, once per RTT in congestion avoidance.
    pub fn on_tick(&mut self, dt: Duration, rtt: Option<Duration>) {
        self.increase_timer = self.increase_timer.saturating_sub(dt);
        if !self.increase_timer.is_zero() || self.state != CongestionState::CongestionAvoidance {
            return;
        }
        let Some(rtt) = rtt.filter(|r| !r.is_zero()) else {
            return;
        };
        self.grow();
        self.increase_timer = rtt;
        trace_trace!("[CWND] additive increase to {}", self.window);
    }

    /// Packet `sequence` was acknowledged.
    pub fn on_delivered(&mut self, sequence: u32, rtt: Option<Duration>) {
        if self.state != CongestionState::SlowStart || sequence < self.min_valid_sequence {
            return;
        }
        self.grow();
        if self.window >= self.ssthresh {
            self.state = CongestionState::CongestionAvoidance;
            self.increase_timer = rtt.unwrap_or(Duration::ZERO);
            trace_debug!(
                "[CWND] window {} reached ssthresh {}, congestion avoidance",
                self.window,
                self.ssthresh
            );
        }
    }

    /// Packet `sequence` was lost. `next_sequence` is the sequence the next
    /// packet will carry; everything below it is fenced off.
    ///
    /// Returns true if the window was reset.
    pub fn on_lost(&mut self, sequence: u32, next_sequence: u32) -> bool {
        if sequence < self.min_valid_sequence {
            return false;
        }
        self.ssthresh = self.window / 2;
        self.window = self.initial_window;
        self.state = CongestionState::SlowStart;
        self.min_valid_sequence = next_sequence;
        trace_debug!(
            "[CWND] loss of {}, ssthresh {} window {}",
            sequence,
            self.ssthresh,
            self.window
        );
        true
    }
}

/// Sender-side state of one connection: congestion control, outstanding
/// packets and the buffers being streamed.
#[derive(Debug)]
pub struct ConnectionStreamStatus {
    pub congestion: CongestionController,
    pub send_window: SendWindow,
    /// Active buffers in the order their streams were started
    pub pending: BTreeMap<StreamHandle, PendingBuffer>,
}

impl ConnectionStreamStatus {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            congestion: CongestionController::from_config(config),
            send_window: SendWindow::with_capacity(config.send_window_capacity),
            pending: BTreeMap::new(),
        }
    }

    /// Nothing left to send or to wait for.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.send_window.is_empty()
    }
}
