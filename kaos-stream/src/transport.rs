//! Seams to the datagram transport underneath the stream layer.
//!
//! The stream layer never touches a socket: finished packets go out through a
//! `PacketSink`, and RTT comes from whoever measures it.

use std::io;
use std::time::Duration;

/// Hands finished packets to the transport.
pub trait PacketSink {
    /// Send one datagram. Failures are treated like loss by the caller.
    fn send_packet(&mut self, packet: &[u8]) -> io::Result<()>;
}

/// Smoothed round-trip estimate of the underlying connection.
pub trait RttProvider {
    /// `None` until a sample exists.
    fn smoothed_rtt(&self) -> Option<Duration>;
}

impl<S: PacketSink + ?Sized> PacketSink for &mut S {
    fn send_packet(&mut self, packet: &[u8]) -> io::Result<()> {
        (**self).send_packet(packet)
    }
}

impl<R: RttProvider + ?Sized> RttProvider for &R {
    fn smoothed_rtt(&self) -> Option<Duration> {
        (**self).smoothed_rtt()
    }
}

/// Collects packets in memory.
impl PacketSink for Vec<Vec<u8>> {
    fn send_packet(&mut self, packet: &[u8]) -> io::Result<()> {
        self.push(packet.to_vec());
        Ok(())
    }
}

/// Fixed RTT, mostly for tests and simulations.
impl RttProvider for Option<Duration> {
    fn smoothed_rtt(&self) -> Option<Duration> {
        *self
    }
}
