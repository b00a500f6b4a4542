//! One end of a streaming connection.
//!
//! ```rust,ignore
//! let mut conn = StreamConnection::new(StreamConfig::default(), transport)?;
//! let handle = conn.begin_stream(&payload)?;
//! loop {
//!     conn.tick(dt);
//!     for packet in incoming() {
//!         conn.handle_packet(&packet)?;
//!     }
//!     while let Some(event) = conn.poll_event() {
//!         // StreamEvent::Delivered / StreamEvent::Received
//!     }
//! }
//! ```

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::handle::StreamHandle;
use crate::header::{decode_ack_packet, frame_payload, MessageType};
use crate::pending::PendingBuffer;
use crate::receiver::Receiver;
use crate::streamer::{Streamer, TickStats};
use crate::transport::{PacketSink, RttProvider};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Every chunk of a buffer we sent was acknowledged.
    Delivered(StreamHandle),
    /// The peer's buffer arrived completely, in stream order.
    Received {
        handle: StreamHandle,
        payload: Vec<u8>,
    },
}

pub struct StreamConnection<T> {
    transport: T,
    streamer: Streamer,
    receiver: Receiver,
    next_handle: StreamHandle,
    events: VecDeque<StreamEvent>,
}

impl<T: PacketSink + RttProvider> StreamConnection<T> {
    pub fn new(config: StreamConfig, transport: T) -> Result<Self> {
        let receiver = Receiver::new(config.chunk_size())?;
        let streamer = Streamer::new(config)?;
        Ok(Self {
            transport,
            streamer,
            receiver,
            next_handle: StreamHandle::FIRST,
            events: VecDeque::new(),
        })
    }

    /// Start streaming `payload` to the peer.
    ///
    /// The payload is framed with its length and split into chunks; the
    /// peer receives exactly `payload` back.
    pub fn begin_stream(&mut self, payload: &[u8]) -> Result<StreamHandle> {
        if payload.is_empty() {
            return Err(StreamError::EmptyPayload);
        }
        let handle = self.next_handle;
        let buffer = PendingBuffer::new(frame_payload(payload), self.streamer.chunk_size())?
            .with_handle(handle);
        self.streamer.begin(buffer)?;
        self.next_handle = handle.next();
        Ok(handle)
    }

    /// Advance both directions by `dt`: resend, send and ack.
    pub fn tick(&mut self, dt: Duration) -> TickStats {
        let rtt = self.transport.smoothed_rtt();
        let stats = self.streamer.tick(dt, rtt, &mut self.transport);
        self.receiver.tick(&mut self.transport);
        self.collect_events();
        stats
    }

    /// Route a packet from the peer by its message type.
    pub fn handle_packet(&mut self, packet: &[u8]) -> Result<()> {
        let Some(&kind) = packet.first() else {
            return Err(StreamError::Truncated {
                needed: 1,
                remaining: 0,
            });
        };
        match MessageType::try_from(kind)? {
            MessageType::Chunk => self.receiver.handle_chunk_packet(packet)?,
            MessageType::Ack => {
                let ack = decode_ack_packet(packet)?;
                self.streamer.handle_ack(&ack)?;
            }
        }
        self.collect_events();
        Ok(())
    }

    fn collect_events(&mut self) {
        while let Some(handle) = self.streamer.poll_delivered() {
            self.events.push_back(StreamEvent::Delivered(handle));
        }
        while let Some((handle, payload)) = self.receiver.poll_received() {
            self.events.push_back(StreamEvent::Received { handle, payload });
        }
    }

    pub fn poll_event(&mut self) -> Option<StreamEvent> {
        self.events.pop_front()
    }
}

impl<T> StreamConnection<T> {
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn streamer(&self) -> &Streamer {
        &self.streamer
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// Handle the next `begin_stream` will assign.
    pub fn next_handle(&self) -> StreamHandle {
        self.next_handle
    }

    /// All sent buffers acknowledged.
    pub fn is_idle(&self) -> bool {
        self.streamer.is_idle()
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

impl<T> std::fmt::Debug for StreamConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("streamer", &self.streamer)
            .field("receiver", &self.receiver)
            .field("next_handle", &self.next_handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Outbox plus fixed RTT.
    #[derive(Default)]
    struct Wire {
        outbox: Vec<Vec<u8>>,
        rtt: Option<Duration>,
    }

    impl PacketSink for Wire {
        fn send_packet(&mut self, packet: &[u8]) -> std::io::Result<()> {
            self.outbox.push(packet.to_vec());
            Ok(())
        }
    }

    impl RttProvider for Wire {
        fn smoothed_rtt(&self) -> Option<Duration> {
            self.rtt
        }
    }

    fn pair() -> (StreamConnection<Wire>, StreamConnection<Wire>) {
        let config = StreamConfig::default().with_max_packet_size(200);
        let a = StreamConnection::new(config.clone(), Wire::default()).unwrap();
        let b = StreamConnection::new(config, Wire::default()).unwrap();
        (a, b)
    }

    /// Move everything `from` sent into `to`.
    fn pump(from: &mut StreamConnection<Wire>, to: &mut StreamConnection<Wire>) {
        let packets = std::mem::take(&mut from.transport_mut().outbox);
        for packet in packets {
            to.handle_packet(&packet).unwrap();
        }
    }

    #[test]
    fn test_handles_start_at_one() {
        let (mut a, _) = pair();
        assert_eq!(a.begin_stream(b"x").unwrap(), StreamHandle(1));
        assert_eq!(a.begin_stream(b"y").unwrap(), StreamHandle(2));
        assert_eq!(a.next_handle(), StreamHandle(3));
        assert!(matches!(a.begin_stream(b""), Err(StreamError::EmptyPayload)));
        assert_eq!(a.next_handle(), StreamHandle(3));
    }

    #[test]
    fn test_round_trip_both_events() {
        let (mut a, mut b) = pair();
        let payload: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
        let handle = a.begin_stream(&payload).unwrap();

        let mut received = None;
        let mut delivered = false;
        for _ in 0..100 {
            a.tick(Duration::from_millis(10));
            pump(&mut a, &mut b);
            b.tick(Duration::from_millis(10));
            pump(&mut b, &mut a);

            while let Some(event) = b.poll_event() {
                if let StreamEvent::Received { handle: h, payload } = event {
                    assert_eq!(h, handle);
                    received = Some(payload);
                }
            }
            while let Some(event) = a.poll_event() {
                assert_eq!(event, StreamEvent::Delivered(handle));
                delivered = true;
            }
            if delivered {
                break;
            }
        }
        assert!(delivered);
        assert_eq!(received.as_deref(), Some(&payload[..]));
        assert!(a.is_idle());
    }

    #[test]
    fn test_rejects_garbage() {
        let (mut a, _) = pair();
        assert!(matches!(
            a.handle_packet(&[]),
            Err(StreamError::Truncated { .. })
        ));
        assert!(matches!(
            a.handle_packet(&[7, 1, 2]),
            Err(StreamError::UnknownMessageType(7))
        ));
        assert!(a.handle_packet(&[MessageType::Ack as u8, 1]).is_err());
    }
}
