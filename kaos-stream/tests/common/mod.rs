//! Two stream connections joined by simulated links on a virtual clock.

#![allow(dead_code)]

use kaos_stream::{PacketSink, RttProvider, StreamConfig, StreamConnection, StreamEvent, StreamHandle};
use kaos_test_support::SimLink;
use std::time::Duration;

/// Frame deltas cycled by `Harness::step_frame`, uneven on purpose.
pub const FRAME_DTS: [Duration; 6] = [
    Duration::from_millis(13),
    Duration::from_millis(4),
    Duration::from_millis(50),
    Duration::from_millis(20),
    Duration::from_millis(10),
    Duration::from_millis(2),
];

/// Outbox with a fixed RTT.
#[derive(Debug, Default)]
pub struct SimTransport {
    pub outbox: Vec<Vec<u8>>,
    pub rtt: Option<Duration>,
}

impl PacketSink for SimTransport {
    fn send_packet(&mut self, packet: &[u8]) -> std::io::Result<()> {
        self.outbox.push(packet.to_vec());
        Ok(())
    }
}

impl RttProvider for SimTransport {
    fn smoothed_rtt(&self) -> Option<Duration> {
        self.rtt
    }
}

pub struct Harness {
    pub sender: StreamConnection<SimTransport>,
    pub receiver: StreamConnection<SimTransport>,
    /// sender -> receiver
    pub forward: SimLink,
    /// receiver -> sender
    pub backward: SimLink,
    pub now: Duration,
    pub delivered: Vec<StreamHandle>,
    pub received: Vec<(StreamHandle, Vec<u8>)>,
    /// Streams begun on `receiver`, acknowledged back to it
    pub reverse_delivered: Vec<StreamHandle>,
    /// Streams begun on `receiver`, reassembled by `sender`
    pub reverse_received: Vec<(StreamHandle, Vec<u8>)>,
    frame: usize,
}

impl Harness {
    /// Both ends report the sum of the link delays as RTT.
    pub fn new(config: StreamConfig, forward: SimLink, backward: SimLink) -> Self {
        let rtt = Some(forward.delay() + backward.delay());
        let transport = || SimTransport {
            outbox: Vec::new(),
            rtt,
        };
        Self {
            sender: StreamConnection::new(config.clone(), transport()).unwrap(),
            receiver: StreamConnection::new(config, transport()).unwrap(),
            forward,
            backward,
            now: Duration::ZERO,
            delivered: Vec::new(),
            received: Vec::new(),
            reverse_delivered: Vec::new(),
            reverse_received: Vec::new(),
            frame: 0,
        }
    }

    pub fn lossless(config: StreamConfig, one_way: Duration) -> Self {
        Self::new(config, SimLink::new(one_way), SimLink::new(one_way))
    }

    /// One frame: both ends tick, then whatever has arrived is handled.
    pub fn step(&mut self, dt: Duration) {
        self.now += dt;

        self.sender.tick(dt);
        for packet in std::mem::take(&mut self.sender.transport_mut().outbox) {
            self.forward.push(&packet, self.now);
        }
        self.receiver.tick(dt);
        for packet in std::mem::take(&mut self.receiver.transport_mut().outbox) {
            self.backward.push(&packet, self.now);
        }

        for packet in self.forward.drain_arrived(self.now) {
            self.receiver.handle_packet(&packet).unwrap();
        }
        for packet in self.backward.drain_arrived(self.now) {
            self.sender.handle_packet(&packet).unwrap();
        }

        while let Some(event) = self.sender.poll_event() {
            match event {
                StreamEvent::Delivered(handle) => self.delivered.push(handle),
                StreamEvent::Received { handle, payload } => {
                    self.reverse_received.push((handle, payload))
                }
            }
        }
        while let Some(event) = self.receiver.poll_event() {
            match event {
                StreamEvent::Received { handle, payload } => self.received.push((handle, payload)),
                StreamEvent::Delivered(handle) => self.reverse_delivered.push(handle),
            }
        }
    }

    /// Step with the next frame delta.
    pub fn step_frame(&mut self) {
        let dt = FRAME_DTS[self.frame % FRAME_DTS.len()];
        self.frame += 1;
        self.step(dt);
    }

    /// Step frames until `done` or `limit` of simulated time has passed.
    pub fn run_until(&mut self, limit: Duration, mut done: impl FnMut(&Self) -> bool) -> bool {
        while self.now < limit {
            if done(self) {
                return true;
            }
            self.step_frame();
        }
        done(self)
    }

    /// Every started stream received and acknowledged.
    pub fn all_done(&self, streams: usize) -> bool {
        self.received.len() >= streams
            && self.delivered.len() >= streams
            && self.sender.streamer().is_idle()
    }
}

/// Deterministic payload of `len` bytes.
pub fn payload(len: usize, salt: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(2_654_435_761).rotate_left(salt as u32 % 32) as u8)
        .collect()
}
