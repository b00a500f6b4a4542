//! One-way simulated datagram link on a virtual clock.
//!
//! Packets pushed at time `now` become available `delay` later, after loss
//! and chaos have had their say. Nothing here sleeps: the caller advances
//! the clock.

use crate::chaos::{ChaosEvent, ChaosMonkey};
use crate::loss::LossGenerator;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub pushed: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub reordered: u64,
    pub delayed: u64,
    pub delivered: u64,
}

pub struct SimLink {
    delay: Duration,
    loss: LossGenerator,
    chaos: Option<ChaosMonkey>,
    /// (arrival time, push order) keeps equal arrivals FIFO
    in_flight: BinaryHeap<Reverse<(Duration, u64, Vec<u8>)>>,
    order: u64,
    stats: LinkStats,
}

impl SimLink {
    /// Lossless link with a fixed one-way delay.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            loss: LossGenerator::none(),
            chaos: None,
            in_flight: BinaryHeap::new(),
            order: 0,
            stats: LinkStats::default(),
        }
    }

    pub fn with_loss(mut self, loss: LossGenerator) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_chaos(mut self, chaos: ChaosMonkey) -> Self {
        self.chaos = Some(chaos);
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn enqueue(&mut self, packet: Vec<u8>, arrival: Duration) {
        self.in_flight.push(Reverse((arrival, self.order, packet)));
        self.order += 1;
    }

    /// Send a datagram at time `now`.
    pub fn push(&mut self, packet: &[u8], now: Duration) {
        self.stats.pushed += 1;
        if self.loss.should_drop() {
            self.stats.dropped += 1;
            return;
        }

        let arrival = now + self.delay;
        let event = self
            .chaos
            .as_mut()
            .map_or(ChaosEvent::Pass, ChaosMonkey::decide);
        match event {
            ChaosEvent::Pass => self.enqueue(packet.to_vec(), arrival),
            ChaosEvent::Duplicate => {
                self.stats.duplicated += 1;
                self.enqueue(packet.to_vec(), arrival);
                self.enqueue(packet.to_vec(), arrival);
            }
            ChaosEvent::Reorder { hold } => {
                self.stats.reordered += 1;
                self.enqueue(packet.to_vec(), arrival + hold);
            }
            ChaosEvent::Delay(extra) => {
                self.stats.delayed += 1;
                self.enqueue(packet.to_vec(), arrival + extra);
            }
        }
    }

    /// Remove and return every packet that has arrived by `now`, in arrival order.
    pub fn drain_arrived(&mut self, now: Duration) -> Vec<Vec<u8>> {
        let mut arrived = Vec::new();
        while self
            .in_flight
            .peek()
            .is_some_and(|Reverse((at, _, _))| *at <= now)
        {
            if let Some(Reverse((_, _, packet))) = self.in_flight.pop() {
                arrived.push(packet);
            }
        }
        self.stats.delivered += arrived.len() as u64;
        arrived
    }

    /// Packets still travelling.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }
}
