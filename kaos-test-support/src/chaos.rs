//! Seeded datagram chaos: duplication, reordering and jitter.
//!
//! Datagrams are never corrupted or truncated here; the stream protocol
//! assumes the transport delivers intact packets or nothing.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// What happens to one datagram besides normal delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChaosEvent {
    Pass,
    /// Deliver twice
    Duplicate,
    /// Hold back so later packets overtake it
    Reorder { hold: Duration },
    /// Extra latency
    Delay(Duration),
}

pub struct ChaosMonkey {
    duplicate_probability: f64,
    reorder_probability: f64,
    reorder_hold: Duration,
    delay_probability: f64,
    max_delay: Duration,
    rng: StdRng,
    events_triggered: usize,
}

impl ChaosMonkey {
    pub fn new(seed: u64) -> Self {
        Self {
            duplicate_probability: 0.0,
            reorder_probability: 0.0,
            reorder_hold: Duration::from_millis(30),
            delay_probability: 0.0,
            max_delay: Duration::from_millis(10),
            rng: StdRng::seed_from_u64(seed),
            events_triggered: 0,
        }
    }

    /// Some of everything.
    pub fn mild(seed: u64) -> Self {
        Self::new(seed)
            .with_duplicate_probability(0.05)
            .with_reorder_probability(0.05)
            .with_delay_probability(0.05)
    }

    pub fn with_duplicate_probability(mut self, prob: f64) -> Self {
        self.duplicate_probability = prob.clamp(0.0, 1.0);
        self
    }

    pub fn with_reorder_probability(mut self, prob: f64) -> Self {
        self.reorder_probability = prob.clamp(0.0, 1.0);
        self
    }

    pub fn with_reorder_hold(mut self, hold: Duration) -> Self {
        self.reorder_hold = hold;
        self
    }

    pub fn with_delay_probability(mut self, prob: f64) -> Self {
        self.delay_probability = prob.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_delay(mut self, max: Duration) -> Self {
        self.max_delay = max;
        self
    }

    /// Pick the event for the next datagram.
    pub fn decide(&mut self) -> ChaosEvent {
        let roll = self.rng.gen::<f64>();
        let mut threshold = 0.0;

        threshold += self.duplicate_probability;
        if roll < threshold {
            self.events_triggered += 1;
            return ChaosEvent::Duplicate;
        }

        threshold += self.reorder_probability;
        if roll < threshold {
            self.events_triggered += 1;
            return ChaosEvent::Reorder {
                hold: self.reorder_hold,
            };
        }

        threshold += self.delay_probability;
        if roll < threshold {
            self.events_triggered += 1;
            let micros = self.max_delay.as_micros() as u64;
            return ChaosEvent::Delay(Duration::from_micros(self.rng.gen_range(0..=micros)));
        }

        ChaosEvent::Pass
    }

    pub fn events_triggered(&self) -> usize {
        self.events_triggered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_chaos_by_default() {
        let mut monkey = ChaosMonkey::new(1);
        for _ in 0..1000 {
            assert_eq!(monkey.decide(), ChaosEvent::Pass);
        }
        assert_eq!(monkey.events_triggered(), 0);
    }

    #[test]
    fn test_always_duplicate() {
        let mut monkey = ChaosMonkey::new(1).with_duplicate_probability(1.0);
        assert_eq!(monkey.decide(), ChaosEvent::Duplicate);
    }

    #[test]
    fn test_always_reorder() {
        let hold = Duration::from_millis(5);
        let mut monkey = ChaosMonkey::new(1)
            .with_reorder_probability(1.0)
            .with_reorder_hold(hold);
        assert_eq!(monkey.decide(), ChaosEvent::Reorder { hold });
    }

    #[test]
    fn test_delay_bounded() {
        let max = Duration::from_millis(3);
        let mut monkey = ChaosMonkey::new(9)
            .with_delay_probability(1.0)
            .with_max_delay(max);
        for _ in 0..100 {
            match monkey.decide() {
                ChaosEvent::Delay(d) => assert!(d <= max),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_mild_is_reproducible() {
        let mut a = ChaosMonkey::mild(3);
        let mut b = ChaosMonkey::mild(3);
        let run_a: Vec<_> = (0..200).map(|_| a.decide()).collect();
        let run_b: Vec<_> = (0..200).map(|_| b.decide()).collect();
        assert_eq!(run_a, run_b);
        assert!(a.events_triggered() > 0);
    }
}
