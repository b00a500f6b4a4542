//! Deterministic packet loss.
//!
//! Every decision draws from a seeded `StdRng`, so a failing run can be
//! replayed exactly with the same seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Which packets to drop. Positions count packets offered to the
/// generator, starting at 0.
#[derive(Debug, Clone)]
pub enum LossPattern {
    None,
    /// Every Nth packet (the Nth, 2Nth, ...)
    Periodic { every_n: u64 },
    /// Each packet independently with probability `p`
    Random { probability: f64 },
    /// `length` consecutive packets from `start`
    Burst { start: u64, length: u64 },
    Specific { positions: HashSet<u64> },
    /// Dropped if any pattern drops it
    Combined(Vec<LossPattern>),
}

pub struct LossGenerator {
    pattern: LossPattern,
    rng: StdRng,
    offered: u64,
    dropped: u64,
}

impl LossGenerator {
    pub fn new(pattern: LossPattern, seed: u64) -> Self {
        Self {
            pattern,
            rng: StdRng::seed_from_u64(seed),
            offered: 0,
            dropped: 0,
        }
    }

    pub fn none() -> Self {
        Self::new(LossPattern::None, 0)
    }

    pub fn random(probability: f64, seed: u64) -> Self {
        Self::new(
            LossPattern::Random {
                probability: probability.clamp(0.0, 1.0),
            },
            seed,
        )
    }

    pub fn periodic(every_n: u64) -> Self {
        Self::new(LossPattern::Periodic { every_n }, 0)
    }

    pub fn burst(start: u64, length: u64) -> Self {
        Self::new(LossPattern::Burst { start, length }, 0)
    }

    pub fn specific(positions: impl IntoIterator<Item = u64>) -> Self {
        Self::new(
            LossPattern::Specific {
                positions: positions.into_iter().collect(),
            },
            0,
        )
    }

    /// Decide the fate of the next packet.
    pub fn should_drop(&mut self) -> bool {
        let position = self.offered;
        self.offered += 1;
        let drop = Self::matches(&self.pattern, position, &mut self.rng);
        if drop {
            self.dropped += 1;
        }
        drop
    }

    fn matches(pattern: &LossPattern, position: u64, rng: &mut StdRng) -> bool {
        match pattern {
            LossPattern::None => false,
            LossPattern::Periodic { every_n } => {
                *every_n > 0 && (position + 1) % every_n == 0
            }
            LossPattern::Random { probability } => rng.gen::<f64>() < *probability,
            LossPattern::Burst { start, length } => {
                position >= *start && position < start + length
            }
            LossPattern::Specific { positions } => positions.contains(&position),
            // Evaluate all so random sub-patterns consume the same draws
            // regardless of earlier matches.
            LossPattern::Combined(patterns) => patterns
                .iter()
                .map(|p| Self::matches(p, position, rng))
                .fold(false, |acc, m| acc | m),
        }
    }

    pub fn stats(&self) -> LossStats {
        LossStats {
            offered: self.offered,
            dropped: self.dropped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossStats {
    pub offered: u64,
    pub dropped: u64,
}
