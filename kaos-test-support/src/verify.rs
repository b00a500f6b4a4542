//! Delivery verification for streamed buffers.
//!
//! Register what was sent under its stream handle, feed in what arrived, and
//! the verifier reports content mismatches, duplicates and order violations.

use std::collections::{HashMap, HashSet};

/// CRC32 of a buffer.
pub fn content_hash(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Ok,
    Mismatch {
        handle: u32,
        expected: u32,
        actual: u32,
    },
    Duplicate,
    /// Arrived before a buffer registered earlier
    OutOfOrder { handle: u32, after: u32 },
    /// Never registered
    Unexpected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyStats {
    pub expected_count: u64,
    pub verified_count: u64,
    pub mismatches: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
    pub unexpected: u64,
}

impl VerifyStats {
    pub fn delivery_rate(&self) -> f64 {
        if self.expected_count > 0 {
            (self.verified_count as f64) / (self.expected_count as f64)
        } else {
            1.0
        }
    }
}

#[derive(Debug, Default)]
pub struct DataVerifier {
    expected: HashMap<u32, u32>,
    verified: HashSet<u32>,
    last_verified: Option<u32>,
    stats: VerifyStats,
}

impl DataVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the buffer sent as `handle`.
    pub fn expect(&mut self, handle: u32, data: &[u8]) {
        self.expected.insert(handle, content_hash(data));
        self.stats.expected_count = self.expected.len() as u64;
    }

    /// Check a received buffer. Handles must arrive in increasing order.
    pub fn verify(&mut self, handle: u32, data: &[u8]) -> VerifyResult {
        if !self.verified.insert(handle) {
            self.stats.duplicates += 1;
            return VerifyResult::Duplicate;
        }

        let Some(&expected) = self.expected.get(&handle) else {
            self.stats.unexpected += 1;
            return VerifyResult::Unexpected;
        };

        if let Some(last) = self.last_verified {
            if handle < last {
                self.stats.out_of_order += 1;
                return VerifyResult::OutOfOrder {
                    handle,
                    after: last,
                };
            }
        }
        self.last_verified = Some(handle);

        let actual = content_hash(data);
        if actual != expected {
            self.stats.mismatches += 1;
            return VerifyResult::Mismatch {
                handle,
                expected,
                actual,
            };
        }

        self.stats.verified_count += 1;
        VerifyResult::Ok
    }

    /// Registered handles not yet verified, ascending.
    pub fn missing(&self) -> Vec<u32> {
        let mut missing: Vec<u32> = self
            .expected
            .keys()
            .filter(|h| !self.verified.contains(*h))
            .copied()
            .collect();
        missing.sort_unstable();
        missing
    }

    pub fn stats(&self) -> VerifyStats {
        self.stats
    }

    pub fn has_errors(&self) -> bool {
        self.stats.mismatches > 0
            || self.stats.duplicates > 0
            || self.stats.out_of_order > 0
            || self.stats.unexpected > 0
    }

    /// Everything registered arrived intact, once, in order.
    pub fn is_complete(&self) -> bool {
        !self.has_errors() && self.stats.verified_count == self.stats.expected_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_ok() {
        let mut v = DataVerifier::new();
        v.expect(1, b"one");
        v.expect(2, b"two");
        assert_eq!(v.missing(), vec![1, 2]);

        assert_eq!(v.verify(1, b"one"), VerifyResult::Ok);
        assert!(!v.is_complete());
        assert_eq!(v.verify(2, b"two"), VerifyResult::Ok);
        assert!(v.is_complete());
        assert_eq!(v.stats().delivery_rate(), 1.0);
    }

    #[test]
    fn test_mismatch_detected() {
        let mut v = DataVerifier::new();
        v.expect(1, b"sent");
        assert!(matches!(v.verify(1, b"sens"), VerifyResult::Mismatch { handle: 1, .. }));
        assert!(v.has_errors());
    }

    #[test]
    fn test_duplicate_and_order() {
        let mut v = DataVerifier::new();
        for h in 1..=3 {
            v.expect(h, &[h as u8]);
        }
        assert_eq!(v.verify(2, &[2]), VerifyResult::Ok);
        assert_eq!(v.verify(2, &[2]), VerifyResult::Duplicate);
        assert_eq!(
            v.verify(1, &[1]),
            VerifyResult::OutOfOrder { handle: 1, after: 2 }
        );
        assert_eq!(v.verify(9, &[9]), VerifyResult::Unexpected);
        assert_eq!(v.stats().duplicates, 1);
        assert_eq!(v.stats().out_of_order, 1);
        assert_eq!(v.missing(), vec![3]);
    }

    #[test]
    fn test_hash_matches_crc32() {
        assert_eq!(content_hash(b"123456789"), 0xCBF4_3926);
    }
}
