//! # kaos-test-support
//!
//! Deterministic network simulation for kaos-stream tests.
//!
//! - [`loss`]: seeded packet loss patterns
//! - [`chaos`]: seeded duplication, reordering and jitter
//! - [`link`]: one-way link with delay on a virtual clock
//! - [`verify`]: CRC32-based delivery and ordering checks

pub mod chaos;
pub mod link;
pub mod loss;
pub mod verify;

pub use chaos::{ChaosEvent, ChaosMonkey};
pub use link::{LinkStats, SimLink};
pub use loss::{LossGenerator, LossPattern, LossStats};
pub use verify::{content_hash, DataVerifier, VerifyResult, VerifyStats};
