//! Streaming over lossy links.

mod common;

use common::{payload, Harness};
use kaos_stream::{StreamConfig, StreamHandle};
use kaos_test_support::{DataVerifier, LossGenerator, SimLink, VerifyResult};
use std::time::Duration;

const ONE_WAY: Duration = Duration::from_millis(100);
const LIMIT: Duration = Duration::from_secs(600);

fn lossy(forward: LossGenerator, backward: LossGenerator) -> Harness {
    Harness::new(
        StreamConfig::default(),
        SimLink::new(ONE_WAY).with_loss(forward),
        SimLink::new(ONE_WAY).with_loss(backward),
    )
}

/// Stream `sizes`, run to completion and check every buffer arrived once,
/// intact and in order, and was acknowledged once.
fn stream_all(h: &mut Harness, sizes: &[usize]) {
    let mut verifier = DataVerifier::new();
    for (i, &len) in sizes.iter().enumerate() {
        let data = payload(len, i as u8);
        let handle = h.sender.begin_stream(&data).unwrap();
        verifier.expect(handle.get(), &data);
    }

    assert!(
        h.run_until(LIMIT, |h| h.all_done(sizes.len())),
        "missing {:?}",
        verifier.missing()
    );
    for (handle, data) in &h.received {
        assert_eq!(verifier.verify(handle.get(), data), VerifyResult::Ok);
    }
    assert!(verifier.is_complete(), "{:?}", verifier.stats());

    let mut delivered = h.delivered.clone();
    delivered.sort();
    let expected: Vec<StreamHandle> = (1..=sizes.len() as u32).map(StreamHandle).collect();
    assert_eq!(delivered, expected);
}

#[test]
fn test_random_loss_both_directions() {
    let mut h = lossy(LossGenerator::random(0.1, 7), LossGenerator::random(0.1, 8));
    stream_all(&mut h, &[200_000]);

    assert!(h.forward.stats().dropped > 0);
    assert!(h.backward.stats().dropped > 0);
    let stats = h.sender.streamer().ack_stats();
    assert!(stats.lost + stats.expired > 0);
}

#[test]
fn test_many_buffers_under_loss() {
    let mut h = lossy(LossGenerator::random(0.15, 21), LossGenerator::random(0.05, 22));
    let sizes: Vec<usize> = (0..20).map(|i| 1 + i * 3_001).collect();
    stream_all(&mut h, &sizes);
}

#[test]
fn test_burst_loss_recovers() {
    let mut h = lossy(LossGenerator::burst(10, 25), LossGenerator::none());
    stream_all(&mut h, &[150_000]);
    assert_eq!(h.forward.stats().dropped, 25);
}

#[test]
fn test_every_ack_of_a_stretch_lost() {
    // Data keeps flowing while acks vanish; expiry resends it and the
    // receiver acknowledges the duplicates.
    let mut h = lossy(LossGenerator::none(), LossGenerator::burst(0, 8));
    stream_all(&mut h, &[40_000]);
    assert!(h.sender.streamer().ack_stats().expired > 0);
    let received = h.receiver.receiver().stats();
    assert!(received.stale_fragments + received.duplicate_fragments > 0);
}

#[test]
fn test_lost_last_chunk_only() {
    let chunk = StreamConfig::default().chunk_size();
    // Packet 1 alone, then 2 and 3 together; 3 is dropped.
    let mut h = lossy(LossGenerator::specific([2]), LossGenerator::none());
    stream_all(&mut h, &[3 * chunk - 4]);
    assert_eq!(h.sender.streamer().ack_stats().lost, 0);
    assert_eq!(h.sender.streamer().ack_stats().expired, 1);
}
