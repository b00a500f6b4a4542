//! Lossless end-to-end streaming.

mod common;

use common::{payload, Harness};
use kaos_stream::{StreamConfig, StreamHandle};
use kaos_test_support::{DataVerifier, VerifyResult};
use std::time::Duration;

const ONE_WAY: Duration = Duration::from_millis(100);
const LIMIT: Duration = Duration::from_secs(30);

fn round_trip(len: usize) {
    let config = StreamConfig::default();
    let mut h = Harness::lossless(config, ONE_WAY);
    let data = payload(len, 3);
    let handle = h.sender.begin_stream(&data).unwrap();

    assert!(h.run_until(LIMIT, |h| h.all_done(1)), "len {} did not finish", len);
    assert_eq!(h.received, vec![(handle, data)]);
    assert_eq!(h.delivered, vec![handle]);
    assert_eq!(h.sender.streamer().ack_stats().lost, 0);
    assert_eq!(h.sender.streamer().ack_stats().expired, 0);
}

#[test]
fn test_smaller_than_one_chunk() {
    round_trip(10);
}

#[test]
fn test_exactly_one_chunk() {
    // The 4-byte length prefix shares the chunk.
    let chunk = StreamConfig::default().chunk_size();
    round_trip(chunk - 4);
}

#[test]
fn test_many_chunks_with_remainder() {
    let chunk = StreamConfig::default().chunk_size();
    round_trip(5 * chunk + 17);
}

#[test]
fn test_large_buffer() {
    round_trip(1024 * 1024 + 3);
}

#[test]
fn test_many_small_buffers_in_order() {
    let mut h = Harness::lossless(StreamConfig::default(), ONE_WAY);
    let mut verifier = DataVerifier::new();
    for i in 0..50u8 {
        let data = payload(1 + i as usize * 37, i);
        let handle = h.sender.begin_stream(&data).unwrap();
        verifier.expect(handle.get(), &data);
    }

    assert!(h.run_until(LIMIT, |h| h.all_done(50)));
    for (handle, data) in &h.received {
        assert_eq!(verifier.verify(handle.get(), data), VerifyResult::Ok);
    }
    assert!(verifier.is_complete());

    let expected: Vec<StreamHandle> = (1..=50).map(StreamHandle).collect();
    let mut delivered = h.delivered.clone();
    delivered.sort();
    assert_eq!(delivered, expected);
}

#[test]
fn test_both_directions() {
    let mut h = Harness::lossless(StreamConfig::default(), ONE_WAY);
    let ab = payload(20_000, 1);
    let ba = payload(7_000, 2);
    h.sender.begin_stream(&ab).unwrap();
    h.receiver.begin_stream(&ba).unwrap();

    assert!(h.run_until(LIMIT, |h| h.all_done(1) && h.reverse_delivered.len() == 1));
    assert_eq!(h.received, vec![(StreamHandle(1), ab)]);
    assert_eq!(h.reverse_received, vec![(StreamHandle(1), ba)]);
    assert!(h.receiver.streamer().is_idle());
}
