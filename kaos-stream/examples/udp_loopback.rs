//! Stream a buffer between two UDP sockets on localhost.
//!
//! Run: cargo run -p kaos-stream --example udp_loopback --features tracing
//! Log level: RUST_LOG=kaos_stream=debug

use kaos_stream::{StreamConfig, StreamConnection, StreamEvent, UdpTransport};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const PAYLOAD_SIZE: usize = 8 * 1024 * 1024;
const FRAME: Duration = Duration::from_millis(1);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("Stream over UDP loopback");
    println!("========================");

    let any: SocketAddr = "127.0.0.1:0".parse()?;
    let mut a = UdpTransport::bind(any, any)?;
    let mut b = UdpTransport::bind(any, any)?;
    a.set_peer(b.local_addr()?);
    b.set_peer(a.local_addr()?);
    // Loopback RTT is negligible; use a nominal value for expiry.
    a.set_rtt(Some(Duration::from_millis(5)));
    b.set_rtt(Some(Duration::from_millis(5)));
    println!("sender   {}", a.local_addr()?);
    println!("receiver {}", b.local_addr()?);

    let config = StreamConfig::default();
    let mut sender = StreamConnection::new(config.clone(), a)?;
    let mut receiver = StreamConnection::new(config, b)?;

    let payload: Vec<u8> = (0..PAYLOAD_SIZE).map(|i| (i % 251) as u8).collect();
    let handle = sender.begin_stream(&payload)?;
    println!("streaming {} ({} bytes)", handle, payload.len());

    let start = Instant::now();
    let mut buf = vec![0u8; 65536];
    let mut received = None;
    let mut acknowledged = false;
    while received.is_none() || !acknowledged {
        if start.elapsed() > Duration::from_secs(30) {
            return Err("transfer timed out".into());
        }

        sender.tick(FRAME);
        receiver.tick(FRAME);

        while let Some(len) = receiver.transport().recv_into(&mut buf)? {
            receiver.handle_packet(&buf[..len])?;
        }
        while let Some(len) = sender.transport().recv_into(&mut buf)? {
            sender.handle_packet(&buf[..len])?;
        }

        while let Some(event) = receiver.poll_event() {
            if let StreamEvent::Received { handle, payload } = event {
                println!("received {} ({} bytes)", handle, payload.len());
                received = Some(payload);
            }
        }
        while let Some(event) = sender.poll_event() {
            if let StreamEvent::Delivered(handle) = event {
                println!("acknowledged {}", handle);
                acknowledged = true;
            }
        }

        std::thread::sleep(FRAME);
    }

    let elapsed = start.elapsed();
    if received.as_deref() != Some(payload.as_slice()) {
        return Err("payload mismatch".into());
    }
    let stats = sender.streamer().ack_stats();
    println!();
    println!(
        "{} bytes in {:.2?} ({:.1} MB/s), {} packets lost, {} expired",
        payload.len(),
        elapsed,
        payload.len() as f64 / elapsed.as_secs_f64() / 1_000_000.0,
        stats.lost,
        stats.expired
    );
    Ok(())
}
