//! UDP socket adapter.
//!
//! Non-blocking socket bound to one peer. RTT is not measured here; whoever
//! owns the connection feeds it in with `set_rtt`.

use crate::transport::{PacketSink, RttProvider};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Socket buffer size (8MB for bursts of chunk packets)
const SOCKET_BUFFER_SIZE: usize = 8 * 1024 * 1024;
/// Largest datagram `poll_with` can receive
const RECV_BUFFER_SIZE: usize = 65536;

pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    rtt: Option<Duration>,
    recv_buf: Box<[u8]>,
}

impl UdpTransport {
    pub fn bind(local: SocketAddr, peer: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(local), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_send_buffer_size(SOCKET_BUFFER_SIZE)?;
        socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE)?;
        socket.bind(&local.into())?;

        let socket: UdpSocket = socket.into();
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            peer,
            rtt: None,
            recv_buf: vec![0u8; RECV_BUFFER_SIZE].into_boxed_slice(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Point at a different peer (e.g. once its ephemeral port is known).
    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = peer;
    }

    pub fn set_rtt(&mut self, rtt: Option<Duration>) {
        self.rtt = rtt;
    }

    /// Receive one datagram from the peer into `buf`. `None` when drained.
    ///
    /// Datagrams from other addresses are dropped.
    pub fn recv_into(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        loop {
            match self.socket.recv_from(buf) {
                Ok((len, from)) if from == self.peer => return Ok(Some(len)),
                Ok(_) => continue,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }

    /// Drain pending datagrams from the peer into `f`. Returns how many.
    pub fn poll_with<F: FnMut(&[u8])>(&mut self, mut f: F) -> io::Result<usize> {
        let mut count = 0;
        loop {
            match self.socket.recv_from(&mut self.recv_buf) {
                Ok((len, from)) if from == self.peer => {
                    f(&self.recv_buf[..len]);
                    count += 1;
                }
                Ok(_) => {}
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(count),
                Err(e) => return Err(e),
            }
        }
    }
}

impl PacketSink for UdpTransport {
    fn send_packet(&mut self, packet: &[u8]) -> io::Result<()> {
        self.socket.send_to(packet, self.peer)?;
        Ok(())
    }
}

impl RttProvider for UdpTransport {
    fn smoothed_rtt(&self) -> Option<Duration> {
        self.rtt
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local", &self.socket.local_addr().ok())
            .field("peer", &self.peer)
            .field("rtt", &self.rtt)
            .finish()
    }
}
