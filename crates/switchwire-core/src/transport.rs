//! Transport abstraction for pluggable I/O.

use std::{io::Result, net::SocketAddr};

/// Low-level datagram socket abstraction toward a single connected peer.
///
/// This trait allows various transports (UDP, in-memory test harness, etc.)
/// to be plugged into the connection engine without coupling to a concrete
/// implementation. Methods take `&self` so the same transport can be shared
/// between the receive and send workers.
pub trait Socket: Send + Sync {
    /// Sends a single datagram to the connected peer.
    fn send_packet(&self, payload: &[u8]) -> Result<usize>;

    /// Receives a single datagram from the peer into `buffer`.
    fn receive_packet<'a>(&self, buffer: &'a mut [u8]) -> Result<&'a [u8]>;

    /// Returns the local address this socket is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;
}
