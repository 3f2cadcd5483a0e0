//! UDP transport toward the switcher.

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
};

use socket2::Socket as Socket2;
use switchwire_core::{config::Config, transport::Socket};

/// Applies socket options from configuration to a UdpSocket.
fn apply_socket_options(socket: &UdpSocket, config: &Config) -> io::Result<()> {
    let socket2 = Socket2::from(socket.try_clone()?);

    if let Some(size) = config.socket_recv_buffer_size {
        socket2.set_recv_buffer_size(size)?;
    }

    if let Some(size) = config.socket_send_buffer_size {
        socket2.set_send_buffer_size(size)?;
    }

    if let Some(ttl) = config.socket_ttl {
        socket.set_ttl(ttl)?;
    }

    Ok(())
}

/// A UDP socket bound to an ephemeral local port and connected to the
/// switcher, so the OS filters datagrams from other sources.
///
/// Reads carry a timeout so the receive worker can notice shutdown without
/// a datagram arriving.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds an ephemeral local port and connects it to `remote`.
    pub fn connect(remote: SocketAddr, config: &Config) -> io::Result<Self> {
        let bind_addr: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)?;
        apply_socket_options(&socket, config)?;
        socket.connect(remote)?;
        socket.set_read_timeout(Some(config.socket_read_timeout))?;
        Ok(Self { socket })
    }

    /// The peer this transport is connected to.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }
}

impl Socket for UdpTransport {
    fn send_packet(&self, payload: &[u8]) -> io::Result<usize> {
        self.socket.send(payload)
    }

    fn receive_packet<'a>(&self, buffer: &'a mut [u8]) -> io::Result<&'a [u8]> {
        self.socket.recv(buffer).map(move |len| &buffer[..len])
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
