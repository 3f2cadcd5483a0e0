use std::{default::Default, time::Duration};

use crate::constants::DEFAULT_MTU;

/// Configuration options to tune protocol and client behavior.
///
/// The interval values are configuration, not contract: the protocol only
/// requires `ack_interval < retransmit_interval < timeout_interval`.
#[derive(Clone, Debug)]
pub struct Config {
    /// UDP port the switcher listens on.
    pub device_port: u16,
    /// How long acks are coalesced before an ack-only datagram is emitted.
    pub ack_interval: Duration,
    /// How long an unacked outbound packet waits before it is re-sent.
    pub retransmit_interval: Duration,
    /// Max idle time before the session is considered dead and re-handshaken.
    pub timeout_interval: Duration,
    /// Width of the ack coverage window in packet ids. An incoming ack for id
    /// `a` covers every in-flight id `i` with `(a - i) mod 2^15` below this.
    pub ack_window: u16,
    /// Max reliable packets in flight before outbound packing stalls.
    pub max_packets_in_flight: u16,
    /// Max total datagram size in bytes, header included.
    pub mtu: u16,
    /// Socket receive buffer size in bytes (None = use system default).
    /// Corresponds to SO_RCVBUF; sized for bursts of status commands.
    pub socket_recv_buffer_size: Option<usize>,
    /// Socket send buffer size in bytes (None = use system default).
    pub socket_send_buffer_size: Option<usize>,
    /// Time-to-live for outgoing packets (None = use system default).
    pub socket_ttl: Option<u32>,
    /// Read timeout on the receive socket. Bounds how long shutdown waits
    /// for the receive thread to notice the stop flag.
    pub socket_read_timeout: Duration,
    /// How long the send worker parks when it finds no pending work.
    pub send_idle_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_port: crate::constants::DEVICE_PORT,
            ack_interval: Duration::from_millis(10),
            retransmit_interval: Duration::from_millis(40),
            timeout_interval: Duration::from_secs(5),
            ack_window: 1 << 14, // half the 15-bit id space
            max_packets_in_flight: 512,
            mtu: DEFAULT_MTU,
            socket_recv_buffer_size: Some(75 * 1024),
            socket_send_buffer_size: None,
            socket_ttl: None,
            socket_read_timeout: Duration::from_millis(250),
            send_idle_backoff: Duration::from_micros(500),
        }
    }
}
