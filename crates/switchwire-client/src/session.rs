//! Per-session transport state.

use std::time::Instant;

use rand::Rng;
use switchwire_core::constants::{HANDSHAKE_MAGIC, PACKET_ID_MASK};
use switchwire_protocol::packet::{next_id, PacketFlags, PacketId, TransportHeader};

/// Fixed payload of the handshake datagram following the 12-byte header.
const HANDSHAKE_PAYLOAD: [u8; 8] = [0x01, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00];

/// Lifecycle of the connection toward the switcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Created, nothing sent yet.
    #[default]
    Fresh,
    /// Handshake sent, waiting for the session-setup reply.
    Handshaking,
    /// Session established; commands flow in both directions.
    Established,
    /// Peer silent past the timeout interval; a reconnect is under way.
    Timedout,
    /// Disposed; terminal.
    Closed,
}

impl ConnectionState {
    /// Returns true if the session is fully established.
    pub fn is_established(&self) -> bool {
        matches!(self, ConnectionState::Established)
    }
}

/// Mutable per-session identifiers and clocks.
#[derive(Debug)]
pub struct Session {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// 15-bit session id; ours until the peer imposes a different one.
    pub session_id: u16,
    /// True once the initial status dump has completed.
    pub init_complete: bool,
    /// Timestamp of the most recent datagram from the peer.
    pub last_recv: Instant,
    /// True if this client reached `Established` since the last
    /// user-visible disconnect; gates the disconnect signal.
    pub established_once: bool,
    next_pkt_id: PacketId,
}

impl Session {
    /// Creates a fresh session with a random 15-bit id.
    pub fn new(now: Instant) -> Self {
        Self {
            state: ConnectionState::Fresh,
            session_id: random_session_id(),
            init_complete: false,
            last_recv: now,
            established_once: false,
            next_pkt_id: 1,
        }
    }

    /// Rolls the session over for a reconnect: fresh random id, packet ids
    /// restarted, liveness clock rewound.
    pub fn rollover(&mut self, now: Instant) {
        self.session_id = random_session_id();
        self.init_complete = false;
        self.last_recv = now;
        self.next_pkt_id = 1;
    }

    /// Assigns the next outbound packet id.
    pub fn assign_pkt_id(&mut self) -> PacketId {
        let id = self.next_pkt_id;
        self.next_pkt_id = next_id(id);
        id
    }

    /// Builds the fixed 20-byte handshake datagram for this session.
    pub fn handshake_datagram(&self) -> Vec<u8> {
        let header = TransportHeader {
            flags: PacketFlags::INIT,
            length: 20,
            session_id: self.session_id,
            acked_pkt_id: 0,
            unknown_a: 0,
            unknown_b: HANDSHAKE_MAGIC,
            pkt_id: 0,
        };
        let mut datagram = header.to_bytes();
        datagram.extend_from_slice(&HANDSHAKE_PAYLOAD);
        datagram
    }
}

fn random_session_id() -> u16 {
    rand::rng().random::<u16>() & PACKET_ID_MASK
}
