//! Transport header layout and 15-bit packet-id arithmetic.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use switchwire_core::{
    constants::{PACKET_ID_MASK, PACKET_ID_MODULUS, TRANSPORT_HEADER_SIZE},
    error::{ErrorKind, Result},
};

/// 15-bit packet identifier type used by the protocol.
///
/// Stored in a `u16`; the top bit is never set. Comparison uses
/// signed-difference-modulo wraparound, see [`id_greater_than`].
pub type PacketId = u16;

/// Flag bits carried in the high 5 bits of the first header byte.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketFlags(u8);

impl PacketFlags {
    /// The peer is asked to acknowledge this packet.
    pub const ACK_REQUEST: PacketFlags = PacketFlags(0x01);
    /// Session setup: the sender proposes (or imposes) a session id.
    pub const INIT: PacketFlags = PacketFlags(0x02);
    /// This datagram is a re-send of an earlier packet id.
    pub const IS_RETRANSMIT: PacketFlags = PacketFlags(0x04);
    /// The sender asks for a retransmission of lost packets.
    pub const REQUEST_RETRANSMIT: PacketFlags = PacketFlags(0x08);
    /// `acked_pkt_id` is meaningful in this header.
    pub const ACK: PacketFlags = PacketFlags(0x10);

    /// All five defined flag bits.
    const ALL: u8 = 0x1F;

    /// Builds flags from the raw 5-bit field, discarding undefined bits.
    pub fn from_bits(bits: u8) -> Self {
        PacketFlags(bits & Self::ALL)
    }

    /// Returns the raw 5-bit field.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set in `self`.
    pub fn contains(self, other: PacketFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both flag sets.
    pub fn with(self, other: PacketFlags) -> Self {
        PacketFlags(self.0 | other.0)
    }

    /// Returns true if no flag is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for PacketFlags {
    type Output = PacketFlags;

    fn bitor(self, rhs: PacketFlags) -> PacketFlags {
        self.with(rhs)
    }
}

impl std::fmt::Debug for PacketFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::ACK_REQUEST) {
            names.push("ACK_REQUEST");
        }
        if self.contains(Self::INIT) {
            names.push("INIT");
        }
        if self.contains(Self::IS_RETRANSMIT) {
            names.push("IS_RETRANSMIT");
        }
        if self.contains(Self::REQUEST_RETRANSMIT) {
            names.push("REQUEST_RETRANSMIT");
        }
        if self.contains(Self::ACK) {
            names.push("ACK");
        }
        if names.is_empty() {
            write!(f, "(none)")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// The fixed 12-byte header at the start of every datagram.
///
/// Multi-byte fields are big-endian. `length` counts the entire datagram,
/// header included. `unknown_a` is observed as zero from clients;
/// `unknown_b` carries a magic value during the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportHeader {
    /// Flag bits, see [`PacketFlags`].
    pub flags: PacketFlags,
    /// Total datagram length in bytes, header included (11-bit field).
    pub length: u16,
    /// 15-bit session identifier.
    pub session_id: u16,
    /// Packet id acknowledged by this datagram (meaningful with `ACK`).
    pub acked_pkt_id: PacketId,
    /// Reserved word, zero from clients.
    pub unknown_a: u16,
    /// Reserved word, carries the handshake magic during session setup.
    pub unknown_b: u16,
    /// 15-bit packet id of this datagram (zero for ack-only traffic).
    pub pkt_id: PacketId,
}

impl TransportHeader {
    /// Parses the header from a datagram and validates the length field
    /// against the actual datagram size.
    pub fn parse(datagram: &[u8]) -> Result<TransportHeader> {
        if datagram.len() < TRANSPORT_HEADER_SIZE {
            return Err(ErrorKind::CouldNotReadHeader(format!(
                "datagram of {} bytes is shorter than the header",
                datagram.len()
            )));
        }

        let mut cursor = Cursor::new(datagram);
        let word0 = cursor
            .read_u16::<BigEndian>()
            .map_err(|e| ErrorKind::CouldNotReadHeader(e.to_string()))?;
        let flags = PacketFlags::from_bits((word0 >> 11) as u8);
        let length = word0 & 0x07FF;
        let session_id = cursor
            .read_u16::<BigEndian>()
            .map_err(|e| ErrorKind::CouldNotReadHeader(e.to_string()))?
            & PACKET_ID_MASK;
        let acked_pkt_id = cursor
            .read_u16::<BigEndian>()
            .map_err(|e| ErrorKind::CouldNotReadHeader(e.to_string()))?
            & PACKET_ID_MASK;
        let unknown_a = cursor
            .read_u16::<BigEndian>()
            .map_err(|e| ErrorKind::CouldNotReadHeader(e.to_string()))?;
        let unknown_b = cursor
            .read_u16::<BigEndian>()
            .map_err(|e| ErrorKind::CouldNotReadHeader(e.to_string()))?;
        let pkt_id = cursor
            .read_u16::<BigEndian>()
            .map_err(|e| ErrorKind::CouldNotReadHeader(e.to_string()))?
            & PACKET_ID_MASK;

        if usize::from(length) != datagram.len() {
            return Err(ErrorKind::PacketLengthMismatch {
                declared: usize::from(length),
                actual: datagram.len(),
            });
        }

        Ok(TransportHeader {
            flags,
            length,
            session_id,
            acked_pkt_id,
            unknown_a,
            unknown_b,
            pkt_id,
        })
    }

    /// Appends the serialized header to `buffer`.
    pub fn write_into(&self, buffer: &mut Vec<u8>) {
        let word0 = (u16::from(self.flags.bits()) << 11) | (self.length & 0x07FF);
        buffer.extend_from_slice(&word0.to_be_bytes());
        buffer.extend_from_slice(&(self.session_id & PACKET_ID_MASK).to_be_bytes());
        buffer.extend_from_slice(&(self.acked_pkt_id & PACKET_ID_MASK).to_be_bytes());
        buffer.extend_from_slice(&self.unknown_a.to_be_bytes());
        buffer.extend_from_slice(&self.unknown_b.to_be_bytes());
        buffer.extend_from_slice(&(self.pkt_id & PACKET_ID_MASK).to_be_bytes());
    }

    /// Serializes the header into a fresh 12-byte buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(TRANSPORT_HEADER_SIZE);
        self.write_into(&mut buffer);
        buffer
    }
}

/// Sets flag bits directly on an already-serialized datagram.
///
/// Used by the retransmit path to mark a stored datagram without re-encoding.
pub fn set_flags_in_place(datagram: &mut [u8], flags: PacketFlags) {
    debug_assert!(datagram.len() >= TRANSPORT_HEADER_SIZE);
    datagram[0] |= flags.bits() << 3;
}

/// Returns the id following `id` in the 15-bit sequence.
pub fn next_id(id: PacketId) -> PacketId {
    id.wrapping_add(1) & PACKET_ID_MASK
}

/// Compares 15-bit packet ids with wrapping arithmetic.
pub fn id_greater_than(s1: PacketId, s2: PacketId) -> bool {
    const HALF: u16 = PACKET_ID_MODULUS / 2;
    ((s1 > s2) && (s1 - s2 <= HALF)) || ((s1 < s2) && (s2 - s1 > HALF))
}

/// Compares 15-bit packet ids with wrapping arithmetic.
pub fn id_less_than(s1: PacketId, s2: PacketId) -> bool {
    id_greater_than(s2, s1)
}

/// Distance from `from` up to `to`, walking forward through the id space.
pub fn id_distance(to: PacketId, from: PacketId) -> u16 {
    to.wrapping_sub(from) & PACKET_ID_MASK
}
