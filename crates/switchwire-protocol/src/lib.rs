//! switchwire-protocol: the wire format of the switcher control channel.
//!
//! This crate implements everything that touches raw bytes:
//! - the fixed 12-byte transport header and its flag bits (`packet`)
//! - length-prefixed command-block framing inside a datagram (`command`)
//! - 15-bit wrapping packet-id arithmetic (`packet`)
//! - the in-flight table driving acknowledgment and retransmission
//!   (`acknowledgment`)
//! - the reorder buffer that restores peer-send order (`reorder`)
//! - the codec registry mapping `(name, protocol version)` to typed command
//!   decoders, plus the built-in command set (`codec`, `commands`)

pub mod acknowledgment;
pub mod codec;
pub mod command;
pub mod commands;
pub mod packet;
pub mod reorder;

pub use acknowledgment::{AcknowledgmentHandler, SentPacket};
pub use codec::{CodecRegistry, ProtocolVersion, QueueKey, ReceivedCommand, SwitcherCommand};
pub use command::RawCommand;
pub use packet::{PacketFlags, PacketId, TransportHeader};
