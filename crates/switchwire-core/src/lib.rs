#![warn(missing_docs)]

//! switchwire-core: foundational types and utilities.
//!
//! This crate provides the minimal set of core utilities shared across all
//! layers of the switcher control-channel client:
//! - Configuration types
//! - Error handling
//! - Protocol constants
//! - Transport and clock abstractions
//!
//! Protocol-specific logic lives in specialized crates:
//! - `switchwire-protocol`: wire header codec, command-block framing,
//!   acknowledgment bookkeeping, inbound reordering, command codec registry
//! - `switchwire-client`: session state machine, outbound scheduling and the
//!   threaded client

/// Protocol constants shared across layers.
pub mod constants {
    /// UDP port the switcher listens on.
    pub const DEVICE_PORT: u16 = 9910;
    /// Size of the fixed transport header at the start of every datagram.
    pub const TRANSPORT_HEADER_SIZE: usize = 12;
    /// Size of the per-command header inside a datagram payload.
    pub const COMMAND_HEADER_SIZE: usize = 8;
    /// Packet and session identifiers are 15-bit counters; ids wrap here.
    pub const PACKET_ID_MODULUS: u16 = 0x8000;
    /// Mask selecting the 15 valid bits of a packet or session id.
    pub const PACKET_ID_MASK: u16 = 0x7FFF;
    /// Magic carried in the reserved word of the handshake datagram.
    pub const HANDSHAKE_MAGIC: u16 = 0x0068;
    /// Maximum transmission unit for an outbound datagram.
    ///
    /// Derived from ethernet_mtu - ipv6_header_size - udp_header_size
    ///       1452 = 1500         - 40               - 8
    ///
    /// Command payloads are packed up to `DEFAULT_MTU - TRANSPORT_HEADER_SIZE`
    /// bytes per datagram.
    pub const DEFAULT_MTU: u16 = 1452;
}

/// Configuration options for the protocol and client runtime.
pub mod config;
/// Error types and results.
pub mod error;
/// Clock abstraction for testable time handling.
pub mod time;
/// Transport abstraction for pluggable I/O.
pub mod transport;
