//! switchwire-client: the threaded client for the switcher control channel.
//!
//! Maintains a reliable, ordered, session-oriented command channel over UDP
//! toward a single switcher: handshake and session-id negotiation, packet
//! acknowledgment and retransmission, timeout-driven reconnection,
//! ack-coalescing, a unique-keyed outbound queue that collapses stale
//! command updates, and a receive dispatcher that delivers decoded commands
//! to user callbacks in peer-send order.

pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod handler;
pub mod outbound;
pub mod session;
pub mod socket;
pub mod statistics;
pub mod transfer;
pub mod unique_queue;

pub use client::SwitcherClient;
pub use handler::{NullHandler, SwitcherHandler};
pub use outbound::OutboundMessage;
pub use session::ConnectionState;
pub use statistics::SessionStatistics;
pub use transfer::{DataTransferHandler, NullDataTransfer};
pub use unique_queue::UniqueQueue;
