#![warn(missing_docs)]

//! Switchwire: a small public API facade for the workspace.
//!
//! This crate provides a clean, stable surface that re-exports the most
//! commonly used types to talk to a broadcast video switcher:
//!
//! - Client and events (`SwitcherClient`, `SwitcherHandler`)
//! - Command traits and the codec registry (`SwitcherCommand`,
//!   `ReceivedCommand`, `CodecRegistry`)
//! - Core configuration (`Config`)
//!
//! Example
//! ```ignore
//! use switchwire::{commands::ProgramInputSetCommand, SwitcherClient, SwitcherHandler};
//!
//! struct Printer;
//!
//! impl SwitcherHandler for Printer {
//!     fn on_connected(&mut self) {
//!         println!("connected");
//!     }
//! }
//!
//! let addr = "192.168.10.240:9910".parse().unwrap();
//! let client = SwitcherClient::connect_to(addr, true, Printer).unwrap();
//! client.send_command(&ProgramInputSetCommand { me: 0, source: 2 }).unwrap();
//! ```

// Core configuration and errors
pub use switchwire_core::{
    config::Config,
    constants,
    error::{DecodingErrorKind, ErrorKind, Result},
    time::{Clock, SystemClock},
};

// Client: the threaded connection to one switcher
pub use switchwire_client::{
    ConnectionState, DataTransferHandler, NullDataTransfer, NullHandler, OutboundMessage,
    SessionStatistics, SwitcherClient, SwitcherHandler,
};

// Protocol: wire types, command traits and the registry
pub use switchwire_protocol::{
    codec::{CommandSpec, DecodeFn},
    CodecRegistry, PacketFlags, PacketId, ProtocolVersion, QueueKey, RawCommand, ReceivedCommand,
    SwitcherCommand, TransportHeader,
};

/// Built-in command types.
pub mod commands {
    pub use switchwire_protocol::commands::*;
}

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        CodecRegistry, Config, ConnectionState, ProtocolVersion, ReceivedCommand,
        SwitcherClient, SwitcherCommand, SwitcherHandler,
    };
}
