//! User-facing event surface.

use switchwire_protocol::{ReceivedCommand, TransportHeader};

/// Callbacks invoked by the client workers.
///
/// `on_connected`, `on_disconnected` and `on_receive` run on the dispatch
/// worker; `on_receive_packet` runs on the receive worker. None of them may
/// block for long: the workers they run on gate command delivery and
/// socket reads.
pub trait SwitcherHandler: Send {
    /// A session reached the established state (first connect or reconnect).
    fn on_connected(&mut self) {}

    /// An established session timed out. A reconnect attempt follows
    /// automatically; `on_connected` fires again when it succeeds.
    fn on_disconnected(&mut self) {}

    /// A batch of decoded commands in peer-send order, after the
    /// data-transfer collaborator took its share.
    fn on_receive(&mut self, _commands: Vec<Box<dyn ReceivedCommand>>) {}

    /// Every parsed inbound datagram, for protocol-level observers.
    fn on_receive_packet(&mut self, _header: &TransportHeader, _payload: &[u8]) {}
}

/// Handler that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl SwitcherHandler for NullHandler {}
