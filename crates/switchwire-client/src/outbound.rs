//! Outbound scheduling: the send worker and its message envelope.
//!
//! Keyed command updates flow through the unique queue (collapsing stale
//! states); control traffic that must not be collapsed bypasses it through a
//! FIFO of [`OutboundMessage`]s. A single worker packs serialized blocks
//! under the MTU budget, lets the connection assign packet ids and record
//! retransmit state, and hands the bytes to the socket.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::error;

use switchwire_core::{
    config::Config, constants::TRANSPORT_HEADER_SIZE, time::Clock, transport::Socket,
};
use switchwire_protocol::QueueKey;

use crate::{connection::Connection, unique_queue::UniqueQueue};

/// An envelope on the direct outbound FIFO.
///
/// Direct messages are strictly FIFO with respect to each other and may
/// interleave with keyed commands from the unique queue.
#[derive(Debug)]
pub struct OutboundMessage {
    pub(crate) payload: OutboundPayload,
}

#[derive(Debug)]
pub(crate) enum OutboundPayload {
    /// Serialized command block(s) exempt from uniqueness collapsing.
    Commands(Vec<u8>),
    /// Re-send the current session's handshake datagram.
    Handshake,
    /// Emit an ack-only datagram outside the coalescing timer.
    AckOnly,
}

impl OutboundMessage {
    /// Wraps already-serialized command blocks.
    pub fn commands(blocks: Vec<u8>) -> Self {
        Self { payload: OutboundPayload::Commands(blocks) }
    }

    /// Control directive: re-send the handshake.
    pub fn handshake() -> Self {
        Self { payload: OutboundPayload::Handshake }
    }

    /// Control directive: ack immediately.
    pub fn ack_only() -> Self {
        Self { payload: OutboundPayload::AckOnly }
    }

    /// Whether this message expects a peer ack once on the wire.
    pub fn needs_ack(&self) -> bool {
        matches!(self.payload, OutboundPayload::Commands(_))
    }
}

pub(crate) struct SendWorker {
    pub conn: Arc<Mutex<Connection>>,
    pub socket: Arc<dyn Socket>,
    pub unique: Arc<UniqueQueue<QueueKey, Vec<u8>>>,
    pub direct: Receiver<OutboundMessage>,
    pub running: Arc<AtomicBool>,
    pub clock: Arc<dyn Clock>,
    pub config: Config,
    /// Blocks dequeued but not yet on the wire (MTU carry-over, full window).
    pending: VecDeque<Vec<u8>>,
}

impl SendWorker {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        socket: Arc<dyn Socket>,
        unique: Arc<UniqueQueue<QueueKey, Vec<u8>>>,
        direct: Receiver<OutboundMessage>,
        running: Arc<AtomicBool>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self { conn, socket, unique, direct, running, clock, config, pending: VecDeque::new() }
    }

    pub fn run(mut self) {
        while self.running.load(Ordering::Relaxed) {
            // Park while the session cannot carry commands; queued work
            // survives the outage and goes out after the next handshake.
            if !self.conn.lock().is_established() {
                thread::sleep(self.config.ack_interval);
                continue;
            }

            self.drain_direct();
            let payload = self.build_payload();

            if payload.is_empty() {
                // Brief blocking wait doubles as the idle yield; any unique
                // insertion wakes it.
                if let Some(block) = self.unique.dequeue_timeout(self.config.send_idle_backoff) {
                    self.pending.push_back(block);
                }
                continue;
            }

            let now = self.clock.now();
            let packed = self.conn.lock().pack_outbound(&payload, now);
            match packed {
                Some(datagram) => {
                    if let Err(e) = self.socket.send_packet(&datagram) {
                        // Reliability is owned by the retransmit path.
                        error!("error sending a packet: {}", e);
                    }
                }
                None => {
                    // Lost the session or the in-flight window is full; the
                    // packed payload stays first in line.
                    self.pending.push_front(payload);
                    thread::sleep(self.config.ack_interval);
                }
            }
        }
    }

    fn drain_direct(&mut self) {
        while let Ok(message) = self.direct.try_recv() {
            match message.payload {
                OutboundPayload::Commands(blocks) => self.pending.push_back(blocks),
                OutboundPayload::Handshake => {
                    let datagram = self.conn.lock().handshake_datagram();
                    if let Err(e) = self.socket.send_packet(&datagram) {
                        error!("error sending handshake: {}", e);
                    }
                }
                OutboundPayload::AckOnly => {
                    let datagram = self.conn.lock().ack_datagram();
                    if let Err(e) = self.socket.send_packet(&datagram) {
                        error!("error sending ack: {}", e);
                    }
                }
            }
        }
    }

    /// Packs pending blocks, then keyed commands, under the MTU budget.
    /// Keyed commands stay in the unique queue (still collapsing) until
    /// there is room for them.
    fn build_payload(&mut self) -> Vec<u8> {
        let budget = usize::from(self.config.mtu) - TRANSPORT_HEADER_SIZE;
        let mut payload = Vec::new();

        while let Some(block) = self.pending.pop_front() {
            if !payload.is_empty() && payload.len() + block.len() > budget {
                self.pending.push_front(block);
                return payload;
            }
            payload.extend_from_slice(&block);
        }

        while payload.len() < budget {
            match self.unique.try_dequeue() {
                Some(block) => {
                    if !payload.is_empty() && payload.len() + block.len() > budget {
                        self.pending.push_back(block);
                        return payload;
                    }
                    payload.extend_from_slice(&block);
                }
                None => break,
            }
        }

        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_message_needs_ack() {
        assert!(OutboundMessage::commands(vec![1, 2, 3]).needs_ack());
        assert!(!OutboundMessage::handshake().needs_ack());
        assert!(!OutboundMessage::ack_only().needs_ack());
    }
}
