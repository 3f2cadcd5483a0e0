//! The transport state machine shared by all client workers.
//!
//! A single `Connection` holds everything the receive, send and timer
//! workers mutate: session identifiers, the in-flight table, the reorder
//! buffer and the ack debt. Workers lock it for the minimum region required
//! and perform the returned [`Action`]s after releasing the lock.

use std::time::Instant;

use tracing::{debug, trace, warn};

use switchwire_core::{config::Config, constants::TRANSPORT_HEADER_SIZE};
use switchwire_protocol::{
    acknowledgment::AcknowledgmentHandler,
    command::parse_blocks,
    packet::{PacketFlags, TransportHeader},
    reorder::{Accept, ReorderBuffer},
};

use crate::{
    dispatcher::DispatchItem,
    session::{ConnectionState, Session},
    statistics::SessionStatistics,
};

/// Work a state transition asks its caller to perform outside the lock.
#[derive(Debug)]
pub enum Action {
    /// Hand the given datagram to the socket.
    Send(Vec<u8>),
    /// Forward an item to the dispatch worker.
    Emit(DispatchItem),
}

/// Shared per-connection protocol state.
#[derive(Debug)]
pub struct Connection {
    config: Config,
    session: Session,
    acks: AcknowledgmentHandler,
    reorder: ReorderBuffer,
    /// An inbound packet requested an ack that has not been emitted yet.
    ack_due: bool,
    statistics: SessionStatistics,
}

impl Connection {
    /// Creates connection state for a new client.
    pub fn new(config: Config, now: Instant) -> Self {
        Self {
            config,
            session: Session::new(now),
            acks: AcknowledgmentHandler::new(),
            reorder: ReorderBuffer::new(),
            ack_due: false,
            statistics: SessionStatistics::default(),
        }
    }

    /// Begins a handshake. Returns the handshake datagram to send, or `None`
    /// when a connect attempt is already under way (idempotent `connect()`).
    pub fn start_connect(&mut self, now: Instant) -> Option<Vec<u8>> {
        match self.session.state {
            ConnectionState::Fresh => {}
            ConnectionState::Timedout => self.session.rollover(now),
            ConnectionState::Handshaking
            | ConnectionState::Established
            | ConnectionState::Closed => return None,
        }
        self.session.state = ConnectionState::Handshaking;
        self.session.last_recv = now;
        Some(self.session.handshake_datagram())
    }

    /// Feeds one parsed inbound datagram through the state machine.
    pub fn handle_packet(
        &mut self,
        header: &TransportHeader,
        payload: &[u8],
        now: Instant,
    ) -> Vec<Action> {
        if self.session.state == ConnectionState::Closed {
            return Vec::new();
        }

        self.statistics.packets_received += 1;
        self.statistics.bytes_received += (TRANSPORT_HEADER_SIZE + payload.len()) as u64;
        self.session.last_recv = now;

        let mut actions = Vec::new();

        if header.flags.contains(PacketFlags::ACK) {
            self.acks.apply_ack(header.acked_pkt_id, self.config.ack_window);
        }

        if header.flags.contains(PacketFlags::REQUEST_RETRANSMIT) {
            // Not acted on: the reorder buffer gap-fills on its own.
            debug!(pkt_id = header.pkt_id, "peer requested a retransmit");
        }

        if header.flags.contains(PacketFlags::INIT) {
            self.complete_handshake(header, &mut actions);
            return actions;
        }

        if header.session_id != self.session.session_id {
            debug!(
                old = self.session.session_id,
                new = header.session_id,
                "adopting peer session id"
            );
            self.session.session_id = header.session_id;
        }

        if header.flags.contains(PacketFlags::ACK_REQUEST) {
            self.ack_due = true;
        }

        if !payload.is_empty() {
            match parse_blocks(payload) {
                Ok(commands) if !commands.is_empty() => {
                    match self.reorder.accept(header.pkt_id, commands) {
                        Accept::Duplicate => self.statistics.duplicates_dropped += 1,
                        Accept::Buffered => {
                            for (_, ready) in self.reorder.drain_ready() {
                                actions.push(Action::Emit(DispatchItem::Batch(ready)));
                            }
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => debug!(pkt_id = header.pkt_id, "dropping datagram: {}", e),
            }
        }

        actions
    }

    fn complete_handshake(&mut self, header: &TransportHeader, actions: &mut Vec<Action>) {
        if header.session_id != self.session.session_id {
            debug!(
                proposed = self.session.session_id,
                imposed = header.session_id,
                "peer replaced our session id"
            );
        }
        self.session.session_id = header.session_id;

        if self.session.state == ConnectionState::Handshaking {
            self.session.state = ConnectionState::Established;
            self.session.established_once = true;
            self.reorder.reset_to(header.pkt_id);
            actions.push(Action::Emit(DispatchItem::Connected));
        }
        // Session setup is acked immediately, outside the coalescing timer.
        actions.push(Action::Send(self.ack_only_datagram()));
    }

    /// Builds a header-only ack datagram covering the delivered stream.
    fn ack_only_datagram(&mut self) -> Vec<u8> {
        let header = TransportHeader {
            flags: PacketFlags::ACK,
            length: TRANSPORT_HEADER_SIZE as u16,
            session_id: self.session.session_id,
            acked_pkt_id: self.reorder.last_delivered(),
            unknown_a: 0,
            unknown_b: 0,
            pkt_id: 0,
        };
        self.ack_due = false;
        self.statistics.acks_sent += 1;
        header.to_bytes()
    }

    /// Wraps a packed command payload into a data packet: assigns the next
    /// packet id, records the datagram for retransmission and piggybacks the
    /// current ack state.
    ///
    /// Returns `None` while the session is not established or the in-flight
    /// window is full; the caller keeps the payload and retries.
    pub fn pack_outbound(&mut self, payload: &[u8], now: Instant) -> Option<Vec<u8>> {
        if !self.session.state.is_established() {
            return None;
        }
        if self.acks.packets_in_flight() >= self.config.max_packets_in_flight {
            return None;
        }

        let pkt_id = self.session.assign_pkt_id();
        let header = TransportHeader {
            flags: PacketFlags::ACK_REQUEST | PacketFlags::ACK,
            length: (TRANSPORT_HEADER_SIZE + payload.len()) as u16,
            session_id: self.session.session_id,
            acked_pkt_id: self.reorder.last_delivered(),
            unknown_a: 0,
            unknown_b: 0,
            pkt_id,
        };
        let mut datagram = header.to_bytes();
        datagram.extend_from_slice(payload);

        self.acks.track(
            pkt_id,
            datagram.clone(),
            now,
            now + self.config.retransmit_interval,
        );
        self.ack_due = false;
        self.statistics.packets_sent += 1;
        self.statistics.bytes_sent += datagram.len() as u64;
        Some(datagram)
    }

    /// Periodic maintenance: liveness timeout, lapsed retransmit deadlines
    /// and coalesced ack emission. Runs once per ack interval.
    pub fn tick(&mut self, now: Instant) -> Vec<Action> {
        match self.session.state {
            ConnectionState::Fresh | ConnectionState::Closed => return Vec::new(),
            _ => {}
        }

        let mut actions = Vec::new();

        if now.duration_since(self.session.last_recv) > self.config.timeout_interval {
            warn!(
                session_id = self.session.session_id,
                "peer silent past the timeout interval; reconnecting"
            );
            self.session.state = ConnectionState::Timedout;
            if self.session.established_once {
                self.session.established_once = false;
                actions.push(Action::Emit(DispatchItem::Disconnected));
            }
            self.acks.clear();
            self.ack_due = false;
            self.statistics.reset();
            self.session.rollover(now);
            self.session.state = ConnectionState::Handshaking;
            actions.push(Action::Send(self.session.handshake_datagram()));
            return actions;
        }

        let deadline = now + self.config.retransmit_interval;
        for pkt_id in self.acks.due_for_retransmit(now) {
            if let Some(datagram) = self.acks.prepare_retransmit(pkt_id, deadline) {
                trace!(pkt_id, "retransmitting unacked packet");
                self.statistics.retransmits += 1;
                self.statistics.bytes_sent += datagram.len() as u64;
                actions.push(Action::Send(datagram));
            }
        }

        if self.ack_due && self.session.state.is_established() {
            actions.push(Action::Send(self.ack_only_datagram()));
        }

        actions
    }

    /// The current session's handshake datagram, for direct control traffic.
    pub(crate) fn handshake_datagram(&self) -> Vec<u8> {
        self.session.handshake_datagram()
    }

    /// An ack-only datagram on demand, for direct control traffic.
    pub(crate) fn ack_datagram(&mut self) -> Vec<u8> {
        self.ack_only_datagram()
    }

    /// Marks the initial status dump as complete.
    pub fn mark_init_complete(&mut self) {
        self.session.init_complete = true;
    }

    /// True once the peer finished its initial status dump this session.
    pub fn is_initialized(&self) -> bool {
        self.session.init_complete
    }

    /// Moves to the terminal state; no further work is produced.
    pub fn close(&mut self) {
        self.session.state = ConnectionState::Closed;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.session.state
    }

    /// Returns true if commands can go on the wire right now.
    pub fn is_established(&self) -> bool {
        self.session.state.is_established()
    }

    /// The session id in effect.
    pub fn session_id(&self) -> u16 {
        self.session.session_id
    }

    /// Number of outbound packets awaiting an ack.
    pub fn packets_in_flight(&self) -> u16 {
        self.acks.packets_in_flight()
    }

    /// Snapshot of the session counters.
    pub fn statistics(&self) -> SessionStatistics {
        self.statistics.clone()
    }

    /// The configuration this connection runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
