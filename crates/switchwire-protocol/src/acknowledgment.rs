//! In-flight tracking for reliable outbound packets.
//!
//! Every data packet enters the table when it is handed to the socket and
//! leaves exactly once, when an ack covering its id arrives. A packet whose
//! deadline lapses is re-sent with the retransmit flag and a fresh deadline;
//! age alone never drops a packet, only an ack or a session reset does.

use std::{
    collections::{HashMap, VecDeque},
    time::Instant,
};

use crate::packet::{id_distance, set_flags_in_place, PacketFlags, PacketId};

/// Represents a packet that has been sent but not yet acknowledged.
#[derive(Clone, Debug)]
pub struct SentPacket {
    /// The full serialized datagram, ready for re-send.
    pub payload: Vec<u8>,
    /// Timestamp of the first transmission.
    pub first_sent: Instant,
    /// When the next retransmission is due.
    pub deadline: Instant,
    /// How many times the packet has been re-sent.
    pub retries: u32,
}

/// Responsible for handling the acknowledgment of packets.
#[derive(Debug, Default)]
pub struct AcknowledgmentHandler {
    in_flight: HashMap<PacketId, SentPacket>,
    /// Ids in assignment order; drives deterministic retransmit order.
    order: VecDeque<PacketId>,
}

impl AcknowledgmentHandler {
    /// Creates an empty handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of sent packets not yet acknowledged.
    pub fn packets_in_flight(&self) -> u16 {
        self.in_flight.len() as u16
    }

    /// Returns true if nothing is awaiting an ack.
    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Tracks a freshly sent datagram under its packet id.
    pub fn track(&mut self, pkt_id: PacketId, payload: Vec<u8>, now: Instant, deadline: Instant) {
        self.in_flight
            .insert(pkt_id, SentPacket { payload, first_sent: now, deadline, retries: 0 });
        self.order.push_back(pkt_id);
    }

    /// Applies an incoming ack: removes every in-flight id `i` with
    /// `(acked - i) mod 2^15 < window`. Returns how many packets were covered.
    pub fn apply_ack(&mut self, acked: PacketId, window: u16) -> usize {
        let before = self.in_flight.len();
        self.in_flight.retain(|id, _| id_distance(acked, *id) >= window);
        let in_flight = &self.in_flight;
        self.order.retain(|id| in_flight.contains_key(id));
        before - self.in_flight.len()
    }

    /// Returns the ids whose retransmit deadline has lapsed, oldest first.
    pub fn due_for_retransmit(&self, now: Instant) -> Vec<PacketId> {
        self.order
            .iter()
            .copied()
            .filter(|id| {
                self.in_flight
                    .get(id)
                    .map(|sent| sent.deadline <= now)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Marks a packet as re-sent: sets the retransmit flag on the stored
    /// bytes, bumps the retry count, extends the deadline, and returns a copy
    /// of the datagram for the wire. Returns `None` if the packet was acked
    /// in the meantime.
    pub fn prepare_retransmit(&mut self, pkt_id: PacketId, deadline: Instant) -> Option<Vec<u8>> {
        let sent = self.in_flight.get_mut(&pkt_id)?;
        set_flags_in_place(&mut sent.payload, PacketFlags::IS_RETRANSMIT);
        sent.retries += 1;
        sent.deadline = deadline;
        Some(sent.payload.clone())
    }

    /// Returns the retry count of an in-flight packet.
    pub fn retries(&self, pkt_id: PacketId) -> Option<u32> {
        self.in_flight.get(&pkt_id).map(|sent| sent.retries)
    }

    /// Abandons all in-flight packets; used on session reset.
    pub fn clear(&mut self) {
        self.in_flight.clear();
        self.order.clear();
    }
}
