//! Reorder buffer restoring peer-send order of inbound packets.
//!
//! Command delivery is gated on contiguous packet-id arrival: out-of-order
//! packets are staged by id and released once the gap before them fills.
//! A packet at or behind the last delivered id is a duplicate: its payload
//! is dropped while the caller still honors its ack request.

use std::collections::HashMap;

use crate::{
    command::RawCommand,
    packet::{id_greater_than, next_id, PacketId},
};

/// Outcome of offering a packet to the buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Accept {
    /// The packet entered the buffer (it may or may not be ready to drain).
    Buffered,
    /// The packet id was already delivered; the payload was discarded.
    Duplicate,
}

/// Staging area for out-of-order inbound packets.
#[derive(Debug, Default)]
pub struct ReorderBuffer {
    last_delivered: PacketId,
    pending: HashMap<PacketId, Vec<RawCommand>>,
}

impl ReorderBuffer {
    /// Creates a buffer expecting delivery to start after id zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restarts the stream: `id` becomes the last delivered packet and all
    /// staged packets are discarded. Called when a session is (re)established.
    pub fn reset_to(&mut self, id: PacketId) {
        self.last_delivered = id;
        self.pending.clear();
    }

    /// The id of the most recently delivered (or reset-to) packet.
    pub fn last_delivered(&self) -> PacketId {
        self.last_delivered
    }

    /// Offers a packet. A retransmit of an already-staged id replaces the
    /// staged payload, which is identical by construction.
    pub fn accept(&mut self, pkt_id: PacketId, commands: Vec<RawCommand>) -> Accept {
        if !id_greater_than(pkt_id, self.last_delivered) {
            return Accept::Duplicate;
        }
        self.pending.insert(pkt_id, commands);
        Accept::Buffered
    }

    /// Releases every packet that is now contiguous with the delivered
    /// stream, in stream order.
    pub fn drain_ready(&mut self) -> Vec<(PacketId, Vec<RawCommand>)> {
        let mut ready = Vec::new();
        loop {
            let expected = next_id(self.last_delivered);
            match self.pending.remove(&expected) {
                Some(commands) => {
                    self.last_delivered = expected;
                    ready.push((expected, commands));
                }
                None => break,
            }
        }
        ready
    }

    /// Number of packets staged waiting for a gap to fill.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(tag: u8) -> Vec<RawCommand> {
        vec![RawCommand::new(*b"Time", vec![tag])]
    }

    fn drained_ids(buffer: &mut ReorderBuffer) -> Vec<PacketId> {
        buffer.drain_ready().into_iter().map(|(id, _)| id).collect()
    }

    #[test]
    fn test_in_order_stream_flows_through() {
        let mut buffer = ReorderBuffer::new();
        for id in 1..=3 {
            assert_eq!(buffer.accept(id, cmd(id as u8)), Accept::Buffered);
            assert_eq!(drained_ids(&mut buffer), vec![id]);
        }
        assert_eq!(buffer.last_delivered(), 3);
    }

    #[test]
    fn test_gap_holds_delivery_until_filled() {
        let mut buffer = ReorderBuffer::new();
        buffer.accept(1, cmd(1));
        assert_eq!(drained_ids(&mut buffer), vec![1]);

        buffer.accept(3, cmd(3));
        assert!(drained_ids(&mut buffer).is_empty());
        assert_eq!(buffer.pending_len(), 1);

        buffer.accept(2, cmd(2));
        assert_eq!(drained_ids(&mut buffer), vec![2, 3]);

        buffer.accept(4, cmd(4));
        assert_eq!(drained_ids(&mut buffer), vec![4]);
    }

    #[test]
    fn test_duplicate_of_delivered_id_is_rejected() {
        let mut buffer = ReorderBuffer::new();
        buffer.accept(1, cmd(1));
        buffer.drain_ready();

        assert_eq!(buffer.accept(1, cmd(1)), Accept::Duplicate);
        assert_eq!(buffer.accept(0, cmd(0)), Accept::Duplicate);
        assert!(drained_ids(&mut buffer).is_empty());
    }

    #[test]
    fn test_retransmit_of_staged_id_replaces_in_place() {
        let mut buffer = ReorderBuffer::new();
        buffer.accept(2, cmd(2));
        assert_eq!(buffer.accept(2, cmd(2)), Accept::Buffered);
        assert_eq!(buffer.pending_len(), 1);
    }

    #[test]
    fn test_stream_wraps_across_id_modulus() {
        let mut buffer = ReorderBuffer::new();
        buffer.reset_to(0x7FFE);

        buffer.accept(0x7FFF, cmd(1));
        buffer.accept(0x0000, cmd(2));
        buffer.accept(0x0001, cmd(3));
        assert_eq!(drained_ids(&mut buffer), vec![0x7FFF, 0x0000, 0x0001]);
        assert_eq!(buffer.last_delivered(), 0x0001);
    }

    #[test]
    fn test_reset_discards_staged_packets() {
        let mut buffer = ReorderBuffer::new();
        buffer.accept(5, cmd(5));
        buffer.reset_to(1);
        assert_eq!(buffer.pending_len(), 0);
        assert_eq!(buffer.last_delivered(), 1);
    }
}
