//! Session statistics tracking.

/// Counters for one connection to the switcher.
/// Tracks datagrams, bytes and reliability events.
#[derive(Debug, Clone, Default)]
pub struct SessionStatistics {
    /// Total data packets sent to the switcher.
    pub packets_sent: u64,
    /// Total datagrams received from the switcher.
    pub packets_received: u64,
    /// Total bytes sent, transport header included.
    pub bytes_sent: u64,
    /// Total bytes received, transport header included.
    pub bytes_received: u64,
    /// Outbound packets re-sent after a lapsed retransmit deadline.
    pub retransmits: u64,
    /// Inbound packets dropped because their id was already delivered.
    pub duplicates_dropped: u64,
    /// Ack-only datagrams emitted.
    pub acks_sent: u64,
}

impl SessionStatistics {
    /// Resets all counters; called when a session is re-established.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
