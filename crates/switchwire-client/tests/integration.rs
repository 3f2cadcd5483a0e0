//! End-to-end tests for the switchwire client.
//!
//! A plain UDP socket on loopback plays the switcher: it answers the
//! handshake, feeds status commands (with losses, duplicates and
//! reorderings) and observes what the client puts on the wire.

use std::{
    net::{SocketAddr, UdpSocket},
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use switchwire_client::{ConnectionState, SwitcherClient, SwitcherHandler};
use switchwire_core::config::Config;
use switchwire_protocol::{
    command::{parse_blocks, write_blocks},
    commands::{TimecodeCommand, TransitionPositionSetCommand},
    packet::{PacketFlags, TransportHeader},
    RawCommand, ReceivedCommand,
};

const HEADER_SIZE: usize = 12;

// ============================================================================
// Harness: a fake switcher on loopback
// ============================================================================

struct Switcher {
    socket: UdpSocket,
    client_addr: Option<SocketAddr>,
    session_id: u16,
    next_pkt_id: u16,
}

impl Switcher {
    fn new() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        Self { socket, client_addr: None, session_id: 0x5678, next_pkt_id: 1 }
    }

    fn addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap()
    }

    fn recv(&mut self) -> Option<(TransportHeader, Vec<u8>)> {
        let mut buf = [0u8; 2048];
        let (len, from) = self.socket.recv_from(&mut buf).ok()?;
        self.client_addr = Some(from);
        let header = TransportHeader::parse(&buf[..len]).ok()?;
        Some((header, buf[HEADER_SIZE..len].to_vec()))
    }

    /// Waits for the 20-byte session-setup datagram.
    fn expect_handshake(&mut self) -> TransportHeader {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some((header, payload)) = self.recv() {
                if header.flags.contains(PacketFlags::INIT) {
                    assert_eq!(payload.len(), 8);
                    return header;
                }
            }
        }
        panic!("no handshake arrived");
    }

    /// Replies to the handshake, imposing this harness's session id.
    fn complete_handshake(&mut self) {
        let header = TransportHeader {
            flags: PacketFlags::INIT | PacketFlags::ACK_REQUEST,
            length: 20,
            session_id: self.session_id,
            acked_pkt_id: 0,
            unknown_a: 0,
            unknown_b: 0,
            pkt_id: self.next_pkt_id,
        };
        self.next_pkt_id += 1;
        let mut datagram = header.to_bytes();
        datagram.extend_from_slice(&[0u8; 8]);
        self.send(datagram);
    }

    fn send(&self, datagram: Vec<u8>) {
        let to = self.client_addr.expect("client address is known after its first datagram");
        self.socket.send_to(&datagram, to).unwrap();
    }

    /// Sends one data packet with the given id carrying `commands`.
    fn send_data(&mut self, pkt_id: u16, commands: &[RawCommand]) {
        let payload = write_blocks(commands);
        let header = TransportHeader {
            flags: PacketFlags::ACK_REQUEST,
            length: (HEADER_SIZE + payload.len()) as u16,
            session_id: self.session_id,
            acked_pkt_id: 0,
            unknown_a: 0,
            unknown_b: 0,
            pkt_id,
        };
        let mut datagram = header.to_bytes();
        datagram.extend_from_slice(&payload);
        self.send(datagram);
    }

    /// Acks a client data packet so it leaves the retransmit table.
    fn ack(&mut self, pkt_id: u16) {
        let header = TransportHeader {
            flags: PacketFlags::ACK,
            length: HEADER_SIZE as u16,
            session_id: self.session_id,
            acked_pkt_id: pkt_id,
            unknown_a: 0,
            unknown_b: 0,
            pkt_id: 0,
        };
        self.send(header.to_bytes());
    }

    /// Waits for the next command-bearing packet from the client, skipping
    /// ack-only traffic.
    fn next_data_packet(&mut self) -> Option<(TransportHeader, Vec<RawCommand>)> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some((header, payload)) = self.recv() {
                if !payload.is_empty() && !header.flags.contains(PacketFlags::INIT) {
                    return Some((header, parse_blocks(&payload).unwrap()));
                }
            }
        }
        None
    }
}

// ============================================================================
// Recording handler
// ============================================================================

#[derive(Default)]
struct Record {
    connects: usize,
    disconnects: usize,
    timecode_tags: Vec<u8>,
    command_names: Vec<String>,
}

#[derive(Clone, Default)]
struct RecordingHandler(Arc<Mutex<Record>>);

impl RecordingHandler {
    fn snapshot(&self) -> Record {
        let record = self.0.lock().unwrap();
        Record {
            connects: record.connects,
            disconnects: record.disconnects,
            timecode_tags: record.timecode_tags.clone(),
            command_names: record.command_names.clone(),
        }
    }

    fn wait_until(&self, mut condition: impl FnMut(&Record) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition(&self.0.lock().unwrap()) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

impl SwitcherHandler for RecordingHandler {
    fn on_connected(&mut self) {
        self.0.lock().unwrap().connects += 1;
    }

    fn on_disconnected(&mut self) {
        self.0.lock().unwrap().disconnects += 1;
    }

    fn on_receive(&mut self, commands: Vec<Box<dyn ReceivedCommand>>) {
        let mut record = self.0.lock().unwrap();
        for command in commands {
            record
                .command_names
                .push(String::from_utf8_lossy(&command.name()).into_owned());
            if let Some(time) = command.as_any().downcast_ref::<TimecodeCommand>() {
                record.timecode_tags.push(time.hour);
            }
        }
    }
}

fn timecode(tag: u8) -> RawCommand {
    RawCommand::new(*b"Time", vec![tag, 0, 0, 0])
}

fn established_pair() -> (Switcher, SwitcherClient, RecordingHandler) {
    let mut switcher = Switcher::new();
    let handler = RecordingHandler::default();
    let client = SwitcherClient::connect_to(switcher.addr(), true, handler.clone()).unwrap();
    switcher.expect_handshake();
    switcher.complete_handshake();
    assert!(handler.wait_until(|r| r.connects == 1), "connection never came up");
    (switcher, client, handler)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn handshake_establishes_and_acks_the_setup_packet() {
    let mut switcher = Switcher::new();
    let handler = RecordingHandler::default();
    let mut client = SwitcherClient::connect_to(switcher.addr(), false, handler.clone()).unwrap();

    assert!(client.connect());
    let handshake = switcher.expect_handshake();
    assert_eq!(handshake.length, 20);
    assert_eq!(handshake.unknown_b, 0x0068);
    assert_eq!(handshake.pkt_id, 0);

    switcher.complete_handshake();
    assert!(handler.wait_until(|r| r.connects == 1));
    assert_eq!(client.state(), ConnectionState::Established);

    // The next client datagram adopts the imposed session id and acks the
    // setup packet immediately.
    let (header, _) = switcher.recv().expect("an immediate ack must arrive");
    assert!(header.flags.contains(PacketFlags::ACK));
    assert_eq!(header.session_id, 0x5678);
    assert_eq!(header.acked_pkt_id, 1);

    client.dispose();
}

#[test]
fn fader_updates_collapse_to_the_latest_value() {
    let mut switcher = Switcher::new();
    let handler = RecordingHandler::default();
    let mut client = SwitcherClient::connect_to(switcher.addr(), false, handler.clone()).unwrap();

    // Queued before the session exists; same queue key throughout.
    for position in [1000u16, 5000, 9000] {
        client
            .send_command(&TransitionPositionSetCommand { me: 0, position })
            .unwrap();
    }

    client.connect();
    switcher.expect_handshake();
    switcher.complete_handshake();

    let (header, commands) = switcher.next_data_packet().expect("one fader packet");
    switcher.ack(header.pkt_id);
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].name, *b"CTPs");
    assert_eq!(commands[0].body, vec![0x00, 0x00, 0x23, 0x28]); // 9000

    // Nothing further: the stale positions never reach the wire. At most a
    // retransmit of the same packet shows up if the ack raced it.
    if let Some((extra, _)) = switcher.next_data_packet() {
        assert!(extra.flags.contains(PacketFlags::IS_RETRANSMIT));
        assert_eq!(extra.pkt_id, header.pkt_id);
    }
    client.dispose();
}

#[test]
fn unacked_packets_are_retransmitted_with_the_flag_set() {
    let (mut switcher, mut client, _handler) = established_pair();

    client
        .send_command(&TransitionPositionSetCommand { me: 0, position: 5000 })
        .unwrap();

    let (first, first_cmds) = switcher.next_data_packet().expect("the original packet");
    assert!(!first.flags.contains(PacketFlags::IS_RETRANSMIT));

    // Swallow it: no ack. The packet must come back, identical, flagged.
    let (resent, resent_cmds) = switcher.next_data_packet().expect("a retransmit");
    assert!(resent.flags.contains(PacketFlags::IS_RETRANSMIT));
    assert_eq!(resent.pkt_id, first.pkt_id);
    assert_eq!(resent_cmds, first_cmds);

    switcher.ack(resent.pkt_id);
    client.dispose();
}

#[test]
fn reordered_packets_deliver_commands_in_stream_order() {
    let (mut switcher, mut client, handler) = established_pair();

    // Stream ids 2..=5 sent as 2, 4, 3, 5; tags follow the stream order.
    switcher.send_data(2, &[timecode(1)]);
    switcher.send_data(4, &[timecode(3)]);
    switcher.send_data(3, &[timecode(2)]);
    switcher.send_data(5, &[timecode(4)]);

    assert!(handler.wait_until(|r| r.timecode_tags.len() == 4));
    assert_eq!(handler.snapshot().timecode_tags, vec![1, 2, 3, 4]);
    client.dispose();
}

#[test]
fn duplicated_packets_deliver_exactly_once() {
    let (mut switcher, mut client, handler) = established_pair();

    switcher.send_data(2, &[timecode(1)]);
    switcher.send_data(2, &[timecode(1)]);
    switcher.send_data(3, &[timecode(2)]);
    switcher.send_data(2, &[timecode(1)]);

    assert!(handler.wait_until(|r| r.timecode_tags.len() >= 2));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(handler.snapshot().timecode_tags, vec![1, 2]);
    client.dispose();
}

#[test]
fn silence_disconnects_then_a_fresh_handshake_reconnects() {
    let mut config = Config::default();
    config.timeout_interval = Duration::from_millis(300);

    let mut switcher = Switcher::new();
    let handler = RecordingHandler::default();
    let mut client =
        SwitcherClient::with_config(switcher.addr(), true, handler.clone(), config).unwrap();

    switcher.expect_handshake();
    switcher.complete_handshake();
    assert!(handler.wait_until(|r| r.connects == 1));

    // Go silent past the timeout: the client gives up on the session and
    // starts over with a new handshake.
    let second = switcher.expect_handshake();
    assert!(handler.wait_until(|r| r.disconnects == 1));
    assert!(second.flags.contains(PacketFlags::INIT));

    switcher.complete_handshake();
    assert!(handler.wait_until(|r| r.connects == 2));
    client.dispose();
}

#[test]
fn unknown_commands_are_skipped_and_the_batch_survives() {
    let (mut switcher, mut client, handler) = established_pair();

    switcher.send_data(
        2,
        &[RawCommand::new(*b"ZZZZ", vec![0xDE, 0xAD]), timecode(7)],
    );

    assert!(handler.wait_until(|r| !r.command_names.is_empty()));
    let record = handler.snapshot();
    assert_eq!(record.command_names, vec!["Time"]);
    assert_eq!(record.timecode_tags, vec![7]);
    client.dispose();
}

#[test]
fn acks_are_coalesced_onto_the_ack_timer() {
    let (mut switcher, mut client, handler) = established_pair();

    switcher.send_data(2, &[timecode(1)]);
    assert!(handler.wait_until(|r| r.timecode_tags.len() == 1));

    // An ack covering the packet arrives within the ack interval (plus
    // generous scheduling slack).
    let deadline = Instant::now() + Duration::from_millis(500);
    let mut acked = false;
    while Instant::now() < deadline {
        if let Some((header, _)) = switcher.recv() {
            if header.flags.contains(PacketFlags::ACK) && header.acked_pkt_id == 2 {
                acked = true;
                break;
            }
        }
    }
    assert!(acked, "no ack covering the data packet arrived");
    client.dispose();
}
