//! The threaded switcher client.
//!
//! Four workers drive one connection:
//!
//! | Worker   | Duty                                             |
//! |----------|--------------------------------------------------|
//! | receive  | blocking socket reads into the connection state  |
//! | dispatch | decoded command batches into user callbacks      |
//! | send     | unique queue draining, packing, socket writes    |
//! | timer    | liveness, retransmit deadlines, ack coalescing   |
//!
//! The connection state is the single shared mutable resource; workers lock
//! it for the minimum region required and perform the returned actions after
//! releasing the lock.

use std::{
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use switchwire_core::{
    config::Config,
    constants::TRANSPORT_HEADER_SIZE,
    error::{ErrorKind, Result},
    time::{Clock, SystemClock},
    transport::Socket,
};
use switchwire_protocol::{
    codec::serialize_command, CodecRegistry, ProtocolVersion, QueueKey, SwitcherCommand,
    TransportHeader,
};

use crate::{
    connection::{Action, Connection},
    dispatcher::{DispatchItem, DispatchWorker},
    handler::SwitcherHandler,
    outbound::{OutboundMessage, SendWorker},
    session::ConnectionState,
    socket::UdpTransport,
    statistics::SessionStatistics,
    transfer::{DataTransferHandler, NullDataTransfer},
    unique_queue::UniqueQueue,
};

/// Client maintaining a reliable, ordered command channel to one switcher.
pub struct SwitcherClient {
    conn: Arc<Mutex<Connection>>,
    socket: Arc<dyn Socket>,
    unique: Arc<UniqueQueue<QueueKey, Vec<u8>>>,
    direct_tx: Sender<OutboundMessage>,
    direct_rx: Receiver<OutboundMessage>,
    dispatch_tx: Sender<DispatchItem>,
    version: Arc<Mutex<ProtocolVersion>>,
    running: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    threads: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for SwitcherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitcherClient")
            .field("state", &self.conn.lock().state())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl SwitcherClient {
    /// Creates a client for the switcher at `address` with default
    /// configuration and no data-transfer collaborator.
    pub fn connect_to<H>(address: SocketAddr, auto_connect: bool, handler: H) -> Result<Self>
    where
        H: SwitcherHandler + 'static,
    {
        Self::with_config(address, auto_connect, handler, Config::default())
    }

    /// Creates a client with custom configuration.
    pub fn with_config<H>(
        address: SocketAddr,
        auto_connect: bool,
        handler: H,
        config: Config,
    ) -> Result<Self>
    where
        H: SwitcherHandler + 'static,
    {
        Self::with_parts(
            address,
            auto_connect,
            handler,
            NullDataTransfer,
            CodecRegistry::with_builtins(),
            config,
            Arc::new(SystemClock),
        )
    }

    /// Creates a client from all its parts: handler, data-transfer
    /// collaborator, codec registry (pre-loaded with application command
    /// types), configuration and clock.
    pub fn with_parts<H, T>(
        address: SocketAddr,
        auto_connect: bool,
        handler: H,
        transfer: T,
        registry: CodecRegistry,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self>
    where
        H: SwitcherHandler + 'static,
        T: DataTransferHandler + 'static,
    {
        let socket: Arc<dyn Socket> = Arc::new(UdpTransport::connect(address, &config)?);
        let conn = Arc::new(Mutex::new(Connection::new(config.clone(), clock.now())));
        let unique = Arc::new(UniqueQueue::new());
        let (direct_tx, direct_rx) = unbounded();
        let (dispatch_tx, dispatch_rx) = unbounded();
        let version = Arc::new(Mutex::new(ProtocolVersion::CURRENT));
        let handler: Arc<Mutex<dyn SwitcherHandler>> = Arc::new(Mutex::new(handler));
        let running = Arc::new(AtomicBool::new(true));

        let mut threads = Vec::with_capacity(4);

        let dispatch_worker = DispatchWorker {
            items: dispatch_rx,
            registry: Arc::new(registry),
            version: Arc::clone(&version),
            conn: Arc::clone(&conn),
            handler: Arc::clone(&handler),
            transfer: Box::new(transfer),
        };
        threads.push(
            thread::Builder::new()
                .name("switchwire-dispatch".into())
                .spawn(move || dispatch_worker.run())?,
        );

        {
            let socket = Arc::clone(&socket);
            let conn = Arc::clone(&conn);
            let handler = Arc::clone(&handler);
            let dispatch_tx = dispatch_tx.clone();
            let running = Arc::clone(&running);
            let clock = Arc::clone(&clock);
            threads.push(thread::Builder::new().name("switchwire-recv".into()).spawn(
                move || run_receive_worker(socket, conn, handler, dispatch_tx, running, clock),
            )?);
        }

        let send_worker = SendWorker::new(
            Arc::clone(&conn),
            Arc::clone(&socket),
            Arc::clone(&unique),
            direct_rx.clone(),
            Arc::clone(&running),
            Arc::clone(&clock),
            config.clone(),
        );
        threads.push(
            thread::Builder::new()
                .name("switchwire-send".into())
                .spawn(move || send_worker.run())?,
        );

        {
            let conn = Arc::clone(&conn);
            let socket = Arc::clone(&socket);
            let dispatch_tx = dispatch_tx.clone();
            let running = Arc::clone(&running);
            let clock = Arc::clone(&clock);
            let ack_interval = config.ack_interval;
            threads.push(thread::Builder::new().name("switchwire-timer".into()).spawn(
                move || run_timer_worker(conn, socket, dispatch_tx, running, clock, ack_interval),
            )?);
        }

        let client = Self {
            conn,
            socket,
            unique,
            direct_tx,
            direct_rx,
            dispatch_tx,
            version,
            running,
            clock,
            threads,
        };

        if auto_connect {
            client.connect();
        }

        Ok(client)
    }

    /// Starts (or restarts) the handshake toward the switcher.
    ///
    /// Idempotent: returns false when a connect attempt is already under way
    /// or the session is established.
    pub fn connect(&self) -> bool {
        if !self.running.load(Ordering::Relaxed) {
            return false;
        }
        let handshake = self.conn.lock().start_connect(self.clock.now());
        match handshake {
            Some(datagram) => {
                if let Err(e) = self.socket.send_packet(&datagram) {
                    // A lost handshake is re-sent by the timeout path.
                    error!("error sending handshake: {}", e);
                }
                true
            }
            None => false,
        }
    }

    /// Serializes `command` and enqueues it under its queue key; a pending
    /// update with the same key is replaced by this one.
    pub fn send_command<C>(&self, command: &C) -> Result<()>
    where
        C: SwitcherCommand,
    {
        if !self.running.load(Ordering::Relaxed) {
            return Err(ErrorKind::ClientClosed);
        }
        let version = *self.version.lock();
        let block = serialize_command(command, version)?;
        self.unique.enqueue(command.queue_key(), block);
        Ok(())
    }

    /// Appends a message to the direct outbound FIFO, bypassing uniqueness
    /// collapsing entirely.
    pub fn direct_queue_message(&self, message: OutboundMessage) -> Result<()> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(ErrorKind::ClientClosed);
        }
        self.direct_tx
            .send(message)
            .map_err(|_| ErrorKind::ClientClosed)
    }

    /// Returns true while anything is waiting to go on the wire.
    pub fn has_queued_outbound(&self) -> bool {
        !self.unique.is_empty() || !self.direct_rx.is_empty()
    }

    /// The protocol version in effect: the peer's advertisement once it
    /// arrived, a current-firmware assumption before that.
    pub fn connection_version(&self) -> ProtocolVersion {
        *self.version.lock()
    }

    /// Current lifecycle state of the connection.
    pub fn state(&self) -> ConnectionState {
        self.conn.lock().state()
    }

    /// True once the switcher finished its initial status dump.
    pub fn is_initialized(&self) -> bool {
        self.conn.lock().is_initialized()
    }

    /// Snapshot of the session counters.
    pub fn statistics(&self) -> SessionStatistics {
        self.conn.lock().statistics()
    }

    /// Local address of the underlying socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Stops all workers and joins them. Idempotent; also runs on drop.
    pub fn dispose(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.conn.lock().close();
        let _ = self.dispatch_tx.send(DispatchItem::Shutdown);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for SwitcherClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Performs connection actions outside the lock: datagrams to the socket,
/// items to the dispatch worker.
pub(crate) fn perform_actions(
    socket: &dyn Socket,
    dispatch_tx: &Sender<DispatchItem>,
    actions: Vec<Action>,
) {
    for action in actions {
        match action {
            Action::Send(datagram) => {
                if let Err(e) = socket.send_packet(&datagram) {
                    error!("error sending a packet: {}", e);
                }
            }
            Action::Emit(item) => {
                // A closed dispatcher means the client is tearing down.
                let _ = dispatch_tx.send(item);
            }
        }
    }
}

fn run_receive_worker(
    socket: Arc<dyn Socket>,
    conn: Arc<Mutex<Connection>>,
    handler: Arc<Mutex<dyn SwitcherHandler>>,
    dispatch_tx: Sender<DispatchItem>,
    running: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
) {
    // Large enough for any datagram; the switcher sends bursts of small ones.
    let mut buffer = vec![0u8; 1 << 16];

    while running.load(Ordering::Relaxed) {
        let datagram_len = match socket.receive_packet(&mut buffer) {
            Ok(datagram) => datagram.len(),
            Err(e) => {
                match e.kind() {
                    // Read timeout: loop around and re-check the stop flag.
                    io::ErrorKind::WouldBlock
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted => {}
                    _ => {
                        if running.load(Ordering::Relaxed) {
                            debug!("socket receive error: {}", e);
                        }
                    }
                }
                continue;
            }
        };

        let datagram = &buffer[..datagram_len];
        let header = match TransportHeader::parse(datagram) {
            Ok(header) => header,
            Err(e @ ErrorKind::PacketLengthMismatch { .. }) => {
                trace!("discarding datagram: {}", e);
                continue;
            }
            Err(e) => {
                debug!("discarding datagram: {}", e);
                continue;
            }
        };
        let payload = &datagram[TRANSPORT_HEADER_SIZE..];

        handler.lock().on_receive_packet(&header, payload);

        let actions = {
            let mut conn = conn.lock();
            conn.handle_packet(&header, payload, clock.now())
        };
        perform_actions(socket.as_ref(), &dispatch_tx, actions);
    }
}

fn run_timer_worker(
    conn: Arc<Mutex<Connection>>,
    socket: Arc<dyn Socket>,
    dispatch_tx: Sender<DispatchItem>,
    running: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    ack_interval: Duration,
) {
    while running.load(Ordering::Relaxed) {
        thread::sleep(ack_interval);
        if !running.load(Ordering::Relaxed) {
            break;
        }
        let actions = {
            let mut conn = conn.lock();
            conn.tick(clock.now())
        };
        perform_actions(socket.as_ref(), &dispatch_tx, actions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::NullHandler;
    use std::net::UdpSocket;

    fn harness() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (_harness, addr) = harness();
        let mut client = SwitcherClient::connect_to(addr, false, NullHandler).unwrap();

        assert_eq!(client.state(), ConnectionState::Fresh);
        assert!(client.connect());
        assert!(!client.connect());
        assert_eq!(client.state(), ConnectionState::Handshaking);
        client.dispose();
    }

    #[test]
    fn test_auto_connect_sends_handshake() {
        let (harness, addr) = harness();
        let mut client = SwitcherClient::connect_to(addr, true, NullHandler).unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = harness.recv_from(&mut buf).unwrap();
        assert_eq!(len, 20);
        assert_eq!(buf[0], 0x10);
        assert_eq!(buf[1], 0x14);
        client.dispose();
    }

    #[test]
    fn test_queued_outbound_is_visible() {
        let (_harness, addr) = harness();
        let mut client = SwitcherClient::connect_to(addr, false, NullHandler).unwrap();
        assert!(!client.has_queued_outbound());

        let cmd = switchwire_protocol::commands::ProgramInputSetCommand { me: 0, source: 1 };
        client.send_command(&cmd).unwrap();
        assert!(client.has_queued_outbound());
        client.dispose();
    }

    #[test]
    fn test_dispose_is_idempotent_and_closes_api() {
        let (_harness, addr) = harness();
        let mut client = SwitcherClient::connect_to(addr, false, NullHandler).unwrap();
        client.dispose();
        client.dispose();

        let cmd = switchwire_protocol::commands::ProgramInputSetCommand { me: 0, source: 1 };
        assert!(matches!(
            client.send_command(&cmd),
            Err(ErrorKind::ClientClosed)
        ));
        assert!(!client.connect());
    }

    #[test]
    fn test_default_connection_version() {
        let (_harness, addr) = harness();
        let mut client = SwitcherClient::connect_to(addr, false, NullHandler).unwrap();
        assert_eq!(client.connection_version(), ProtocolVersion::CURRENT);
        client.dispose();
    }
}
