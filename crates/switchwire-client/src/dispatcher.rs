//! Receive dispatcher: ordered command blocks in, user callbacks out.
//!
//! The dispatch worker is the only place decoded commands exist before user
//! code sees them. It owns the data-transfer collaborator outright, so the
//! collaborator never needs its own synchronization.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::debug;

use switchwire_core::error::{DecodingErrorKind, ErrorKind};
use switchwire_protocol::{
    commands::{InitializationCompleteCommand, ProtocolVersionCommand},
    CodecRegistry, ProtocolVersion, RawCommand, ReceivedCommand,
};

use crate::{connection::Connection, handler::SwitcherHandler, transfer::DataTransferHandler};

/// Work items flowing from the receive and timer workers to the dispatcher.
#[derive(Debug)]
pub enum DispatchItem {
    /// A handshake completed; fire the connection-up signal.
    Connected,
    /// An established session timed out.
    Disconnected,
    /// One inbound packet's commands, already in stream order.
    Batch(Vec<RawCommand>),
    /// Tear the worker down.
    Shutdown,
}

pub(crate) struct DispatchWorker {
    pub items: Receiver<DispatchItem>,
    pub registry: Arc<CodecRegistry>,
    pub version: Arc<Mutex<ProtocolVersion>>,
    pub conn: Arc<Mutex<Connection>>,
    pub handler: Arc<Mutex<dyn SwitcherHandler>>,
    pub transfer: Box<dyn DataTransferHandler>,
}

impl DispatchWorker {
    pub fn run(mut self) {
        loop {
            match self.items.recv() {
                Ok(DispatchItem::Shutdown) | Err(_) => break,
                Ok(DispatchItem::Connected) => {
                    self.transfer.reset();
                    self.handler.lock().on_connected();
                }
                Ok(DispatchItem::Disconnected) => self.handler.lock().on_disconnected(),
                Ok(DispatchItem::Batch(commands)) => self.dispatch_batch(commands),
            }
        }
        self.transfer.dispose();
    }

    fn dispatch_batch(&mut self, raws: Vec<RawCommand>) {
        let mut batch: Vec<Box<dyn ReceivedCommand>> = Vec::new();

        for raw in raws {
            // Re-read per command: a version advertisement applies to the
            // commands that follow it, even within the same batch.
            let version = *self.version.lock();
            match self.registry.decode_block(&raw, version) {
                Ok(command) => {
                    self.note_transport_commands(command.as_ref());
                    if self.transfer.handle(command.as_ref()) {
                        continue;
                    }
                    batch.push(command);
                }
                Err(ErrorKind::DecodingError(DecodingErrorKind::UnknownCommand(_))) => {
                    debug!(
                        name = %raw.display_name(),
                        body = %hex_dump(&raw.body),
                        "skipping unknown command"
                    );
                }
                Err(e) => debug!(name = %raw.display_name(), "dropping command: {}", e),
            }
        }

        if !batch.is_empty() {
            self.handler.lock().on_receive(batch);
        }
    }

    /// Commands the transport itself consumes state from before delivery.
    fn note_transport_commands(&self, command: &dyn ReceivedCommand) {
        if let Some(advertised) = command.as_any().downcast_ref::<ProtocolVersionCommand>() {
            debug!(version = %advertised.version, "peer advertised protocol version");
            *self.version.lock() = advertised.version;
        } else if command
            .as_any()
            .downcast_ref::<InitializationCompleteCommand>()
            .is_some()
        {
            self.conn.lock().mark_init_complete();
        }
    }
}

fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Instant};

    use crossbeam_channel::unbounded;
    use switchwire_core::config::Config;
    use switchwire_protocol::commands::{ProgramInputCommand, TimecodeCommand};

    #[derive(Default)]
    struct Recording {
        connects: usize,
        disconnects: usize,
        received: Vec<String>,
    }

    struct RecordingHandler(Arc<Mutex<Recording>>);

    impl SwitcherHandler for RecordingHandler {
        fn on_connected(&mut self) {
            self.0.lock().connects += 1;
        }
        fn on_disconnected(&mut self) {
            self.0.lock().disconnects += 1;
        }
        fn on_receive(&mut self, commands: Vec<Box<dyn ReceivedCommand>>) {
            let mut recording = self.0.lock();
            for command in commands {
                recording.received.push(command.display_name());
            }
        }
    }

    trait DisplayName {
        fn display_name(&self) -> String;
    }
    impl DisplayName for Box<dyn ReceivedCommand> {
        fn display_name(&self) -> String {
            switchwire_core::error::command_name(&self.name())
        }
    }

    struct ClaimTimecode {
        resets: Arc<Mutex<usize>>,
    }

    impl DataTransferHandler for ClaimTimecode {
        fn handle(&mut self, command: &dyn ReceivedCommand) -> bool {
            command.as_any().downcast_ref::<TimecodeCommand>().is_some()
        }
        fn reset(&mut self) {
            *self.resets.lock() += 1;
        }
    }

    fn run_worker(
        items: Vec<DispatchItem>,
        transfer: Box<dyn DataTransferHandler>,
    ) -> (Arc<Mutex<Recording>>, Arc<Mutex<ProtocolVersion>>) {
        let (tx, rx) = unbounded();
        let recording = Arc::new(Mutex::new(Recording::default()));
        let version = Arc::new(Mutex::new(ProtocolVersion::MINIMUM));
        let worker = DispatchWorker {
            items: rx,
            registry: Arc::new(CodecRegistry::with_builtins()),
            version: Arc::clone(&version),
            conn: Arc::new(Mutex::new(Connection::new(Config::default(), Instant::now()))),
            handler: Arc::new(Mutex::new(RecordingHandler(Arc::clone(&recording)))),
            transfer,
        };

        let join = thread::spawn(move || worker.run());
        for item in items {
            tx.send(item).unwrap();
        }
        tx.send(DispatchItem::Shutdown).unwrap();
        join.join().unwrap();

        (recording, version)
    }

    #[test]
    fn test_unknown_command_is_skipped_batch_survives() {
        let batch = vec![
            RawCommand::new(*b"ZZZZ", vec![1, 2, 3]),
            RawCommand::new(*b"Time", vec![1, 2, 3, 4]),
        ];
        let (recording, _) =
            run_worker(vec![DispatchItem::Batch(batch)], Box::new(crate::transfer::NullDataTransfer));
        assert_eq!(recording.lock().received, vec!["Time"]);
    }

    #[test]
    fn test_version_advertisement_rekeys_later_decodes() {
        // Wide-source PrgI body only decodes under the 2.28 layout; the _ver
        // in front of it must switch the registry key mid-batch.
        let batch = vec![
            RawCommand::new(*b"_ver", vec![0x00, 0x02, 0x00, 0x1C]),
            RawCommand::new(*b"PrgI", vec![1, 0, 0x0B, 0xC2]),
        ];
        let (recording, version) =
            run_worker(vec![DispatchItem::Batch(batch)], Box::new(crate::transfer::NullDataTransfer));
        assert_eq!(*version.lock(), ProtocolVersion::new(2, 28));
        assert_eq!(recording.lock().received, vec!["_ver", "PrgI"]);
    }

    #[test]
    fn test_transfer_claims_are_consumed_silently() {
        let resets = Arc::new(Mutex::new(0));
        let batch = vec![
            RawCommand::new(*b"Time", vec![1, 2, 3, 4]),
            RawCommand::new(*b"PrgI", vec![1, 4]),
        ];
        let (recording, _) = run_worker(
            vec![DispatchItem::Connected, DispatchItem::Batch(batch)],
            Box::new(ClaimTimecode { resets: Arc::clone(&resets) }),
        );

        let recording = recording.lock();
        assert_eq!(recording.connects, 1);
        assert_eq!(recording.received, vec!["PrgI"]);
        assert_eq!(*resets.lock(), 1);
    }

    #[test]
    fn test_connection_signals_reach_the_handler() {
        let (recording, _) = run_worker(
            vec![DispatchItem::Connected, DispatchItem::Disconnected, DispatchItem::Connected],
            Box::new(crate::transfer::NullDataTransfer),
        );
        let recording = recording.lock();
        assert_eq!(recording.connects, 2);
        assert_eq!(recording.disconnects, 1);
    }

    #[test]
    fn test_hex_dump_formats_bytes() {
        assert_eq!(hex_dump(&[0x00, 0xAB, 0x10]), "00ab10");
    }

    #[test]
    fn test_decoded_program_input_downcasts() {
        let registry = CodecRegistry::with_builtins();
        let raw = RawCommand::new(*b"PrgI", vec![0, 5]);
        let decoded = registry.decode_block(&raw, ProtocolVersion::MINIMUM).unwrap();
        let prgi = decoded.as_any().downcast_ref::<ProgramInputCommand>().unwrap();
        assert_eq!(prgi.source, 5);
    }
}
