//! Codec registry mapping `(name, protocol version)` to typed decoders.
//!
//! Decoding is a startup-time registry of explicit registrations rather than
//! runtime type discovery: each command type contributes a [`CommandSpec`]
//! holding its decode function, the protocol version it first appeared in and
//! whether it tolerates trailing body bytes (types that grow across firmware
//! revisions).

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    io::Cursor,
};

use switchwire_core::error::{DecodingErrorKind, ErrorKind, Result};

use crate::command::{write_block, RawCommand};

/// Protocol version advertised by the switcher early in the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    /// Major revision.
    pub major: u16,
    /// Minor revision.
    pub minor: u16,
}

impl ProtocolVersion {
    /// Oldest revision this library speaks.
    pub const MINIMUM: ProtocolVersion = ProtocolVersion { major: 2, minor: 21 };
    /// Revision assumed until the peer advertises one.
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 2, minor: 28 };

    /// Creates a version from its two components.
    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A decoded inbound command.
///
/// Concrete command types are recovered by downcasting through [`as_any`]:
///
/// ```ignore
/// if let Some(prgi) = cmd.as_any().downcast_ref::<ProgramInputCommand>() {
///     println!("ME {} shows source {}", prgi.me, prgi.source);
/// }
/// ```
///
/// [`as_any`]: ReceivedCommand::as_any
pub trait ReceivedCommand: fmt::Debug + Send {
    /// The four-byte wire name of this command type.
    fn name(&self) -> [u8; 4];

    /// Upcast for downcasting to the concrete command type.
    fn as_any(&self) -> &dyn Any;
}

/// An outbound command that can be serialized for transmission.
pub trait SwitcherCommand: Send {
    /// The four-byte wire name of this command type.
    fn name(&self) -> [u8; 4];

    /// Key under which pending updates of this command collapse in the
    /// outbound queue. Defaults to the command type identity; override with
    /// a scoped key when updates to distinct targets must not collapse.
    fn queue_key(&self) -> QueueKey {
        QueueKey::of_type(self.name())
    }

    /// Appends the serialized body for the given protocol version.
    fn write_body(&self, buffer: &mut Vec<u8>, version: ProtocolVersion) -> std::io::Result<()>;
}

/// Serializes an outbound command into a complete framed block.
pub fn serialize_command(
    command: &dyn SwitcherCommand,
    version: ProtocolVersion,
) -> std::io::Result<Vec<u8>> {
    let mut body = Vec::new();
    command.write_body(&mut body, version)?;
    let mut block = Vec::with_capacity(body.len() + 8);
    write_block(&mut block, command.name(), &body);
    Ok(block)
}

/// Uniqueness key for the outbound queue.
///
/// Two pending commands with equal keys collapse to the latest value. The
/// `instance` discriminator scopes the key below the type level, e.g. one key
/// per mix-effect bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueueKey {
    /// Command type identity.
    pub name: [u8; 4],
    /// Sub-type discriminator, zero when the type itself is the key.
    pub instance: u16,
}

impl QueueKey {
    /// Key covering every instance of a command type.
    pub fn of_type(name: [u8; 4]) -> Self {
        Self { name, instance: 0 }
    }

    /// Key scoped to one instance of a command type.
    pub fn scoped(name: [u8; 4], instance: u16) -> Self {
        Self { name, instance }
    }
}

/// Decode function: reads a command body from the cursor.
///
/// The cursor starts at the beginning of the body; the registry checks the
/// final position against the trailing-bytes policy of the [`CommandSpec`].
pub type DecodeFn =
    fn(&mut Cursor<&[u8]>, ProtocolVersion) -> std::io::Result<Box<dyn ReceivedCommand>>;

/// Registration record for one command type at one protocol revision.
pub struct CommandSpec {
    /// Four-byte wire name.
    pub name: [u8; 4],
    /// First protocol version this layout applies to.
    pub since: ProtocolVersion,
    /// Whether unconsumed body bytes are tolerated (versioned growth).
    pub accepts_trailing: bool,
    /// Body decoder.
    pub decode: DecodeFn,
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &switchwire_core::error::command_name(&self.name))
            .field("since", &self.since)
            .field("accepts_trailing", &self.accepts_trailing)
            .finish()
    }
}

/// Registry of command decoders keyed by name and protocol version.
#[derive(Debug, Default)]
pub struct CodecRegistry {
    entries: HashMap<[u8; 4], Vec<CommandSpec>>,
}

impl CodecRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with the built-in command set.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::commands::register_builtins(&mut registry);
        registry
    }

    /// Registers a command spec. Specs for the same name are kept ordered by
    /// the version they apply from.
    pub fn register(&mut self, spec: CommandSpec) {
        let specs = self.entries.entry(spec.name).or_default();
        specs.push(spec);
        specs.sort_by_key(|s| s.since);
    }

    /// Looks up the decoder for `name` active at `version`: the registered
    /// spec with the highest `since` not exceeding `version`.
    pub fn find(&self, name: [u8; 4], version: ProtocolVersion) -> Option<&CommandSpec> {
        self.entries
            .get(&name)?
            .iter()
            .rev()
            .find(|spec| spec.since <= version)
    }

    /// Decodes one framed command at the given protocol version.
    ///
    /// Unknown names and trailing-byte violations surface as
    /// [`ErrorKind::DecodingError`]; the caller decides whether to drop the
    /// single command or the whole batch.
    pub fn decode_block(
        &self,
        raw: &RawCommand,
        version: ProtocolVersion,
    ) -> Result<Box<dyn ReceivedCommand>> {
        let spec = self
            .find(raw.name, version)
            .ok_or(ErrorKind::DecodingError(DecodingErrorKind::UnknownCommand(raw.name)))?;

        let mut cursor = Cursor::new(raw.body.as_slice());
        let command = (spec.decode)(&mut cursor, version).map_err(|e| {
            ErrorKind::DecodingError(DecodingErrorKind::Payload {
                name: raw.name,
                message: e.to_string(),
            })
        })?;

        let remaining = raw.body.len() as u64 - cursor.position();
        if remaining > 0 && !spec.accepts_trailing {
            return Err(ErrorKind::DecodingError(DecodingErrorKind::TrailingBytes {
                name: raw.name,
                remaining: remaining as usize,
            }));
        }

        Ok(command)
    }

    /// Number of distinct command names registered.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
