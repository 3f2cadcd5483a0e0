//! Built-in command types.
//!
//! The full device catalogue runs to hundreds of commands and lives with the
//! application; this module carries the commands the transport itself needs
//! (version negotiation, initialization tracking) plus a small set of status
//! and control commands that exercise the registry end to end. Applications
//! register further types through [`CodecRegistry::register`].

use std::{any::Any, io, io::Cursor};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::codec::{
    CodecRegistry, CommandSpec, ProtocolVersion, QueueKey, ReceivedCommand, SwitcherCommand,
};

// ============================================================================
// Inbound status commands
// ============================================================================

/// Protocol version advertised by the switcher (`_ver`).
///
/// Arrives first in the initial status dump; the dispatcher records it as the
/// connection version used to key all subsequent decodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProtocolVersionCommand {
    /// Advertised protocol revision.
    pub version: ProtocolVersion,
}

/// Wire name of [`ProtocolVersionCommand`].
pub const VERSION_NAME: [u8; 4] = *b"_ver";

impl ReceivedCommand for ProtocolVersionCommand {
    fn name(&self) -> [u8; 4] {
        VERSION_NAME
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn decode_version(
    cursor: &mut Cursor<&[u8]>,
    _version: ProtocolVersion,
) -> io::Result<Box<dyn ReceivedCommand>> {
    let major = cursor.read_u16::<BigEndian>()?;
    let minor = cursor.read_u16::<BigEndian>()?;
    Ok(Box::new(ProtocolVersionCommand { version: ProtocolVersion::new(major, minor) }))
}

/// End of the initial status dump (`InCm`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InitializationCompleteCommand;

/// Wire name of [`InitializationCompleteCommand`].
pub const INIT_COMPLETE_NAME: [u8; 4] = *b"InCm";

impl ReceivedCommand for InitializationCompleteCommand {
    fn name(&self) -> [u8; 4] {
        INIT_COMPLETE_NAME
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn decode_init_complete(
    cursor: &mut Cursor<&[u8]>,
    _version: ProtocolVersion,
) -> io::Result<Box<dyn ReceivedCommand>> {
    // One meaningful byte followed by padding.
    let _ = cursor.read_u8()?;
    Ok(Box::new(InitializationCompleteCommand))
}

/// Device timecode status (`Time`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimecodeCommand {
    /// Hours component.
    pub hour: u8,
    /// Minutes component.
    pub minute: u8,
    /// Seconds component.
    pub second: u8,
    /// Frame number within the second.
    pub frame: u8,
}

/// Wire name of [`TimecodeCommand`].
pub const TIMECODE_NAME: [u8; 4] = *b"Time";

impl ReceivedCommand for TimecodeCommand {
    fn name(&self) -> [u8; 4] {
        TIMECODE_NAME
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn decode_timecode(
    cursor: &mut Cursor<&[u8]>,
    _version: ProtocolVersion,
) -> io::Result<Box<dyn ReceivedCommand>> {
    Ok(Box::new(TimecodeCommand {
        hour: cursor.read_u8()?,
        minute: cursor.read_u8()?,
        second: cursor.read_u8()?,
        frame: cursor.read_u8()?,
    }))
}

/// Program bus status for one mix-effect bank (`PrgI`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramInputCommand {
    /// Mix-effect bank index.
    pub me: u8,
    /// Source currently on the program bus.
    pub source: u16,
}

/// Wire name of [`ProgramInputCommand`].
pub const PROGRAM_INPUT_NAME: [u8; 4] = *b"PrgI";

impl ReceivedCommand for ProgramInputCommand {
    fn name(&self) -> [u8; 4] {
        PROGRAM_INPUT_NAME
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// Sources were a single byte before 2.28 widened the field.
fn decode_program_input_legacy(
    cursor: &mut Cursor<&[u8]>,
    _version: ProtocolVersion,
) -> io::Result<Box<dyn ReceivedCommand>> {
    let me = cursor.read_u8()?;
    let source = u16::from(cursor.read_u8()?);
    Ok(Box::new(ProgramInputCommand { me, source }))
}

fn decode_program_input(
    cursor: &mut Cursor<&[u8]>,
    _version: ProtocolVersion,
) -> io::Result<Box<dyn ReceivedCommand>> {
    let me = cursor.read_u8()?;
    let _ = cursor.read_u8()?; // padding
    let source = cursor.read_u16::<BigEndian>()?;
    Ok(Box::new(ProgramInputCommand { me, source }))
}

// ============================================================================
// Outbound control commands
// ============================================================================

/// Cuts a source onto the program bus of one mix-effect bank (`CPgI`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramInputSetCommand {
    /// Mix-effect bank index.
    pub me: u8,
    /// Source to place on the program bus.
    pub source: u16,
}

impl SwitcherCommand for ProgramInputSetCommand {
    fn name(&self) -> [u8; 4] {
        *b"CPgI"
    }

    fn queue_key(&self) -> QueueKey {
        QueueKey::scoped(self.name(), u16::from(self.me))
    }

    fn write_body(&self, buffer: &mut Vec<u8>, _version: ProtocolVersion) -> io::Result<()> {
        buffer.write_u8(self.me)?;
        buffer.write_u8(0)?;
        buffer.write_u16::<BigEndian>(self.source)
    }
}

/// Moves the transition fader of one mix-effect bank (`CTPs`).
///
/// Position is expressed in ten-thousandths: 0 is fully up, 10000 fully down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionPositionSetCommand {
    /// Mix-effect bank index.
    pub me: u8,
    /// Fader position, 0..=10000.
    pub position: u16,
}

impl SwitcherCommand for TransitionPositionSetCommand {
    fn name(&self) -> [u8; 4] {
        *b"CTPs"
    }

    fn queue_key(&self) -> QueueKey {
        QueueKey::scoped(self.name(), u16::from(self.me))
    }

    fn write_body(&self, buffer: &mut Vec<u8>, _version: ProtocolVersion) -> io::Result<()> {
        buffer.write_u8(self.me)?;
        buffer.write_u8(0)?;
        buffer.write_u16::<BigEndian>(self.position)
    }
}

/// Registers the built-in command set into `registry`.
pub fn register_builtins(registry: &mut CodecRegistry) {
    registry.register(CommandSpec {
        name: VERSION_NAME,
        since: ProtocolVersion::MINIMUM,
        accepts_trailing: false,
        decode: decode_version,
    });
    registry.register(CommandSpec {
        name: INIT_COMPLETE_NAME,
        since: ProtocolVersion::MINIMUM,
        accepts_trailing: true,
        decode: decode_init_complete,
    });
    registry.register(CommandSpec {
        name: TIMECODE_NAME,
        since: ProtocolVersion::MINIMUM,
        accepts_trailing: true,
        decode: decode_timecode,
    });
    registry.register(CommandSpec {
        name: PROGRAM_INPUT_NAME,
        since: ProtocolVersion::MINIMUM,
        accepts_trailing: false,
        decode: decode_program_input_legacy,
    });
    registry.register(CommandSpec {
        name: PROGRAM_INPUT_NAME,
        since: ProtocolVersion::new(2, 28),
        accepts_trailing: false,
        decode: decode_program_input,
    });
}
