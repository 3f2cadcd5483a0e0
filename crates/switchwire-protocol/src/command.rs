//! Command-block framing inside a datagram payload.
//!
//! A payload is a sequence of blocks, each `length` (u16, includes the 8
//! header bytes), two reserved bytes, a 4-byte ASCII name, and `length - 8`
//! bytes of body. Parsing is strict: a block whose declared length runs past
//! the remaining payload aborts the whole datagram.

use byteorder::{BigEndian, ByteOrder};
use switchwire_core::{
    constants::COMMAND_HEADER_SIZE,
    error::{command_name, ErrorKind, Result},
};

/// A framed command as it appears on the wire: a name and an opaque body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawCommand {
    /// Four ASCII bytes identifying the command type.
    pub name: [u8; 4],
    /// The command body, without the block header.
    pub body: Vec<u8>,
}

impl RawCommand {
    /// Creates a raw command from a name and body.
    pub fn new(name: [u8; 4], body: Vec<u8>) -> Self {
        Self { name, body }
    }

    /// Returns the command name rendered for humans.
    pub fn display_name(&self) -> String {
        command_name(&self.name)
    }

    /// Size of this command once framed, header included.
    pub fn encoded_len(&self) -> usize {
        COMMAND_HEADER_SIZE + self.body.len()
    }
}

/// Parses every command block out of a datagram payload.
pub fn parse_blocks(payload: &[u8]) -> Result<Vec<RawCommand>> {
    let mut commands = Vec::new();
    let mut offset = 0;

    while offset < payload.len() {
        let remaining = payload.len() - offset;
        if remaining < COMMAND_HEADER_SIZE {
            return Err(ErrorKind::CommandBlockOverrun { declared: remaining, remaining });
        }

        let length = BigEndian::read_u16(&payload[offset..]) as usize;
        if length < COMMAND_HEADER_SIZE || length > remaining {
            return Err(ErrorKind::CommandBlockOverrun { declared: length, remaining });
        }

        // Two reserved bytes between the length and the name are skipped.
        let mut name = [0u8; 4];
        name.copy_from_slice(&payload[offset + 4..offset + 8]);
        let body = payload[offset + COMMAND_HEADER_SIZE..offset + length].to_vec();

        commands.push(RawCommand { name, body });
        offset += length;
    }

    Ok(commands)
}

/// Appends one framed command block to `buffer`.
pub fn write_block(buffer: &mut Vec<u8>, name: [u8; 4], body: &[u8]) {
    let length = (COMMAND_HEADER_SIZE + body.len()) as u16;
    buffer.extend_from_slice(&length.to_be_bytes());
    buffer.extend_from_slice(&[0, 0]);
    buffer.extend_from_slice(&name);
    buffer.extend_from_slice(body);
}

/// Serializes a sequence of raw commands into one payload.
pub fn write_blocks(commands: &[RawCommand]) -> Vec<u8> {
    let total = commands.iter().map(RawCommand::encoded_len).sum();
    let mut buffer = Vec::with_capacity(total);
    for command in commands {
        write_block(&mut buffer, command.name, &command.body);
    }
    buffer
}
