use std::{
    fmt::{self, Display, Formatter},
    io,
};

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Enum with all possible network errors that could occur.
#[derive(Debug)]
pub enum ErrorKind {
    /// Wrapper around a `std::io::Error`.
    IOError(io::Error),
    /// The transport header could not be read from the datagram.
    CouldNotReadHeader(String),
    /// The length declared in the transport header disagrees with the
    /// datagram length; the packet is discarded.
    PacketLengthMismatch {
        /// Length field from the header, in bytes.
        declared: usize,
        /// Actual datagram length, in bytes.
        actual: usize,
    },
    /// A command block declared a length that exceeds the remaining payload;
    /// parsing of the whole datagram is aborted.
    CommandBlockOverrun {
        /// Length field of the offending block, in bytes.
        declared: usize,
        /// Bytes left in the payload at that point.
        remaining: usize,
    },
    /// A command body could not be decoded.
    DecodingError(DecodingErrorKind),
    /// The client has been disposed and no longer accepts work.
    ClientClosed,
}

/// Codec failures surfaced while decoding a single command block.
#[derive(Debug)]
pub enum DecodingErrorKind {
    /// No codec is registered for this name at the active protocol version.
    UnknownCommand([u8; 4]),
    /// The decoder finished with bytes left over and the command type does
    /// not accept trailing bytes.
    TrailingBytes {
        /// Four-byte command name.
        name: [u8; 4],
        /// Number of unconsumed bytes.
        remaining: usize,
    },
    /// The decoder itself failed to read the body.
    Payload {
        /// Four-byte command name.
        name: [u8; 4],
        /// Decoder failure message.
        message: String,
    },
}

/// Renders a four-byte command name, falling back to hex for non-ASCII names.
pub fn command_name(name: &[u8; 4]) -> String {
    if name.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        String::from_utf8_lossy(name).into_owned()
    } else {
        format!("{:02x}{:02x}{:02x}{:02x}", name[0], name[1], name[2], name[3])
    }
}

impl Display for ErrorKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::IOError(e) => write!(fmt, "An IO Error occurred. Reason: {:?}.", e),
            ErrorKind::CouldNotReadHeader(e) => {
                write!(fmt, "The transport header could not be read. Reason: {}.", e)
            }
            ErrorKind::PacketLengthMismatch { declared, actual } => write!(
                fmt,
                "The header declares {} bytes but the datagram holds {}.",
                declared, actual
            ),
            ErrorKind::CommandBlockOverrun { declared, remaining } => write!(
                fmt,
                "A command block declares {} bytes but only {} remain.",
                declared, remaining
            ),
            ErrorKind::DecodingError(e) => {
                write!(fmt, "A command could not be decoded. Reason: {}.", e)
            }
            ErrorKind::ClientClosed => write!(fmt, "The client has been disposed."),
        }
    }
}

impl Display for DecodingErrorKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DecodingErrorKind::UnknownCommand(name) => {
                write!(fmt, "unknown command '{}'", command_name(name))
            }
            DecodingErrorKind::TrailingBytes { name, remaining } => write!(
                fmt,
                "command '{}' left {} trailing bytes",
                command_name(name),
                remaining
            ),
            DecodingErrorKind::Payload { name, message } => {
                write!(fmt, "command '{}' body: {}", command_name(name), message)
            }
        }
    }
}

impl std::error::Error for ErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ErrorKind::IOError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ErrorKind {
    fn from(inner: io::Error) -> Self {
        ErrorKind::IOError(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name_ascii() {
        assert_eq!(command_name(b"PrgI"), "PrgI");
    }

    #[test]
    fn test_command_name_binary_falls_back_to_hex() {
        assert_eq!(command_name(&[0x00, 0x01, 0xFF, b'A']), "0001ff41");
    }

    #[test]
    fn test_io_error_conversion() {
        let err: ErrorKind = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, ErrorKind::IOError(_)));
    }

    #[test]
    fn test_display_length_mismatch() {
        let err = ErrorKind::PacketLengthMismatch { declared: 20, actual: 12 };
        assert_eq!(
            err.to_string(),
            "The header declares 20 bytes but the datagram holds 12."
        );
    }
}
