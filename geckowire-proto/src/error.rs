//! Error types for wire-level operations.

use std::io;
use std::time::Duration;

/// Alias for `Result<T, geckowire_proto::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while framing, reading, or decoding messages.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The peer closed its end of the connection.
    #[error(
        "connection to the remote end is lost; check the browser log for errors"
    )]
    ConnectionLost,

    /// No complete frame arrived before the deadline.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// The length prefix is missing, not decimal, or too long.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The frame payload is not the JSON shape the dialect expects.
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is valid JSON but breaks the message protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Any other socket error.
    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero => Self::ConnectionLost,
            _ => Self::Io(e),
        }
    }
}
