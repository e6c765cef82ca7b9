//! Error types for geckowire operations.

use std::io;

use geckowire_proto::Response;

/// Alias for `Result<T, geckowire::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by transport operations.
///
/// None of these are retried internally: the transport cannot tell whether
/// a request was applied before the connection dropped.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Dialing the remote end failed.
    #[error("failed to connect to {addr}")]
    Connect {
        /// The `host:port` that was dialed.
        addr: String,
        /// The underlying socket error.
        #[source]
        source: io::Error,
    },

    /// A response arrived whose id matches no pending request.
    #[error("received unexpected response: {0}")]
    UnexpectedResponse(Box<Response>),

    /// Framing, timeout, or decoding failure on the wire.
    #[error(transparent)]
    Wire(#[from] geckowire_proto::Error),

    /// An I/O error outside frame exchange, e.g. configuring the socket.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns `true` if the peer hung up.
    pub const fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Wire(geckowire_proto::Error::ConnectionLost))
    }

    /// Returns `true` if no complete frame arrived in time.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Wire(geckowire_proto::Error::Timeout(_)))
    }

    /// Returns `true` for messages that break the protocol: an uncorrelated
    /// response or an unknown message type.
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedResponse(_) | Self::Wire(geckowire_proto::Error::ProtocolViolation(_))
        )
    }

    /// Returns `true` if a frame or its payload could not be parsed.
    pub const fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Wire(geckowire_proto::Error::MalformedFrame(_) | geckowire_proto::Error::Json(_))
        )
    }
}
