//! Socket ownership, handshake, and frame exchange.

use std::io;
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use geckowire_proto::{FrameReader, Hello};

use crate::config::TransportConfig;
use crate::error::{Error, Result};

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionState {
    /// No connection has been made yet.
    Unconnected,
    /// A socket is open and the hello frame has been read.
    Connected,
    /// The socket was closed, by [`close`](crate::Transport::close) or by
    /// the peer.
    Closed,
}

/// The exclusively owned socket of one transport.
#[derive(Debug)]
pub(crate) struct Connection {
    /// Target and timeouts.
    config: TransportConfig,
    /// Open socket, `None` when disconnected.
    stream: Option<TcpStream>,
    /// Reassembly buffer for inbound frames.
    reader: FrameReader,
    /// Current lifecycle state.
    state: ConnectionState,
}

impl Connection {
    /// Creates an unconnected connection.
    pub(crate) const fn new(config: TransportConfig) -> Self {
        Self {
            config,
            stream: None,
            reader: FrameReader::new(),
            state: ConnectionState::Unconnected,
        }
    }

    /// Target and timeouts.
    pub(crate) const fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub(crate) const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns `true` while a socket is held.
    pub(crate) const fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Dials the remote end and reads its hello frame.
    ///
    /// The hello read uses the short hello timeout; the steady-state timeout
    /// is restored afterwards. If dialing fails no socket is kept, so the
    /// next attempt starts clean. If the hello frame cannot be read the
    /// socket is closed as well.
    pub(crate) fn open(&mut self) -> Result<Hello> {
        self.stream = None;
        self.reader.clear();

        let addr = self.config.addr();
        tracing::debug!(%addr, "connecting");
        let stream = TcpStream::connect(addr.as_str()).map_err(|source| {
            tracing::debug!(%addr, error = %source, "connect failed");
            Error::Connect {
                addr: addr.clone(),
                source,
            }
        })?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(socket_timeout(self.config.hello_timeout))?;
        stream.set_write_timeout(socket_timeout(self.config.socket_timeout))?;
        self.stream = Some(stream);
        self.state = ConnectionState::Connected;

        match self.handshake() {
            Ok(hello) => {
                tracing::debug!(
                    %addr,
                    dialect = %hello.dialect(),
                    application_type = ?hello.application_type,
                    "handshake complete"
                );
                Ok(hello)
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "handshake failed");
                self.close();
                Err(e)
            }
        }
    }

    /// Reads the hello frame, then restores the steady-state read timeout.
    fn handshake(&mut self) -> Result<Hello> {
        let raw = self.read_payload(self.config.hello_timeout)?;
        let hello = Hello::parse(&raw)?;
        if let Some(stream) = &self.stream {
            stream.set_read_timeout(socket_timeout(self.config.socket_timeout))?;
        }
        Ok(hello)
    }

    /// Sends one frame.
    pub(crate) fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        let res = geckowire_proto::write_frame(stream, payload, self.config.max_packet_length);
        self.settle(res)
    }

    /// Receives one frame payload, waiting at most `timeout`.
    ///
    /// The socket read timeout is lowered to the time left before each read,
    /// so a peer trickling bytes cannot stretch the wait past `timeout`.
    pub(crate) fn read_payload(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        let res = self.reader.read_frame_with(stream, timeout, |s, left| {
            s.set_read_timeout(socket_timeout(left))
        });
        if let Ok(payload) = &res {
            tracing::trace!(len = payload.len(), "frame read");
        }
        self.settle(res)
    }

    /// Drops the socket when the peer has gone away, so the next send
    /// reconnects.
    fn settle<T>(&mut self, res: geckowire_proto::Result<T>) -> Result<T> {
        if matches!(res, Err(geckowire_proto::Error::ConnectionLost)) {
            tracing::debug!(addr = %self.config.addr(), "connection lost");
            self.close();
        }
        res.map_err(Error::from)
    }

    /// Shuts down and drops the socket. Safe to call repeatedly.
    pub(crate) fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            tracing::debug!(addr = %self.config.addr(), "connection closed");
        }
        self.reader.clear();
        if self.state == ConnectionState::Connected {
            self.state = ConnectionState::Closed;
        }
    }
}

/// Maps a deadline to a socket timeout. A zero timeout is rejected by the
/// OS, so it is clamped to 1 ms.
fn socket_timeout(d: Duration) -> Option<Duration> {
    Some(d.max(Duration::from_millis(1)))
}

/// Error for frame operations without an open socket.
fn not_connected() -> Error {
    io::Error::from(io::ErrorKind::NotConnected).into()
}
