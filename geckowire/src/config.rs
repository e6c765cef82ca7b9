//! Connection and probe parameters.

use std::time::Duration;

use geckowire_proto::MAX_PACKET_LENGTH;

/// Default Marionette listening port.
pub const DEFAULT_PORT: u16 = 2828;

/// Parameters for a [`Transport`](crate::Transport).
///
/// Defaults: `127.0.0.1:2828`, 360 s socket timeout, 2 s hello timeout,
/// 4096-byte writes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
#[must_use]
pub struct TransportConfig {
    /// Host name or address of the remote end.
    pub host: String,
    /// TCP port of the remote end.
    pub port: u16,
    /// Overall deadline for assembling one frame in steady state.
    pub socket_timeout: Duration,
    /// Deadline for the hello frame read right after connecting.
    pub hello_timeout: Duration,
    /// Largest single socket write.
    pub max_packet_length: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: DEFAULT_PORT,
            socket_timeout: Duration::from_secs(360),
            hello_timeout: Duration::from_secs(2),
            max_packet_length: MAX_PACKET_LENGTH,
        }
    }
}

impl TransportConfig {
    /// Targets `host:port` with default timeouts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Sets the steady-state frame deadline (default: 360 s).
    pub const fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Sets the hello frame deadline (default: 2 s).
    pub const fn hello_timeout(mut self, timeout: Duration) -> Self {
        self.hello_timeout = timeout;
        self
    }

    /// Sets the largest single write (default: 4096 bytes).
    pub const fn max_packet_length(mut self, len: usize) -> Self {
        self.max_packet_length = len;
        self
    }

    /// `host:port` as dialed.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parameters for [`wait_for_port`](crate::wait_for_port).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[must_use]
pub struct ProbeConfig {
    /// Give up once this much time has passed.
    pub timeout: Duration,
    /// Pause between attempts.
    pub poll_interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl ProbeConfig {
    /// Sets the overall deadline (default: 60 s).
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the pause between attempts (default: 100 ms).
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
