//! Readiness probe for a remote end that is still starting up.

use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::config::ProbeConfig;

/// Waits until something speaking the framed protocol listens on `host:port`.
///
/// Each attempt opens a throwaway connection and reads up to 16 bytes; a
/// `:` in them means a hello frame is on its way. Refused or failed attempts
/// are retried every `poll_interval` until `timeout` has passed, at which
/// point `false` is returned. The probe socket is closed after every attempt.
pub fn wait_for_port(host: &str, port: u16, config: &ProbeConfig) -> bool {
    let addr = format!("{host}:{port}");
    let started = Instant::now();
    loop {
        let remaining = config.timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            break;
        }
        match probe_once(&addr, remaining) {
            Ok(true) => {
                tracing::debug!(%addr, elapsed = ?started.elapsed(), "remote end is ready");
                return true;
            }
            Ok(false) => tracing::trace!(%addr, "listener did not send a frame prefix"),
            Err(e) => tracing::trace!(%addr, error = %e, "probe attempt failed"),
        }
        std::thread::sleep(config.poll_interval.min(remaining));
    }
    tracing::debug!(%addr, timeout = ?config.timeout, "remote end did not become ready");
    false
}

/// One connect-and-peek attempt, finished within `budget`.
fn probe_once(addr: &str, budget: Duration) -> io::Result<bool> {
    let started = Instant::now();
    let mut sock = connect_within(addr, budget)?;
    let left = budget.saturating_sub(started.elapsed());
    sock.set_read_timeout(Some(left.max(Duration::from_millis(1))))?;
    let mut buf = [0u8; 16];
    let n = sock.read(&mut buf)?;
    Ok(buf[..n].contains(&b':'))
}

/// Dials each address `addr` resolves to, giving up once `budget` is spent.
fn connect_within(addr: &str, budget: Duration) -> io::Result<TcpStream> {
    let started = Instant::now();
    let mut last_err = None;
    for sock_addr in addr.to_socket_addrs()? {
        let left = budget.saturating_sub(started.elapsed());
        if left.is_zero() {
            return Err(io::ErrorKind::TimedOut.into());
        }
        match TcpStream::connect_timeout(&sock_addr, left) {
            Ok(sock) => return Ok(sock),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("{addr} resolved to no address"))
    }))
}
