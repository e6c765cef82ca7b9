//! Length-prefixed frame codec over any `Read`/`Write` stream.
//!
//! Each frame is: `<N>:<payload>`, where `N` is the decimal byte length of
//! `payload`. Frame boundaries come from the prefix alone; how the bytes were
//! split across socket writes does not matter.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Largest single write issued by [`write_frame`] by default.
pub const MAX_PACKET_LENGTH: usize = 4096;

/// Bytes requested per read while looking for the `:` separator.
pub const PREFIX_READ_LEN: usize = 10;

/// Longest length prefix accepted before the separator must appear.
pub const MAX_PREFIX_LEN: usize = 20;

/// Prepends the `<len>:` header to `payload`.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = format!("{}:", payload.len()).into_bytes();
    frame.extend_from_slice(payload);
    frame
}

/// Writes `payload` as one frame, in writes of at most `max_packet` bytes.
///
/// A peer that has gone away surfaces as [`Error::ConnectionLost`].
pub fn write_frame<W: Write + ?Sized>(
    w: &mut W,
    payload: &[u8],
    max_packet: usize,
) -> Result<()> {
    let frame = encode_frame(payload);
    for packet in frame.chunks(max_packet.max(1)) {
        w.write_all(packet)?;
    }
    w.flush()?;
    tracing::trace!(len = payload.len(), "frame written");
    Ok(())
}

/// Reassembles frames from a stream that may deliver them in arbitrary pieces.
///
/// While the length prefix is unknown the reader asks for
/// [`PREFIX_READ_LEN`] bytes at a time; afterwards it asks for exactly the
/// bytes still missing. Bytes that arrive past the end of a frame are kept
/// and start the next one.
#[derive(Debug, Default)]
pub struct FrameReader {
    /// Bytes received but not yet returned as a frame.
    buf: Vec<u8>,
}

impl FrameReader {
    /// Creates an empty reader.
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Number of bytes held for the next frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drops any buffered bytes, e.g. after the stream was replaced.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Reads one complete frame payload from `r`.
    ///
    /// Reads that fail with `WouldBlock`, `TimedOut`, or `Interrupted` are
    /// retried until `timeout` has elapsed, after which [`Error::Timeout`] is
    /// returned. A read of zero bytes means the peer closed the stream.
    pub fn read_frame<R: Read + ?Sized>(
        &mut self,
        r: &mut R,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.read_frame_with(r, timeout, |_, _| Ok(()))
    }

    /// Like [`read_frame`](Self::read_frame), but calls `arm` with the time
    /// left before every read.
    ///
    /// A blocking source uses `arm` to bound each read by the remaining
    /// deadline, e.g. through `TcpStream::set_read_timeout`.
    pub fn read_frame_with<R, F>(
        &mut self,
        r: &mut R,
        timeout: Duration,
        mut arm: F,
    ) -> Result<Vec<u8>>
    where
        R: Read + ?Sized,
        F: FnMut(&mut R, Duration) -> io::Result<()>,
    {
        let started = Instant::now();
        let mut chunk = [0u8; MAX_PACKET_LENGTH];
        loop {
            let want = match parse_header(&self.buf)? {
                Some((start, len)) => {
                    let end = start.checked_add(len).ok_or_else(|| {
                        Error::MalformedFrame(format!("declared length {len} overflows"))
                    })?;
                    if self.buf.len() >= end {
                        return Ok(self.take_frame(start, end));
                    }
                    end - self.buf.len()
                }
                None => PREFIX_READ_LEN,
            };

            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(Error::Timeout(timeout));
            }
            arm(r, remaining)?;

            let n = want.min(chunk.len());
            match r.read(&mut chunk[..n]) {
                Ok(0) => return Err(Error::ConnectionLost),
                Ok(read) => self.buf.extend_from_slice(&chunk[..read]),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock
                            | io::ErrorKind::TimedOut
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Splits `buf[start..end]` off as a frame, keeping what follows.
    fn take_frame(&mut self, start: usize, end: usize) -> Vec<u8> {
        let rest = self.buf.split_off(end);
        let mut frame = std::mem::replace(&mut self.buf, rest);
        frame.drain(..start);
        if !self.buf.is_empty() {
            tracing::trace!(buffered = self.buf.len(), "bytes held for next frame");
        }
        frame
    }
}

/// Locates the length prefix in `buf`.
///
/// Returns `(payload_start, declared_len)` once the separator has arrived.
fn parse_header(buf: &[u8]) -> Result<Option<(usize, usize)>> {
    let Some(sep) = buf.iter().position(|&b| b == b':') else {
        if buf.len() > MAX_PREFIX_LEN {
            return Err(Error::MalformedFrame(format!(
                "no length separator in the first {} bytes",
                buf.len()
            )));
        }
        return Ok(None);
    };

    let prefix = &buf[..sep];
    let len = std::str::from_utf8(prefix)
        .ok()
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            Error::MalformedFrame(format!(
                "invalid length prefix {:?}",
                String::from_utf8_lossy(prefix)
            ))
        })?;
    Ok(Some((sep + 1, len)))
}
