//! JSON text as the remote end writes it.
//!
//! Marionette servers and clients separate items with `", "` and keys from
//! values with `": "`. Frame lengths count the bytes of this exact text, so
//! outgoing payloads are rendered with [`WireFormatter`] rather than
//! `serde_json`'s compact form.

use std::io;

use serde::Serialize;
use serde_json::ser::Formatter;

/// `serde_json` formatter producing `[0, 1, "foo", {"a": 1}]`-style text.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct WireFormatter;

impl Formatter for WireFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Serializes `value` into wire-style JSON bytes.
pub fn to_vec<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, WireFormatter);
    value.serialize(&mut ser)?;
    Ok(out)
}
