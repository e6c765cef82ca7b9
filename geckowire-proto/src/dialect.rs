//! Protocol dialect negotiation and per-dialect unmarshalling.
//!
//! The first frame the remote end sends after accepting a connection is a
//! [`Hello`] object. Its `marionetteProtocol` field selects the [`Dialect`]
//! for the rest of the connection:
//!
//! - **3 and above**: payloads are arrays, `[0, id, name, params]` for a
//!   command and `[1, id, error, result]` for a response.
//! - **2 and below**: payloads are flat objects without ids. Objects naming an
//!   emulator callback are commands; everything else is a response.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::message::{COMMAND_TYPE, Command, Message, RESPONSE_TYPE, Response};

/// Decodes one frame payload into a [`Message`].
pub type Unmarshal = fn(&[u8]) -> Result<Message>;

/// Negotiated protocol level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dialect(u32);

impl Dialect {
    /// Highest level that still speaks flat objects without ids.
    pub const LEGACY_MAX: u32 = 2;

    /// Creates a dialect from the level reported by the remote end.
    pub const fn new(level: u32) -> Self {
        Self(level)
    }

    /// Numeric protocol level.
    pub const fn level(self) -> u32 {
        self.0
    }

    /// Returns `true` for dialects without correlation ids.
    pub const fn is_legacy(self) -> bool {
        self.0 <= Self::LEGACY_MAX
    }

    /// Selects the decoder for this dialect.
    pub fn unmarshaller(self) -> Unmarshal {
        if self.is_legacy() {
            unmarshal_legacy
        } else {
            unmarshal_tagged
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self(1)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The greeting sent by the remote end right after the connection opens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Hello {
    /// Protocol level; absent means level 1.
    pub marionette_protocol: Option<u32>,
    /// Application type of the remote end, e.g. `"gecko"`.
    pub application_type: Option<String>,
}

impl Hello {
    /// Parses a hello payload. It must be a JSON object.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(payload)?;
        if !value.is_object() {
            return Err(Error::ProtocolViolation(format!(
                "hello frame must be an object, got {value}"
            )));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Dialect announced by the remote end.
    pub fn dialect(&self) -> Dialect {
        self.marionette_protocol.map(Dialect::new).unwrap_or_default()
    }
}

/// Decodes a dialect 3+ array payload.
pub fn unmarshal_tagged(payload: &[u8]) -> Result<Message> {
    let (tag, id, a, b): (u64, Option<u64>, Value, Value) = serde_json::from_slice(payload)?;
    match tag {
        COMMAND_TYPE => {
            let Value::String(name) = a else {
                return Err(Error::ProtocolViolation(format!(
                    "command name must be a string, got {a}"
                )));
            };
            Ok(Message::Command(Command {
                id,
                name,
                params: b,
            }))
        }
        RESPONSE_TYPE => Ok(Message::Response(Response::new(
            id,
            non_null(a),
            non_null(b),
        ))),
        other => Err(Error::ProtocolViolation(format!(
            "unknown message type {other}"
        ))),
    }
}

/// Decodes a dialect 1-2 flat payload.
pub fn unmarshal_legacy(payload: &[u8]) -> Result<Message> {
    let data: Value = serde_json::from_slice(payload)?;
    if let Some(cmd) = data.as_object().and_then(Command::from_legacy) {
        return Ok(Message::Command(cmd));
    }
    Ok(Message::Response(Response::from_legacy(data)))
}

/// Maps JSON `null` to `None`.
fn non_null(v: Value) -> Option<Value> {
    if v.is_null() { None } else { Some(v) }
}
