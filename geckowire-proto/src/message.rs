//! Command and Response messages exchanged with the remote end.

use std::fmt;

use serde_json::{Map, Value};

use crate::json;

/// Type tag of a [`Command`] in the array encoding.
pub const COMMAND_TYPE: u64 = 0;

/// Type tag of a [`Response`] in the array encoding.
pub const RESPONSE_TYPE: u64 = 1;

/// Keys that mark a legacy emulator callback, with the command name each maps to.
const LEGACY_CALLBACKS: [(&str, &str); 2] = [
    ("emulator_cmd", "runEmulatorCmd"),
    ("emulator_shell", "runEmulatorShell"),
];

/// A single protocol message.
///
/// Two messages are equal when their correlation ids are equal; the body is
/// not compared.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Message {
    /// A request, either sent by us or a callback sent by the remote end.
    Command(Command),
    /// The answer to a previously sent command.
    Response(Response),
}

impl Message {
    /// Correlation id, `None` under legacy dialects.
    pub const fn id(&self) -> Option<u64> {
        match self {
            Self::Command(c) => c.id,
            Self::Response(r) => r.id,
        }
    }

    /// Renders the message in its array encoding.
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Self::Command(c) => c.to_payload(),
            Self::Response(r) => r.to_payload(),
        }
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl From<Command> for Message {
    fn from(c: Command) -> Self {
        Self::Command(c)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Self::Response(r)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(c) => fmt::Display::fmt(c, f),
            Self::Response(r) => fmt::Display::fmt(r, f),
        }
    }
}

/// A named command with structured parameters.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Command {
    /// Correlation id.
    pub id: Option<u64>,
    /// Command name, e.g. `"getTitle"`.
    pub name: String,
    /// Parameters, usually an object.
    pub params: Value,
}

impl Command {
    /// Creates a command carrying a correlation id.
    pub fn new(id: u64, name: impl Into<String>, params: Value) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            params,
        }
    }

    /// Builds a command from a legacy (dialect 2 and below) emulator callback.
    ///
    /// Returns `None` when `data` carries neither `emulator_cmd` nor
    /// `emulator_shell`. The whole object becomes the parameters.
    pub fn from_legacy(data: &Map<String, Value>) -> Option<Self> {
        let (_, name) = LEGACY_CALLBACKS
            .iter()
            .find(|(key, _)| data.contains_key(*key))?;
        Some(Self {
            id: None,
            name: (*name).to_owned(),
            params: Value::Object(data.clone()),
        })
    }

    /// Renders `[0, id, name, params]`.
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        json::to_vec(&(COMMAND_TYPE, self.id, &self.name, &self.params))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Command id={}, name={}, params={}>",
            DisplayId(self.id),
            self.name,
            self.params
        )
    }
}

/// The outcome of a command: either an error or a result.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Response {
    /// Correlation id of the command being answered.
    pub id: Option<u64>,
    /// Error payload, if the command failed.
    pub error: Option<Value>,
    /// Result payload, if the command succeeded.
    pub result: Option<Value>,
}

impl Response {
    /// Creates a response from its raw parts.
    pub const fn new(id: Option<u64>, error: Option<Value>, result: Option<Value>) -> Self {
        Self { id, error, result }
    }

    /// Creates a successful response.
    pub const fn ok(id: Option<u64>, result: Value) -> Self {
        Self::new(id, None, Some(result))
    }

    /// Creates a failed response.
    pub const fn err(id: Option<u64>, error: Value) -> Self {
        Self::new(id, Some(error), None)
    }

    /// Builds a response from a legacy (dialect 2 and below) flat object.
    ///
    /// An object with an `"error"` key is taken as the error payload,
    /// anything else as the result.
    pub fn from_legacy(data: Value) -> Self {
        let failed = data.as_object().is_some_and(|m| m.contains_key("error"));
        if failed {
            Self::err(None, data)
        } else {
            Self::ok(None, data)
        }
    }

    /// Returns `true` if the remote end reported an error.
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Converts into `Ok(result)` or `Err(error)`.
    ///
    /// A response without either payload is `Ok(Value::Null)`.
    pub fn into_result(self) -> Result<Value, Value> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }

    /// Renders `[1, id, error, result]`.
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        json::to_vec(&(RESPONSE_TYPE, self.id, &self.error, &self.result))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Response id={}, error={}, result={}>",
            DisplayId(self.id),
            self.error.as_ref().unwrap_or(&Value::Null),
            self.result.as_ref().unwrap_or(&Value::Null)
        )
    }
}

/// Formats an optional id the way the remote end writes it.
struct DisplayId(Option<u64>);

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => fmt::Display::fmt(&id, f),
            None => f.write_str("null"),
        }
    }
}
