//! Wire protocol for Marionette-style remote automation endpoints.
//!
//! Messages are JSON, framed as `<length>:<payload>` on any reliable byte
//! stream. The payload shape depends on the [`Dialect`] the remote end
//! announces in its [`Hello`] frame.

mod codec;
mod dialect;
mod error;
pub mod json;
mod message;

pub use codec::{
    FrameReader, MAX_PACKET_LENGTH, MAX_PREFIX_LEN, PREFIX_READ_LEN, encode_frame, write_frame,
};
pub use dialect::{Dialect, Hello, Unmarshal, unmarshal_legacy, unmarshal_tagged};
pub use error::{Error, Result};
pub use message::{COMMAND_TYPE, Command, Message, RESPONSE_TYPE, Response};
