//! Blocking wire transport for Marionette-style remote automation endpoints.
//!
//! `geckowire` owns one TCP connection to the remote end, reads its hello
//! frame to pick a protocol [`Dialect`], and then exchanges length-prefixed
//! JSON [`Command`]s and [`Response`]s with it.
//!
//! # Quick start
//!
//! ```no_run
//! use geckowire::{ProbeConfig, Transport, TransportConfig, wait_for_port};
//! use serde_json::json;
//!
//! if !wait_for_port("127.0.0.1", 2828, &ProbeConfig::default()) {
//!     return Ok(());
//! }
//!
//! let mut transport = Transport::new(TransportConfig::new("127.0.0.1", 2828));
//! let reply = transport.request("newSession", json!({}))?;
//! transport.close();
//! # let _ = reply;
//! # Ok::<(), geckowire::Error>(())
//! ```

mod config;
mod connection;
mod correlator;
mod error;
mod probe;
mod transport;

pub use config::{DEFAULT_PORT, ProbeConfig, TransportConfig};
pub use connection::ConnectionState;
pub use error::{Error, Result};
pub use geckowire_proto::{Command, Dialect, Hello, Message, Response};
pub use probe::wait_for_port;
pub use transport::Transport;
