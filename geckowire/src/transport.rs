//! The transport facade: connect, send, receive, request, respond, close.

use geckowire_proto::{Command, Dialect, Message, Response, Unmarshal};
use serde_json::Value;

use crate::config::TransportConfig;
use crate::connection::{Connection, ConnectionState};
use crate::correlator::Correlator;
use crate::error::Result;

/// Client side of a connection to a Marionette-style remote end.
///
/// Every operation blocks and takes `&mut self`: one owner drives the
/// socket, and frames go out and come in strictly in call order. Operations
/// that send connect on demand, so a transport can be reused after
/// [`close`](Self::close).
///
/// # Example
///
/// ```no_run
/// use geckowire::{Message, Transport, TransportConfig};
/// use serde_json::json;
///
/// let mut transport = Transport::new(TransportConfig::new("127.0.0.1", 2828));
/// let (dialect, app) = transport.connect()?;
/// println!("dialect {dialect}, application {app:?}");
///
/// if let Message::Response(resp) = transport.request("getTitle", json!({}))? {
///     println!("title: {:?}", resp.into_result());
/// }
/// # Ok::<(), geckowire::Error>(())
/// ```
#[derive(Debug)]
pub struct Transport {
    /// Socket and frame reassembly.
    conn: Connection,
    /// Dialect fixed by the last handshake.
    dialect: Dialect,
    /// Decoder chosen for `dialect`.
    unmarshal: Unmarshal,
    /// Application type reported by the remote end.
    application_type: Option<String>,
    /// Request ids and pending responses.
    correlator: Correlator,
}

impl Transport {
    /// Creates a transport; no connection is made until
    /// [`connect`](Self::connect) or the first send.
    pub fn new(config: TransportConfig) -> Self {
        let dialect = Dialect::default();
        Self {
            conn: Connection::new(config),
            dialect,
            unmarshal: dialect.unmarshaller(),
            application_type: None,
            correlator: Correlator::default(),
        }
    }

    /// Connects and negotiates the dialect from the hello frame.
    ///
    /// Returns the dialect and the application type the remote end
    /// reported. Requests still pending from a previous connection are
    /// forgotten.
    pub fn connect(&mut self) -> Result<(Dialect, Option<String>)> {
        let hello = self.conn.open()?;
        self.dialect = hello.dialect();
        self.unmarshal = self.dialect.unmarshaller();
        self.application_type = hello.application_type;
        self.correlator.clear_pending();
        Ok((self.dialect, self.application_type.clone()))
    }

    /// Connects unless a socket is already open.
    pub fn ensure_connected(&mut self) -> Result<()> {
        if !self.conn.is_open() {
            self.connect()?;
        }
        Ok(())
    }

    /// Sends `msg`, connecting first if needed.
    ///
    /// Under dialect 3 and above a [`Command`] with an id is recorded as
    /// awaiting a response.
    pub fn send(&mut self, msg: &Message) -> Result<()> {
        self.ensure_connected()?;
        let payload = msg.to_payload().map_err(geckowire_proto::Error::from)?;
        if let Message::Command(cmd) = msg {
            self.correlator.register(cmd, self.dialect);
        }
        tracing::debug!(%msg, "send");
        self.conn.write_payload(&payload)
    }

    /// Sends an arbitrary JSON value as one frame, connecting first if
    /// needed. Nothing is correlated.
    pub fn send_value(&mut self, value: &Value) -> Result<()> {
        self.ensure_connected()?;
        let payload = geckowire_proto::json::to_vec(value).map_err(geckowire_proto::Error::from)?;
        tracing::debug!(%value, "send raw");
        self.conn.write_payload(&payload)
    }

    /// Waits for the next frame and returns its payload undecoded.
    pub fn receive_raw(&mut self) -> Result<Vec<u8>> {
        let timeout = self.conn.config().socket_timeout;
        self.conn.read_payload(timeout)
    }

    /// Waits for the next message.
    ///
    /// Under dialect 3 and above a response must answer a pending request,
    /// otherwise [`Error::UnexpectedResponse`](crate::Error::UnexpectedResponse)
    /// is returned. Commands from the remote end are returned as they are;
    /// answer them with [`respond`](Self::respond).
    pub fn receive(&mut self) -> Result<Message> {
        let payload = self.receive_raw()?;
        let msg = (self.unmarshal)(&payload)?;
        tracing::debug!(%msg, "received");
        self.correlator.observe(msg, self.dialect)
    }

    /// Sends a command with a fresh id and waits for the next message.
    ///
    /// That message is normally the [`Response`] carrying the same id. It
    /// can also be a callback [`Command`] from the remote end, which must be
    /// answered with [`respond`](Self::respond) before the response follows.
    pub fn request(&mut self, name: impl Into<String>, params: Value) -> Result<Message> {
        let id = self.correlator.next_id();
        self.send(&Command::new(id, name, params).into())?;
        self.receive()
    }

    /// Answers the most recently received message and waits for the next
    /// one.
    ///
    /// `Ok` carries a result payload, `Err` an error payload.
    pub fn respond(&mut self, outcome: std::result::Result<Value, Value>) -> Result<Message> {
        let id = self.correlator.last_observed_id();
        let resp = match outcome {
            Ok(result) => Response::ok(id, result),
            Err(error) => Response::err(id, error),
        };
        self.send(&resp.into())?;
        self.receive()
    }

    /// Closes the socket. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.conn.close();
    }

    /// Dialect negotiated by the last handshake (1 before any).
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Application type reported by the remote end.
    pub fn application_type(&self) -> Option<&str> {
        self.application_type.as_deref()
    }

    /// Connection lifecycle state.
    pub const fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    /// Returns `true` while a socket is open.
    pub const fn is_connected(&self) -> bool {
        self.conn.is_open()
    }

    /// Returns `true` if request `id` still awaits its response.
    pub fn is_pending(&self, id: u64) -> bool {
        self.correlator.is_pending(id)
    }

    /// Ids of requests awaiting a response, oldest first.
    pub fn pending_ids(&self) -> Vec<u64> {
        self.correlator.pending_ids()
    }

    /// Id given to the most recent request, `0` before the first.
    pub const fn last_id(&self) -> u64 {
        self.correlator.last_id()
    }

    /// Id of the most recently received message.
    pub const fn last_observed_id(&self) -> Option<u64> {
        self.correlator.last_observed_id()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread::{self, JoinHandle};
    use std::time::{Duration, Instant};

    use geckowire_proto::{FrameReader, MAX_PACKET_LENGTH, write_frame};
    use serde_json::json;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);
    const TAGGED_HELLO: &str = r#"{"marionetteProtocol": 3, "applicationType": "gecko"}"#;

    /// The remote end, as seen from a test.
    struct Peer {
        stream: TcpStream,
        reader: FrameReader,
    }

    impl Peer {
        fn accept(listener: &TcpListener, hello: &str) -> Self {
            let (stream, _) = listener.accept().unwrap();
            stream.set_read_timeout(Some(WAIT)).unwrap();
            let mut peer = Self {
                stream,
                reader: FrameReader::new(),
            };
            peer.send(hello);
            peer
        }

        fn send(&mut self, payload: &str) {
            write_frame(&mut self.stream, payload.as_bytes(), MAX_PACKET_LENGTH).unwrap();
        }

        fn recv(&mut self) -> String {
            let frame = self.reader.read_frame(&mut self.stream, WAIT).unwrap();
            String::from_utf8(frame).unwrap()
        }
    }

    /// Serves one connection with `script` after sending `hello`.
    fn serve(
        hello: &'static str,
        script: impl FnOnce(Peer) + Send + 'static,
    ) -> (TransportConfig, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || script(Peer::accept(&listener, hello)));
        let cfg = TransportConfig::new("127.0.0.1", port).socket_timeout(WAIT);
        (cfg, handle)
    }

    #[test]
    fn connect_negotiates_tagged_dialect() {
        let (cfg, peer) = serve(TAGGED_HELLO, |_| {});
        let mut t = Transport::new(cfg);
        assert_eq!(t.state(), ConnectionState::Unconnected);

        let (dialect, app) = t.connect().unwrap();
        assert_eq!(dialect, Dialect::new(3));
        assert_eq!(app.as_deref(), Some("gecko"));
        assert_eq!(t.application_type(), Some("gecko"));
        assert_eq!(t.state(), ConnectionState::Connected);
        peer.join().unwrap();
    }

    #[test]
    fn command_bytes_on_the_wire() {
        let (cfg, peer) = serve(TAGGED_HELLO, |mut p| {
            let mut raw = [0u8; 20];
            p.stream.read_exact(&mut raw).unwrap();
            assert_eq!(&raw, br#"17:[0, 1, "foo", {}]"#);
        });
        let mut t = Transport::new(cfg);
        t.connect().unwrap();
        t.send(&Command::new(1, "foo", json!({})).into()).unwrap();
        assert!(t.is_pending(1));
        peer.join().unwrap();
    }

    #[test]
    fn request_returns_matching_response() {
        let (cfg, peer) = serve(TAGGED_HELLO, |mut p| {
            assert_eq!(p.recv(), r#"[0, 1, "getTitle", {}]"#);
            p.send(r#"[1, 1, null, {"value": "Example Domain"}]"#);
            assert_eq!(p.recv(), r#"[0, 2, "getUrl", {}]"#);
            p.send(r#"[1, 2, null, {"value": "about:blank"}]"#);
        });
        let mut t = Transport::new(cfg);

        // First request connects on demand.
        let Message::Response(first) = t.request("getTitle", json!({})).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(first.id, Some(1));
        assert_eq!(first.into_result(), Ok(json!({"value": "Example Domain"})));
        assert!(!t.is_pending(1));

        let reply = t.request("getUrl", json!({})).unwrap();
        assert_eq!(reply.id(), Some(2));
        assert_eq!(t.last_id(), 2);
        assert!(t.pending_ids().is_empty());
        peer.join().unwrap();
    }

    #[test]
    fn uncorrelated_response_is_protocol_violation() {
        let (cfg, peer) = serve(TAGGED_HELLO, |mut p| {
            p.recv();
            p.send("[1, 99, null, null]");
        });
        let mut t = Transport::new(cfg);
        let err = t.request("getTitle", json!({})).unwrap_err();
        assert!(err.is_protocol_violation(), "{err}");
        assert_eq!(t.pending_ids(), vec![1]);
        peer.join().unwrap();
    }

    #[test]
    fn unknown_type_tag_is_protocol_violation() {
        let (cfg, peer) = serve(TAGGED_HELLO, |mut p| {
            p.recv();
            p.send("[4, 1, null, null]");
        });
        let mut t = Transport::new(cfg);
        let err = t.request("getTitle", json!({})).unwrap_err();
        assert!(err.is_protocol_violation(), "{err}");
        peer.join().unwrap();
    }

    #[test]
    fn respond_answers_callback_with_its_id() {
        let (cfg, peer) = serve(TAGGED_HELLO, |mut p| {
            p.recv();
            p.send(r#"[0, 5, "runEmulatorCmd", {"emulator_cmd": "gsm list"}]"#);
            assert_eq!(p.recv(), r#"[1, 5, "no emulator", null]"#);
            p.send(r#"[1, 1, null, {"value": 1}]"#);
        });
        let mut t = Transport::new(cfg);

        let Message::Command(cb) = t.request("executeScript", json!({})).unwrap() else {
            panic!("expected callback");
        };
        assert_eq!(cb.name, "runEmulatorCmd");
        assert_eq!(t.last_observed_id(), Some(5));

        let reply = t.respond(Err(json!("no emulator"))).unwrap();
        assert_eq!(reply.id(), Some(1));
        assert!(t.pending_ids().is_empty());
        peer.join().unwrap();
    }

    #[test]
    fn legacy_dialect_uses_flat_objects() {
        let (cfg, peer) = serve("{}", |mut p| {
            assert_eq!(p.recv(), r#"[0, 1, "getTitle", {}]"#);
            p.send(r#"{"emulator_cmd": "power ac off"}"#);
            assert_eq!(p.recv(), r#"[1, null, null, "OK"]"#);
            p.send(r#"{"value": "Title"}"#);
            p.recv();
            p.send(r#"{"error": {"message": "boom"}}"#);
        });
        let mut t = Transport::new(cfg);
        let (dialect, app) = t.connect().unwrap();
        assert_eq!(dialect, Dialect::new(1));
        assert!(app.is_none());

        let Message::Command(cb) = t.request("getTitle", json!({})).unwrap() else {
            panic!("expected callback");
        };
        assert_eq!(cb.name, "runEmulatorCmd");
        assert_eq!(cb.id, None);
        assert!(t.pending_ids().is_empty());

        let Message::Response(resp) = t.respond(Ok(json!("OK"))).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(resp.id, None);
        assert_eq!(resp.into_result(), Ok(json!({"value": "Title"})));
        assert!(t.pending_ids().is_empty());
        assert!(!t.is_pending(1));

        let Message::Response(failed) = t.request("getUrl", json!({})).unwrap() else {
            panic!("expected response");
        };
        assert!(failed.is_error());
        assert!(t.pending_ids().is_empty());
        assert!(!t.is_pending(2));
        peer.join().unwrap();
    }

    #[test]
    fn small_packets_reassemble() {
        let params = json!({"script": "return arguments[0];", "args": ["x".repeat(64)]});
        let expected = Command::new(1, "executeScript", params.clone())
            .to_payload()
            .unwrap();
        let (cfg, peer) = serve(TAGGED_HELLO, move |mut p| {
            assert_eq!(p.recv().as_bytes(), expected.as_slice());
            p.send("[1, 1, null, null]");
        });
        let mut t = Transport::new(cfg.max_packet_length(3));
        let reply = t.request("executeScript", params).unwrap();
        assert_eq!(reply.id(), Some(1));
        peer.join().unwrap();
    }

    #[test]
    fn send_value_and_receive_raw() {
        let (cfg, peer) = serve(TAGGED_HELLO, |mut p| {
            assert_eq!(p.recv(), r#"{"name": "ping"}"#);
            p.send("pong");
        });
        let mut t = Transport::new(cfg);
        t.send_value(&json!({"name": "ping"})).unwrap();
        assert_eq!(t.receive_raw().unwrap(), b"pong");
        assert!(t.pending_ids().is_empty());
        peer.join().unwrap();
    }

    #[test]
    fn malformed_payload_is_reported() {
        let (cfg, peer) = serve(TAGGED_HELLO, |mut p| {
            p.recv();
            p.send("[1, 1, nul");
        });
        let mut t = Transport::new(cfg);
        let err = t.request("getTitle", json!({})).unwrap_err();
        assert!(err.is_malformed(), "{err}");
        peer.join().unwrap();
    }

    #[test]
    fn silence_is_a_timeout() {
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let (cfg, peer) = serve(TAGGED_HELLO, move |p| {
            let _ = done_rx.recv();
            drop(p);
        });
        let mut t = Transport::new(cfg.socket_timeout(Duration::from_millis(200)));
        t.connect().unwrap();
        let err = t.receive().unwrap_err();
        assert!(err.is_timeout(), "{err}");
        assert!(t.is_connected());
        drop(done_tx);
        peer.join().unwrap();
    }

    #[test]
    fn silent_hello_times_out_fast() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let peer = thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            let _ = done_rx.recv();
        });

        let cfg = TransportConfig::new("127.0.0.1", port).hello_timeout(Duration::from_millis(100));
        let mut t = Transport::new(cfg);
        let err = t.connect().unwrap_err();
        assert!(err.is_timeout(), "{err}");
        assert!(!t.is_connected());
        drop(done_tx);
        peer.join().unwrap();
    }

    #[test]
    fn late_partial_hello_still_times_out_on_time() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let peer = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(350));
            stream.write_all(b"5").unwrap();
            let _ = done_rx.recv();
        });

        let hello_timeout = Duration::from_millis(400);
        let cfg = TransportConfig::new("127.0.0.1", port).hello_timeout(hello_timeout);
        let mut t = Transport::new(cfg);
        let started = Instant::now();
        let err = t.connect().unwrap_err();
        let elapsed = started.elapsed();
        assert!(err.is_timeout(), "{err}");
        assert!(elapsed < Duration::from_millis(650), "took {elapsed:?}");
        assert!(!t.is_connected());
        drop(done_tx);
        peer.join().unwrap();
    }

    #[test]
    fn peer_hangup_is_connection_lost() {
        let (cfg, peer) = serve(TAGGED_HELLO, drop);
        let mut t = Transport::new(cfg);
        t.connect().unwrap();
        peer.join().unwrap();

        let err = t.receive().unwrap_err();
        assert!(err.is_connection_lost(), "{err}");
        assert!(!t.is_connected());
        assert_eq!(t.state(), ConnectionState::Closed);
    }

    #[test]
    fn refused_connect_keeps_no_socket() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut t = Transport::new(TransportConfig::new("127.0.0.1", port));
        let err = t.connect().unwrap_err();
        assert!(matches!(err, crate::Error::Connect { .. }), "{err}");
        assert!(!t.is_connected());
        assert_eq!(t.state(), ConnectionState::Unconnected);
    }

    #[test]
    fn close_is_idempotent() {
        let mut never = Transport::new(TransportConfig::default());
        never.close();
        never.close();
        assert!(!never.is_connected());

        let (cfg, peer) = serve(TAGGED_HELLO, |_| {});
        let mut t = Transport::new(cfg);
        t.connect().unwrap();
        t.close();
        assert!(!t.is_connected());
        t.close();
        assert!(!t.is_connected());
        assert_eq!(t.state(), ConnectionState::Closed);
        peer.join().unwrap();
    }

    #[test]
    fn request_after_peer_hangup_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let peer = thread::spawn(move || {
            drop(Peer::accept(&listener, TAGGED_HELLO));

            let mut second = Peer::accept(&listener, TAGGED_HELLO);
            assert_eq!(second.recv(), r#"[0, 1, "getTitle", {}]"#);
            second.send(r#"[1, 1, null, {"value": "back"}]"#);
        });

        let mut t = Transport::new(TransportConfig::new("127.0.0.1", port).socket_timeout(WAIT));
        t.connect().unwrap();
        let err = t.receive().unwrap_err();
        assert!(err.is_connection_lost(), "{err}");
        assert_eq!(t.state(), ConnectionState::Closed);

        let Message::Response(resp) = t.request("getTitle", json!({})).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(resp.into_result(), Ok(json!({"value": "back"})));
        assert_eq!(t.state(), ConnectionState::Connected);
        assert!(t.pending_ids().is_empty());
        peer.join().unwrap();
    }

    #[test]
    fn send_after_close_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let peer = thread::spawn(move || {
            let mut first = Peer::accept(&listener, "{}");
            assert_eq!(first.recv(), r#"[0, 1, "getTitle", {}]"#);
            first.send(r#"{"value": "a"}"#);
            drop(first);

            let mut second = Peer::accept(&listener, TAGGED_HELLO);
            assert_eq!(second.recv(), r#"[0, 2, "getTitle", {}]"#);
            second.send("[1, 2, null, null]");
        });

        let mut t = Transport::new(TransportConfig::new("127.0.0.1", port).socket_timeout(WAIT));
        assert_eq!(t.connect().unwrap().0, Dialect::new(1));
        assert!(t.request("getTitle", json!({})).is_ok());
        t.close();

        // Ids continue across connections; the new hello sets the dialect.
        let reply = t.request("getTitle", json!({})).unwrap();
        assert_eq!(reply.id(), Some(2));
        assert_eq!(t.dialect(), Dialect::new(3));
        assert!(t.pending_ids().is_empty());
        assert_eq!(t.state(), ConnectionState::Connected);
        peer.join().unwrap();
    }
}
