//! TCP request server
//!
//! One thread per client. Each request is dispatched through a static table
//! keyed by [`RequestKind`]; every failure ends the client connection, with
//! a DISCONNECT carrying the reason whenever the peer can still read it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use fand_core::{Connection, ConnectionRegistry, Listener, Registered, ShelfRegistry, Terminator};
use fand_error::{FandError, Result};
use fand_protocol::args::{arg_f64, arg_opt_f64, arg_opt_timestamp, arg_str, expect_arity};
use fand_protocol::RequestKind;

/// Request handler: replies on the connection or returns why it could not
pub type Handler = fn(&Server, &Connection, &[Value]) -> Result<()>;

/// Handler for a request kind, `None` for kinds a server never accepts
pub fn handler_for(kind: RequestKind) -> Option<Handler> {
    match kind {
        RequestKind::Ping => Some(handle_ping),
        RequestKind::GetPwm => Some(handle_get_pwm),
        RequestKind::GetRpm => Some(handle_get_rpm),
        RequestKind::SetRpm => Some(handle_set_rpm),
        RequestKind::SetPwmOverride => Some(handle_set_pwm_override),
        RequestKind::SetPwmExpire => Some(handle_set_pwm_expire),
        RequestKind::Ack | RequestKind::Disconnect | RequestKind::SetPwm => None,
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn handle_ping(_server: &Server, conn: &Connection, args: &[Value]) -> Result<()> {
    expect_arity(RequestKind::Ping, args, 0)?;
    info!("Received PING from {}", conn);
    conn.send(RequestKind::Ack, &[])
}

fn handle_get_pwm(server: &Server, conn: &Connection, args: &[Value]) -> Result<()> {
    expect_arity(RequestKind::GetPwm, args, 1)?;
    let shelf_id = arg_str(args, 0)?;
    info!("Received GET_PWM for {} from {}", shelf_id, conn);
    let pwm = server.shelves.get(shelf_id)?.pwm();
    conn.send(RequestKind::SetPwm, &[json!(shelf_id), json!(pwm)])
}

fn handle_get_rpm(server: &Server, conn: &Connection, args: &[Value]) -> Result<()> {
    expect_arity(RequestKind::GetRpm, args, 1)?;
    let shelf_id = arg_str(args, 0)?;
    info!("Received GET_RPM for {} from {}", shelf_id, conn);
    let rpm = server.shelves.get(shelf_id)?.rpm();
    conn.send(RequestKind::SetRpm, &[json!(shelf_id), json!(rpm)])
}

fn handle_set_rpm(server: &Server, conn: &Connection, args: &[Value]) -> Result<()> {
    expect_arity(RequestKind::SetRpm, args, 2)?;
    let shelf_id = arg_str(args, 0)?;
    let rpm = arg_f64(args, 1)?;
    info!("Received SET_RPM {} for {} from {}", rpm, shelf_id, conn);
    server.shelves.get(shelf_id)?.set_rpm(rpm)?;
    conn.send(RequestKind::Ack, &[])
}

fn handle_set_pwm_override(server: &Server, conn: &Connection, args: &[Value]) -> Result<()> {
    expect_arity(RequestKind::SetPwmOverride, args, 2)?;
    let shelf_id = arg_str(args, 0)?;
    let value = arg_opt_f64(args, 1)?;
    info!("Received SET_PWM_OVERRIDE {:?} for {} from {}", value, shelf_id, conn);
    server.shelves.get(shelf_id)?.set_pwm_override(value)?;
    conn.send(RequestKind::Ack, &[])
}

fn handle_set_pwm_expire(server: &Server, conn: &Connection, args: &[Value]) -> Result<()> {
    expect_arity(RequestKind::SetPwmExpire, args, 2)?;
    let shelf_id = arg_str(args, 0)?;
    let expire = arg_opt_timestamp(args, 1)?;
    info!("Received SET_PWM_EXPIRE {:?} for {} from {}", expire, shelf_id, conn);
    server.shelves.get(shelf_id)?.set_pwm_expire(expire)?;
    conn.send(RequestKind::Ack, &[])
}

// ============================================================================
// Server
// ============================================================================

pub struct Server {
    shelves: Arc<ShelfRegistry>,
    connections: Arc<ConnectionRegistry>,
}

impl Server {
    pub fn new(shelves: Arc<ShelfRegistry>, connections: Arc<ConnectionRegistry>) -> Self {
        Self { shelves, connections }
    }

    pub fn shelves(&self) -> &ShelfRegistry {
        &self.shelves
    }

    pub fn terminator(&self) -> &Terminator {
        self.connections.terminator()
    }

    /// Open the listening socket; failing to do so terminates the process
    pub fn bind(&self, address: &str, port: u16) -> Result<Listener> {
        match self.connections.bind(address, port) {
            Ok(listener) => Ok(listener),
            Err(FandError::Terminating) => Err(FandError::Terminating),
            Err(e) => {
                error!("Cannot bind to {}:{}: {}", address, port, e);
                self.terminator()
                    .terminate(Some("Cannot bind to requested interface and port".to_string()));
                Err(e)
            }
        }
    }

    /// Accept clients until the listener is closed
    ///
    /// Client threads are joined on the way out when the process is
    /// terminating, since termination closes their sockets.
    pub fn serve(self: &Arc<Self>, listener: Listener) -> Result<()> {
        match listener.local_addr() {
            Ok(addr) => info!("Listening for clients on {}", addr),
            Err(e) => warn!("Listening for clients on an unknown address: {}", e),
        }

        let mut clients: Vec<JoinHandle<()>> = Vec::new();
        let mut result = Ok(());
        while listener.is_open() {
            match listener.accept() {
                Ok(conn) => {
                    if let Some(handle) = self.spawn_client(conn) {
                        clients.push(handle);
                    }
                }
                Err(_) if self.terminator().is_terminating() => break,
                Err(e) => {
                    error!("Error while listening for clients: {}", e);
                    self.terminator()
                        .terminate(Some("Error while listening for clients".to_string()));
                    result = Err(e);
                    break;
                }
            }
            clients.retain(|handle| !handle.is_finished());
        }

        info!("Stopped listening for clients");
        if self.terminator().is_terminating() {
            for handle in clients {
                if handle.join().is_err() {
                    error!("Client thread panicked");
                }
            }
        }
        result
    }

    fn spawn_client(self: &Arc<Self>, conn: Connection) -> Option<JoinHandle<()>> {
        let name = format!("client-{}", conn.id());
        let server = Arc::clone(self);
        // The closure owns the connection; a failed spawn drops it, closing the socket
        match thread::Builder::new().name(name).spawn(move || server.listen_client(conn)) {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Cannot start client thread: {}", e);
                None
            }
        }
    }

    /// Serve one client until its connection closes
    pub fn listen_client(&self, conn: Connection) {
        info!("Listening to {}", conn);

        while conn.is_open() {
            let message = match conn.recv() {
                Ok(message) => message,
                Err(e) if e.is_timeout() => {
                    warn!("{} timed out", conn);
                    continue;
                }
                Err(e) if e.is_connection_reset() => {
                    info!("{}: {}", conn, e);
                    conn.close(None, false);
                    continue;
                }
                Err(FandError::UnknownRequest(kind)) => {
                    error!("Invalid request {} from {}", kind, conn);
                    conn.close(Some("Invalid request"), true);
                    continue;
                }
                Err(e) => {
                    error!("Connection error from {}: {}", conn, e);
                    conn.close(None, true);
                    continue;
                }
            };

            debug!("Received {} from {}", message, conn);
            let Some(handler) = handler_for(message.kind) else {
                error!("Invalid request {} from {}", message.kind, conn);
                conn.close(Some("Invalid request"), true);
                continue;
            };
            if let Err(e) = handler(self, &conn, &message.args) {
                self.handle_error(&conn, message.kind, e);
            }
        }

        debug!("Stopping client thread for {}: socket closed", conn);
    }

    fn handle_error(&self, conn: &Connection, kind: RequestKind, err: FandError) {
        match err {
            FandError::InvalidCall(reason) => {
                error!("Invalid call to {} from {}: {}", kind, conn, reason);
                conn.close(Some("Invalid call"), true);
            }
            e if e.is_connection_reset() => {
                info!("{}: {}", conn, e);
                conn.close(None, false);
            }
            e if e.is_domain() => {
                error!("Rejected {} from {}: {}", kind, conn, e);
                conn.close(Some(&e.to_string()), true);
            }
            e => {
                error!("Connection error from {}: {}", conn, e);
                conn.close(None, true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{SocketAddr, TcpStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::{Duration as ChronoDuration, Utc};
    use fand_core::{Backend, CurveSet, Device, DeviceKind, Disk, Probe, Shelf, TemperatureCurve};

    use crate::control::spawn_shelf_threads;
    use fand_protocol::{decode_frame, encode_frame, recv, send, Message};

    struct Harness {
        terminator: Terminator,
        shelves: Arc<ShelfRegistry>,
        addr: SocketAddr,
        serve: Option<JoinHandle<Result<()>>>,
    }

    impl Harness {
        fn start() -> Self {
            Self::with_shelf(Shelf::new("shelf-a", vec![], CurveSet::default(), Duration::from_secs(60)))
        }

        fn with_shelf(shelf: Shelf) -> Self {
            let terminator = Terminator::new();
            let mut shelves = ShelfRegistry::new();
            shelves.insert(shelf).unwrap();
            let shelves = Arc::new(shelves);
            let connections = ConnectionRegistry::new(terminator.clone());
            let server = Arc::new(Server::new(Arc::clone(&shelves), connections));
            let listener = server.bind("127.0.0.1", 0).unwrap();
            let addr = listener.local_addr().unwrap();
            let serve = thread::spawn(move || server.serve(listener));
            Self {
                terminator,
                shelves,
                addr,
                serve: Some(serve),
            }
        }

        fn client(&self) -> TcpStream {
            let stream = TcpStream::connect(self.addr).unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            stream
        }

        fn shelf(&self) -> &Shelf {
            self.shelves.get("shelf-a").unwrap()
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.terminator.terminate(None);
            if let Some(serve) = self.serve.take() {
                let _ = serve.join();
            }
        }
    }

    fn request(stream: &mut TcpStream, kind: RequestKind, args: &[Value]) -> Result<Message> {
        send(stream, kind, args)?;
        recv(stream)
    }

    /// Read everything the server sends before closing and return the DISCONNECT reason
    fn disconnect_reason(stream: &mut TcpStream) -> Value {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        let message = decode_frame(&buf).unwrap();
        assert_eq!(message.kind, RequestKind::Disconnect);
        message.args.first().cloned().unwrap_or(Value::Null)
    }

    #[test]
    fn test_handler_table() {
        assert!(handler_for(RequestKind::Ping).is_some());
        assert!(handler_for(RequestKind::SetPwmExpire).is_some());
        assert!(handler_for(RequestKind::Ack).is_none());
        assert!(handler_for(RequestKind::SetPwm).is_none());
        assert!(handler_for(RequestKind::Disconnect).is_none());
    }

    #[test]
    fn test_ping() {
        let harness = Harness::start();
        let mut client = harness.client();
        let reply = request(&mut client, RequestKind::Ping, &[]).unwrap();
        assert_eq!(reply, Message::new(RequestKind::Ack, vec![]));
        // The connection stays usable
        let reply = request(&mut client, RequestKind::Ping, &[]).unwrap();
        assert_eq!(reply.kind, RequestKind::Ack);
    }

    #[test]
    fn test_get_pwm_and_rpm() {
        let harness = Harness::start();
        let mut client = harness.client();

        let reply = request(&mut client, RequestKind::GetPwm, &[json!("shelf-a")]).unwrap();
        assert_eq!(reply, Message::new(RequestKind::SetPwm, vec![json!("shelf-a"), json!(100.0)]));

        let reply = request(&mut client, RequestKind::SetRpm, &[json!("shelf-a"), json!(1500)]).unwrap();
        assert_eq!(reply.kind, RequestKind::Ack);
        assert_eq!(harness.shelf().rpm(), 1500.0);

        let reply = request(&mut client, RequestKind::GetRpm, &[json!("shelf-a")]).unwrap();
        assert_eq!(reply, Message::new(RequestKind::SetRpm, vec![json!("shelf-a"), json!(1500.0)]));
    }

    #[test]
    fn test_unknown_shelf() {
        let harness = Harness::start();
        let mut client = harness.client();
        send(&mut client, RequestKind::GetPwm, &[json!("nope")]).unwrap();
        assert_eq!(disconnect_reason(&mut client), json!("Shelf nope not found"));
    }

    #[test]
    fn test_negative_rpm() {
        let harness = Harness::start();
        let mut client = harness.client();
        send(&mut client, RequestKind::SetRpm, &[json!("shelf-a"), json!(-1)]).unwrap();
        assert_eq!(disconnect_reason(&mut client), json!("RPM cannot be below zero"));
        assert_eq!(harness.shelf().rpm(), 0.0);
    }

    #[test]
    fn test_invalid_call() {
        let harness = Harness::start();
        let mut client = harness.client();
        send(&mut client, RequestKind::GetPwm, &[]).unwrap();
        assert_eq!(disconnect_reason(&mut client), json!("Invalid call"));
    }

    #[test]
    fn test_reply_kind_is_not_a_request() {
        let harness = Harness::start();
        let mut client = harness.client();
        send(&mut client, RequestKind::SetPwm, &[json!("shelf-a"), json!(50)]).unwrap();
        assert_eq!(disconnect_reason(&mut client), json!("Invalid request"));
    }

    #[test]
    fn test_unknown_request() {
        use std::io::Write;

        let harness = Harness::start();
        let mut client = harness.client();
        let payload = br#"["reboot", []]"#;
        let mut frame = format!("99F9{:04x}", payload.len()).into_bytes();
        frame.extend_from_slice(payload);
        client.write_all(&frame).unwrap();
        assert_eq!(disconnect_reason(&mut client), json!("Invalid request"));
    }

    #[test]
    fn test_override_and_expire() {
        let harness = Harness::start();
        let mut client = harness.client();

        let reply = request(&mut client, RequestKind::SetPwmOverride, &[json!("shelf-a"), json!(40)]).unwrap();
        assert_eq!(reply.kind, RequestKind::Ack);
        let reply = request(&mut client, RequestKind::GetPwm, &[json!("shelf-a")]).unwrap();
        assert_eq!(reply.args[1], json!(40.0));

        let expire = (Utc::now() + ChronoDuration::hours(1)).to_rfc3339();
        let reply = request(&mut client, RequestKind::SetPwmExpire, &[json!("shelf-a"), json!(expire)]).unwrap();
        assert_eq!(reply.kind, RequestKind::Ack);
        assert!(harness.shelf().pwm_expire().is_some());

        let reply = request(&mut client, RequestKind::SetPwmOverride, &[json!("shelf-a"), Value::Null]).unwrap();
        assert_eq!(reply.kind, RequestKind::Ack);
        assert_eq!(harness.shelf().pwm(), 100.0);
    }

    #[test]
    fn test_expired_timestamp_rejected() {
        let harness = Harness::start();
        let mut client = harness.client();
        let past = (Utc::now() - ChronoDuration::hours(1)).to_rfc3339();
        send(&mut client, RequestKind::SetPwmExpire, &[json!("shelf-a"), json!(past)]).unwrap();
        let reason = disconnect_reason(&mut client);
        assert!(reason.as_str().unwrap().starts_with("Expiration "));
        assert!(harness.shelf().pwm_expire().is_none());
    }

    #[test]
    fn test_concurrent_clients() {
        let harness = Harness::start();
        let addr = harness.addr;

        let readers: Vec<_> = (0..4)
            .map(|_| {
                thread::spawn(move || {
                    let mut client = TcpStream::connect(addr).unwrap();
                    client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
                    for _ in 0..25 {
                        let reply = request(&mut client, RequestKind::GetPwm, &[json!("shelf-a")]).unwrap();
                        let pwm = reply.args[1].as_f64().unwrap();
                        assert!(pwm == 100.0 || pwm == 20.0 || pwm == 80.0, "unexpected {pwm}");
                    }
                })
            })
            .collect();

        let mut writer = harness.client();
        for i in 0..25 {
            let value = if i % 2 == 0 { 20 } else { 80 };
            request(&mut writer, RequestKind::SetPwmOverride, &[json!("shelf-a"), json!(value)]).unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }

    /// Disk whose temperature walks through a fixed cycle on every refresh
    struct CyclingProbe {
        refreshes: AtomicUsize,
    }

    const CYCLE: [f64; 4] = [20.0, 36.0, 45.0, 36.0];

    impl CyclingProbe {
        fn disk(&self, n: usize) -> Backend {
            Backend::Hdd(Disk {
                node: "/dev/sda".into(),
                serial: Some("ZA1".into()),
                temperature: CYCLE[n % CYCLE.len()],
            })
        }
    }

    impl Probe for CyclingProbe {
        fn locate(&self, _serial: &str) -> Backend {
            self.disk(0)
        }

        fn refresh(&self, backend: &mut Backend) -> Result<()> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst);
            *backend = self.disk(n);
            Ok(())
        }
    }

    #[test]
    fn test_reads_during_control_updates() {
        let hdd = TemperatureCurve::new(DeviceKind::Hdd, vec![(0.0, 25.0), (35.0, 50.0), (41.0, 100.0)]).unwrap();
        let curves = CurveSet::new(hdd, TemperatureCurve::idle(), TemperatureCurve::idle());
        let probe = Arc::new(CyclingProbe {
            refreshes: AtomicUsize::new(0),
        });
        let device = Device::new("ZA1", "bay 1", probe.as_ref());
        let harness = Harness::with_shelf(Shelf::new("shelf-a", vec![device], curves, Duration::from_millis(1)));

        let workers = spawn_shelf_threads(&harness.shelves, probe.clone(), &harness.terminator).unwrap();
        while probe.refreshes.load(Ordering::SeqCst) < 3 {
            thread::sleep(Duration::from_millis(1));
        }

        let addr = harness.addr;
        let readers: Vec<_> = (0..6)
            .map(|_| {
                thread::spawn(move || {
                    let mut client = TcpStream::connect(addr).unwrap();
                    client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
                    for _ in 0..50 {
                        let reply = request(&mut client, RequestKind::GetPwm, &[json!("shelf-a")]).unwrap();
                        assert_eq!(reply.kind, RequestKind::SetPwm);
                        assert_eq!(reply.args[0], json!("shelf-a"));
                        let pwm = reply.args[1].as_f64().unwrap();
                        assert!([25.0, 50.0, 100.0].contains(&pwm), "unexpected {pwm}");
                    }
                })
            })
            .collect();
        for reader in readers {
            reader.join().unwrap();
        }

        assert!(!harness.terminator.is_terminating());
        let before = probe.refreshes.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert!(probe.refreshes.load(Ordering::SeqCst) > before);

        harness.terminator.terminate(None);
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(harness.terminator.error(), None);
    }

    #[test]
    fn test_terminate_disconnects_clients() {
        let mut harness = Harness::start();
        let mut client = harness.client();
        request(&mut client, RequestKind::Ping, &[]).unwrap();

        harness.terminator.terminate(None);
        let serve = harness.serve.take().unwrap();
        assert!(serve.join().unwrap().is_ok());

        assert_eq!(disconnect_reason(&mut client), Value::Null);
    }

    #[test]
    fn test_garbage_closes_connection() {
        use std::io::Write;

        let harness = Harness::start();
        let mut client = harness.client();
        client.write_all(&encode_frame(RequestKind::Ping, &[]).unwrap()[..4]).unwrap();
        client.write_all(b"zzzz").unwrap();
        assert_eq!(disconnect_reason(&mut client), Value::Null);
    }
}
