//! Registry of live sockets
//!
//! Every socket the process opens or accepts is tracked here so shutdown can
//! reach it. [`ConnectionRegistry::close`] is the only removal path: the
//! entry is taken out under the lock before any I/O, so at most one caller
//! ever performs the notify/shutdown sequence for a given socket.
//!
//! Each stream carries a write lock shared between its [`Connection`] handle
//! and the registry entry, so a `DISCONNECT` never interleaves with a reply.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use fand_error::{FandError, Result};
use fand_protocol::{Message, RequestKind};

use crate::constants::network::{CLIENT_TIMEOUT, CLOSE_NOTIFY_WAIT, CONNECT_TIMEOUT};
use crate::shutdown::Terminator;

pub type ConnectionId = u64;

type WriteLock = Arc<Mutex<()>>;

enum Socket {
    Stream(TcpStream, WriteLock),
    Listener(TcpListener),
}

/// Process-wide set of open sockets
pub struct ConnectionRegistry {
    sockets: Mutex<HashMap<ConnectionId, Socket>>,
    next_id: AtomicU64,
    terminator: Terminator,
}

impl ConnectionRegistry {
    /// Create the registry and arrange for every socket to be closed on
    /// termination
    pub fn new(terminator: Terminator) -> Arc<Self> {
        let registry = Arc::new(Self {
            sockets: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            terminator: terminator.clone(),
        });
        let weak = Arc::downgrade(&registry);
        terminator.on_terminate(move || {
            if let Some(registry) = weak.upgrade() {
                registry.close_all();
            }
        });
        registry
    }

    pub fn terminator(&self) -> &Terminator {
        &self.terminator
    }

    fn insert(&self, socket: Socket) -> Result<ConnectionId> {
        let mut sockets = self.sockets.lock();
        if self.terminator.is_terminating() {
            return Err(FandError::Terminating);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        sockets.insert(id, socket);
        Ok(id)
    }

    /// Track a connected stream
    pub fn add(self: &Arc<Self>, stream: TcpStream) -> Result<Connection> {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown peer".to_string());
        let tracked = stream
            .try_clone()
            .map_err(|e| FandError::io("Cannot track connection", e))?;
        let writer = WriteLock::default();
        let id = self.insert(Socket::Stream(tracked, Arc::clone(&writer)))?;
        debug!("Tracking connection {} to {}", id, peer);
        Ok(Connection {
            id,
            stream,
            writer,
            peer,
            registry: Arc::clone(self),
        })
    }

    /// Track a listening socket
    pub fn add_listener(self: &Arc<Self>, listener: TcpListener) -> Result<Listener> {
        let tracked = listener
            .try_clone()
            .map_err(|e| FandError::io("Cannot track listener", e))?;
        let id = self.insert(Socket::Listener(tracked))?;
        Ok(Listener {
            id,
            listener,
            registry: Arc::clone(self),
        })
    }

    /// Bind a listening socket and track it
    pub fn bind(self: &Arc<Self>, address: &str, port: u16) -> Result<Listener> {
        let listener = TcpListener::bind((address, port))
            .map_err(|e| FandError::io(format!("Cannot bind to {address}:{port}"), e))?;
        self.add_listener(listener)
    }

    /// Open a client connection with the default timeouts and track it
    pub fn connect(self: &Arc<Self>, address: &str, port: u16) -> Result<Connection> {
        let addrs: Vec<SocketAddr> = (address, port)
            .to_socket_addrs()
            .map_err(|e| FandError::io(format!("Cannot resolve {address}"), e))?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    set_timeouts(&stream, Some(CLIENT_TIMEOUT))?;
                    info!("Connected to {}", addr);
                    return self.add(stream);
                }
                Err(e) => {
                    debug!("Cannot connect to {}: {}", addr, e);
                    last_error = Some(FandError::io(format!("Cannot connect to {addr}"), e));
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            FandError::io(
                format!("Cannot resolve {address}"),
                io::Error::new(io::ErrorKind::NotFound, "no address found"),
            )
        }))
    }

    pub fn is_open(&self, id: ConnectionId) -> bool {
        self.sockets.lock().contains_key(&id)
    }

    /// Number of tracked sockets
    pub fn len(&self) -> usize {
        self.sockets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close a tracked socket
    ///
    /// No-op returning `false` if the socket is not registered. With
    /// `notify`, a best-effort `DISCONNECT(reason)` is sent first, after any
    /// reply in flight on the same stream. A writer stuck for longer than
    /// [`CLOSE_NOTIFY_WAIT`] skips the notification. Listening sockets are
    /// shut down so a blocked `accept` returns.
    pub fn close(&self, id: ConnectionId, reason: Option<&str>, notify: bool) -> bool {
        let Some(socket) = self.sockets.lock().remove(&id) else {
            return false;
        };

        match socket {
            Socket::Stream(mut stream, writer) => {
                if notify {
                    match writer.try_lock_for(CLOSE_NOTIFY_WAIT) {
                        Some(_guard) => {
                            let reason = reason.map_or(Value::Null, Value::from);
                            if let Err(e) = fand_protocol::send(&mut stream, RequestKind::Disconnect, &[reason]) {
                                warn!("Cannot notify connection {} of disconnection: {}", id, e);
                            }
                        }
                        None => warn!("Connection {} is busy writing, closing without notice", id),
                    }
                }
                if let Err(e) = stream.shutdown(Shutdown::Both) {
                    debug!("Cannot shut down connection {}: {}", id, e);
                }
            }
            Socket::Listener(listener) => shutdown_listener(id, &listener),
        }
        info!("Closed connection {}", id);
        true
    }

    /// Close every tracked socket, notifying peers
    pub fn close_all(&self) {
        let ids: Vec<ConnectionId> = self.sockets.lock().keys().copied().collect();
        debug!("Closing {} tracked socket(s)", ids.len());
        for id in ids {
            self.close(id, None, true);
        }
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("sockets", &self.len())
            .finish()
    }
}

fn set_timeouts(stream: &TcpStream, timeout: Option<Duration>) -> Result<()> {
    stream
        .set_read_timeout(timeout)
        .and_then(|_| stream.set_write_timeout(timeout))
        .map_err(|e| FandError::io("Cannot set socket timeout", e))
}

fn shutdown_listener(id: ConnectionId, listener: &TcpListener) {
    // SAFETY: the descriptor belongs to `listener`, which outlives this call.
    // shutdown(2) on a listening socket only makes pending and future accept
    // calls fail; it does not release the descriptor.
    let rc = unsafe { libc::shutdown(listener.as_raw_fd(), libc::SHUT_RDWR) };
    if rc != 0 {
        debug!(
            "Cannot shut down listener {}: {}",
            id,
            io::Error::last_os_error()
        );
    }
}

/// A socket tracked by a [`ConnectionRegistry`]
pub trait Registered {
    fn id(&self) -> ConnectionId;

    fn registry(&self) -> &ConnectionRegistry;

    fn is_open(&self) -> bool {
        self.registry().is_open(self.id())
    }

    fn close(&self, reason: Option<&str>, notify: bool) -> bool {
        self.registry().close(self.id(), reason, notify)
    }
}

/// A tracked stream connection
pub struct Connection {
    id: ConnectionId,
    stream: TcpStream,
    writer: WriteLock,
    peer: String,
    registry: Arc<ConnectionRegistry>,
}

impl Connection {
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn send(&self, kind: RequestKind, args: &[Value]) -> Result<()> {
        let _guard = self.writer.lock();
        let mut stream = &self.stream;
        fand_protocol::send(&mut stream, kind, args)
    }

    pub fn recv(&self) -> Result<Message> {
        let mut stream = &self.stream;
        fand_protocol::recv(&mut stream)
    }

    /// Read/write timeout; `None` blocks indefinitely
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        set_timeouts(&self.stream, timeout)
    }
}

impl Registered for Connection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection {} ({})", self.id, self.peer)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.registry.close(self.id, None, false);
    }
}

/// A tracked listening socket
pub struct Listener {
    id: ConnectionId,
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
}

impl Listener {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| FandError::io("Cannot read listener address", e))
    }

    /// Accept one connection and track it
    pub fn accept(&self) -> Result<Connection> {
        let (stream, addr) = self
            .listener
            .accept()
            .map_err(|e| FandError::io("Cannot accept connection", e))?;
        info!("New connection from {}", addr);
        self.registry.add(stream)
    }
}

impl Registered for Listener {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.registry.close(self.id, None, false);
    }
}
