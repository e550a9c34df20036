//! TCP listener, accept loop, connection registry, and shutdown.
//!
//! The accept loop hands each connection to an independent session task and
//! never waits on one. Failures split into two classes: socket setup and
//! accept failures are recoverable (`SocketError`, surfaced to the caller),
//! while I/O failures on an established connection terminate only that
//! session.

use crate::config::Config;
use crate::connection::run_session;
use crate::identity::ServerIdentity;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Listen backlog for the accepting socket
const LISTEN_BACKLOG: i32 = 10;

/// Identifies one tracked connection in the registry.
pub type ConnectionId = u64;

/// Registry entry for one live session.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub peer: SocketAddr,
    pub cancel: CancellationToken,
}

type Registry = Arc<Mutex<HashMap<ConnectionId, ConnectionHandle>>>;

/// Server instance: one bound listening socket plus the shared session state.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    identity: Arc<ServerIdentity>,
    registry: Registry,
    shutdown: CancellationToken,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
    next_id: AtomicU64,
}

impl Server {
    /// Create the listening socket and freeze the server identity.
    ///
    /// Binding failure is terminal for this instance; the caller may retry
    /// with different parameters.
    pub fn bind(config: &Config) -> Result<Self, SocketError> {
        let addr: SocketAddr = config
            .listen
            .parse()
            .map_err(|e| SocketError::InvalidAddr(config.listen.clone(), e))?;

        let std_listener = create_listener(addr)?;
        let local_addr = std_listener.local_addr().map_err(SocketError::Create)?;
        let listener = TcpListener::from_std(std_listener).map_err(SocketError::Create)?;

        // Identity is frozen here, before the first accept, and never
        // mutated afterwards
        let identity = Arc::new(ServerIdentity::new(&config.identity, local_addr.ip()));

        info!(address = %local_addr, "Server listening");

        Ok(Server {
            listener,
            local_addr,
            identity,
            registry: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
            next_id: AtomicU64::new(1),
        })
    }

    /// Address the listener actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for triggering and observing shutdown from other tasks.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown.clone(),
            registry: Arc::clone(&self.registry),
            connection_limit: Arc::clone(&self.connection_limit),
            max_connections: self.max_connections,
        }
    }

    /// Accept connections until shutdown, spawning one session per peer.
    ///
    /// Session tasks are fire-and-forget: their failures are logged, never
    /// propagated here. An `accept` failure returns to the caller, whose
    /// policy decides whether to retry; the loop does not retry on its own.
    /// The listening socket closes when this returns.
    pub async fn serve(self) -> Result<(), SocketError> {
        loop {
            // Backpressure: hold a free session slot before accepting.
            // At the cap, pending peers wait in the kernel backlog.
            let permit = tokio::select! {
                permit = self.connection_limit.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = self.shutdown.cancelled() => break,
            };

            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => accepted.map_err(SocketError::Accept)?,
                _ = self.shutdown.cancelled() => break,
            };

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let cancel = self.shutdown.child_token();
            self.registry.lock().unwrap().insert(
                id,
                ConnectionHandle {
                    peer,
                    cancel: cancel.clone(),
                },
            );
            debug!(peer = %peer, id, "New connection");

            let identity = Arc::clone(&self.identity);
            let registry = Arc::clone(&self.registry);
            tokio::spawn(async move {
                if let Err(e) = run_session(stream, identity, cancel.clone()).await {
                    debug!(error = %e, "Connection error");
                }
                cancel.cancel();
                registry.lock().unwrap().remove(&id);
                debug!(id, "Connection closed");
                drop(permit);
            });
        }

        info!("Accept loop stopped");
        Ok(())
    }
}

/// Cloneable handle over the server's shared shutdown state.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: CancellationToken,
    registry: Registry,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl ServerHandle {
    /// Shut the server down and wait for every session to fully close.
    ///
    /// Cancels each tracked connection (best-effort; one session cannot
    /// block the rest), then the root token, which stops the accept loop and
    /// any session registered in between. Returns once all connection
    /// permits are back, i.e. no session task remains. The server is not
    /// reusable afterwards.
    pub async fn shutdown(&self) {
        info!("Shutting down");

        let handles: Vec<ConnectionHandle> =
            self.registry.lock().unwrap().values().cloned().collect();
        for handle in handles {
            handle.cancel.cancel();
        }
        self.shutdown.cancel();

        if let Ok(permits) = self
            .connection_limit
            .acquire_many(self.max_connections as u32)
            .await
        {
            drop(permits);
            info!("All sessions closed");
        }
    }

    /// Whether shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of currently tracked sessions.
    pub fn connection_count(&self) -> usize {
        self.registry.lock().unwrap().len()
    }

    /// Peers of currently tracked sessions.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.registry
            .lock()
            .unwrap()
            .values()
            .map(|handle| handle.peer)
            .collect()
    }
}

/// Create a TCP listener with an explicit backlog.
fn create_listener(addr: SocketAddr) -> Result<std::net::TcpListener, SocketError> {
    let socket = Socket::new(
        match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        },
        Type::STREAM,
        Some(Protocol::TCP),
    )
    .map_err(SocketError::Create)?;

    socket.set_reuse_address(true).map_err(SocketError::Create)?;
    socket.set_nonblocking(true).map_err(SocketError::Create)?;
    socket
        .bind(&addr.into())
        .map_err(|e| SocketError::Bind(addr, e))?;
    socket.listen(LISTEN_BACKLOG).map_err(SocketError::Listen)?;

    Ok(socket.into())
}

/// Recoverable socket errors: setup or accept failures.
///
/// The caller decides whether to retry or abort. I/O failures on
/// established connections never appear here.
#[derive(Debug)]
pub enum SocketError {
    InvalidAddr(String, std::net::AddrParseError),
    Create(io::Error),
    Bind(SocketAddr, io::Error),
    Listen(io::Error),
    Accept(io::Error),
}

impl std::fmt::Display for SocketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketError::InvalidAddr(addr, e) => {
                write!(f, "Invalid listen address '{}': {}", addr, e)
            }
            SocketError::Create(e) => write!(f, "Failed to create socket: {}", e),
            SocketError::Bind(addr, e) => write!(f, "Failed to bind to {}: {}", addr, e),
            SocketError::Listen(e) => write!(f, "Failed to listen on socket: {}", e),
            SocketError::Accept(e) => write!(f, "Failed to accept connection: {}", e),
        }
    }
}

impl std::error::Error for SocketError {}
