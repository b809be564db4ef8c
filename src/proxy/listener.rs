//! Service listener and per-connection handling.
//!
//! One listener serves one route: it binds the route's public port with
//! SO_REUSEADDR and a bounded backlog, accepts for the process lifetime,
//! and spawns an independent handler task per connection so a slow or
//! stuck connection never delays subsequent accepts.
//!
//! The handler drives a single connection through its terminal states:
//! blocked (client address in the blocklist, no backend dial), error
//! (dial failure or a direction ending with an I/O error), or completed
//! (both directions ended via clean end-of-stream). Exactly one connection
//! record is emitted, at the transition into the terminal state.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::{TcpSocket, TcpStream};
use tracing::{debug, error, info, warn, Instrument};

use crate::blocklist::BlocklistStore;
use crate::logger::{ConnectionLogger, ConnectionRecord, ConnectionStatus};

use super::forward::pump;
use super::route::Route;

/// Accept backlog for each service listener.
pub const ACCEPT_BACKLOG: u32 = 100;

/// Default timeout for backend dials. Established forwarding has no idle
/// timeout; only the dial is time-bounded.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Aggregate counters for one listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicU64,
    /// Connections currently in flight.
    pub connections_active: AtomicU64,
    /// Connections rejected by the blocklist.
    pub connections_blocked: AtomicU64,
    /// Bytes relayed client to backend.
    pub bytes_to_backend: AtomicU64,
    /// Bytes relayed backend to client.
    pub bytes_from_backend: AtomicU64,
}

/// A public listener serving one service route.
pub struct Listener {
    route: Route,
    listener: tokio::net::TcpListener,
    blocklist: Arc<BlocklistStore>,
    logger: Arc<ConnectionLogger>,
    dial_timeout: Duration,
    stats: Arc<ListenerStats>,
}

impl Listener {
    /// Bind the route's public port.
    ///
    /// A bind failure is fatal to this listener only; the caller decides
    /// whether the process keeps running other routes.
    pub fn bind(
        route: Route,
        listen_ip: IpAddr,
        blocklist: Arc<BlocklistStore>,
        logger: Arc<ConnectionLogger>,
        dial_timeout: Duration,
    ) -> io::Result<Self> {
        let bind_addr = SocketAddr::new(listen_ip, route.listen_port);
        let socket = match bind_addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(bind_addr)?;
        let listener = socket.listen(ACCEPT_BACKLOG)?;

        info!(
            service = %route.name,
            bind_addr = %listener.local_addr()?,
            backend = %route.backend_addr(),
            "Listener bound"
        );

        Ok(Self {
            route,
            listener,
            blocklist,
            logger,
            dial_timeout,
            stats: Arc::new(ListenerStats::default()),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get listener statistics.
    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Accept loop for the process lifetime.
    ///
    /// Transient accept errors are logged and the loop continues.
    pub async fn run(self: Arc<Self>) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    self.stats
                        .connections_accepted
                        .fetch_add(1, Ordering::Relaxed);
                    self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                    let listener = Arc::clone(&self);
                    tokio::spawn(
                        async move {
                            listener.handle_connection(stream, peer_addr).await;
                            listener
                                .stats
                                .connections_active
                                .fetch_sub(1, Ordering::Relaxed);
                        }
                        .instrument(tracing::info_span!(
                            "connection",
                            service = %self.route.name,
                            peer = %peer_addr
                        )),
                    );
                }
                Err(e) => {
                    error!(service = %self.route.name, error = %e, "Accept error");
                    // Brief sleep to avoid a tight loop on persistent errors
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Drive one accepted connection to a terminal state.
    async fn handle_connection(&self, client: TcpStream, peer_addr: SocketAddr) {
        let start = Instant::now();
        let client_ip = peer_addr.ip().to_string();

        if self.blocklist.is_blocked(&client_ip) {
            self.stats
                .connections_blocked
                .fetch_add(1, Ordering::Relaxed);
            warn!("Blocked connection");
            drop(client);
            self.emit(peer_addr, ConnectionStatus::Blocked, Duration::ZERO, 0, 0)
                .await;
            return;
        }

        debug!("Connection accepted");

        let backend_addr = self.route.backend_addr();
        let backend =
            match tokio::time::timeout(self.dial_timeout, TcpStream::connect(&backend_addr)).await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!(backend = %backend_addr, error = %e, "Backend dial failed");
                    drop(client);
                    self.emit(peer_addr, ConnectionStatus::Error, start.elapsed(), 0, 0)
                        .await;
                    return;
                }
                Err(_) => {
                    warn!(
                        backend = %backend_addr,
                        timeout = ?self.dial_timeout,
                        "Backend dial timed out"
                    );
                    drop(client);
                    self.emit(peer_addr, ConnectionStatus::Error, start.elapsed(), 0, 0)
                        .await;
                    return;
                }
            };

        info!(backend = %backend_addr, "Forwarding established");

        // One counter per direction, shared with the pump tasks.
        let bytes_sent = Arc::new(AtomicU64::new(0));
        let bytes_received = Arc::new(AtomicU64::new(0));

        let (client_read, client_write) = client.into_split();
        let (backend_read, backend_write) = backend.into_split();

        let client_to_backend = tokio::spawn(
            pump(client_read, backend_write, Arc::clone(&bytes_sent))
                .instrument(tracing::debug_span!("forward", direction = "client_to_backend")),
        );
        let backend_to_client = tokio::spawn(
            pump(backend_read, client_write, Arc::clone(&bytes_received))
                .instrument(tracing::debug_span!("forward", direction = "backend_to_client")),
        );

        // Join, not race: ending early would truncate the still-active
        // direction's stream.
        let (c2b, b2c) = tokio::join!(client_to_backend, backend_to_client);

        let sent = bytes_sent.load(Ordering::Relaxed);
        let received = bytes_received.load(Ordering::Relaxed);
        self.stats.bytes_to_backend.fetch_add(sent, Ordering::Relaxed);
        self.stats
            .bytes_from_backend
            .fetch_add(received, Ordering::Relaxed);

        let clean = matches!(c2b, Ok(Ok(()))) && matches!(b2c, Ok(Ok(())));
        let status = if clean {
            ConnectionStatus::Completed
        } else {
            ConnectionStatus::Error
        };

        let duration = start.elapsed();
        info!(
            status = ?status,
            duration_ms = duration.as_millis() as u64,
            bytes_sent = sent,
            bytes_received = received,
            "Connection closed"
        );

        self.emit(peer_addr, status, duration, sent, received).await;
    }

    /// Emit the connection's single terminal record. A log-write failure is
    /// surfaced by the logger on the operational channel and does not alter
    /// the classification.
    async fn emit(
        &self,
        peer_addr: SocketAddr,
        status: ConnectionStatus,
        duration: Duration,
        bytes_sent: u64,
        bytes_received: u64,
    ) {
        let record = ConnectionRecord::new(
            peer_addr.ip().to_string(),
            peer_addr.port(),
            &self.route.name,
            self.route.backend_port,
            status,
            duration,
            bytes_sent,
            bytes_received,
        );
        self.logger.record(&record).await;
    }
}
