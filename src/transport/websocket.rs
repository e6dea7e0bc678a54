//! WebSocket server transport.
//!
//! Accepts WebSocket clients on a TCP port and maps each connection to a
//! [`TransportClientId`]. Text frames are forwarded to the engine verbatim.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              WsTransport                │
//! │  accept loop ──► connection task (1/ws) │
//! │  ┌───────────────────────────────────┐  │
//! │  │ conn-1 → outbound queue           │  │
//! │  │ conn-2 → outbound queue           │  │
//! │  └───────────────────────────────────┘  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Whoever removes a connection from the table reports its `Disconnect`,
//! so each connection is reported exactly once.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::TransportClientId;

use super::{Transport, TransportEvent, TransportEventSender, TransportEvents, TransportState};

// ============================================================================
// Constants
// ============================================================================

/// Default bind address (localhost).
const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

// ============================================================================
// Types
// ============================================================================

/// Commands for a connection task.
enum Outbound {
    /// Send a text frame.
    Text(String),
    /// Close the socket.
    Close,
}

// ============================================================================
// WsTransport
// ============================================================================

/// WebSocket server transport.
///
/// # Example
///
/// ```no_run
/// use feedme_server::{Server, transport::WsTransport};
///
/// # async fn example() -> feedme_server::Result<()> {
/// let (transport, events) = WsTransport::with_port(8080);
/// let server = Server::builder().transport(transport).events(events).build()?;
/// server.start()?;
/// # Ok(())
/// # }
/// ```
pub struct WsTransport {
    /// Requested bind address.
    addr: SocketAddr,
    /// Self reference for spawned tasks.
    me: Weak<Self>,
    /// Lifecycle state.
    state: Mutex<TransportState>,
    /// Event stream towards the server.
    events: TransportEventSender,
    /// Active connections.
    connections: RwLock<FxHashMap<TransportClientId, mpsc::UnboundedSender<Outbound>>>,
    /// Address actually bound, while started.
    local_addr: Mutex<Option<SocketAddr>>,
    /// Stops the accept loop.
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    /// Next connection ID.
    next_id: AtomicU64,
}

// ============================================================================
// WsTransport - Constructor
// ============================================================================

impl WsTransport {
    /// Creates a transport that will bind `addr` when started.
    #[must_use]
    pub fn new(addr: SocketAddr) -> (Arc<Self>, TransportEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Arc::new_cyclic(|me| Self {
            addr,
            me: me.clone(),
            state: Mutex::new(TransportState::Stopped),
            events,
            connections: RwLock::new(FxHashMap::default()),
            local_addr: Mutex::new(None),
            shutdown: Mutex::new(None),
            next_id: AtomicU64::new(1),
        });
        (transport, rx)
    }

    /// Creates a transport that will bind localhost on `port` (0 for random).
    #[must_use]
    pub fn with_port(port: u16) -> (Arc<Self>, TransportEvents) {
        Self::new(SocketAddr::new(DEFAULT_BIND_IP, port))
    }
}

// ============================================================================
// WsTransport - Public API
// ============================================================================

impl WsTransport {
    /// Returns the bound address while started.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Returns the WebSocket URL while started.
    ///
    /// Format: `ws://{ip}:{port}`
    #[must_use]
    pub fn ws_url(&self) -> Option<String> {
        self.local_addr().map(|addr| format!("ws://{addr}"))
    }

    /// Returns the number of active connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}

// ============================================================================
// Transport Implementation
// ============================================================================

impl Transport for WsTransport {
    fn state(&self) -> TransportState {
        *self.state.lock()
    }

    fn start(&self) -> Result<()> {
        let handle = Handle::try_current()
            .map_err(|_| Error::config("WsTransport must be started inside a tokio runtime"))?;

        let Some(me) = self.me.upgrade() else {
            return Err(Error::invalid_state("Transport is being dropped"));
        };

        {
            let mut state = self.state.lock();
            if *state != TransportState::Stopped {
                return Err(Error::invalid_state(format!(
                    "Transport is {}, expected stopped",
                    *state
                )));
            }
            *state = TransportState::Starting;
        }

        self.emit(TransportEvent::Starting);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown.lock() = Some(shutdown_tx);

        handle.spawn(async move {
            me.run(shutdown_rx).await;
        });

        Ok(())
    }

    fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != TransportState::Started {
                return Err(Error::invalid_state(format!(
                    "Transport is {}, expected started",
                    *state
                )));
            }
            *state = TransportState::Stopping;
        }

        info!(addr = ?self.local_addr(), "WsTransport stopping");
        self.emit(TransportEvent::Stopping { error: None });

        // Report every client gone before the listener winds down
        let connections: Vec<_> = self.connections.write().drain().collect();
        for (client, tx) in connections {
            let _ = tx.send(Outbound::Close);
            self.emit(TransportEvent::Disconnect {
                client,
                error: Some(Error::TransportStopping),
            });
        }

        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }

        Ok(())
    }

    fn send(&self, client: TransportClientId, text: String) -> Result<()> {
        let connections = self.connections.read();
        let tx = connections
            .get(&client)
            .ok_or_else(|| Error::transport(format!("{client} is not connected")))?;

        tx.send(Outbound::Text(text))
            .map_err(|_| Error::transport(format!("{client} connection task ended")))
    }

    fn disconnect(&self, client: TransportClientId, error: Option<Error>) -> Result<()> {
        let tx = self
            .connections
            .write()
            .remove(&client)
            .ok_or_else(|| Error::transport(format!("{client} is not connected")))?;

        let _ = tx.send(Outbound::Close);
        debug!(%client, "Client disconnected by server");
        self.emit(TransportEvent::Disconnect { client, error });
        Ok(())
    }
}

// ============================================================================
// WsTransport - Accept Loop
// ============================================================================

impl WsTransport {
    /// Binds, accepts until shutdown, then reports `stop`.
    async fn run(self: Arc<Self>, mut shutdown_rx: oneshot::Receiver<()>) {
        let listener = match TcpListener::bind(self.addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, addr = %self.addr, "WsTransport bind failed");
                *self.state.lock() = TransportState::Stopping;
                self.emit(TransportEvent::Stopping {
                    error: Some(Error::transport(format!("bind failed: {e}"))),
                });
                *self.state.lock() = TransportState::Stopped;
                self.emit(TransportEvent::Stop {
                    error: Some(Error::Io(e)),
                });
                return;
            }
        };

        *self.local_addr.lock() = listener.local_addr().ok();

        // stop() may have been rejected while starting; it only applies once started
        {
            let mut state = self.state.lock();
            if *state == TransportState::Starting {
                *state = TransportState::Started;
            }
        }

        info!(addr = ?self.local_addr(), "WsTransport started");
        self.emit(TransportEvent::Start);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("Accept loop shutting down");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let transport = Arc::clone(&self);
                        tokio::spawn(async move {
                            transport.handle_connection(stream, addr).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                        self.emit(TransportEvent::Error { error: Error::Io(e) });
                    }
                },
            }
        }

        drop(listener);
        *self.local_addr.lock() = None;
        *self.state.lock() = TransportState::Stopped;

        info!("WsTransport stopped");
        self.emit(TransportEvent::Stop { error: None });
    }

    /// Upgrades one TCP connection and pumps its frames.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        debug!(?addr, "New TCP connection");

        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(error = %e, ?addr, "WebSocket upgrade failed");
                return;
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let Some(client) = self.register(tx) else {
            debug!(?addr, "Connection arrived while not started");
            return;
        };
        info!(%client, ?addr, "WebSocket client connected");

        let (mut ws_write, mut ws_read) = ws_stream.split();

        let reason = loop {
            tokio::select! {
                message = ws_read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(%client, len = text.len(), "Frame received");
                        self.emit(TransportEvent::Message {
                            client,
                            text: text.as_str().to_string(),
                        });
                    }

                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%client, "WebSocket closed by remote");
                        break Error::ConnectionClosed;
                    }

                    Some(Err(e)) => {
                        warn!(%client, error = %e, "WebSocket error");
                        break Error::WebSocket(e);
                    }

                    // Ignore Binary, Ping, Pong
                    Some(Ok(_)) => {}
                },

                command = rx.recv() => match command {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            warn!(%client, error = %e, "Failed to send frame");
                            break Error::WebSocket(e);
                        }
                    }

                    // Already removed and reported by disconnect()/stop()
                    Some(Outbound::Close) | None => {
                        let _ = ws_write.close().await;
                        return;
                    }
                },
            }
        };

        if self.connections.write().remove(&client).is_some() {
            self.emit(TransportEvent::Disconnect {
                client,
                error: Some(reason),
            });
        }
    }

    /// Adds a connection and reports it, unless the transport left `started`.
    ///
    /// The state lock is held throughout, so `stop()` either refuses this
    /// connection or finds it in the table and reports its disconnect after
    /// the `Connect`.
    fn register(&self, tx: mpsc::UnboundedSender<Outbound>) -> Option<TransportClientId> {
        let state = self.state.lock();
        if *state != TransportState::Started {
            return None;
        }

        let client = TransportClientId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.connections.write().insert(client, tx);
        self.emit(TransportEvent::Connect { client });
        drop(state);

        Some(client)
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            trace!("Transport event dropped, receiver gone");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::time::timeout;

    async fn next_event(events: &mut TransportEvents) -> TransportEvent {
        timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event in time")
            .expect("channel open")
    }

    async fn started() -> (Arc<WsTransport>, TransportEvents, String) {
        let (transport, mut events) = WsTransport::with_port(0);
        transport.start().expect("start");
        assert!(matches!(next_event(&mut events).await, TransportEvent::Starting));
        assert!(matches!(next_event(&mut events).await, TransportEvent::Start));
        let url = transport.ws_url().expect("bound");
        (transport, events, url)
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let (transport, _events) = WsTransport::with_port(0);
        let err = transport.start().expect_err("no runtime");
        assert_eq!(err.code(), "CONFIG");
        assert_eq!(transport.state(), TransportState::Stopped);
    }

    #[tokio::test]
    async fn test_start_binds_random_port() {
        let (transport, _events, url) = started().await;
        assert_eq!(transport.state(), TransportState::Started);
        assert!(url.starts_with("ws://127.0.0.1:"));
        assert_eq!(transport.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_register_refused_unless_started() {
        let (transport, mut events) = WsTransport::with_port(0);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(transport.register(tx).is_none());

        *transport.state.lock() = TransportState::Stopping;
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(transport.register(tx).is_none());

        assert_eq!(transport.connection_count(), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_reports_registered_connection() -> anyhow::Result<()> {
        let (transport, mut events, _url) = started().await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let client = transport.register(tx).expect("started");
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Connect { client: c } if c == client
        ));

        transport.stop()?;
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Stopping { error: None }
        ));
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Disconnect { client: c, error: Some(Error::TransportStopping) } if c == client
        ));
        assert_eq!(transport.connection_count(), 0);

        // Late arrivals after stop() are refused
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(transport.register(tx).is_none());
        assert_eq!(transport.connection_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_before_start_is_invalid() {
        let (transport, _events) = WsTransport::with_port(0);
        let err = transport.stop().expect_err("not started");
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_client_roundtrip() -> anyhow::Result<()> {
        let (transport, mut events, url) = started().await;

        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;

        let TransportEvent::Connect { client } = next_event(&mut events).await else {
            panic!("expected connect");
        };

        ws.send(Message::Text("hello".into())).await?;
        match next_event(&mut events).await {
            TransportEvent::Message { client: from, text } => {
                assert_eq!(from, client);
                assert_eq!(text, "hello");
            }
            other => panic!("unexpected event {other:?}"),
        }

        transport.send(client, "world".to_string())?;
        let reply = timeout(Duration::from_secs(5), ws.next())
            .await?
            .expect("frame")?;
        assert_eq!(reply.into_text()?.as_str(), "world");

        ws.close(None).await?;
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Disconnect { client: c, error: Some(Error::ConnectionClosed) } if c == client
        ));
        assert_eq!(transport.connection_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_server_disconnect_reports_once() -> anyhow::Result<()> {
        let (transport, mut events, url) = started().await;
        let (_ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;

        let TransportEvent::Connect { client } = next_event(&mut events).await else {
            panic!("expected connect");
        };

        transport.disconnect(client, Some(Error::handshake_timeout(10)))?;
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Disconnect { error: Some(Error::HandshakeTimeout { .. }), .. }
        ));
        assert!(transport.disconnect(client, None).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_disconnects_then_stops() -> anyhow::Result<()> {
        let (transport, mut events, url) = started().await;
        let (_ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        assert!(matches!(next_event(&mut events).await, TransportEvent::Connect { .. }));

        transport.stop()?;
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Stopping { error: None }
        ));
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Disconnect { error: Some(Error::TransportStopping), .. }
        ));
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Stop { error: None }
        ));
        assert_eq!(transport.state(), TransportState::Stopped);
        assert!(transport.ws_url().is_none());
        Ok(())
    }
}
