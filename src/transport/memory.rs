//! In-process transport.
//!
//! [`MemoryTransport`] has no network side. The embedder simulates clients
//! (connect, send frames, close) and inspects what the server sent. Starting
//! and stopping complete immediately.
//!
//! # Example
//!
//! ```
//! use feedme_server::transport::{MemoryTransport, Transport, TransportEvent};
//!
//! let (transport, mut events) = MemoryTransport::new();
//! transport.start().unwrap();
//! let client = transport.connect();
//! transport.receive(client, r#"{"MessageType":"Handshake","Versions":["0.1"]}"#);
//!
//! assert!(matches!(events.try_recv(), Ok(TransportEvent::Starting)));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::TransportClientId;

use super::{Transport, TransportEvent, TransportEventSender, TransportEvents, TransportState};

// ============================================================================
// Types
// ============================================================================

/// A frame the server sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    /// Recipient.
    pub client: TransportClientId,
    /// Raw text.
    pub text: String,
}

/// A disconnect the server requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectRecord {
    /// Disconnected client.
    pub client: TransportClientId,
    /// Error code passed with the request, if any.
    pub error_code: Option<&'static str>,
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// Transport that keeps everything in memory.
pub struct MemoryTransport {
    /// Lifecycle state.
    state: Mutex<TransportState>,
    /// Event stream towards the server.
    events: TransportEventSender,
    /// Currently connected clients.
    connected: Mutex<FxHashSet<TransportClientId>>,
    /// Frames sent by the server.
    sent: Mutex<Vec<SentFrame>>,
    /// Disconnects requested by the server.
    disconnects: Mutex<Vec<DisconnectRecord>>,
    /// Next connection ID.
    next_id: AtomicU64,
}

impl MemoryTransport {
    /// Creates a stopped transport and its event stream.
    #[must_use]
    pub fn new() -> (Arc<Self>, TransportEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            state: Mutex::new(TransportState::Stopped),
            events,
            connected: Mutex::new(FxHashSet::default()),
            sent: Mutex::new(Vec::new()),
            disconnects: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        });
        (transport, rx)
    }

    /// Simulates a new client connection.
    pub fn connect(&self) -> TransportClientId {
        let client = TransportClientId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.connected.lock().insert(client);
        self.emit(TransportEvent::Connect { client });
        client
    }

    /// Simulates a frame from a client.
    pub fn receive(&self, client: TransportClientId, text: impl Into<String>) {
        self.emit(TransportEvent::Message {
            client,
            text: text.into(),
        });
    }

    /// Simulates the client closing its connection.
    pub fn close(&self, client: TransportClientId) {
        if self.connected.lock().remove(&client) {
            self.emit(TransportEvent::Disconnect {
                client,
                error: Some(Error::ConnectionClosed),
            });
        }
    }

    /// Simulates a non-fatal transport failure.
    pub fn fail(&self, error: Error) {
        self.emit(TransportEvent::Error { error });
    }

    /// Returns `true` if the client is connected.
    #[must_use]
    pub fn is_connected(&self, client: TransportClientId) -> bool {
        self.connected.lock().contains(&client)
    }

    /// Drains the frames sent so far.
    pub fn take_sent(&self) -> Vec<SentFrame> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Drains the frames sent so far, parsed as JSON.
    pub fn take_sent_json(&self) -> Vec<(TransportClientId, serde_json::Value)> {
        self.take_sent()
            .into_iter()
            .filter_map(|frame| {
                serde_json::from_str(&frame.text)
                    .ok()
                    .map(|json| (frame.client, json))
            })
            .collect()
    }

    /// Drains the disconnects requested so far.
    pub fn take_disconnects(&self) -> Vec<DisconnectRecord> {
        std::mem::take(&mut *self.disconnects.lock())
    }

    fn emit(&self, event: TransportEvent) {
        trace!(?event, "Memory transport event");
        // Receiver gone means nobody is listening; nothing to do.
        let _ = self.events.send(event);
    }
}

// ============================================================================
// Transport Implementation
// ============================================================================

impl Transport for MemoryTransport {
    fn state(&self) -> TransportState {
        *self.state.lock()
    }

    fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != TransportState::Stopped {
                return Err(Error::invalid_state(format!(
                    "Transport is {}, expected stopped",
                    *state
                )));
            }
            *state = TransportState::Started;
        }

        self.emit(TransportEvent::Starting);
        self.emit(TransportEvent::Start);
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
            *state = TransportState::Stopped;
        }

        self.emit(TransportEvent::Stopping { error: None });

        let clients: Vec<_> = self.connected.lock().drain().collect();
        for client in clients {
            self.emit(TransportEvent::Disconnect {
                client,
                error: Some(Error::TransportStopping),
            });
        }

        self.emit(TransportEvent::Stop { error: None });
        Ok(())
    }

    fn send(&self, client: TransportClientId, text: String) -> Result<()> {
        if !self.is_connected(client) {
            return Err(Error::transport(format!("{client} is not connected")));
        }
        self.sent.lock().push(SentFrame { client, text });
        Ok(())
    }

    fn disconnect(&self, client: TransportClientId, error: Option<Error>) -> Result<()> {
        if !self.connected.lock().remove(&client) {
            return Err(Error::transport(format!("{client} is not connected")));
        }

        self.disconnects.lock().push(DisconnectRecord {
            client,
            error_code: error.as_ref().map(Error::code),
        });
        self.emit(TransportEvent::Disconnect { client, error });
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
