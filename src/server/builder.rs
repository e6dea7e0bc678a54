//! Builder pattern for server configuration.
//!
//! Provides a fluent API for configuring and creating [`Server`] instances.
//!
//! # Example
//!
//! ```no_run
//! use feedme_server::{Server, WsTransport};
//!
//! # async fn example() -> feedme_server::Result<()> {
//! let (transport, events) = WsTransport::with_port(8080);
//! let server = Server::builder()
//!     .transport(transport)
//!     .events(events)
//!     .handshake_ms(10_000)
//!     .termination_ms(60_000)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvents, TransportState};

use super::core::{Server, ServerInner};
use super::options::ServerOptions;

// ============================================================================
// ServerBuilder
// ============================================================================

/// Builder for configuring a [`Server`] instance.
///
/// Use [`Server::builder()`] to create a new builder.
#[derive(Default)]
pub struct ServerBuilder {
    /// Transport carrying client connections.
    transport: Option<Arc<dyn Transport>>,
    /// Transport event stream, pumped by the server when set.
    events: Option<TransportEvents>,
    /// Timing configuration.
    options: ServerOptions,
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("transport", &self.transport.as_ref().map(|t| t.state()))
            .field("events", &self.events.is_some())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// ServerBuilder Implementation
// ============================================================================

impl ServerBuilder {
    /// Creates a new builder with default options and no transport.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport. It must be stopped.
    #[inline]
    #[must_use]
    pub fn transport<T: Transport + 'static>(mut self, transport: Arc<T>) -> Self {
        let transport: Arc<dyn Transport> = transport;
        self.transport = Some(transport);
        self
    }

    /// Sets the transport's event stream.
    ///
    /// The server spawns a task that feeds these events into the engine.
    /// Without a stream, the embedder calls
    /// [`Server::handle_transport_event`] itself.
    #[inline]
    #[must_use]
    pub fn events(mut self, events: TransportEvents) -> Self {
        self.events = Some(events);
        self
    }

    /// Replaces all timing options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the handshake timeout in milliseconds. 0 disables it.
    #[inline]
    #[must_use]
    pub fn handshake_ms(mut self, ms: u64) -> Self {
        self.options.handshake_ms = ms;
        self
    }

    /// Sets the termination forget delay in milliseconds. 0 disables it.
    #[inline]
    #[must_use]
    pub fn termination_ms(mut self, ms: u64) -> Self {
        self.options.termination_ms = ms;
        self
    }

    /// Builds the server with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no transport is set
    /// - [`Error::InvalidArgument`] if the transport is not stopped
    /// - [`Error::Config`] if timers or an event stream are used outside a
    ///   tokio runtime
    pub fn build(self) -> Result<Server> {
        let transport = self.validate_transport()?;
        let runtime = self.validate_runtime()?;

        let inner = ServerInner::new(transport, self.options, runtime.clone());

        if let (Some(events), Some(handle)) = (self.events, runtime) {
            spawn_pump(&inner, events, &handle);
        }

        info!(
            handshake_ms = self.options.handshake_ms,
            termination_ms = self.options.termination_ms,
            "Server initialized"
        );

        Ok(Server::from_inner(inner))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ServerBuilder {
    /// Validates the transport configuration.
    fn validate_transport(&self) -> Result<Arc<dyn Transport>> {
        let transport = self.transport.clone().ok_or_else(|| {
            Error::config(
                "Transport is required. Use .transport() to set it.\n\
                 Example: Server::builder().transport(transport)",
            )
        })?;

        let state = transport.state();
        if state != TransportState::Stopped {
            return Err(Error::invalid_argument(format!(
                "Transport must be stopped, it is {state}"
            )));
        }

        Ok(transport)
    }

    /// Validates that a runtime is available when one is needed.
    fn validate_runtime(&self) -> Result<Option<Handle>> {
        if !self.options.uses_timers() && self.events.is_none() {
            return Ok(Handle::try_current().ok());
        }

        Handle::try_current().map(Some).map_err(|_| {
            Error::config(
                "Timers and event streams need a tokio runtime.\n\
                 Build inside a runtime, or set handshake_ms(0) and termination_ms(0) \
                 and call handle_transport_event() yourself.",
            )
        })
    }
}

// ============================================================================
// Event Pump
// ============================================================================

/// Spawns the task feeding transport events into the engine.
fn spawn_pump(inner: &Arc<ServerInner>, mut events: TransportEvents, handle: &Handle) {
    let engine = Arc::downgrade(inner);
    let task = handle.spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(inner) = engine.upgrade() else {
                break;
            };
            inner.handle_transport_event(event);
        }
        debug!("Transport event stream ended");
    });

    *inner.pump.lock() = Some(task.abort_handle());
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::MemoryTransport;

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = ServerBuilder::new();
        assert!(builder.transport.is_none());
        assert!(builder.events.is_none());
        assert_eq!(builder.options, ServerOptions::default());
    }

    #[test]
    fn test_timing_setters() {
        let builder = ServerBuilder::new().handshake_ms(1).termination_ms(2);
        assert_eq!(builder.options.handshake_ms, 1);
        assert_eq!(builder.options.termination_ms, 2);
    }

    #[test]
    fn test_build_fails_without_transport() {
        let err = ServerBuilder::new().build().expect_err("no transport");
        assert_eq!(err.code(), "CONFIG");
        assert!(err.to_string().contains("Transport"));
    }

    #[test]
    fn test_build_fails_with_started_transport() {
        let (transport, _events) = MemoryTransport::new();
        transport.start().expect("start");

        let err = ServerBuilder::new()
            .transport(transport)
            .handshake_ms(0)
            .termination_ms(0)
            .build()
            .expect_err("started transport");
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_build_without_runtime() {
        let (transport, _events) = MemoryTransport::new();
        let err = ServerBuilder::new()
            .transport(Arc::clone(&transport))
            .build()
            .expect_err("timers without runtime");
        assert_eq!(err.code(), "CONFIG");

        let server = ServerBuilder::new()
            .transport(transport)
            .handshake_ms(0)
            .termination_ms(0)
            .build()
            .expect("no runtime needed");
        assert_eq!(server.state(), TransportState::Stopped);
    }

    #[tokio::test]
    async fn test_pump_delivers_events() {
        let (transport, events) = MemoryTransport::new();
        let server = ServerBuilder::new()
            .transport(Arc::clone(&transport))
            .events(events)
            .build()
            .expect("build");

        server.start().expect("start");
        let tid = transport.connect();

        for _ in 0..100 {
            if server.client_id(tid).is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(server.client_count(), 1);
    }
}
