//! Feedme server engine.
//!
//! The [`Server`] owns all protocol state: connected clients, the feed
//! subscription table and outstanding requests. State lives behind one
//! mutex; every transport event, timer firing and responder call runs to
//! completion under it. Messages to clients are sent while the lock is
//! held, so each client sees them in state-transition order.
//!
//! Application handlers run after the lock is released. They may call any
//! [`Server`] method or resolve responders synchronously.
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
//!     .build()?;
//!
//! server.on_action(|request, responder| {
//!     tracing::info!(action = %request.action_name, "Action received");
//!     responder.success(serde_json::Map::new());
//! });
//!
//! server.start()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CallbackId, ClientId, TransportClientId};
use crate::protocol::{Feed, FeedKey, JsonObject, ServerMessage};
use crate::transport::{Transport, TransportEvent, TransportState};

use super::builder::ServerBuilder;
use super::clients::{ClientRegistry, HandshakeStatus};
use super::commands::{Revelation, Termination, TerminationTarget};
use super::events::{
    ActionHandler, FeedCloseHandler, FeedOpenHandler, HandshakeHandler, Handlers, ServerEvent,
};
use super::feeds::{FeedState, FeedTable};
use super::notifier::Notifier;
use super::options::ServerOptions;
use super::pending::{PendingFlags, PendingRegistry};
use super::responders::{
    ActionRequest, ActionResponder, FeedCloseRequest, FeedCloseResponder, FeedOpenRequest,
    FeedOpenResponder, HandshakeRequest, HandshakeResponder, Outcome,
};
use super::timer::Timer;

// ============================================================================
// Types
// ============================================================================

/// Mutable protocol state guarded by the engine lock.
#[derive(Default)]
pub(crate) struct ServerState {
    pub clients: ClientRegistry,
    pub feeds: FeedTable,
    pub handshakes: PendingRegistry<ClientId, HandshakeRequest>,
    pub actions: PendingRegistry<(ClientId, CallbackId), ActionRequest>,
    pub feed_opens: PendingRegistry<(ClientId, FeedKey), FeedOpenRequest>,
    pub feed_closes: PendingRegistry<(ClientId, FeedKey), FeedCloseRequest>,
    next_timer_token: u64,
}

impl ServerState {
    fn next_token(&mut self) -> u64 {
        self.next_timer_token += 1;
        self.next_timer_token
    }

    /// Returns `true` if the client appears anywhere in the state.
    pub(crate) fn references(&self, client_id: ClientId) -> bool {
        self.clients.contains(client_id)
            || self.feeds.has_client(client_id)
            || self.handshakes.has_client(client_id)
            || self.actions.has_client(client_id)
            || self.feed_opens.has_client(client_id)
            || self.feed_closes.has_client(client_id)
    }
}

/// Work deferred until the engine lock is released.
pub(crate) enum Followup {
    Emit(ServerEvent),
    Handshake(HandshakeHandler, HandshakeRequest, HandshakeResponder),
    Action(ActionHandler, ActionRequest, ActionResponder),
    FeedOpen(FeedOpenHandler, FeedOpenRequest, FeedOpenResponder),
    FeedClose(FeedCloseHandler, FeedCloseRequest, FeedCloseResponder),
}

/// Internal shared state for the server.
pub(crate) struct ServerInner {
    /// Self reference handed to timers and responders.
    pub me: Weak<ServerInner>,

    /// Transport carrying client connections.
    pub transport: Arc<dyn Transport>,

    /// Timing configuration.
    pub options: ServerOptions,

    /// Protocol state.
    pub state: Mutex<ServerState>,

    /// Registered application handlers.
    pub handlers: RwLock<Handlers>,

    /// Runtime timers are spawned on, captured when the server was built.
    pub runtime: Option<Handle>,

    /// Task feeding transport events into the engine, if any.
    pub pump: Mutex<Option<AbortHandle>>,
}

// ============================================================================
// Server
// ============================================================================

/// Feedme protocol server.
///
/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct Server {
    /// Shared inner state.
    pub(crate) inner: Arc<ServerInner>,
}

// ============================================================================
// Server - Display
// ============================================================================

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state())
            .field("options", &self.inner.options)
            .field("client_count", &self.client_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Server - Lifecycle
// ============================================================================

impl Server {
    /// Creates a configuration builder for the server.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub(crate) fn from_inner(inner: Arc<ServerInner>) -> Self {
        Self { inner }
    }

    /// Starts the transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the transport is not stopped.
    pub fn start(&self) -> Result<()> {
        self.require_state(TransportState::Stopped)?;
        info!("Starting server");
        self.inner.transport.start()
    }

    /// Stops the transport. Every client is disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the transport is not started.
    pub fn stop(&self) -> Result<()> {
        self.require_state(TransportState::Started)?;
        info!("Stopping server");
        self.inner.transport.stop()
    }

    /// Returns the transport lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> TransportState {
        self.inner.transport.state()
    }

    /// Returns the timing configuration.
    #[inline]
    #[must_use]
    pub fn options(&self) -> ServerOptions {
        self.inner.options
    }

    /// Feeds one transport event into the engine.
    ///
    /// Only needed when the server was built without an event stream. May be
    /// called from any thread; timers run on the runtime the server was
    /// built in.
    pub fn handle_transport_event(&self, event: TransportEvent) {
        self.inner.handle_transport_event(event);
    }

    fn require_state(&self, expected: TransportState) -> Result<()> {
        let state = self.state();
        if state != expected {
            return Err(Error::invalid_state(format!(
                "Transport is {state}, expected {expected}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Server - Handlers
// ============================================================================

impl Server {
    /// Registers the handshake handler.
    ///
    /// Without one, every handshake with a supported version succeeds.
    pub fn on_handshake<F>(&self, handler: F)
    where
        F: Fn(HandshakeRequest, HandshakeResponder) + Send + Sync + 'static,
    {
        self.inner.handlers.write().handshake = Some(Arc::new(handler));
    }

    /// Registers the action handler.
    ///
    /// Without one, every action fails with `INTERNAL_ERROR`.
    pub fn on_action<F>(&self, handler: F)
    where
        F: Fn(ActionRequest, ActionResponder) + Send + Sync + 'static,
    {
        self.inner.handlers.write().action = Some(Arc::new(handler));
    }

    /// Registers the feed open handler.
    ///
    /// Without one, every feed open fails with `INTERNAL_ERROR`.
    pub fn on_feed_open<F>(&self, handler: F)
    where
        F: Fn(FeedOpenRequest, FeedOpenResponder) + Send + Sync + 'static,
    {
        self.inner.handlers.write().feed_open = Some(Arc::new(handler));
    }

    /// Registers the feed close handler.
    ///
    /// Without one, every feed close succeeds immediately.
    pub fn on_feed_close<F>(&self, handler: F)
    where
        F: Fn(FeedCloseRequest, FeedCloseResponder) + Send + Sync + 'static,
    {
        self.inner.handlers.write().feed_close = Some(Arc::new(handler));
    }

    /// Registers the notification handler.
    pub fn set_event_handler<F>(&self, handler: F)
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.inner.handlers.write().event = Some(Arc::new(handler));
    }

    /// Removes the handshake handler.
    pub fn clear_handshake_handler(&self) {
        self.inner.handlers.write().handshake = None;
    }

    /// Removes the action handler.
    pub fn clear_action_handler(&self) {
        self.inner.handlers.write().action = None;
    }

    /// Removes the feed open handler.
    pub fn clear_feed_open_handler(&self) {
        self.inner.handlers.write().feed_open = None;
    }

    /// Removes the feed close handler.
    pub fn clear_feed_close_handler(&self) {
        self.inner.handlers.write().feed_close = None;
    }

    /// Removes the notification handler.
    pub fn clear_event_handler(&self) {
        self.inner.handlers.write().event = None;
    }
}

// ============================================================================
// Server - Feed Commands
// ============================================================================

impl Server {
    /// Broadcasts an action revelation to every client with the feed open.
    ///
    /// Returns the number of clients reached.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the revelation is malformed
    /// - [`Error::InvalidState`] if the transport is not started
    pub fn action_revelation(&self, revelation: Revelation) -> Result<usize> {
        let feed_md5 = revelation.validate()?;
        self.require_state(TransportState::Started)?;

        let inner = &self.inner;
        let delivered = inner.run(|state, _| {
            let feed = revelation.feed().clone();
            let recipients: Vec<TransportClientId> = state
                .feeds
                .clients_of(feed.key())
                .into_iter()
                .filter(|(_, feed_state)| *feed_state == FeedState::Open)
                .filter_map(|(client_id, _)| state.clients.transport_id(client_id))
                .collect();

            if recipients.is_empty() {
                return 0;
            }

            let (action_name, action_data, feed_deltas) = revelation.into_parts();
            let message = ServerMessage::action_revelation(
                action_name,
                action_data,
                &feed,
                feed_deltas,
                feed_md5,
            );
            inner.notifier().broadcast(recipients, &message)
        });

        debug!(delivered, "Action revelation broadcast");
        Ok(delivered)
    }

    /// Terminates feed subscriptions.
    ///
    /// Open feeds receive a `FeedTermination`; feeds still opening receive a
    /// failed `FeedOpenResponse`. Targets that do not exist are ignored.
    /// Returns the number of subscriptions affected.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the termination is malformed
    /// - [`Error::InvalidState`] if the transport is not started
    pub fn feed_termination(&self, termination: Termination) -> Result<usize> {
        termination.validate()?;
        self.require_state(TransportState::Started)?;

        let inner = &self.inner;
        Ok(inner.run(|state, _| inner.terminate(state, termination)))
    }

    /// Disconnects a client. Unknown clients are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the disconnect.
    pub fn disconnect(&self, client_id: ClientId) -> Result<()> {
        let state = self.inner.state.lock();
        let Some(transport_id) = state.clients.transport_id(client_id) else {
            return Ok(());
        };

        debug!(client_id = %client_id, "Disconnecting client");
        self.inner.transport.disconnect(transport_id, None)
    }
}

// ============================================================================
// Server - Introspection
// ============================================================================

impl Server {
    /// Returns the number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.inner.state.lock().clients.len()
    }

    /// Returns the client ID assigned to a transport connection.
    #[must_use]
    pub fn client_id(&self, transport_id: TransportClientId) -> Option<ClientId> {
        self.inner.state.lock().clients.client_id(transport_id)
    }

    /// Returns a client's handshake status, `None` if not connected.
    #[must_use]
    pub fn handshake_status(&self, client_id: ClientId) -> Option<HandshakeStatus> {
        self.inner.state.lock().clients.status(client_id)
    }

    /// Returns a client's subscription state for a feed, `None` when closed.
    #[must_use]
    pub fn feed_state(&self, client_id: ClientId, feed: &Feed) -> Option<FeedState> {
        self.inner.state.lock().feeds.state(client_id, feed.key())
    }
}

// ============================================================================
// ServerInner - Engine
// ============================================================================

impl ServerInner {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        options: ServerOptions,
        runtime: Option<Handle>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            transport,
            options,
            state: Mutex::new(ServerState::default()),
            handlers: RwLock::new(Handlers::default()),
            runtime,
            pump: Mutex::new(None),
        })
    }

    /// Starts a timer on the server's runtime.
    ///
    /// `None` only when the server was built without a runtime, which the
    /// builder allows only with both timeouts disabled.
    fn start_timer<F>(&self, token: u64, delay: Duration, callback: F) -> Option<Timer>
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(runtime) = &self.runtime else {
            warn!(token, "No tokio runtime, timer not started");
            return None;
        };
        Some(Timer::start(runtime, token, delay, callback))
    }

    #[inline]
    pub(crate) fn notifier(&self) -> Notifier<'_> {
        Notifier::new(self.transport.as_ref())
    }

    /// Runs `f` under the engine lock, then runs the deferred work it queued.
    pub(crate) fn run<T>(&self, f: impl FnOnce(&mut ServerState, &mut Vec<Followup>) -> T) -> T {
        let mut followups = Vec::new();
        let result = {
            let mut state = self.state.lock();
            f(&mut state, &mut followups)
        };
        self.run_followups(followups);
        result
    }

    fn run_followups(&self, followups: Vec<Followup>) {
        if followups.is_empty() {
            return;
        }

        let event_handler = self.handlers.read().event.clone();
        for followup in followups {
            match followup {
                Followup::Emit(event) => {
                    if let Some(handler) = &event_handler {
                        handler(&event);
                    }
                }
                Followup::Handshake(handler, request, responder) => handler(request, responder),
                Followup::Action(handler, request, responder) => handler(request, responder),
                Followup::FeedOpen(handler, request, responder) => handler(request, responder),
                Followup::FeedClose(handler, request, responder) => handler(request, responder),
            }
        }
    }

    pub(crate) fn handle_transport_event(&self, event: TransportEvent) {
        self.run(|state, out| match event {
            TransportEvent::Starting => {
                info!("Transport starting");
                out.push(Followup::Emit(ServerEvent::Starting));
            }

            TransportEvent::Start => {
                info!("Transport started");
                out.push(Followup::Emit(ServerEvent::Start));
            }

            TransportEvent::Stopping { error } => {
                match &error {
                    Some(e) => warn!(error = %e, "Transport stopping unexpectedly"),
                    None => info!("Transport stopping"),
                }
                self.purge_all(state, out);
                out.push(Followup::Emit(ServerEvent::Stopping { error }));
            }

            TransportEvent::Stop { error } => {
                info!("Transport stopped");
                out.push(Followup::Emit(ServerEvent::Stop { error }));
            }

            TransportEvent::Connect { client } => self.on_connect(state, client, out),

            TransportEvent::Disconnect { client, error } => {
                self.on_disconnect(state, client, error, out);
            }

            TransportEvent::Message { client, text } => self.on_message(state, client, &text, out),

            TransportEvent::Error { error } => {
                warn!(error = %error, "Transport error");
                out.push(Followup::Emit(ServerEvent::TransportError { error }));
            }
        });
    }

    fn on_connect(
        &self,
        state: &mut ServerState,
        transport_id: TransportClientId,
        out: &mut Vec<Followup>,
    ) {
        let transport_state = self.transport.state();
        if !matches!(transport_state, TransportState::Starting | TransportState::Started) {
            warn!(
                transport_id = %transport_id,
                state = %transport_state,
                "Connect while transport is not running ignored"
            );
            return;
        }

        if state.clients.client_id(transport_id).is_some() {
            warn!(transport_id = %transport_id, "Duplicate connect ignored");
            return;
        }

        let client_id = state.clients.insert(transport_id);

        if let Some(delay) = self.options.handshake_timeout() {
            let token = state.next_token();
            let me = self.me.clone();
            let timer = self.start_timer(token, delay, move || {
                if let Some(inner) = me.upgrade() {
                    inner.on_handshake_timeout(client_id, token);
                }
            });
            if let Some(timer) = timer {
                state.clients.set_handshake_timer(client_id, timer);
            }
        }

        info!(client_id = %client_id, transport_id = %transport_id, "Client connected");
        out.push(Followup::Emit(ServerEvent::Connect { client_id }));
    }

    fn on_disconnect(
        &self,
        state: &mut ServerState,
        transport_id: TransportClientId,
        error: Option<Error>,
        out: &mut Vec<Followup>,
    ) {
        let Some(client_id) = state.clients.remove_by_transport(transport_id) else {
            debug!(transport_id = %transport_id, "Disconnect for unknown connection");
            return;
        };

        Self::purge_client(state, client_id);

        match &error {
            Some(e) => info!(client_id = %client_id, error = %e, "Client disconnected"),
            None => info!(client_id = %client_id, "Client disconnected"),
        }
        out.push(Followup::Emit(ServerEvent::Disconnect { client_id, error }));
    }

    /// Drops every client still known, ahead of the transport shutting down.
    fn purge_all(&self, state: &mut ServerState, out: &mut Vec<Followup>) {
        for client_id in state.clients.ids() {
            state.clients.remove(client_id);
            Self::purge_client(state, client_id);

            info!(client_id = %client_id, "Client dropped by transport shutdown");
            out.push(Followup::Emit(ServerEvent::Disconnect {
                client_id,
                error: Some(Error::TransportStopping),
            }));
        }
    }

    /// Removes a departed client's feeds and neutralizes its requests.
    fn purge_client(state: &mut ServerState, client_id: ClientId) {
        let handshake = usize::from(state.handshakes.neutralize(&client_id).is_some());
        let actions = state.actions.neutralize_client(client_id);
        let opens = state.feed_opens.neutralize_client(client_id);
        let closes = state.feed_closes.neutralize_client(client_id);
        let feeds = state.feeds.remove_client(client_id).len();

        debug!(
            client_id = %client_id,
            neutralized = handshake + actions + opens + closes,
            feeds,
            "Client state purged"
        );
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn on_handshake_timeout(&self, client_id: ClientId, token: u64) {
        self.run(|state, _| {
            let Some(transport_id) = state.clients.expire_handshake_timer(client_id, token) else {
                return;
            };

            warn!(
                client_id = %client_id,
                timeout_ms = self.options.handshake_ms,
                "Handshake timed out"
            );
            let error = Error::handshake_timeout(self.options.handshake_ms);
            if let Err(e) = self.transport.disconnect(transport_id, Some(error)) {
                warn!(client_id = %client_id, error = %e, "Failed to disconnect timed-out client");
            }
        });
    }

    fn on_termination_timeout(&self, client_id: ClientId, key: FeedKey, token: u64) {
        self.run(|state, _| {
            if state.feeds.forget_terminated(client_id, &key, token) {
                debug!(client_id = %client_id, feed = %key, "Terminated feed forgotten");
            }
        });
    }

    // ========================================================================
    // Terminations
    // ========================================================================

    fn terminate(&self, state: &mut ServerState, termination: Termination) -> usize {
        let Termination {
            target,
            error_code,
            error_data,
        } = termination;

        let targets: Vec<(ClientId, Feed)> = match target {
            TerminationTarget::ClientFeed(client_id, feed) => vec![(client_id, feed)],

            TerminationTarget::Client(client_id) => state
                .feeds
                .feeds_of(client_id)
                .into_iter()
                .filter_map(|(key, _)| state.feeds.feed(&key).cloned())
                .map(|feed| (client_id, feed))
                .collect(),

            TerminationTarget::Feed(feed) => state
                .feeds
                .clients_of(feed.key())
                .into_iter()
                .map(|(client_id, _)| (client_id, feed.clone()))
                .collect(),
        };

        let mut affected = 0;
        for (client_id, feed) in targets {
            if self.terminate_entry(state, client_id, &feed, &error_code, &error_data) {
                affected += 1;
            }
        }
        affected
    }

    /// Terminates one (client, feed) entry. Returns `false` if nothing changed.
    fn terminate_entry(
        &self,
        state: &mut ServerState,
        client_id: ClientId,
        feed: &Feed,
        error_code: &str,
        error_data: &JsonObject,
    ) -> bool {
        let Some(transport_id) = state.clients.transport_id(client_id) else {
            return false;
        };

        match state.feeds.state(client_id, feed.key()) {
            Some(FeedState::Opening) => {
                state
                    .feed_opens
                    .neutralize(&(client_id, feed.key().clone()));
                state.feeds.set(client_id, feed, None);

                debug!(client_id = %client_id, feed = %feed, error_code, "Opening feed terminated");
                let message = ServerMessage::feed_open_failure(feed, error_code, error_data.clone());
                self.notifier().send(transport_id, &message);
                true
            }

            Some(FeedState::Open) => {
                let timer = self.options.termination_timeout().and_then(|delay| {
                    let token = state.next_token();
                    let me = self.me.clone();
                    let key = feed.key().clone();
                    self.start_timer(token, delay, move || {
                        if let Some(inner) = me.upgrade() {
                            inner.on_termination_timeout(client_id, key, token);
                        }
                    })
                });
                state.feeds.terminate(client_id, feed, timer);

                debug!(client_id = %client_id, feed = %feed, error_code, "Open feed terminated");
                let message = ServerMessage::feed_termination(feed, error_code, error_data.clone());
                self.notifier().send(transport_id, &message);
                true
            }

            Some(FeedState::Closing | FeedState::Terminated) | None => false,
        }
    }

    // ========================================================================
    // Resolutions
    // ========================================================================

    pub(crate) fn resolve_handshake(&self, client_id: ClientId, flags: &Arc<PendingFlags>) {
        self.run(|state, _| {
            let Some(request) = state.handshakes.take(&client_id, flags) else {
                return;
            };
            let Some(transport_id) = state.clients.transport_id(client_id) else {
                return;
            };

            state.clients.set_status(client_id, HandshakeStatus::Complete);
            debug!(client_id = %client_id, version = %request.version, "Handshake complete");

            let message = ServerMessage::handshake_success(request.version, client_id);
            self.notifier().send(transport_id, &message);
        });
    }

    pub(crate) fn resolve_action(
        &self,
        key: &(ClientId, CallbackId),
        flags: &Arc<PendingFlags>,
        outcome: Outcome,
    ) {
        self.run(|state, _| {
            let Some(request) = state.actions.take(key, flags) else {
                return;
            };
            let Some(transport_id) = state.clients.transport_id(request.client_id) else {
                return;
            };

            let message = match outcome {
                Outcome::Success(data) => {
                    debug!(client_id = %request.client_id, callback_id = %request.callback_id, "Action succeeded");
                    ServerMessage::action_success(request.callback_id, data)
                }
                Outcome::Failure { code, data } => {
                    debug!(client_id = %request.client_id, callback_id = %request.callback_id, error_code = %code, "Action failed");
                    ServerMessage::action_failure(request.callback_id, code, data)
                }
            };
            self.notifier().send(transport_id, &message);
        });
    }

    pub(crate) fn resolve_feed_open(
        &self,
        key: &(ClientId, FeedKey),
        flags: &Arc<PendingFlags>,
        outcome: Outcome,
    ) {
        self.run(|state, _| {
            let Some(request) = state.feed_opens.take(key, flags) else {
                return;
            };
            let Some(transport_id) = state.clients.transport_id(request.client_id) else {
                return;
            };

            let message = match outcome {
                Outcome::Success(data) => {
                    state
                        .feeds
                        .set(request.client_id, &request.feed, Some(FeedState::Open));
                    debug!(client_id = %request.client_id, feed = %request.feed, "Feed opened");
                    ServerMessage::feed_open_success(&request.feed, data)
                }
                Outcome::Failure { code, data } => {
                    state.feeds.set(request.client_id, &request.feed, None);
                    debug!(client_id = %request.client_id, feed = %request.feed, error_code = %code, "Feed open rejected");
                    ServerMessage::feed_open_failure(&request.feed, code, data)
                }
            };
            self.notifier().send(transport_id, &message);
        });
    }

    pub(crate) fn resolve_feed_close(&self, key: &(ClientId, FeedKey), flags: &Arc<PendingFlags>) {
        self.run(|state, _| {
            let Some(request) = state.feed_closes.take(key, flags) else {
                return;
            };
            let Some(transport_id) = state.clients.transport_id(request.client_id) else {
                return;
            };

            state.feeds.set(request.client_id, &request.feed, None);
            debug!(client_id = %request.client_id, feed = %request.feed, "Feed closed");
            self.notifier()
                .send(transport_id, &ServerMessage::feed_close(&request.feed));
        });
    }
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
