//! Test harness driving a server over an in-memory transport.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::identifiers::{ClientId, TransportClientId};
use crate::protocol::{Feed, JsonObject};
use crate::transport::{MemoryTransport, TransportEvents};

use super::core::Server;
use super::events::ServerEvent;
use super::feeds::FeedState;
use super::options::ServerOptions;

/// A notification captured by the harness.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Recorded {
    pub name: &'static str,
    pub client_id: Option<ClientId>,
    pub error_code: Option<&'static str>,
}

impl Recorded {
    fn from_event(event: &ServerEvent) -> Self {
        let error = match event {
            ServerEvent::Stopping { error }
            | ServerEvent::Stop { error }
            | ServerEvent::Disconnect { error, .. } => error.as_ref(),
            ServerEvent::BadClientMessage { error, .. } | ServerEvent::TransportError { error } => {
                Some(error)
            }
            ServerEvent::Starting | ServerEvent::Start | ServerEvent::Connect { .. } => None,
        };

        Self {
            name: event.name(),
            client_id: event.client_id(),
            error_code: error.map(|e| e.code()),
        }
    }
}

/// Server plus memory transport, pumped by hand.
pub(crate) struct Harness {
    pub server: Server,
    pub transport: Arc<MemoryTransport>,
    events: TransportEvents,
    recorded: Arc<Mutex<Vec<Recorded>>>,
}

impl Harness {
    /// Started server with both timers disabled.
    pub(crate) fn new() -> Self {
        Self::with_options(ServerOptions::new().with_handshake_ms(0).with_termination_ms(0))
    }

    /// Started server with the given options. Timers need a tokio runtime.
    pub(crate) fn with_options(options: ServerOptions) -> Self {
        let (transport, events) = MemoryTransport::new();
        let server = Server::builder()
            .transport(Arc::clone(&transport))
            .options(options)
            .build()
            .expect("build server");

        let recorded = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&recorded);
        server.set_event_handler(move |event| sink.lock().push(Recorded::from_event(event)));

        server.start().expect("start server");

        let mut harness = Self {
            server,
            transport,
            events,
            recorded,
        };
        harness.pump();
        harness.take_events();
        harness
    }

    /// Delivers every queued transport event.
    pub(crate) fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.server.handle_transport_event(event);
        }
    }

    pub(crate) fn connect(&mut self) -> (TransportClientId, ClientId) {
        let tid = self.transport.connect();
        self.pump();
        let cid = self.server.client_id(tid).expect("client registered");
        (tid, cid)
    }

    /// Connects and completes a handshake, discarding the response.
    pub(crate) fn handshaken(&mut self) -> (TransportClientId, ClientId) {
        let (tid, cid) = self.connect();
        self.send(tid, json!({"MessageType": "Handshake", "Versions": ["0.1"]}));
        self.sent();
        (tid, cid)
    }

    pub(crate) fn send(&mut self, tid: TransportClientId, message: Value) {
        self.send_raw(tid, &message.to_string());
    }

    pub(crate) fn send_raw(&mut self, tid: TransportClientId, text: &str) {
        self.transport.receive(tid, text);
        self.pump();
    }

    /// Installs an accepting feed open handler and opens a feed.
    pub(crate) fn open_feed(&mut self, tid: TransportClientId, name: &str, args: Value) -> Feed {
        self.server
            .on_feed_open(|_, responder| responder.success(JsonObject::new()));
        self.send(
            tid,
            json!({"MessageType": "FeedOpen", "FeedName": name, "FeedArgs": args}),
        );

        let args = serde_json::from_value(args).expect("string arguments");
        let feed = Feed::new(name, args);
        let cid = self.server.client_id(tid).expect("client registered");
        assert_eq!(self.server.feed_state(cid, &feed), Some(FeedState::Open));
        feed
    }

    /// Drains every frame sent so far, parsed as JSON.
    pub(crate) fn sent(&self) -> Vec<Value> {
        self.transport
            .take_sent_json()
            .into_iter()
            .map(|(_, json)| json)
            .collect()
    }

    pub(crate) fn take_events(&self) -> Vec<Recorded> {
        std::mem::take(&mut *self.recorded.lock())
    }

    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.take_events().into_iter().map(|e| e.name).collect()
    }

    pub(crate) fn references(&self, client_id: ClientId) -> bool {
        self.server.inner.state.lock().references(client_id)
    }

    pub(crate) fn pending_actions(&self) -> usize {
        self.server.inner.state.lock().actions.len()
    }

    pub(crate) fn has_termination_timer(&self, client_id: ClientId, feed: &Feed) -> bool {
        self.server
            .inner
            .state
            .lock()
            .feeds
            .has_timer(client_id, feed.key())
    }

    pub(crate) fn feed_table_is_empty(&self) -> bool {
        let state = self.server.inner.state.lock();
        state.clients.ids().iter().all(|cid| state.feeds.feeds_of(*cid).is_empty())
    }

    pub(crate) fn assert_consistent(&self) {
        assert!(self.server.inner.state.lock().feeds.is_consistent());
    }
}

/// Converts a JSON object literal into a [`JsonObject`].
pub(crate) fn obj(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

/// Lets spawned timer tasks run after a clock advance.
pub(crate) async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
