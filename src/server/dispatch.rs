//! Inbound message dispatch.
//!
//! Every frame is parsed and validated first. Invalid frames and messages
//! that arrive out of sequence are answered with a `ViolationResponse` that
//! echoes the raw frame; the connection stays open.
//!
//! | Message | Requires | Otherwise |
//! |---------|----------|-----------|
//! | `Handshake` | status `waiting` | "Unexpected Handshake message." |
//! | `Action` | status `complete`, `CallbackId` not outstanding | "Handshake required." / "Action message reused an outstanding CallbackId." |
//! | `FeedOpen` | status `complete`, feed closed or terminated | "Handshake required." / "Unexpected FeedOpen message." |
//! | `FeedClose` | status `complete`, feed open or terminated | "Handshake required." / "Unexpected FeedClose message." |

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ClientId, TransportClientId};
use crate::protocol::client::{
    self, Action, FeedClose, FeedOpen, Handshake, PROBLEM_HANDSHAKE_REQUIRED,
    PROBLEM_REUSED_CALLBACK_ID, PROBLEM_UNEXPECTED_FEED_CLOSE, PROBLEM_UNEXPECTED_FEED_OPEN,
    PROBLEM_UNEXPECTED_HANDSHAKE,
};
use crate::protocol::{ClientMessage, INTERNAL_ERROR, JsonObject, SUPPORTED_VERSIONS, ServerMessage};

use super::clients::HandshakeStatus;
use super::core::{Followup, ServerInner, ServerState};
use super::events::ServerEvent;
use super::feeds::FeedState;
use super::responders::{
    ActionRequest, ActionResponder, FeedCloseRequest, FeedCloseResponder, FeedOpenRequest,
    FeedOpenResponder, HandshakeRequest, HandshakeResponder,
};

// ============================================================================
// Dispatch
// ============================================================================

impl ServerInner {
    /// Handles one frame from a client.
    pub(super) fn on_message(
        &self,
        state: &mut ServerState,
        transport_id: TransportClientId,
        text: &str,
        out: &mut Vec<Followup>,
    ) {
        let Some(client_id) = state.clients.client_id(transport_id) else {
            warn!(transport_id = %transport_id, "Message from unknown connection dropped");
            return;
        };

        trace!(client_id = %client_id, text, "Received frame");

        let result = ClientMessage::parse(text).and_then(|message| match message {
            ClientMessage::Handshake(m) => self.on_handshake(state, client_id, transport_id, m, out),
            ClientMessage::Action(m) => self.on_action(state, client_id, transport_id, m, out),
            ClientMessage::FeedOpen(m) => self.on_feed_open(state, client_id, transport_id, m, out),
            ClientMessage::FeedClose(m) => self.on_feed_close(state, client_id, transport_id, m, out),
        });

        if let Err(error) = result {
            self.reject(client_id, transport_id, text, error, out);
        }
    }

    /// Answers a violation and reports it.
    fn reject(
        &self,
        client_id: ClientId,
        transport_id: TransportClientId,
        text: &str,
        error: Error,
        out: &mut Vec<Followup>,
    ) {
        let problem = error.problem().unwrap_or(client::PROBLEM_SCHEMA_VIOLATION);
        warn!(client_id = %client_id, error = %error, "Client protocol violation");

        self.notifier()
            .send(transport_id, &ServerMessage::violation(problem, text));
        out.push(Followup::Emit(ServerEvent::BadClientMessage { client_id, error }));
    }

    // ========================================================================
    // Handshake
    // ========================================================================

    fn on_handshake(
        &self,
        state: &mut ServerState,
        client_id: ClientId,
        transport_id: TransportClientId,
        message: Handshake,
        out: &mut Vec<Followup>,
    ) -> Result<()> {
        if state.clients.status(client_id) != Some(HandshakeStatus::Waiting) {
            return Err(Error::unexpected_message(PROBLEM_UNEXPECTED_HANDSHAKE));
        }

        let Some(version) = negotiate(&message.versions) else {
            debug!(client_id = %client_id, versions = ?message.versions, "No common protocol version");
            self.notifier()
                .send(transport_id, &ServerMessage::handshake_failure());
            return Ok(());
        };

        state.clients.cancel_handshake_timer(client_id);

        let Some(handler) = self.handlers.read().handshake.clone() else {
            state.clients.set_status(client_id, HandshakeStatus::Complete);
            debug!(client_id = %client_id, version, "Handshake complete");
            self.notifier()
                .send(transport_id, &ServerMessage::handshake_success(version, client_id));
            return Ok(());
        };

        state.clients.set_status(client_id, HandshakeStatus::Processing);
        let request = HandshakeRequest {
            client_id,
            versions: message.versions,
            version: version.to_string(),
        };
        let flags = state.handshakes.insert(client_id, request.clone());
        let responder = HandshakeResponder::new(self.me.clone(), flags, client_id);

        debug!(client_id = %client_id, version, "Handshake awaiting application");
        out.push(Followup::Handshake(handler, request, responder));
        Ok(())
    }

    // ========================================================================
    // Action
    // ========================================================================

    fn on_action(
        &self,
        state: &mut ServerState,
        client_id: ClientId,
        transport_id: TransportClientId,
        message: Action,
        out: &mut Vec<Followup>,
    ) -> Result<()> {
        require_handshake(state, client_id)?;

        let key = (client_id, message.callback_id.clone());
        if state.actions.contains(&key) {
            return Err(Error::unexpected_message(PROBLEM_REUSED_CALLBACK_ID));
        }

        let Some(handler) = self.handlers.read().action.clone() else {
            debug!(client_id = %client_id, action = %message.action_name, "No action handler");
            let response =
                ServerMessage::action_failure(message.callback_id, INTERNAL_ERROR, JsonObject::new());
            self.notifier().send(transport_id, &response);
            return Ok(());
        };

        let request = ActionRequest {
            client_id,
            action_name: message.action_name,
            action_args: message.action_args,
            callback_id: message.callback_id,
        };
        let flags = state.actions.insert(key.clone(), request.clone());
        let responder = ActionResponder::new(self.me.clone(), flags, key);

        debug!(
            client_id = %client_id,
            action = %request.action_name,
            callback_id = %request.callback_id,
            "Action awaiting application"
        );
        out.push(Followup::Action(handler, request, responder));
        Ok(())
    }

    // ========================================================================
    // Feeds
    // ========================================================================

    fn on_feed_open(
        &self,
        state: &mut ServerState,
        client_id: ClientId,
        transport_id: TransportClientId,
        message: FeedOpen,
        out: &mut Vec<Followup>,
    ) -> Result<()> {
        require_handshake(state, client_id)?;

        let feed = message.feed();
        match state.feeds.state(client_id, feed.key()) {
            Some(FeedState::Opening | FeedState::Open | FeedState::Closing) => {
                return Err(Error::unexpected_message(PROBLEM_UNEXPECTED_FEED_OPEN));
            }
            Some(FeedState::Terminated) | None => {}
        }

        let Some(handler) = self.handlers.read().feed_open.clone() else {
            state.feeds.set(client_id, &feed, None);
            debug!(client_id = %client_id, feed = %feed, "No feed open handler");
            let response = ServerMessage::feed_open_failure(&feed, INTERNAL_ERROR, JsonObject::new());
            self.notifier().send(transport_id, &response);
            return Ok(());
        };

        state.feeds.set(client_id, &feed, Some(FeedState::Opening));
        let key = (client_id, feed.key().clone());
        let request = FeedOpenRequest { client_id, feed };
        let flags = state.feed_opens.insert(key.clone(), request.clone());
        let responder = FeedOpenResponder::new(self.me.clone(), flags, key);

        debug!(client_id = %client_id, feed = %request.feed, "Feed open awaiting application");
        out.push(Followup::FeedOpen(handler, request, responder));
        Ok(())
    }

    fn on_feed_close(
        &self,
        state: &mut ServerState,
        client_id: ClientId,
        transport_id: TransportClientId,
        message: FeedClose,
        out: &mut Vec<Followup>,
    ) -> Result<()> {
        require_handshake(state, client_id)?;

        let feed = message.feed();
        let handler = match state.feeds.state(client_id, feed.key()) {
            Some(FeedState::Open) => self.handlers.read().feed_close.clone(),
            // Termination already closed it for the client
            Some(FeedState::Terminated) => None,
            Some(FeedState::Opening | FeedState::Closing) | None => {
                return Err(Error::unexpected_message(PROBLEM_UNEXPECTED_FEED_CLOSE));
            }
        };

        let Some(handler) = handler else {
            state.feeds.set(client_id, &feed, None);
            debug!(client_id = %client_id, feed = %feed, "Feed closed");
            self.notifier()
                .send(transport_id, &ServerMessage::feed_close(&feed));
            return Ok(());
        };

        state.feeds.set(client_id, &feed, Some(FeedState::Closing));
        let key = (client_id, feed.key().clone());
        let request = FeedCloseRequest { client_id, feed };
        let flags = state.feed_closes.insert(key.clone(), request.clone());
        let responder = FeedCloseResponder::new(self.me.clone(), flags, key);

        debug!(client_id = %client_id, feed = %request.feed, "Feed close awaiting application");
        out.push(Followup::FeedClose(handler, request, responder));
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Picks the first offered version the server supports.
fn negotiate(offered: &[String]) -> Option<&'static str> {
    offered.iter().find_map(|version| {
        SUPPORTED_VERSIONS
            .iter()
            .copied()
            .find(|supported| supported == version)
    })
}

fn require_handshake(state: &ServerState, client_id: ClientId) -> Result<()> {
    if state.clients.status(client_id) == Some(HandshakeStatus::Complete) {
        Ok(())
    } else {
        Err(Error::unexpected_message(PROBLEM_HANDSHAKE_REQUIRED))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::{Value, json};

    use crate::protocol::Feed;
    use crate::server::commands::Termination;
    use crate::server::testing::{Harness, obj};

    const HANDSHAKE: &str = r#"{"MessageType":"Handshake","Versions":["0.1"]}"#;

    fn violation(problem: &str, raw: &str) -> Value {
        json!({
            "MessageType": "ViolationResponse",
            "Diagnostics": {"Problem": problem, "Message": raw}
        })
    }

    fn action(callback_id: &str) -> String {
        json!({
            "MessageType": "Action",
            "ActionName": "some_action",
            "ActionArgs": {"action": "args"},
            "CallbackId": callback_id
        })
        .to_string()
    }

    fn feed_open() -> String {
        json!({"MessageType": "FeedOpen", "FeedName": "some_feed", "FeedArgs": {"feed": "args"}})
            .to_string()
    }

    fn feed_close() -> String {
        json!({"MessageType": "FeedClose", "FeedName": "some_feed", "FeedArgs": {"feed": "args"}})
            .to_string()
    }

    fn some_feed() -> Feed {
        Feed::with_args("some_feed", [("feed", "args")])
    }

    /// Collects responders handed to a handler.
    fn collect<R: Send + 'static>() -> Arc<Mutex<Vec<R>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_negotiate() {
        assert_eq!(negotiate(&["0.1".to_string()]), Some("0.1"));
        assert_eq!(negotiate(&["9".to_string(), "0.1".to_string()]), Some("0.1"));
        assert_eq!(negotiate(&["9".to_string()]), None);
    }

    // ========================================================================
    // Parsing
    // ========================================================================

    #[test]
    fn test_invalid_json_is_violation() {
        let mut harness = Harness::new();
        let (tid, cid) = harness.connect();
        harness.take_events();

        harness.send_raw(tid, "not json");
        assert_eq!(harness.sent(), vec![violation("Invalid JSON.", "not json")]);

        let events = harness.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "badClientMessage");
        assert_eq!(events[0].client_id, Some(cid));
        assert_eq!(events[0].error_code, Some("INVALID_MESSAGE"));
        assert!(harness.transport.is_connected(tid));
    }

    #[test]
    fn test_schema_violation() {
        let mut harness = Harness::new();
        let (tid, _) = harness.connect();

        let raw = r#"{"MessageType":"Handshake","Versions":[]}"#;
        harness.send_raw(tid, raw);
        assert_eq!(harness.sent(), vec![violation("Schema violation.", raw)]);
    }

    // ========================================================================
    // Handshake
    // ========================================================================

    #[test]
    fn test_handshake_without_handler() {
        let mut harness = Harness::new();
        let (tid, cid) = harness.connect();

        harness.send_raw(tid, HANDSHAKE);
        assert_eq!(
            harness.sent(),
            vec![json!({
                "MessageType": "HandshakeResponse",
                "Success": true,
                "Version": "0.1",
                "ClientId": cid.to_string()
            })]
        );
        assert_eq!(harness.server.handshake_status(cid), Some(HandshakeStatus::Complete));
    }

    #[test]
    fn test_handshake_with_handler() {
        let mut harness = Harness::new();
        let responders = collect::<(HandshakeRequest, HandshakeResponder)>();
        let sink = Arc::clone(&responders);
        harness
            .server
            .on_handshake(move |request, responder| sink.lock().push((request, responder)));

        let (tid, cid) = harness.connect();
        harness.send_raw(tid, HANDSHAKE);

        assert!(harness.sent().is_empty());
        assert_eq!(harness.server.handshake_status(cid), Some(HandshakeStatus::Processing));

        let (request, responder) = responders.lock().remove(0);
        assert_eq!(request.client_id, cid);
        assert_eq!(request.versions, vec!["0.1".to_string()]);
        assert_eq!(request.version, "0.1");

        responder.success();
        assert!(responder.has_responded());
        assert_eq!(
            harness.sent(),
            vec![json!({
                "MessageType": "HandshakeResponse",
                "Success": true,
                "Version": "0.1",
                "ClientId": cid.to_string()
            })]
        );
        assert_eq!(harness.server.handshake_status(cid), Some(HandshakeStatus::Complete));

        // Second resolution is ignored
        responder.success();
        assert!(harness.sent().is_empty());
    }

    #[test]
    fn test_handshake_while_processing_is_violation() {
        let mut harness = Harness::new();
        harness.server.on_handshake(|_, _| {});
        let (tid, _) = harness.connect();

        harness.send_raw(tid, HANDSHAKE);
        harness.send_raw(tid, HANDSHAKE);
        assert_eq!(
            harness.sent(),
            vec![violation("Unexpected Handshake message.", HANDSHAKE)]
        );
    }

    #[test]
    fn test_handshake_after_complete_is_violation() {
        let mut harness = Harness::new();
        let (tid, _) = harness.handshaken();

        harness.send_raw(tid, HANDSHAKE);
        assert_eq!(
            harness.sent(),
            vec![violation("Unexpected Handshake message.", HANDSHAKE)]
        );
    }

    #[test]
    fn test_handshake_retry_after_version_mismatch() {
        let mut harness = Harness::new();
        let (tid, cid) = harness.connect();

        harness.send(tid, json!({"MessageType": "Handshake", "Versions": ["2.0"]}));
        assert_eq!(
            harness.sent(),
            vec![json!({"MessageType": "HandshakeResponse", "Success": false})]
        );

        harness.send_raw(tid, HANDSHAKE);
        assert_eq!(harness.sent()[0]["Success"], true);
        assert_eq!(harness.server.handshake_status(cid), Some(HandshakeStatus::Complete));
    }

    // ========================================================================
    // Action
    // ========================================================================

    #[test]
    fn test_action_requires_handshake() {
        let mut harness = Harness::new();
        let (tid, _) = harness.connect();

        let raw = action("1");
        harness.send_raw(tid, &raw);
        assert_eq!(harness.sent(), vec![violation("Handshake required.", &raw)]);
    }

    #[test]
    fn test_action_without_handler() {
        let mut harness = Harness::new();
        let (tid, _) = harness.handshaken();

        harness.send_raw(tid, &action("1"));
        assert_eq!(
            harness.sent(),
            vec![json!({
                "MessageType": "ActionResponse",
                "Success": false,
                "CallbackId": "1",
                "ErrorCode": "INTERNAL_ERROR",
                "ErrorData": {}
            })]
        );
    }

    #[test]
    fn test_action_success_and_failure() {
        let mut harness = Harness::new();
        let responders = collect::<(ActionRequest, ActionResponder)>();
        let sink = Arc::clone(&responders);
        harness
            .server
            .on_action(move |request, responder| sink.lock().push((request, responder)));
        let (tid, cid) = harness.handshaken();

        harness.send_raw(tid, &action("a"));
        harness.send_raw(tid, &action("b"));
        let mut pending = std::mem::take(&mut *responders.lock());
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].0.client_id, cid);
        assert_eq!(pending[0].0.action_name, "some_action");
        assert_eq!(pending[0].0.action_args, obj(json!({"action": "args"})));

        let (_, second) = pending.pop().expect("second");
        let (_, first) = pending.pop().expect("first");

        // Resolve out of order
        second
            .failure("SOME_ERROR", obj(json!({"error": "data"})))
            .expect("failure");
        first.success(obj(json!({"action": "data"})));

        assert_eq!(
            harness.sent(),
            vec![
                json!({
                    "MessageType": "ActionResponse",
                    "Success": false,
                    "CallbackId": "b",
                    "ErrorCode": "SOME_ERROR",
                    "ErrorData": {"error": "data"}
                }),
                json!({
                    "MessageType": "ActionResponse",
                    "Success": true,
                    "CallbackId": "a",
                    "ActionData": {"action": "data"}
                }),
            ]
        );
    }

    #[test]
    fn test_reused_callback_id() {
        let mut harness = Harness::new();
        harness.server.on_action(|_, _| {});
        let (tid, cid) = harness.handshaken();

        harness.send_raw(tid, &action("123"));
        harness.take_events();

        let raw = action("123");
        harness.send_raw(tid, &raw);
        assert_eq!(
            harness.sent(),
            vec![violation("Action message reused an outstanding CallbackId.", &raw)]
        );
        assert_eq!(harness.take_events()[0].name, "badClientMessage");
        assert_eq!(harness.pending_actions(), 1);
        assert_eq!(harness.server.handshake_status(cid), Some(HandshakeStatus::Complete));
    }

    #[test]
    fn test_callback_id_reusable_after_resolution() {
        let mut harness = Harness::new();
        let responders = collect::<ActionResponder>();
        let sink = Arc::clone(&responders);
        harness
            .server
            .on_action(move |_, responder| sink.lock().push(responder));
        let (tid, _) = harness.handshaken();

        harness.send_raw(tid, &action("1"));
        responders.lock()[0].success(JsonObject::new());
        harness.sent();

        harness.send_raw(tid, &action("1"));
        assert!(harness.sent().is_empty());
        assert_eq!(responders.lock().len(), 2);
    }

    #[test]
    fn test_disconnect_neutralizes_actions() {
        let mut harness = Harness::new();
        let responders = collect::<ActionResponder>();
        let sink = Arc::clone(&responders);
        harness
            .server
            .on_action(move |_, responder| sink.lock().push(responder));
        let (tid, cid) = harness.handshaken();

        harness.send_raw(tid, &action("123"));
        harness.send_raw(tid, &action("456"));
        assert_eq!(harness.pending_actions(), 2);

        harness.transport.close(tid);
        harness.pump();

        let responders = responders.lock();
        assert!(responders.iter().all(ActionResponder::is_neutralized));
        assert!(!harness.references(cid));

        for responder in responders.iter() {
            responder.success(JsonObject::new());
            assert!(!responder.has_responded());
        }
        assert!(harness.sent().is_empty());
    }

    // ========================================================================
    // Feed Open
    // ========================================================================

    #[test]
    fn test_feed_open_success() {
        let mut harness = Harness::new();
        let responders = collect::<(FeedOpenRequest, FeedOpenResponder)>();
        let sink = Arc::clone(&responders);
        harness
            .server
            .on_feed_open(move |request, responder| sink.lock().push((request, responder)));
        let (tid, cid) = harness.handshaken();

        harness.send_raw(tid, &feed_open());
        assert_eq!(harness.server.feed_state(cid, &some_feed()), Some(FeedState::Opening));

        let (request, responder) = responders.lock().remove(0);
        assert_eq!(request.client_id, cid);
        assert_eq!(request.feed, some_feed());

        responder.success(obj(json!({"feed": "data"})));
        assert_eq!(
            harness.sent(),
            vec![json!({
                "MessageType": "FeedOpenResponse",
                "Success": true,
                "FeedName": "some_feed",
                "FeedArgs": {"feed": "args"},
                "FeedData": {"feed": "data"}
            })]
        );
        assert_eq!(harness.server.feed_state(cid, &some_feed()), Some(FeedState::Open));
        harness.assert_consistent();
    }

    #[test]
    fn test_feed_open_failure_returns_to_closed() {
        let mut harness = Harness::new();
        harness.server.on_feed_open(|_, responder| {
            let _ = responder.failure("DENIED", JsonObject::new());
        });
        let (tid, cid) = harness.handshaken();

        harness.send_raw(tid, &feed_open());
        assert_eq!(
            harness.sent(),
            vec![json!({
                "MessageType": "FeedOpenResponse",
                "Success": false,
                "FeedName": "some_feed",
                "FeedArgs": {"feed": "args"},
                "ErrorCode": "DENIED",
                "ErrorData": {}
            })]
        );
        assert_eq!(harness.server.feed_state(cid, &some_feed()), None);
        assert!(harness.feed_table_is_empty());
        harness.assert_consistent();
    }

    #[test]
    fn test_feed_open_without_handler() {
        let mut harness = Harness::new();
        let (tid, cid) = harness.handshaken();

        harness.send_raw(tid, &feed_open());
        let sent = harness.sent();
        assert_eq!(sent[0]["Success"], false);
        assert_eq!(sent[0]["ErrorCode"], "INTERNAL_ERROR");
        assert_eq!(harness.server.feed_state(cid, &some_feed()), None);
    }

    #[test]
    fn test_feed_open_requires_handshake() {
        let mut harness = Harness::new();
        let (tid, _) = harness.connect();

        let raw = feed_open();
        harness.send_raw(tid, &raw);
        assert_eq!(harness.sent(), vec![violation("Handshake required.", &raw)]);
    }

    #[test]
    fn test_feed_open_twice_is_violation() {
        let mut harness = Harness::new();
        harness.server.on_feed_open(|_, _| {});
        let (tid, cid) = harness.handshaken();

        let raw = feed_open();
        harness.send_raw(tid, &raw);
        harness.send_raw(tid, &raw);
        assert_eq!(harness.sent(), vec![violation("Unexpected FeedOpen message.", &raw)]);
        assert_eq!(harness.server.feed_state(cid, &some_feed()), Some(FeedState::Opening));
    }

    #[test]
    fn test_feed_open_argument_order_is_irrelevant() {
        let mut harness = Harness::new();
        harness.server.on_feed_open(|_, _| {});
        let (tid, _) = harness.handshaken();

        harness.send_raw(
            tid,
            r#"{"MessageType":"FeedOpen","FeedName":"f","FeedArgs":{"a":"1","b":"2"}}"#,
        );
        let raw = r#"{"MessageType":"FeedOpen","FeedName":"f","FeedArgs":{"b":"2","a":"1"}}"#;
        harness.send_raw(tid, raw);
        assert_eq!(harness.sent(), vec![violation("Unexpected FeedOpen message.", raw)]);
    }

    // ========================================================================
    // Feed Close
    // ========================================================================

    #[test]
    fn test_open_close_roundtrip() {
        let mut harness = Harness::new();
        let closers = collect::<(FeedCloseRequest, FeedCloseResponder)>();
        let sink = Arc::clone(&closers);
        harness
            .server
            .on_feed_close(move |request, responder| sink.lock().push((request, responder)));
        let (tid, cid) = harness.handshaken();

        harness.open_feed(tid, "some_feed", json!({"feed": "args"}));
        harness.sent();

        harness.send_raw(tid, &feed_close());
        assert_eq!(harness.server.feed_state(cid, &some_feed()), Some(FeedState::Closing));

        let (request, responder) = closers.lock().remove(0);
        assert_eq!(request.feed, some_feed());
        responder.success();

        assert_eq!(
            harness.sent(),
            vec![json!({
                "MessageType": "FeedCloseResponse",
                "FeedName": "some_feed",
                "FeedArgs": {"feed": "args"}
            })]
        );
        assert_eq!(harness.server.feed_state(cid, &some_feed()), None);
        assert!(harness.feed_table_is_empty());
    }

    #[test]
    fn test_feed_close_without_handler() {
        let mut harness = Harness::new();
        let (tid, cid) = harness.handshaken();
        harness.open_feed(tid, "some_feed", json!({"feed": "args"}));
        harness.sent();

        harness.send_raw(tid, &feed_close());
        assert_eq!(harness.sent()[0]["MessageType"], "FeedCloseResponse");
        assert_eq!(harness.server.feed_state(cid, &some_feed()), None);
    }

    #[test]
    fn test_feed_close_when_not_open_is_violation() {
        let mut harness = Harness::new();
        let (tid, _) = harness.handshaken();

        let raw = feed_close();
        harness.send_raw(tid, &raw);
        assert_eq!(harness.sent(), vec![violation("Unexpected FeedClose message.", &raw)]);
    }

    #[test]
    fn test_feed_close_after_termination_skips_handler() {
        let mut harness = Harness::new();
        let closers = collect::<FeedCloseResponder>();
        let sink = Arc::clone(&closers);
        harness
            .server
            .on_feed_close(move |_, responder| sink.lock().push(responder));
        let (tid, cid) = harness.handshaken();
        harness.open_feed(tid, "some_feed", json!({"feed": "args"}));

        harness
            .server
            .feed_termination(Termination::client_feed(cid, some_feed(), "GONE", JsonObject::new()))
            .expect("terminate");
        harness.sent();

        harness.send_raw(tid, &feed_close());
        assert_eq!(harness.sent()[0]["MessageType"], "FeedCloseResponse");
        assert!(closers.lock().is_empty());
        assert_eq!(harness.server.feed_state(cid, &some_feed()), None);
    }

    #[test]
    fn test_disconnect_neutralizes_feed_requests() {
        let mut harness = Harness::new();
        let openers = collect::<FeedOpenResponder>();
        let sink = Arc::clone(&openers);
        harness
            .server
            .on_feed_open(move |_, responder| sink.lock().push(responder));
        let (tid, cid) = harness.handshaken();

        harness.send_raw(tid, &feed_open());
        harness.transport.close(tid);
        harness.pump();

        let opener = openers.lock().remove(0);
        assert!(opener.is_neutralized());
        opener.success(JsonObject::new());
        assert!(harness.sent().is_empty());
        assert!(!harness.references(cid));
        harness.assert_consistent();
    }
}
