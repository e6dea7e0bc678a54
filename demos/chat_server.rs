//! Minimal chat room over WebSocket.
//!
//! Demonstrates:
//! - Building a server on the WebSocket transport
//! - Accepting feed opens for `chat` rooms
//! - Handling a `post` action and revealing it to room subscribers
//! - Logging server notifications
//!
//! Usage:
//!   cargo run --example chat_server
//!   cargo run --example chat_server -- --debug
//!   cargo run --example chat_server -- --port 9000

// ============================================================================
// Imports
// ============================================================================

use feedme_server::{
    ActionRequest, ActionResponder, Feed, FeedDelta, FeedOpenRequest, FeedOpenResponder,
    JsonObject, Result, Revelation, Server, ServerEvent, WsTransport,
};
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_PORT: u16 = 8080;
const FEED_NAME: &str = "chat";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    init_logging(args.iter().any(|a| a == "--debug"));

    let port = args
        .iter()
        .position(|a| a == "--port")
        .and_then(|i| args.get(i + 1))
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    if let Err(e) = run(port).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "feedme_server=debug,chat_server=debug"
    } else {
        "feedme_server=info,chat_server=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn run(port: u16) -> Result<()> {
    let (transport, events) = WsTransport::with_port(port);
    let server = Server::builder()
        .transport(transport.clone())
        .events(events)
        .build()?;

    server.set_event_handler(log_event);
    server.on_feed_open(open_room);

    let poster = server.clone();
    server.on_action(move |request, responder| post(&poster, request, responder));

    server.start()?;
    println!("Listening on port {port}. Press Ctrl+C to exit...");

    tokio::signal::ctrl_c().await.ok();
    server.stop()?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

fn log_event(event: &ServerEvent) {
    match event {
        ServerEvent::BadClientMessage { client_id, error } => {
            warn!(%client_id, %error, "Bad client message");
        }
        other => info!(event = other.name(), client_id = ?other.client_id(), "Server event"),
    }
}

/// Accepts any `chat` feed carrying a `room` argument.
fn open_room(request: FeedOpenRequest, responder: FeedOpenResponder) {
    let feed = &request.feed;
    if feed.name() != FEED_NAME || !feed.args().contains_key("room") {
        let mut data = JsonObject::new();
        data.insert("feed".to_string(), json!(feed.to_string()));
        if let Err(e) = responder.failure("UNKNOWN_FEED", data) {
            warn!(%e, "Feed open failure rejected");
        }
        return;
    }

    let mut data = JsonObject::new();
    data.insert("messages".to_string(), json!([]));
    responder.success(data);
}

/// `post` with `{room, text}` appends a message to the room feed.
fn post(server: &Server, request: ActionRequest, responder: ActionResponder) {
    let args = &request.action_args;
    let (Some(room), Some(text)) = (
        args.get("room").and_then(Value::as_str),
        args.get("text").and_then(Value::as_str),
    ) else {
        if let Err(e) = responder.failure("INVALID_ARGUMENTS", JsonObject::new()) {
            warn!(%e, "Action failure rejected");
        }
        return;
    };

    let feed = Feed::with_args(FEED_NAME, [("room", room)]);
    let mut action_data = JsonObject::new();
    action_data.insert("text".to_string(), json!(text));

    let revelation = Revelation::new("message_posted", feed)
        .action_data(action_data)
        .delta(FeedDelta::InsertLast {
            path: vec!["messages".into()],
            value: json!(text),
        });

    match server.action_revelation(revelation) {
        Ok(count) => {
            info!(room, subscribers = count, "Message posted");
            responder.success(JsonObject::new());
        }
        Err(e) => {
            warn!(%e, "Revelation failed");
            if let Err(e) = responder.failure("POST_FAILED", JsonObject::new()) {
                warn!(%e, "Action failure rejected");
            }
        }
    }
}
