//! Action revelation fan-out benchmark.
//!
//! Measures broadcasting one revelation to every client with a feed open,
//! over the in-memory transport:
//! - Subscriber counts: 10, 100, 1000
//!
//! Run with: cargo bench --bench revelation
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use feedme_server::{
    Feed, FeedDelta, MemoryTransport, Revelation, Server, ServerOptions, TransportEvents,
};
use serde_json::{Map, json};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const SUBSCRIBER_COUNTS: &[usize] = &[10, 100, 1000];

// ============================================================================
// Setup
// ============================================================================

fn pump(server: &Server, events: &mut TransportEvents) {
    while let Ok(event) = events.try_recv() {
        server.handle_transport_event(event);
    }
}

/// Starts a server with `subscribers` clients holding the `chat` feed open.
fn setup(subscribers: usize) -> (Server, Arc<MemoryTransport>, TransportEvents, Feed) {
    let (transport, mut events) = MemoryTransport::new();
    let server = Server::builder()
        .transport(Arc::clone(&transport))
        .options(ServerOptions::new().with_handshake_ms(0).with_termination_ms(0))
        .build()
        .expect("build server");
    server.on_feed_open(|_, responder| responder.success(Map::new()));
    server.start().expect("start server");

    let handshake = json!({"MessageType": "Handshake", "Versions": ["0.1"]}).to_string();
    let open = json!({"MessageType": "FeedOpen", "FeedName": "chat", "FeedArgs": {"room": "lobby"}})
        .to_string();

    for _ in 0..subscribers {
        let client = transport.connect();
        transport.receive(client, handshake.clone());
        transport.receive(client, open.clone());
    }
    pump(&server, &mut events);
    transport.take_sent();

    let feed = Feed::with_args("chat", [("room", "lobby")]);
    (server, transport, events, feed)
}

// ============================================================================
// Benchmark: Revelation Fan-out
// ============================================================================

fn bench_revelation(c: &mut Criterion) {
    let mut group = c.benchmark_group("revelation");

    for &count in SUBSCRIBER_COUNTS {
        let (server, transport, _events, feed) = setup(count);
        let mut data = Map::new();
        data.insert("text".to_string(), json!("hello"));

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("broadcast", count), &count, |b, _| {
            b.iter(|| {
                let revelation = Revelation::new("message_posted", feed.clone())
                    .action_data(data.clone())
                    .delta(FeedDelta::Append {
                        path: vec!["log".into()],
                        value: "hello".to_string(),
                    });
                let delivered = server.action_revelation(revelation).expect("broadcast");
                black_box(delivered);
                transport.take_sent();
            });
        });
    }

    group.finish();
}

fn bench_revelation_with_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("revelation_with_hash");
    let (server, transport, _events, feed) = setup(100);

    let mut feed_data = Map::new();
    feed_data.insert(
        "log".to_string(),
        json!((0..100).map(|i| format!("line {i}")).collect::<Vec<_>>()),
    );

    group.bench_function("feed_data_100_lines", |b| {
        b.iter(|| {
            let revelation = Revelation::new("message_posted", feed.clone())
                .feed_data(feed_data.clone());
            black_box(server.action_revelation(revelation).expect("broadcast"));
            transport.take_sent();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_revelation, bench_revelation_with_hash);
criterion_main!(benches);
