//! Integration tests for end-to-end board synchronization.
//!
//! These tests start a real server and connect real clients over real
//! sockets, verifying the full snapshot + delta + immediate-echo pipeline.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;

use mosaic_collab::client::{ConnectionState, SyncClient, SyncEvent};
use mosaic_collab::protocol::{CellDraw, WireMessage};
use mosaic_collab::server::{ServerConfig, SyncServer};
use mosaic_core::color::Color;

const RED: Color = Color { r: 255, g: 0, b: 0 };

/// Find a free port for testing.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a server with the given board/tick settings, return its ws URL.
async fn start_test_server(width: usize, height: usize, tick_interval_ms: u64) -> String {
    start_test_server_with(|config| {
        config.width = width;
        config.height = height;
        config.tick_interval_ms = tick_interval_ms;
    })
    .await
}

async fn start_test_server_with(tweak: impl FnOnce(&mut ServerConfig)) -> String {
    let port = free_port().await;
    let mut config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        ..ServerConfig::default()
    };
    tweak(&mut config);
    let server = SyncServer::new(config);
    tokio::spawn(async move {
        server.run().await.unwrap();
    });
    // Give the server time to bind
    tokio::time::sleep(Duration::from_millis(50)).await;
    format!("ws://127.0.0.1:{port}")
}

/// Read the next text frame, failing the test on timeout or close.
async fn next_frame<S>(ws: &mut S) -> WireMessage
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .expect("read ok");
        if let Message::Text(text) = msg {
            return WireMessage::decode(text.as_str()).expect("valid frame");
        }
    }
}

/// Wait for an event matching the predicate, failing the test on timeout.
async fn wait_for(
    rx: &mut mpsc::Receiver<SyncEvent>,
    pred: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
    loop {
        let event = timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("event within timeout")
            .expect("event channel open");
        if pred(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn test_server_accepts_connections() {
    let url = start_test_server(16, 16, 600_000).await;
    let result = tokio_tungstenite::connect_async(&url).await;
    assert!(result.is_ok(), "should connect to server");
}

#[tokio::test]
async fn test_join_receives_snapshot_first() {
    let url = start_test_server(12, 7, 600_000).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    match next_frame(&mut ws).await {
        WireMessage::Snapshot { board, .. } => {
            assert_eq!(board.len(), 7);
            assert!(board.iter().all(|row| row.len() == 12));
            assert!(board.iter().flatten().all(Option::is_none));
        }
        other => panic!("expected snapshot first, got {other:?}"),
    }
}

#[tokio::test]
async fn test_draw_is_echoed_immediately() {
    // Tick far in the future: only the immediate echo can arrive.
    let url = start_test_server(16, 16, 600_000).await;

    let mut client = SyncClient::new("alice", &url);
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();

    wait_for(&mut events, |e| matches!(e, SyncEvent::SnapshotReceived { .. })).await;
    assert_eq!(client.connection_state().await, ConnectionState::Connected);

    client
        .send_draw(vec![CellDraw::new(3, 4, RED)])
        .await
        .unwrap();

    let event = wait_for(&mut events, |e| matches!(e, SyncEvent::ImmediateDraw { .. })).await;
    match event {
        SyncEvent::ImmediateDraw { cells, submitter_id } => {
            assert_eq!(cells, vec![CellDraw::new(3, 4, RED)]);
            assert_eq!(submitter_id.as_deref(), Some("alice"));
        }
        _ => unreachable!(),
    }

    // The mirror reflects the draw.
    let snap = client.mirror_snapshot().await.unwrap();
    assert_eq!(snap.cells[4 * 16 + 3], Some(RED));
}

#[tokio::test]
async fn test_out_of_bounds_draw_cells_are_discarded() {
    let url = start_test_server(8, 8, 600_000).await;

    let mut client = SyncClient::new("alice", &url);
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();
    wait_for(&mut events, |e| matches!(e, SyncEvent::SnapshotReceived { .. })).await;

    client
        .send_draw(vec![
            CellDraw::new(-5, 2, RED),
            CellDraw::new(2, 2, RED),
            CellDraw::new(800, 800, RED),
        ])
        .await
        .unwrap();

    // Only the in-bounds cell comes back.
    let event = wait_for(&mut events, |e| matches!(e, SyncEvent::ImmediateDraw { .. })).await;
    match event {
        SyncEvent::ImmediateDraw { cells, .. } => {
            assert_eq!(cells, vec![CellDraw::new(2, 2, RED)]);
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_new_observer_snapshot_reflects_draws() {
    let url = start_test_server(16, 16, 600_000).await;

    let mut alice = SyncClient::new("alice", &url);
    let mut alice_events = alice.take_event_rx().unwrap();
    alice.connect().await.unwrap();
    wait_for(&mut alice_events, |e| matches!(e, SyncEvent::SnapshotReceived { .. })).await;

    alice.send_draw(vec![CellDraw::new(5, 5, RED)]).await.unwrap();
    wait_for(&mut alice_events, |e| matches!(e, SyncEvent::ImmediateDraw { .. })).await;

    // A later joiner's snapshot already contains the draw.
    let mut bob = SyncClient::new("bob", &url);
    let mut bob_events = bob.take_event_rx().unwrap();
    bob.connect().await.unwrap();
    wait_for(&mut bob_events, |e| matches!(e, SyncEvent::SnapshotReceived { .. })).await;

    let snap = bob.mirror_snapshot().await.unwrap();
    assert_eq!(snap.cells[5 * 16 + 5], Some(RED));
}

#[tokio::test]
async fn test_delta_propagates_to_clients() {
    let url = start_test_server(8, 8, 25).await;

    let mut client = SyncClient::new("alice", &url);
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();
    wait_for(&mut events, |e| matches!(e, SyncEvent::SnapshotReceived { .. })).await;

    // A blinker keeps producing changes every tick.
    client
        .send_draw(vec![
            CellDraw::new(1, 2, RED),
            CellDraw::new(2, 2, RED),
            CellDraw::new(3, 2, RED),
        ])
        .await
        .unwrap();

    let event = wait_for(&mut events, |e| matches!(e, SyncEvent::Delta { .. })).await;
    match event {
        SyncEvent::Delta { changes, generation } => {
            assert!(!changes.is_empty());
            assert!(generation >= 1);
        }
        _ => unreachable!(),
    }

    // The mirror advanced with the delta.
    assert!(client.generation().await.unwrap() >= 1);
}

#[tokio::test]
async fn test_two_clients_see_each_others_draws() {
    let url = start_test_server(16, 16, 600_000).await;

    let mut alice = SyncClient::new("alice", &url);
    let mut alice_events = alice.take_event_rx().unwrap();
    alice.connect().await.unwrap();
    wait_for(&mut alice_events, |e| matches!(e, SyncEvent::SnapshotReceived { .. })).await;

    let mut bob = SyncClient::new("bob", &url);
    let mut bob_events = bob.take_event_rx().unwrap();
    bob.connect().await.unwrap();
    wait_for(&mut bob_events, |e| matches!(e, SyncEvent::SnapshotReceived { .. })).await;

    alice.send_draw(vec![CellDraw::new(7, 8, RED)]).await.unwrap();

    let event = wait_for(&mut bob_events, |e| matches!(e, SyncEvent::ImmediateDraw { .. })).await;
    match event {
        SyncEvent::ImmediateDraw { cells, submitter_id } => {
            assert_eq!(cells, vec![CellDraw::new(7, 8, RED)]);
            assert_eq!(submitter_id.as_deref(), Some("alice"));
        }
        _ => unreachable!(),
    }

    let snap = bob.mirror_snapshot().await.unwrap();
    assert_eq!(snap.cells[8 * 16 + 7], Some(RED));
}

#[tokio::test]
async fn test_dead_observer_does_not_block_others() {
    let url = start_test_server(16, 16, 600_000).await;

    // Observer A joins and then vanishes without a close handshake.
    let (mut ws_a, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let _ = next_frame(&mut ws_a).await; // snapshot
    drop(ws_a);

    // Observer B must still receive broadcasts.
    let mut bob = SyncClient::new("bob", &url);
    let mut bob_events = bob.take_event_rx().unwrap();
    bob.connect().await.unwrap();
    wait_for(&mut bob_events, |e| matches!(e, SyncEvent::SnapshotReceived { .. })).await;

    bob.send_draw(vec![CellDraw::new(1, 1, RED)]).await.unwrap();
    let event = wait_for(&mut bob_events, |e| matches!(e, SyncEvent::ImmediateDraw { .. })).await;
    assert!(matches!(event, SyncEvent::ImmediateDraw { .. }));
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let url = start_test_server(8, 8, 600_000).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let _ = next_frame(&mut ws).await; // snapshot

    // Garbage, an unknown discriminant, and a wrong-shape frame: all dropped
    // at the boundary without killing the connection.
    for bad in ["not json", "{\"type\":\"reboot\"}", "{\"type\":\"draw\"}"] {
        ws.send(Message::Text(bad.to_string().into())).await.unwrap();
    }

    let draw = WireMessage::draw(vec![CellDraw::new(2, 2, RED)], Some("raw".to_string()));
    ws.send(Message::Text(draw.encode().unwrap().into())).await.unwrap();

    match next_frame(&mut ws).await {
        WireMessage::ImmediateDraw { cells, .. } => {
            assert_eq!(cells, vec![CellDraw::new(2, 2, RED)]);
        }
        other => panic!("expected immediate_draw echo, got {other:?}"),
    }
}

#[tokio::test]
async fn test_quiescent_ticks_broadcast_nothing() {
    // Fast ticks over an empty board: generations advance, no frames flow.
    let url = start_test_server(8, 8, 30).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let _ = next_frame(&mut ws).await; // snapshot

    let quiet = timeout(Duration::from_millis(400), ws.next()).await;
    assert!(quiet.is_err(), "expected no frames from a quiescent board");
}

#[tokio::test]
async fn test_observer_cap_refuses_excess_connections() {
    let url = start_test_server_with(|config| {
        config.width = 8;
        config.height = 8;
        config.tick_interval_ms = 600_000;
        config.max_observers = 1;
    })
    .await;

    let (mut ws_a, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let _ = next_frame(&mut ws_a).await; // snapshot: A is in

    // B completes the handshake but is closed without ever seeing a frame.
    let (mut ws_b, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let first = timeout(Duration::from_secs(3), ws_b.next())
        .await
        .expect("server should close promptly");
    match first {
        Some(Ok(Message::Close(_))) | None => {}
        other => panic!("expected close for over-cap observer, got {other:?}"),
    }
}
