//! End-to-end relay tests over real sockets.
//!
//! Spins the server up on an ephemeral port, connects `tokio-tungstenite`
//! clients with real bearer tokens, and drives the subscribe → broadcast →
//! disconnect flow the way a deployment would see it.

use axum::extract::{Json, State};
use futures_util::{SinkExt, StreamExt};
use ripple_core::Identity;
use ripple_server::{handlers, AppState, Config};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (SocketAddr, Arc<AppState>) {
    let mut config = Config::default();
    config.auth.secret = "integration-secret".to_string();
    config.metrics.enabled = false;

    let state = Arc::new(AppState::new(config).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let serve_state = Arc::clone(&state);
    tokio::spawn(async move {
        handlers::serve(listener, serve_state).await.unwrap();
    });

    (addr, state)
}

fn token_for(state: &AppState, user_id: &str, display_name: &str) -> String {
    let identity = Identity {
        user_id: user_id.to_string(),
        display_name: display_name.to_string(),
        avatar_url: None,
    };
    state.verifier.sign(&identity, Duration::from_secs(60)).unwrap()
}

async fn connect(addr: SocketAddr, token: &str) -> WsClient {
    let url = format!("ws://{}/ws?token={}", addr, token);
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

async fn subscribe(ws: &mut WsClient, channel: &str, user_id: &str) {
    let frame = json!({"type": "subscribe", "channelName": channel, "userId": user_id});
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn next_push(ws: &mut WsClient) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for push")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn assert_no_push(ws: &mut WsClient) {
    let result = timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "expected silence, got {:?}", result);
}

#[tokio::test]
async fn test_subscribe_broadcast_disconnect_flow() {
    let (addr, state) = start_server().await;

    let mut alice = connect(addr, &token_for(&state, "u1", "Alice")).await;
    subscribe(&mut alice, "general", "u1").await;

    let push = next_push(&mut alice).await;
    assert_eq!(push["event"], "MEMBER_STATUS_UPDATE");
    assert_eq!(push["data"]["userId"], "u1");
    assert_eq!(push["data"]["isOnline"], true);
    assert_eq!(push["data"]["onlineUsers"], json!(["u1"]));

    let mut bob = connect(addr, &token_for(&state, "u2", "Bob")).await;
    subscribe(&mut bob, "general", "u2").await;

    let push = next_push(&mut alice).await;
    assert_eq!(push["data"]["userId"], "u2");
    assert_eq!(push["data"]["onlineUsers"], json!(["u1", "u2"]));
    let _ = next_push(&mut bob).await;

    // Producer pushes a message through the ingestion endpoint.
    let body = json!({
        "type": "new-message",
        "channelName": "general",
        "message": {"id": 1, "body": "hello"}
    });
    let response = handlers::ingest_handler(State(Arc::clone(&state)), Json(body))
        .await
        .unwrap();
    assert_eq!(response.0.delivered, 2);

    for ws in [&mut alice, &mut bob] {
        let push = next_push(ws).await;
        assert_eq!(push["event"], "new-message");
        assert_eq!(push["data"]["body"], "hello");
    }

    // Bob disconnects; Alice sees the offline transition.
    bob.close(None).await.unwrap();
    let push = next_push(&mut alice).await;
    assert_eq!(push["event"], "MEMBER_STATUS_UPDATE");
    assert_eq!(push["data"]["userId"], "u2");
    assert_eq!(push["data"]["isOnline"], false);
    assert_eq!(push["data"]["onlineUsers"], json!(["u1"]));
}

#[tokio::test]
async fn test_rejects_invalid_credentials() {
    let (addr, _state) = start_server().await;

    let url = format!("ws://{}/ws?token=not-a-token", addr);
    assert!(tokio_tungstenite::connect_async(url).await.is_err());

    let url = format!("ws://{}/ws", addr);
    assert!(tokio_tungstenite::connect_async(url).await.is_err());
}

#[tokio::test]
async fn test_claimed_user_mismatch_is_dropped_silently() {
    let (addr, state) = start_server().await;

    let mut alice = connect(addr, &token_for(&state, "u1", "Alice")).await;

    // Claiming someone else's id changes nothing and gets no reply.
    subscribe(&mut alice, "general", "u999").await;
    assert_no_push(&mut alice).await;

    // The same socket can still subscribe under its own id.
    subscribe(&mut alice, "general", "u1").await;
    let push = next_push(&mut alice).await;
    assert_eq!(push["data"]["userId"], "u1");
}

#[tokio::test]
async fn test_unrecognized_frames_are_ignored() {
    let (addr, state) = start_server().await;

    let mut alice = connect(addr, &token_for(&state, "u1", "Alice")).await;
    alice
        .send(Message::Text(json!({"type": "dance"}).to_string()))
        .await
        .unwrap();
    alice.send(Message::Text("not json".to_string())).await.unwrap();
    assert_no_push(&mut alice).await;

    // Connection is still healthy afterwards.
    subscribe(&mut alice, "general", "u1").await;
    let push = next_push(&mut alice).await;
    assert_eq!(push["event"], "MEMBER_STATUS_UPDATE");
}
