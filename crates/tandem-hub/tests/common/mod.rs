//! Shared scaffolding for hub integration tests: an in-process stub
//! registry, a hub bound to an ephemeral port, and WebSocket client helpers.

// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tandem_hub::config::HubConfig;
use tandem_hub::{room, AppState};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Token the stub registry accepts, mapping to candidate "Alice".
pub const VALID_TOKEN: &str = "valid-token";
/// Token the stub registry resolves to a closed room.
pub const INACTIVE_TOKEN: &str = "inactive-token";

async fn rooms_join(Query(params): Query<HashMap<String, String>>) -> axum::response::Response {
    match params.get("token").map(String::as_str) {
        Some(VALID_TOKEN) => Json(json!({
            "id": "room-1",
            "candidateName": "Alice",
            "isActive": true,
            "token": VALID_TOKEN,
        }))
        .into_response(),
        Some(INACTIVE_TOKEN) => Json(json!({
            "id": "room-1",
            "candidateName": "Alice",
            "isActive": false,
        }))
        .into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn spawn_registry() -> String {
    let app = Router::new().route("/rooms/join", get(rooms_join));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Bind a hub on an ephemeral port against a fresh stub registry.
pub async fn spawn_hub_with(cleanup_interval: Duration, with_reaper: bool) -> SocketAddr {
    let config = HubConfig {
        core_base_url: spawn_registry().await,
        cleanup_interval,
        ..HubConfig::default()
    };
    let state = AppState::new(config);
    if with_reaper {
        tokio::spawn(room::run_reaper(state.hub.clone(), cleanup_interval));
    }
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = tandem_hub::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub async fn spawn_hub() -> SocketAddr {
    spawn_hub_with(Duration::from_secs(60), false).await
}

pub async fn connect(addr: SocketAddr, path: &str) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
        .await
        .expect("websocket connect");
    ws
}

/// Next JSON text frame, skipping keepalive frames.
pub async fn recv_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("invalid json frame"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

pub async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string()))
        .await
        .expect("send frame");
}

/// Assert no data frame arrives within `window` (keepalives are fine).
pub async fn expect_silence(ws: &mut WsClient, window: Duration) {
    let outcome = tokio::time::timeout(window, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => return other,
            }
        }
    })
    .await;
    if let Ok(frame) = outcome {
        panic!("expected no traffic, got {frame:?}");
    }
}

pub async fn health(addr: SocketAddr) -> Value {
    reqwest::get(format!("http://{addr}/health"))
        .await
        .expect("health request")
        .json()
        .await
        .expect("health body")
}

/// Poll `/health` until `predicate` holds or five seconds pass.
pub async fn wait_for_health(addr: SocketAddr, predicate: impl Fn(&Value) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = health(addr).await;
        if predicate(&snapshot) {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("health never converged, last snapshot: {snapshot}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
