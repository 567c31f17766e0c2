//! End-to-end tests for the editor, notes, and chat channels and the
//! front door's refusal codes, driven over real WebSockets.

mod common;

use std::time::Duration;

use common::*;
use futures_util::StreamExt;
use serde_json::json;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

#[tokio::test]
async fn editor_sync_reaches_late_joiner() {
    let addr = spawn_hub().await;

    let mut alice = connect(addr, &format!("/editor/r1?token={VALID_TOKEN}")).await;
    send_json(
        &mut alice,
        json!({"type": "code", "code": "fn main() {}", "language": "rust"}),
    )
    .await;
    // Let the hub accept the mutation before the second join reads it.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut bob = connect(addr, &format!("/editor/r1?token={VALID_TOKEN}")).await;
    let sync = recv_json(&mut bob).await;
    assert_eq!(sync["type"], "sync");
    assert_eq!(sync["code"], "fn main() {}");
    assert_eq!(sync["language"], "rust");
    expect_silence(&mut bob, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn editor_joiner_gets_no_sync_for_untouched_room() {
    let addr = spawn_hub().await;
    let mut alice = connect(addr, &format!("/editor/r1?token={VALID_TOKEN}")).await;
    expect_silence(&mut alice, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn notes_broadcast_excludes_the_sender() {
    let addr = spawn_hub().await;

    let mut alice = connect(addr, &format!("/notes/r1?token={VALID_TOKEN}")).await;
    let mut bob = connect(addr, &format!("/notes/r1?token={VALID_TOKEN}")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    send_json(&mut alice, json!({"type": "content", "content": "hello"})).await;

    let frame = recv_json(&mut bob).await;
    assert_eq!(frame["type"], "content");
    assert_eq!(frame["content"], "hello");
    expect_silence(&mut alice, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn notes_sync_carries_latest_content() {
    let addr = spawn_hub().await;

    let mut alice = connect(addr, &format!("/notes/r1?token={VALID_TOKEN}")).await;
    send_json(&mut alice, json!({"type": "content", "content": "first"})).await;
    send_json(&mut alice, json!({"type": "content", "content": "second"})).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut late = connect(addr, &format!("/notes/r1?token={VALID_TOKEN}")).await;
    let sync = recv_json(&mut late).await;
    assert_eq!(sync["type"], "sync");
    assert_eq!(sync["content"], "second");
}

#[tokio::test]
async fn chat_replays_bounded_history_and_substitutes_names() {
    let addr = spawn_hub().await;

    let mut writer = connect(addr, &format!("/chat/r1?token={VALID_TOKEN}")).await;
    let marker = recv_json(&mut writer).await;
    assert_eq!(marker["type"], "history");

    // One more message than the log holds; the first one must fall out.
    for n in 0..=1000 {
        send_json(
            &mut writer,
            json!({"type": "chat", "userName": "u", "content": format!("m{n}")}),
        )
        .await;
        // Authoritative echo comes back to the author as well.
        let echo = recv_json(&mut writer).await;
        assert_eq!(echo["type"], "chat");
        assert_eq!(echo["message"]["content"], format!("m{n}"));
        assert_eq!(echo["message"]["userName"], "u");
    }

    let mut joiner = connect(addr, &format!("/chat/r1?token={VALID_TOKEN}")).await;
    let marker = recv_json(&mut joiner).await;
    assert_eq!(marker["type"], "history");
    for n in 1..=1000 {
        let frame = recv_json(&mut joiner).await;
        assert_eq!(frame["type"], "chat");
        assert_eq!(frame["message"]["content"], format!("m{n}"));
        assert_eq!(frame["message"]["roomId"], "r1");
    }

    // An empty userName resolves to the authority's candidate name.
    send_json(&mut joiner, json!({"type": "chat", "userName": "", "content": "hi"})).await;
    let echo = recv_json(&mut joiner).await;
    assert_eq!(echo["message"]["userName"], "Alice");
    assert_eq!(echo["message"]["content"], "hi");
    let relayed = recv_json(&mut writer).await;
    assert_eq!(relayed["message"]["userName"], "Alice");
}

#[tokio::test]
async fn chat_anonymous_placeholder_is_substituted() {
    let addr = spawn_hub().await;
    let mut client = connect(addr, &format!("/chat/r1?token={VALID_TOKEN}")).await;
    let _ = recv_json(&mut client).await; // history marker

    send_json(
        &mut client,
        json!({"type": "chat", "userName": "Anonymous", "content": "hey"}),
    )
    .await;
    let echo = recv_json(&mut client).await;
    assert_eq!(echo["message"]["userName"], "Alice");
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let addr = spawn_hub().await;
    for path in ["/editor/r1", "/notes/r1", "/chat/r1", "/videochat/r1"] {
        let err = tokio_tungstenite::connect_async(format!("ws://{}{path}", addr))
            .await
            .expect_err("upgrade must be refused");
        match err {
            WsError::Http(response) => assert_eq!(response.status(), 401, "{path}"),
            other => panic!("expected http refusal, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn rejected_token_is_unauthorized() {
    let addr = spawn_hub().await;
    let err = tokio_tungstenite::connect_async(format!(
        "ws://{}/editor/r1?token=wrong-token",
        addr
    ))
    .await
    .expect_err("upgrade must be refused");
    match err {
        WsError::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("expected http refusal, got {other:?}"),
    }
}

#[tokio::test]
async fn media_upgrade_requires_client_id() {
    let addr = spawn_hub().await;
    let err = tokio_tungstenite::connect_async(format!(
        "ws://{}/videochat/r1?token={VALID_TOKEN}",
        addr
    ))
    .await
    .expect_err("upgrade must be refused");
    match err {
        WsError::Http(response) => assert_eq!(response.status(), 400),
        other => panic!("expected http refusal, got {other:?}"),
    }
}

#[tokio::test]
async fn plain_get_requires_upgrade() {
    let addr = spawn_hub().await;
    let response = reqwest::get(format!(
        "http://{}/editor/r1?token={VALID_TOKEN}",
        addr
    ))
    .await
    .unwrap();
    assert_eq!(response.status(), 426);
}

#[tokio::test]
async fn inactive_room_closes_with_reason() {
    let addr = spawn_hub().await;
    let mut ws = connect(addr, &format!("/editor/r1?token={INACTIVE_TOKEN}")).await;
    match ws.next().await {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(frame.code, CloseCode::Normal);
            assert_eq!(frame.reason, "Room is not active");
        }
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn rooms_vanish_once_the_last_client_leaves() {
    let addr = spawn_hub_with(Duration::from_millis(200), true).await;

    let alice = connect(addr, &format!("/editor/r1?token={VALID_TOKEN}")).await;
    let bob = connect(addr, &format!("/chat/r2?token={VALID_TOKEN}")).await;
    wait_for_health(addr, |h| h["active_rooms"] == 2 && h["active_clients"] == 2).await;

    drop(alice);
    wait_for_health(addr, |h| h["active_rooms"] == 1).await;

    drop(bob);
    wait_for_health(addr, |h| {
        h["active_rooms"] == 0 && h["active_clients"] == 0
    })
    .await;
}
