//! Group chat channel.
//!
//! The room keeps a bounded log of authored messages. Joiners get a
//! `history` marker followed by the whole log before the read loop starts;
//! authored messages are stamped server-side and echoed to every member,
//! sender included, so all clients render the authoritative form.

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tandem_common::{ChatEvent, ChatMessage};
use tracing::{debug, info, warn};

use crate::room::{Channel, ChatClient, SharedRoom};
use crate::socket::{self, Authorization, ChannelParams};
use crate::AppState;

pub async fn chat_ws(
    ws: Option<WebSocketUpgrade>,
    Path(room_id): Path<String>,
    Query(params): Query<ChannelParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(ws) = ws else {
        return StatusCode::UPGRADE_REQUIRED.into_response();
    };
    let auth =
        match socket::authorize(&state, Channel::Chat, &room_id, params.token.as_deref()).await {
            Ok(auth) => auth,
            Err(response) => return response,
        };
    ws.on_upgrade(move |socket| async move {
        match auth {
            Authorization::Granted(room) => {
                handle_chat(socket, state, room_id, room.candidate_name).await
            }
            Authorization::Inactive => {
                socket::refuse_inactive(socket, &room_id, Channel::Chat).await
            }
        }
    })
}

async fn handle_chat(socket: WebSocket, state: AppState, room_id: String, default_name: String) {
    let (handle, mut stream, writer) = socket::spawn_writer(socket);
    let conn = handle.id();
    let room = state
        .hub
        .join_chat(
            &room_id,
            ChatClient {
                handle,
                user_name: default_name.clone(),
            },
        )
        .await;
    info!(%room_id, "chat client connected");

    while let Some(text) = socket::next_text(&mut stream, &room_id, Channel::Chat).await {
        let event: ChatEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(err) => {
                debug!(%room_id, "invalid chat frame: {err}");
                continue;
            }
        };
        if event.kind != "chat" {
            continue;
        }
        append_and_echo(&room, &room_id, &default_name, event).await;
    }

    state.hub.leave(&room_id, Channel::Chat, conn).await;
    writer.abort();
    info!(%room_id, "chat client disconnected");
}

async fn append_and_echo(room: &SharedRoom, room_id: &str, default_name: &str, event: ChatEvent) {
    let mut user_name = event.user_name.unwrap_or_default();
    if user_name.is_empty() || user_name == "Anonymous" {
        user_name = if default_name.is_empty() {
            "Anonymous".to_string()
        } else {
            default_name.to_string()
        };
    }

    let now = Utc::now();
    let message = ChatMessage {
        id: now.timestamp_nanos_opt().unwrap_or_default().to_string(),
        room_id: room_id.to_string(),
        user_name,
        content: event.content.unwrap_or_default(),
        timestamp: now,
    };

    let mut guard = room.write().await;
    guard.append_chat(message.clone());
    match serde_json::to_string(&ChatEvent::chat(message)) {
        Ok(text) => {
            // Authoritative echo: every chat member, sender included.
            guard.broadcast(Channel::Chat, None, &text);
        }
        Err(err) => warn!(%room_id, "failed to encode chat event: {err}"),
    }
}
