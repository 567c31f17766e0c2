//! Shared notes channel.
//!
//! Same shape as the editor channel with a single `content` snapshot:
//! `content` frames replace the room's latest notes and fan out to the other
//! members; anything else is relayed as-is.

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tandem_common::NotesMessage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::room::{Channel, SharedRoom};
use crate::socket::{self, Authorization, ChannelParams};
use crate::AppState;

pub async fn notes_ws(
    ws: Option<WebSocketUpgrade>,
    Path(room_id): Path<String>,
    Query(params): Query<ChannelParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(ws) = ws else {
        return StatusCode::UPGRADE_REQUIRED.into_response();
    };
    let auth =
        match socket::authorize(&state, Channel::Notes, &room_id, params.token.as_deref()).await {
            Ok(auth) => auth,
            Err(response) => return response,
        };
    ws.on_upgrade(move |socket| async move {
        match auth {
            Authorization::Granted(_) => handle_notes(socket, state, room_id).await,
            Authorization::Inactive => {
                socket::refuse_inactive(socket, &room_id, Channel::Notes).await
            }
        }
    })
}

async fn handle_notes(socket: WebSocket, state: AppState, room_id: String) {
    let (handle, mut stream, writer) = socket::spawn_writer(socket);
    let conn = handle.id();
    let room = state.hub.join_notes(&room_id, handle).await;
    info!(%room_id, "notes client connected");

    while let Some(text) = socket::next_text(&mut stream, &room_id, Channel::Notes).await {
        let msg: NotesMessage = match serde_json::from_str(&text) {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%room_id, "invalid notes frame: {err}");
                continue;
            }
        };
        apply_notes_message(&room, &room_id, conn, msg).await;
    }

    state.hub.leave(&room_id, Channel::Notes, conn).await;
    writer.abort();
    info!(%room_id, "notes client disconnected");
}

async fn apply_notes_message(room: &SharedRoom, room_id: &str, sender: Uuid, msg: NotesMessage) {
    let mut guard = room.write().await;

    if msg.kind == "content" {
        guard.set_latest_notes(msg.content.clone().unwrap_or_default());
        debug!(%room_id, "notes updated");
    }

    match serde_json::to_string(&msg) {
        Ok(text) => {
            guard.broadcast(Channel::Notes, Some(sender), &text);
        }
        Err(err) => warn!(%room_id, "failed to encode notes frame: {err}"),
    }
}
