//! Collaborative editor channel.
//!
//! The room keeps the latest accepted `(code, language)` pair so late
//! joiners can be brought up to date with a single `sync` frame. Everything
//! else is fan-out: cursor moves, legacy inline chat, and any frame kind the
//! hub does not recognize are forwarded to the other editor clients
//! untouched.

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tandem_common::EditorMessage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::room::{Channel, SharedRoom};
use crate::socket::{self, Authorization, ChannelParams};
use crate::AppState;

pub async fn editor_ws(
    ws: Option<WebSocketUpgrade>,
    Path(room_id): Path<String>,
    Query(params): Query<ChannelParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(ws) = ws else {
        return StatusCode::UPGRADE_REQUIRED.into_response();
    };
    let auth =
        match socket::authorize(&state, Channel::Editor, &room_id, params.token.as_deref()).await {
            Ok(auth) => auth,
            Err(response) => return response,
        };
    ws.on_upgrade(move |socket| async move {
        match auth {
            Authorization::Granted(_) => handle_editor(socket, state, room_id).await,
            Authorization::Inactive => {
                socket::refuse_inactive(socket, &room_id, Channel::Editor).await
            }
        }
    })
}

async fn handle_editor(socket: WebSocket, state: AppState, room_id: String) {
    let (handle, mut stream, writer) = socket::spawn_writer(socket);
    let conn = handle.id();
    let room = state.hub.join_editor(&room_id, handle).await;
    info!(%room_id, "editor client connected");

    while let Some(text) = socket::next_text(&mut stream, &room_id, Channel::Editor).await {
        let msg: EditorMessage = match serde_json::from_str(&text) {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%room_id, "invalid editor frame: {err}");
                continue;
            }
        };
        apply_editor_message(&room, &room_id, conn, msg).await;
    }

    state.hub.leave(&room_id, Channel::Editor, conn).await;
    writer.abort();
    info!(%room_id, "editor client disconnected");
}

async fn apply_editor_message(room: &SharedRoom, room_id: &str, sender: Uuid, msg: EditorMessage) {
    let mut guard = room.write().await;

    match msg.kind.as_str() {
        "code" => {
            guard.set_latest_code(
                msg.code.clone().unwrap_or_default(),
                msg.language.clone().unwrap_or_default(),
            );
            debug!(
                room_id,
                language = msg.language.as_deref().unwrap_or_default(),
                "code updated"
            );
        }
        "cursor" | "chat" => {}
        // Unknown frame kinds are forwarded untouched.
        _ => {}
    }

    match serde_json::to_string(&msg) {
        Ok(text) => {
            guard.broadcast(Channel::Editor, Some(sender), &text);
        }
        Err(err) => warn!(%room_id, "failed to encode editor frame: {err}"),
    }
}
