//! Shared WebSocket plumbing for the four channel handlers.
//!
//! Every upgrade runs the same prologue: validate the token against the
//! registry, upgrade, and split the socket into a read stream for the handler
//! task and a writer task fed by the client's [`ClientHandle`] channel. The
//! writer task is the single place socket writes happen, which serializes
//! concurrent senders (broadcasts, signaling replies, ICE trickle) without
//! holding any lock across I/O.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::stream::{SplitStream, StreamExt};
use futures_util::SinkExt;
use serde::Deserialize;
use tandem_common::{AuthorizedRoom, Error};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::room::{Channel, ClientHandle};
use crate::AppState;

/// Query parameters accepted on every channel upgrade.
#[derive(Debug, Deserialize)]
pub(crate) struct ChannelParams {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "clientId")]
    pub client_id: Option<String>,
}

/// Outcome of the pre-upgrade authorization check.
pub(crate) enum Authorization {
    Granted(AuthorizedRoom),
    /// The room exists but is closed; the upgrade proceeds so the client can
    /// be told why before the socket is shut.
    Inactive,
}

/// Validate `(roomId, token)` with the registry before upgrading.
///
/// Missing or rejected tokens and an unreachable registry all refuse the
/// upgrade with 401; the causes are only distinguished in the log.
pub(crate) async fn authorize(
    state: &AppState,
    channel: Channel,
    room_id: &str,
    token: Option<&str>,
) -> Result<Authorization, Response> {
    match state
        .registry
        .validate_room(room_id, token.unwrap_or_default())
        .await
    {
        Ok(room) => Ok(Authorization::Granted(room)),
        Err(Error::RoomInactive) => Ok(Authorization::Inactive),
        Err(err @ Error::RegistryUnavailable(_)) => {
            warn!(
                room_id,
                channel = channel.as_str(),
                "registry unreachable during upgrade: {err}"
            );
            Err(StatusCode::UNAUTHORIZED.into_response())
        }
        Err(err) => {
            warn!(
                room_id,
                channel = channel.as_str(),
                "room validation failed: {err}"
            );
            Err(StatusCode::UNAUTHORIZED.into_response())
        }
    }
}

/// Split the socket and spawn the writer task.
///
/// The returned handle is the client's only write path; the writer stops on
/// the first failed write or after forwarding a close frame.
pub(crate) fn spawn_writer(
    socket: WebSocket,
) -> (ClientHandle, SplitStream<WebSocket>, JoinHandle<()>) {
    let (mut sink, stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    (ClientHandle::new(tx), stream, writer)
}

/// Complete the upgrade only to report the room as closed, then hang up.
pub(crate) async fn refuse_inactive(mut socket: WebSocket, room_id: &str, channel: Channel) {
    warn!(room_id, channel = channel.as_str(), "room is not active");
    let frame = CloseFrame {
        code: close_code::NORMAL,
        reason: "Room is not active".into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Pull the next text frame off the stream.
///
/// Returns `None` when the connection is done: normal closure, end of
/// stream, or a read error (logged). Non-text frames are skipped.
pub(crate) async fn next_text(
    stream: &mut SplitStream<WebSocket>,
    room_id: &str,
    channel: Channel,
) -> Option<String> {
    loop {
        match stream.next().await? {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(err) => {
                warn!(
                    room_id,
                    channel = channel.as_str(),
                    "websocket error: {err}"
                );
                return None;
            }
        }
    }
}
