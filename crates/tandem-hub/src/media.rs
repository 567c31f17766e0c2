//! Video chat channel: WebRTC signaling plus selective forwarding.
//!
//! The hub terminates one peer connection per media member. Incoming RTP is
//! republished to every other member as a fresh local track (no transcoding,
//! no mixing), and RTCP from each forwarded sender is drained so congestion
//! feedback keeps flowing. Signaling frames also fan out verbatim to the
//! other members; the hub never uses those forwarded frames for routing.
//!
//! Trickled ICE candidates that arrive before the remote description are
//! buffered and applied in arrival order once the first description lands.

use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use tandem_common::{Error, Result};
use tracing::{debug, error, info, warn};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

use crate::room::{Channel, ClientHandle, MediaClient, SharedRoom};
use crate::rtc;
use crate::socket::{self, Authorization, ChannelParams};
use crate::AppState;

pub async fn media_ws(
    ws: Option<WebSocketUpgrade>,
    Path(room_id): Path<String>,
    Query(params): Query<ChannelParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(ws) = ws else {
        return StatusCode::UPGRADE_REQUIRED.into_response();
    };
    let auth =
        match socket::authorize(&state, Channel::Media, &room_id, params.token.as_deref()).await {
            Ok(auth) => auth,
            Err(response) => return response,
        };
    let client_id = params.client_id.unwrap_or_default();
    if client_id.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    ws.on_upgrade(move |socket| async move {
        match auth {
            Authorization::Granted(_) => handle_media(socket, state, room_id, client_id).await,
            Authorization::Inactive => {
                socket::refuse_inactive(socket, &room_id, Channel::Media).await
            }
        }
    })
}

async fn handle_media(socket: WebSocket, state: AppState, room_id: String, client_id: String) {
    let (handle, mut stream, writer) = socket::spawn_writer(socket);
    let conn = handle.id();

    let pc = match rtc::build_peer_connection(&state.config.stun_server_url).await {
        Ok(pc) => pc,
        Err(err) => {
            error!(%room_id, %client_id, "failed to create peer connection: {err}");
            handle.close();
            writer.abort();
            return;
        }
    };

    let room = state
        .hub
        .join_media(
            &room_id,
            MediaClient {
                handle: handle.clone(),
                client_id: client_id.clone(),
            },
            pc.clone(),
        )
        .await;
    info!(%room_id, %client_id, "media client connected");

    attach_ice_hook(&pc, handle.clone(), room_id.clone());
    attach_track_hook(&pc, room.clone(), conn, room_id.clone());
    attach_state_hook(&pc, room_id.clone(), client_id.clone());

    // Candidates trickled in before the remote description is applied.
    let mut pending: Vec<RTCIceCandidateInit> = Vec::new();

    while let Some(text) = socket::next_text(&mut stream, &room_id, Channel::Media).await {
        let signal: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                debug!(%room_id, "invalid signaling frame: {err}");
                continue;
            }
        };

        if signal.get("sdp").is_some() {
            if let Err(err) = apply_session_description(&pc, &handle, &signal).await {
                warn!(%room_id, %client_id, "failed to handle SDP: {err}");
                continue;
            }
            for candidate in pending.drain(..) {
                if let Err(err) = pc.add_ice_candidate(candidate).await {
                    warn!(%room_id, %client_id, "failed to add stored ICE candidate: {err}");
                }
            }
        } else if let Some(candidate) = signal.get("candidate") {
            if let Err(err) = handle_ice_candidate(&pc, &mut pending, candidate).await {
                warn!(%room_id, %client_id, "failed to handle ICE candidate: {err}");
            }
        }

        // Relay the raw frame to the other media members regardless of
        // whether the hub consumed it; full-mesh clients signal through us.
        room.write().await.broadcast(Channel::Media, Some(conn), &text);
    }

    if let Some(pc) = state.hub.leave_media(&room_id, conn, &client_id).await {
        if let Err(err) = pc.close().await {
            warn!(%room_id, %client_id, "failed to close peer connection: {err}");
        }
    }
    writer.abort();
    info!(%room_id, %client_id, "media client disconnected");
}

/// Trickle local candidates to this client as they are gathered.
fn attach_ice_hook(pc: &Arc<RTCPeerConnection>, handle: ClientHandle, room_id: String) {
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let handle = handle.clone();
        let room_id = room_id.clone();
        Box::pin(async move {
            let Some(candidate) = candidate else {
                return;
            };
            match candidate.to_json() {
                Ok(init) => {
                    let frame = json!({ "type": "ice_candidate", "candidate": init });
                    if !handle.send_text(frame.to_string()) {
                        debug!(%room_id, "client gone before ICE candidate could be sent");
                    }
                }
                Err(err) => warn!(%room_id, "failed to encode ICE candidate: {err}"),
            }
        })
    }));
}

/// Republish each incoming track to every other media member.
fn attach_track_hook(pc: &Arc<RTCPeerConnection>, room: SharedRoom, conn: uuid::Uuid, room_id: String) {
    pc.on_track(Box::new(move |track, _receiver, _transceiver| {
        let room = room.clone();
        let room_id = room_id.clone();
        Box::pin(async move {
            info!(
                %room_id,
                track_id = %track.id(),
                kind = %track.kind(),
                "received track"
            );

            let local_track = Arc::new(TrackLocalStaticRTP::new(
                track.codec().capability,
                track.id(),
                track.stream_id(),
            ));

            let subscribers = room.read().await.other_peer_connections(conn);
            for peer in subscribers {
                let sender = match peer
                    .add_track(Arc::clone(&local_track) as Arc<dyn TrackLocal + Send + Sync>)
                    .await
                {
                    Ok(sender) => sender,
                    Err(err) => {
                        error!(%room_id, "failed to add track to peer: {err}");
                        continue;
                    }
                };
                // RTCP must be read off each sender or feedback stalls.
                tokio::spawn(async move {
                    let mut rtcp_buf = vec![0u8; 1500];
                    while sender.read(&mut rtcp_buf).await.is_ok() {}
                });
            }

            tokio::spawn(relay_rtp(track, local_track, room_id));
        })
    }));
}

/// Copy RTP from the publisher's track into the forwarded local track until
/// the publisher goes away.
async fn relay_rtp(
    remote: Arc<TrackRemote>,
    local: Arc<TrackLocalStaticRTP>,
    room_id: String,
) {
    loop {
        let (packet, _) = match remote.read_rtp().await {
            Ok(read) => read,
            Err(err) => {
                debug!(%room_id, "track read ended: {err}");
                return;
            }
        };
        if let Err(err) = local.write_rtp(&packet).await {
            debug!(%room_id, "forwarded track write failed: {err}");
            return;
        }
    }
}

fn attach_state_hook(pc: &Arc<RTCPeerConnection>, room_id: String, client_id: String) {
    pc.on_peer_connection_state_change(Box::new(move |pc_state| {
        info!(
            %room_id,
            %client_id,
            state = %pc_state,
            "peer connection state changed"
        );
        Box::pin(async {})
    }));
}

/// Apply a remote description; offers are answered on the same socket.
async fn apply_session_description(
    pc: &Arc<RTCPeerConnection>,
    handle: &ClientHandle,
    signal: &Value,
) -> Result<()> {
    let sdp = signal.get("sdp").cloned().unwrap_or(Value::Null);
    let desc: RTCSessionDescription =
        serde_json::from_value(sdp).map_err(|err| Error::signaling(format!("invalid SDP: {err}")))?;
    let is_offer = desc.sdp_type == RTCSdpType::Offer;

    pc.set_remote_description(desc)
        .await
        .map_err(|err| Error::signaling(format!("set remote description: {err}")))?;

    if is_offer {
        let answer = pc
            .create_answer(None)
            .await
            .map_err(|err| Error::signaling(format!("create answer: {err}")))?;
        pc.set_local_description(answer.clone())
            .await
            .map_err(|err| Error::signaling(format!("set local description: {err}")))?;

        let frame = json!({ "type": "answer", "sdp": answer });
        if !handle.send_text(frame.to_string()) {
            return Err(Error::peer_send("client gone before answer could be sent"));
        }
    }

    Ok(())
}

/// Apply a trickled candidate, or buffer it until the remote description
/// exists. The buffer is never dropped; it drains after the first SDP.
async fn handle_ice_candidate(
    pc: &Arc<RTCPeerConnection>,
    pending: &mut Vec<RTCIceCandidateInit>,
    candidate: &Value,
) -> Result<()> {
    let init: RTCIceCandidateInit = serde_json::from_value(candidate.clone())
        .map_err(|err| Error::signaling(format!("invalid ICE candidate: {err}")))?;

    if pc.remote_description().await.is_none() {
        debug!("storing ICE candidate until the remote description is set");
        pending.push(init);
        return Ok(());
    }

    pc.add_ice_candidate(init)
        .await
        .map_err(|err| Error::signaling(format!("add ICE candidate: {err}")))
}
