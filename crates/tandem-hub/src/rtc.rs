//! WebRTC peer connection factory.
//!
//! Every media member gets a server-side peer connection with the default
//! codec set and one send-recv transceiver per media kind, so the very first
//! offer from either side can be answered before any local track exists.
//! ICE is STUN-only; the hub never relays through TURN.

use std::sync::Arc;

use tandem_common::{Error, Result};
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

/// Build a peer connection configured for the hub's forwarding role.
///
/// The caller attaches the ICE, track, and connection-state hooks.
pub async fn build_peer_connection(stun_server_url: &str) -> Result<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(|err| Error::signaling(format!("failed to register default codecs: {err}")))?;

    let api = APIBuilder::new().with_media_engine(media_engine).build();

    let config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: vec![stun_server_url.to_string()],
            ..Default::default()
        }],
        ..Default::default()
    };

    let pc = api
        .new_peer_connection(config)
        .await
        .map_err(|err| Error::signaling(format!("failed to create peer connection: {err}")))?;

    let sendrecv = || RTCRtpTransceiverInit {
        direction: RTCRtpTransceiverDirection::Sendrecv,
        send_encodings: Vec::new(),
    };

    pc.add_transceiver_from_kind(RTPCodecType::Video, Some(sendrecv()))
        .await
        .map_err(|err| Error::signaling(format!("failed to add video transceiver: {err}")))?;

    pc.add_transceiver_from_kind(RTPCodecType::Audio, Some(sendrecv()))
        .await
        .map_err(|err| Error::signaling(format!("failed to add audio transceiver: {err}")))?;

    Ok(Arc::new(pc))
}
