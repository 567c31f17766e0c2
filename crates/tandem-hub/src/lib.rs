//! Tandem's real-time collaboration hub.
//!
//! One process serves four WebSocket planes per interview room (the
//! collaborative editor, shared notes, group chat, and many-to-many video)
//! behind token authorization delegated to the core registry service. Editor,
//! notes, and chat are state-sync channels with room-scoped fan-out; the
//! video plane does WebRTC signaling and republishes each member's RTP to
//! every other member (a selective forwarding unit, no transcoding).
//!
//! All room state is in-memory and dies with the process.

#![forbid(unsafe_code)]

pub mod chat;
pub mod config;
pub mod editor;
pub mod media;
pub mod notes;
pub mod registry;
pub mod room;
pub mod rtc;
mod socket;

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::config::HubConfig;
use crate::registry::RegistryClient;
use crate::room::Hub;

/// Shared state behind every front-door route.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub registry: Arc<RegistryClient>,
    pub config: Arc<HubConfig>,
}

impl AppState {
    pub fn new(config: HubConfig) -> Self {
        let registry = RegistryClient::new(config.core_base_url.clone());
        Self {
            hub: Arc::new(Hub::new()),
            registry: Arc::new(registry),
            config: Arc::new(config),
        }
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.snapshot().await)
}

/// The hub's front door: four upgrade paths plus the health surface.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Tandem Hub Online" }))
        .route("/health", get(health))
        .route("/editor/:room_id", get(editor::editor_ws))
        .route("/notes/:room_id", get(notes::notes_ws))
        .route("/chat/:room_id", get(chat::chat_ws))
        .route("/videochat/:room_id", get(media::media_ws))
        .layer(cors)
        .with_state(state)
}
