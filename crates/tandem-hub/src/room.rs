//! Room and hub state.
//!
//! A room is the in-memory rendezvous for one interview: four client sets
//! (editor, notes, chat, media), the latest editor/notes snapshots, a bounded
//! chat log, and the WebRTC peer connections of its media members. The hub is
//! the process-wide registry of rooms plus the reaper task.
//!
//! Rooms are created lazily on the first successful join of any channel and
//! removed once every client set is empty and no peer connections remain.
//!
//! Lock order is hub, then room. Client writes go through per-connection
//! unbounded channels drained by the owning handler task, so no lock is ever
//! held across socket I/O.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use serde::Serialize;
use tandem_common::{ChatEvent, ChatMessage, EditorMessage, NotesMessage};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

/// Upper bound on the per-room chat log; older messages are evicted first.
pub const MAX_CHAT_HISTORY: usize = 1000;

/// The four communication planes within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Editor,
    Notes,
    Chat,
    Media,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Editor => "editor",
            Channel::Notes => "notes",
            Channel::Chat => "chat",
            Channel::Media => "media",
        }
    }
}

/// Write handle for one connected client.
///
/// The handler task owns the socket; everyone else talks to the client
/// through this channel. A failed send means the connection is gone.
#[derive(Clone)]
pub struct ClientHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
}

impl ClientHandle {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a text frame; false means the connection is dead.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.tx.send(Message::Text(text.into())).is_ok()
    }

    /// Queue a ping frame; false means the connection is dead.
    pub fn ping(&self) -> bool {
        self.tx.send(Message::Ping(Vec::new())).is_ok()
    }

    /// Ask the owning task to close the socket.
    pub fn close(&self) {
        let _ = self.tx.send(Message::Close(None));
    }
}

/// Chat membership carries the display name captured at join time.
pub struct ChatClient {
    pub handle: ClientHandle,
    pub user_name: String,
}

/// Media membership carries the client-supplied peer identity.
pub struct MediaClient {
    pub handle: ClientHandle,
    pub client_id: String,
}

/// Soft state for a single interview room.
#[derive(Default)]
pub struct Room {
    editor_clients: HashMap<Uuid, ClientHandle>,
    notes_clients: HashMap<Uuid, ClientHandle>,
    chat_clients: HashMap<Uuid, ChatClient>,
    media_clients: HashMap<Uuid, MediaClient>,
    latest_code: String,
    latest_language: String,
    latest_notes: String,
    chat_log: VecDeque<ChatMessage>,
    peer_conns: HashMap<String, Arc<RTCPeerConnection>>,
}

impl Room {
    /// True once no channel has members and no peer connections remain;
    /// the hub drops the room at that point.
    pub fn is_fully_empty(&self) -> bool {
        self.editor_clients.is_empty()
            && self.notes_clients.is_empty()
            && self.chat_clients.is_empty()
            && self.media_clients.is_empty()
            && self.peer_conns.is_empty()
    }

    pub fn client_count(&self) -> usize {
        self.editor_clients.len()
            + self.notes_clients.len()
            + self.chat_clients.len()
            + self.media_clients.len()
    }

    pub fn peer_connection_count(&self) -> usize {
        self.peer_conns.len()
    }

    pub fn set_latest_code(&mut self, code: String, language: String) {
        self.latest_code = code;
        self.latest_language = language;
    }

    pub fn set_latest_notes(&mut self, content: String) {
        self.latest_notes = content;
    }

    /// Append an authored message, evicting from the head past the bound.
    pub fn append_chat(&mut self, message: ChatMessage) {
        self.chat_log.push_back(message);
        while self.chat_log.len() > MAX_CHAT_HISTORY {
            self.chat_log.pop_front();
        }
    }

    pub fn chat_log_len(&self) -> usize {
        self.chat_log.len()
    }

    /// Peer connections of every media member except `exclude`.
    pub fn other_peer_connections(&self, exclude: Uuid) -> Vec<Arc<RTCPeerConnection>> {
        self.media_clients
            .iter()
            .filter(|(conn, _)| **conn != exclude)
            .filter_map(|(_, client)| self.peer_conns.get(&client.client_id))
            .cloned()
            .collect()
    }

    /// Broadcast a pre-encoded frame on one channel.
    ///
    /// `exclude` implements sender-exclusion; pass `None` for the chat
    /// channel's authoritative echo. Clients whose send fails are evicted
    /// from the set; the broadcast continues with the remaining members.
    pub fn broadcast(&mut self, channel: Channel, exclude: Option<Uuid>, text: &str) -> usize {
        match channel {
            Channel::Editor => broadcast_to(&mut self.editor_clients, |c| c, exclude, text),
            Channel::Notes => broadcast_to(&mut self.notes_clients, |c| c, exclude, text),
            Channel::Chat => broadcast_to(&mut self.chat_clients, |c| &c.handle, exclude, text),
            Channel::Media => broadcast_to(&mut self.media_clients, |c| &c.handle, exclude, text),
        }
    }

    fn remove(&mut self, channel: Channel, conn: Uuid) {
        match channel {
            Channel::Editor => {
                self.editor_clients.remove(&conn);
            }
            Channel::Notes => {
                self.notes_clients.remove(&conn);
            }
            Channel::Chat => {
                self.chat_clients.remove(&conn);
            }
            Channel::Media => {
                if let Some(client) = self.media_clients.remove(&conn) {
                    self.peer_conns.remove(&client.client_id);
                }
            }
        }
    }

    /// Remove a media member, returning its peer connection for closing
    /// outside the room lock.
    ///
    /// Keyed by `client_id` as well so the peer connection is still found
    /// when the reaper already evicted the client-set entry.
    fn remove_media(&mut self, conn: Uuid, client_id: &str) -> Option<Arc<RTCPeerConnection>> {
        self.media_clients.remove(&conn);
        self.peer_conns.remove(client_id)
    }

    /// Ping every client on every channel, evicting the unreachable.
    fn ping_clients(&mut self, room_id: &str) {
        let evicted = ping_all(&mut self.editor_clients, |c| c, room_id, "editor")
            + ping_all(&mut self.notes_clients, |c| c, room_id, "notes")
            + ping_all(&mut self.chat_clients, |c| &c.handle, room_id, "chat")
            + ping_all(&mut self.media_clients, |c| &c.handle, room_id, "media");
        if evicted > 0 {
            debug!(room_id, evicted, "evicted unreachable clients");
        }
    }

    /// Drop peer connections the WebRTC stack has already closed.
    fn drop_closed_peers(&mut self, room_id: &str) {
        self.peer_conns.retain(|client_id, pc| {
            let closed = pc.connection_state() == RTCPeerConnectionState::Closed;
            if closed {
                debug!(room_id, %client_id, "dropping closed peer connection");
            }
            !closed
        });
    }

    /// Close every client and clear all state; returns the peer connections
    /// so the caller can close them outside the lock.
    fn drain_for_shutdown(&mut self) -> Vec<Arc<RTCPeerConnection>> {
        for handle in self.editor_clients.values() {
            handle.close();
        }
        for handle in self.notes_clients.values() {
            handle.close();
        }
        for client in self.chat_clients.values() {
            client.handle.close();
        }
        for client in self.media_clients.values() {
            client.handle.close();
        }
        self.editor_clients.clear();
        self.notes_clients.clear();
        self.chat_clients.clear();
        self.media_clients.clear();
        self.peer_conns.drain().map(|(_, pc)| pc).collect()
    }
}

fn broadcast_to<V>(
    clients: &mut HashMap<Uuid, V>,
    handle_of: impl Fn(&V) -> &ClientHandle,
    exclude: Option<Uuid>,
    text: &str,
) -> usize {
    let mut dead = Vec::new();
    for (conn, client) in clients.iter() {
        if Some(*conn) == exclude {
            continue;
        }
        if !handle_of(client).send_text(text) {
            dead.push(*conn);
        }
    }
    for conn in &dead {
        clients.remove(conn);
    }
    dead.len()
}

fn ping_all<V>(
    clients: &mut HashMap<Uuid, V>,
    handle_of: impl Fn(&V) -> &ClientHandle,
    room_id: &str,
    channel: &str,
) -> usize {
    let mut dead = Vec::new();
    for (conn, client) in clients.iter() {
        if !handle_of(client).ping() {
            warn!(room_id, channel, "unreachable client detected");
            dead.push(*conn);
        }
    }
    for conn in &dead {
        if let Some(client) = clients.remove(conn) {
            handle_of(&client).close();
        }
    }
    dead.len()
}

fn encode<T: Serialize>(frame: &T) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(text),
        Err(err) => {
            warn!("failed to encode outbound frame: {err}");
            None
        }
    }
}

pub type SharedRoom = Arc<RwLock<Room>>;

/// Aggregate counts over all rooms, for the health surface and logs.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HubSnapshot {
    pub active_rooms: usize,
    pub active_clients: usize,
    pub active_peer_connections: usize,
}

/// Process-wide registry of rooms.
#[derive(Default)]
pub struct Hub {
    rooms: RwLock<HashMap<String, SharedRoom>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create(rooms: &mut HashMap<String, SharedRoom>, room_id: &str) -> SharedRoom {
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                info!(room_id, "room created");
                Arc::new(RwLock::new(Room::default()))
            })
            .clone()
    }

    /// Join the editor channel; the current code snapshot (if any) is queued
    /// to the joiner before any later broadcast can be.
    pub async fn join_editor(&self, room_id: &str, handle: ClientHandle) -> SharedRoom {
        let mut rooms = self.rooms.write().await;
        let room = Self::get_or_create(&mut rooms, room_id);
        {
            let mut guard = room.write().await;
            if !guard.latest_code.is_empty() {
                let sync =
                    EditorMessage::sync(guard.latest_code.clone(), guard.latest_language.clone());
                if let Some(text) = encode(&sync) {
                    handle.send_text(text);
                }
            }
            guard.editor_clients.insert(handle.id(), handle);
        }
        room
    }

    /// Join the notes channel; same snapshot contract as the editor.
    pub async fn join_notes(&self, room_id: &str, handle: ClientHandle) -> SharedRoom {
        let mut rooms = self.rooms.write().await;
        let room = Self::get_or_create(&mut rooms, room_id);
        {
            let mut guard = room.write().await;
            if !guard.latest_notes.is_empty() {
                let sync = NotesMessage::sync(guard.latest_notes.clone());
                if let Some(text) = encode(&sync) {
                    handle.send_text(text);
                }
            }
            guard.notes_clients.insert(handle.id(), handle);
        }
        room
    }

    /// Join the chat channel; the history marker and the full log are queued
    /// to the joiner before the read loop starts.
    pub async fn join_chat(&self, room_id: &str, client: ChatClient) -> SharedRoom {
        let mut rooms = self.rooms.write().await;
        let room = Self::get_or_create(&mut rooms, room_id);
        {
            let mut guard = room.write().await;
            if let Some(text) = encode(&ChatEvent::history_marker()) {
                client.handle.send_text(text);
            }
            for message in guard.chat_log.iter() {
                if let Some(text) = encode(&ChatEvent::chat(message.clone())) {
                    client.handle.send_text(text);
                }
            }
            guard.chat_clients.insert(client.handle.id(), client);
        }
        room
    }

    /// Join the media channel, registering the member's peer connection.
    pub async fn join_media(
        &self,
        room_id: &str,
        client: MediaClient,
        pc: Arc<RTCPeerConnection>,
    ) -> SharedRoom {
        let mut rooms = self.rooms.write().await;
        let room = Self::get_or_create(&mut rooms, room_id);
        {
            let mut guard = room.write().await;
            guard.peer_conns.insert(client.client_id.clone(), pc);
            guard.media_clients.insert(client.handle.id(), client);
        }
        room
    }

    /// Leave a channel; the room is dropped once fully empty.
    pub async fn leave(&self, room_id: &str, channel: Channel, conn: Uuid) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(room_id) else {
            return;
        };
        let now_empty = {
            let mut guard = room.write().await;
            guard.remove(channel, conn);
            guard.is_fully_empty()
        };
        if now_empty {
            rooms.remove(room_id);
            info!(room_id, "room closed");
        }
    }

    /// Leave the media channel.
    ///
    /// Returns the member's peer connection (if still registered) so the
    /// caller can close it outside any lock; the room is dropped once fully
    /// empty.
    pub async fn leave_media(
        &self,
        room_id: &str,
        conn: Uuid,
        client_id: &str,
    ) -> Option<Arc<RTCPeerConnection>> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get(room_id)?;
        let (pc, now_empty) = {
            let mut guard = room.write().await;
            let pc = guard.remove_media(conn, client_id);
            (pc, guard.is_fully_empty())
        };
        if now_empty {
            rooms.remove(room_id);
            info!(room_id, "room closed");
        }
        pc
    }

    /// Look up an existing room without creating it.
    pub async fn get(&self, room_id: &str) -> Option<SharedRoom> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Aggregate counts across all rooms.
    pub async fn snapshot(&self) -> HubSnapshot {
        let rooms: Vec<SharedRoom> = self.rooms.read().await.values().cloned().collect();
        let mut snapshot = HubSnapshot {
            active_rooms: rooms.len(),
            active_clients: 0,
            active_peer_connections: 0,
        };
        for room in rooms {
            let guard = room.read().await;
            snapshot.active_clients += guard.client_count();
            snapshot.active_peer_connections += guard.peer_connection_count();
        }
        snapshot
    }

    /// One reaper pass: ping every client, drop closed peer connections,
    /// then delete rooms that ended up fully empty.
    ///
    /// Two-phase on purpose: the room list is snapshotted under the hub read
    /// lock, each room is swept under its own lock, and only then is the hub
    /// write lock taken to delete the empties.
    pub async fn sweep(&self) {
        let rooms: Vec<(String, SharedRoom)> = self
            .rooms
            .read()
            .await
            .iter()
            .map(|(id, room)| (id.clone(), room.clone()))
            .collect();

        let mut empties = Vec::new();
        for (room_id, room) in rooms {
            let mut guard = room.write().await;
            guard.ping_clients(&room_id);
            guard.drop_closed_peers(&room_id);
            if guard.is_fully_empty() {
                empties.push(room_id);
            }
        }

        if empties.is_empty() {
            return;
        }

        let mut rooms = self.rooms.write().await;
        for room_id in empties {
            let still_empty = match rooms.get(&room_id) {
                Some(room) => room.read().await.is_fully_empty(),
                None => false,
            };
            if still_empty {
                rooms.remove(&room_id);
                info!(%room_id, "removed empty room");
            }
        }
    }

    /// Shutdown sweep: close every client connection and every peer
    /// connection, dropping all rooms.
    pub async fn close_all(&self) {
        let drained: Vec<(String, SharedRoom)> = {
            let mut rooms = self.rooms.write().await;
            rooms.drain().collect()
        };
        for (room_id, room) in drained {
            let peers = room.write().await.drain_for_shutdown();
            for pc in peers {
                if let Err(err) = pc.close().await {
                    warn!(%room_id, "failed to close peer connection: {err}");
                }
            }
            info!(%room_id, "room closed during shutdown");
        }
    }
}

/// Periodic maintenance task: ping clients, evict the unreachable, and
/// delete empty rooms, every `interval`.
pub async fn run_reaper(hub: Arc<Hub>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        hub.sweep().await;
    }
}
