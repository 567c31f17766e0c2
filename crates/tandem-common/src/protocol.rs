//! Wire protocol types for the Tandem hub's four room channels.
//!
//! All frames are JSON text. The editor and notes channels are permissive:
//! a message with an unrecognized `type` is re-broadcast untouched so newer
//! clients can ship frame kinds the hub does not yet interpret.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cursor position inside the collaborative editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub line: i64,
    pub column: i64,
}

/// Frame exchanged on the editor channel.
///
/// `type` is one of `code`, `cursor`, `chat` (legacy) or `sync`
/// (server-to-client snapshot on join); other values are forwarded as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat: Option<String>,
}

impl EditorMessage {
    /// Snapshot frame sent to a late joiner.
    pub fn sync(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            kind: "sync".to_string(),
            code: Some(code.into()),
            language: Some(language.into()),
            cursor: None,
            chat: None,
        }
    }
}

/// Frame exchanged on the notes channel.
///
/// `content` carries the plain-text notes body; `html` is an optional
/// rendered form that the hub relays without inspecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotesMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl NotesMessage {
    /// Snapshot frame sent to a late joiner.
    pub fn sync(content: impl Into<String>) -> Self {
        Self {
            kind: "sync".to_string(),
            content: Some(content.into()),
            html: None,
        }
    }
}

/// A single chat message as stored in the room log and replayed to joiners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub room_id: String,
    pub user_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Frame exchanged on the chat channel.
///
/// Inbound frames carry `userName`/`content`; outbound frames wrap the
/// authoritative [`ChatMessage`]. `type` is `chat` or `history` (the replay
/// delimiter sent once on join).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatMessage>,
}

impl ChatEvent {
    /// The replay delimiter sent before the room's chat log.
    pub fn history_marker() -> Self {
        Self {
            kind: "history".to_string(),
            user_name: None,
            content: None,
            message: None,
        }
    }

    /// The authoritative broadcast form of a stored message.
    pub fn chat(message: ChatMessage) -> Self {
        Self {
            kind: "chat".to_string(),
            user_name: None,
            content: None,
            message: Some(message),
        }
    }
}

/// Registry reply for a token-validated room join.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedRoom {
    pub id: String,
    #[serde(default)]
    pub candidate_name: String,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}
