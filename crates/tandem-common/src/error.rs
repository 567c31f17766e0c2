//! Common error types for Tandem.

use thiserror::Error;

/// Result type alias using Tandem's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for Tandem operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing token or token rejected by the registry
    #[error("authentication error: {0}")]
    Auth(String),

    /// The registry could not be reached or timed out
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// The room exists but is no longer active
    #[error("room is not active")]
    RoomInactive,

    /// An inbound frame failed to decode
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// SDP or ICE handling failed on a peer connection
    #[error("signaling error: {0}")]
    Signaling(String),

    /// A write to a peer socket failed
    #[error("peer send failed: {0}")]
    PeerSend(String),

    /// Read-side connection failure other than normal closure
    #[error("connection error: {0}")]
    Connection(String),

    /// Operation timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an auth error from any displayable type.
    pub fn auth(msg: impl std::fmt::Display) -> Self {
        Self::Auth(msg.to_string())
    }

    /// Create a registry-unavailable error from any displayable type.
    pub fn registry_unavailable(msg: impl std::fmt::Display) -> Self {
        Self::RegistryUnavailable(msg.to_string())
    }

    /// Create an invalid-frame error from any displayable type.
    pub fn invalid_frame(msg: impl std::fmt::Display) -> Self {
        Self::InvalidFrame(msg.to_string())
    }

    /// Create a signaling error from any displayable type.
    pub fn signaling(msg: impl std::fmt::Display) -> Self {
        Self::Signaling(msg.to_string())
    }

    /// Create a peer-send error from any displayable type.
    pub fn peer_send(msg: impl std::fmt::Display) -> Self {
        Self::PeerSend(msg.to_string())
    }

    /// Create a connection error from any displayable type.
    pub fn connection(msg: impl std::fmt::Display) -> Self {
        Self::Connection(msg.to_string())
    }

    /// Create a timeout error from any displayable type.
    pub fn timeout(msg: impl std::fmt::Display) -> Self {
        Self::Timeout(msg.to_string())
    }

    /// Create an internal error from any displayable type.
    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self::Internal(msg.to_string())
    }
}
