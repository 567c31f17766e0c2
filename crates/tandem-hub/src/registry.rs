//! HTTP client for the core registry service.
//!
//! The hub owns no room records; every WebSocket upgrade asks the registry
//! whether `(roomId, token)` names an active room. The three refusal causes
//! are distinct error variants so the caller can log them apart, but all of
//! them refuse the upgrade.

use std::time::Duration;

use tandem_common::{AuthorizedRoom, Error, Result};
use tracing::debug;

/// Total deadline for one validation round-trip.
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the registry's room-join endpoint.
pub struct RegistryClient {
    base_url: String,
    http: reqwest::Client,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Ask the registry whether `token` grants access to an active room.
    ///
    /// - empty token: rejected without a network call
    /// - non-2xx reply: [`Error::Auth`]
    /// - transport failure or deadline: [`Error::RegistryUnavailable`]
    /// - `isActive == false`: [`Error::RoomInactive`]
    pub async fn validate_room(&self, room_id: &str, token: &str) -> Result<AuthorizedRoom> {
        if token.is_empty() {
            return Err(Error::auth("token is required"));
        }

        debug!(room_id, "validating room against registry");

        let url = format!("{}/rooms/join", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("token", token)])
            .timeout(VALIDATE_TIMEOUT)
            .send()
            .await
            .map_err(Error::registry_unavailable)?;

        if !response.status().is_success() {
            return Err(Error::auth(format!(
                "invalid room or token: status {}",
                response.status()
            )));
        }

        let room: AuthorizedRoom = response
            .json()
            .await
            .map_err(Error::registry_unavailable)?;

        if !room.is_active {
            return Err(Error::RoomInactive);
        }

        Ok(room)
    }
}
