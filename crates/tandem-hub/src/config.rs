//! Hub configuration, read from the environment.
//!
//! Every option has a default so the hub starts with no configuration at
//! all; `dotenv` is loaded by the binary before this runs.

use std::time::Duration;

/// Default bind address for the hub's front door.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8100";

/// Default STUN server handed to every peer connection.
pub const DEFAULT_STUN_SERVER_URL: &str = "stun:stun.l.google.com:19302";

/// Default base URL of the core registry service.
pub const DEFAULT_CORE_BASE_URL: &str = "http://127.0.0.1:8000";

const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;
const DEFAULT_VALIDATE_INTERVAL_SECS: u64 = 300;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration for the hub service.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address the front door listens on.
    pub bind_addr: String,
    /// STUN server URL used by every peer connection (single entry, no TURN).
    pub stun_server_url: String,
    /// How often the reaper pings clients and drops empty rooms.
    pub cleanup_interval: Duration,
    /// Reserved: periodic re-validation of active rooms against the registry.
    pub validate_interval: Duration,
    /// How long shutdown waits for the server to drain.
    pub shutdown_timeout: Duration,
    /// Base URL of the core registry service that owns room records.
    pub core_base_url: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            stun_server_url: DEFAULT_STUN_SERVER_URL.to_string(),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            validate_interval: Duration::from_secs(DEFAULT_VALIDATE_INTERVAL_SECS),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            core_base_url: DEFAULT_CORE_BASE_URL.to_string(),
        }
    }
}

impl HubConfig {
    /// Load configuration from `TANDEM_*` environment variables.
    ///
    /// Unset, empty, or unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_string("TANDEM_HUB_BIND_ADDR", DEFAULT_BIND_ADDR),
            stun_server_url: env_string("TANDEM_STUN_SERVER_URL", DEFAULT_STUN_SERVER_URL),
            cleanup_interval: env_duration_secs(
                "TANDEM_CLEANUP_INTERVAL_SECS",
                DEFAULT_CLEANUP_INTERVAL_SECS,
            ),
            validate_interval: env_duration_secs(
                "TANDEM_VALIDATE_INTERVAL_SECS",
                DEFAULT_VALIDATE_INTERVAL_SECS,
            ),
            shutdown_timeout: env_duration_secs(
                "TANDEM_SHUTDOWN_TIMEOUT_SECS",
                DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            ),
            core_base_url: env_string("TANDEM_CORE_BASE_URL", DEFAULT_CORE_BASE_URL),
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn env_duration_secs(name: &str, default: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}
