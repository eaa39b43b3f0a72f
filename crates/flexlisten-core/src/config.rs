// ── Runtime listener configuration ──
//
// These types describe *how* to discover radios. They carry credential
// data and timing, but never touch disk. The application constructs a
// `ListenerConfig` and hands it in.

use std::time::Duration;

use flexlisten_api::transport::{DISCOVERY_PORT, RELAY_HOST, RELAY_PORT};
use secrecy::SecretString;

/// How strictly discovery payloads are parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Unknown keys reject the payload. Surfaces firmware format changes.
    Strict,
    /// Unknown keys are skipped.
    Lenient,
}

impl Default for ParseMode {
    /// Strict in debug builds, lenient in release builds.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Strict
        } else {
            Self::Lenient
        }
    }
}

/// LAN broadcast listener settings.
#[derive(Debug, Clone)]
pub struct LanConfig {
    /// UDP port to bind. 0 picks an ephemeral port (tests).
    pub port: u16,
    /// How often to sweep for radios that stopped broadcasting.
    pub check_interval: Duration,
    /// A LAN radio not heard from for this long is removed.
    pub timeout: Duration,
}

impl Default for LanConfig {
    fn default() -> Self {
        Self {
            port: DISCOVERY_PORT,
            check_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        }
    }
}

/// SmartLink relay settings.
#[derive(Debug, Clone)]
pub struct WanConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    /// Deadline for command writes. Pings are sent without one.
    pub write_timeout: Duration,
    /// The session is torn down if the relay sends nothing for this long.
    pub read_idle_timeout: Duration,
    pub ping_interval: Duration,
    /// Application name sent in the `register` command.
    pub app_name: String,
    /// Platform identifier sent in the `register` command.
    pub platform: String,
}

impl Default for WanConfig {
    fn default() -> Self {
        Self {
            host: RELAY_HOST.into(),
            port: RELAY_PORT,
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            read_idle_timeout: Duration::from_secs(30),
            ping_interval: Duration::from_secs(10),
            app_name: env!("CARGO_PKG_NAME").into(),
            platform: std::env::consts::OS.into(),
        }
    }
}

/// Configuration for a [`Listener`](crate::Listener).
///
/// Built by the application -- core never reads config files.
#[derive(Debug, Clone, Default)]
pub struct ListenerConfig {
    pub lan: LanConfig,
    pub wan: WanConfig,
    pub parse_mode: ParseMode,
}

/// How to obtain a SmartLink bearer token.
#[derive(Debug, Clone)]
pub enum WanCredentials {
    /// Interactive identity flow seeded with the account email.
    /// `force_login` skips any cached session.
    Interactive { email: String, force_login: bool },
    /// Direct user/password exchange.
    Password { user: String, password: SecretString },
}

/// Which discovery sources should be running.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMode {
    pub lan: bool,
    pub wan: bool,
    /// Required when `wan` is set and no WAN listener is running yet.
    pub credentials: Option<WanCredentials>,
}

impl ConnectionMode {
    pub fn lan_only() -> Self {
        Self {
            lan: true,
            wan: false,
            credentials: None,
        }
    }

    pub fn wan_only(credentials: WanCredentials) -> Self {
        Self {
            lan: false,
            wan: true,
            credentials: Some(credentials),
        }
    }

    pub fn both(credentials: WanCredentials) -> Self {
        Self {
            lan: true,
            wan: true,
            credentials: Some(credentials),
        }
    }
}
