// ── SmartLink relay line protocol ──
//
// Newline-delimited ASCII in both directions. Outbound lines are
// rendered from `RelayCommand`; inbound lines are classified into
// `RelayMessage` without interpreting discovery fields (that belongs
// to the core record model).

use strum::IntoStaticStr;

use crate::auth::IdToken;

// ── Tokenizing ───────────────────────────────────────────────────────

/// Split whitespace-separated `key=value` tokens.
///
/// A token without `=` yields an empty value. Empty values (`key=`) are
/// preserved so callers can distinguish "present but blank".
pub fn key_values(text: &str) -> Vec<(&str, &str)> {
    text.split_whitespace()
        .map(|token| token.split_once('=').unwrap_or((token, "")))
        .collect()
}

/// Lenient boolean coercion used by radio firmware: `1`, `true`, `yes`,
/// `on` (any case) are true, everything else false.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "t" | "y"
    )
}

fn lookup<'a>(pairs: &[(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

// ── Outbound ─────────────────────────────────────────────────────────

/// Commands the client sends to the relay.
#[derive(Debug, Clone, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RelayCommand {
    /// First line after the TLS handshake.
    Register {
        name: String,
        platform: String,
        token: IdToken,
    },
    /// Keep-alive.
    Ping,
    TestConnection {
        serial: String,
    },
    /// Ask the relay to broker a session; answered by `radio connect_ready`.
    Connect {
        serial: String,
        hole_punch_port: u16,
    },
    /// Kick every station on a radio, or just the one with `handle`.
    DisconnectUsers {
        serial: String,
        handle: Option<u32>,
    },
}

impl RelayCommand {
    /// Render the command without its trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            Self::Register {
                name,
                platform,
                token,
            } => format!(
                "application register name={name} platform={platform} token={}",
                token.expose()
            ),
            Self::Ping => "ping from client".to_owned(),
            Self::TestConnection { serial } => {
                format!("application test_connection serial={serial}")
            }
            Self::Connect {
                serial,
                hole_punch_port,
            } => format!("application connect serial={serial} hole_punch_port={hole_punch_port}"),
            Self::DisconnectUsers {
                serial,
                handle: None,
            } => format!("application disconnect_users serial={serial}"),
            Self::DisconnectUsers {
                serial,
                handle: Some(handle),
            } => format!("application disconnect_users serial={serial} handle=0x{handle:08X}"),
        }
    }

    /// Short name for logging. Never includes arguments (the register
    /// line carries the bearer token).
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

// ── Inbound ──────────────────────────────────────────────────────────

/// Result of an `application test_connection` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestResult {
    pub serial: String,
    pub upnp_tcp_port_working: bool,
    pub upnp_udp_port_working: bool,
    pub forward_tcp_port_working: bool,
    pub forward_udp_port_working: bool,
    pub nat_supports_hole_punch: bool,
}

impl TestResult {
    /// A radio is reachable when either port forwarding or UPnP works
    /// for both TCP and UDP.
    pub fn is_success(&self) -> bool {
        (self.forward_tcp_port_working && self.forward_udp_port_working)
            || (self.upnp_tcp_port_working && self.upnp_udp_port_working)
    }

    fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let flag = |key| lookup(pairs, key).is_some_and(parse_bool);
        Self {
            serial: lookup(pairs, "serial").unwrap_or_default().to_owned(),
            upnp_tcp_port_working: flag("upnp_tcp_port_working"),
            upnp_udp_port_working: flag("upnp_udp_port_working"),
            forward_tcp_port_working: flag("forward_tcp_port_working"),
            forward_udp_port_working: flag("forward_udp_port_working"),
            nat_supports_hole_punch: flag("nat_supports_hole_punch"),
        }
    }
}

/// Account details the relay reports after registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSettings {
    pub callsign: String,
    pub first_name: String,
    pub last_name: String,
}

/// A classified inbound relay line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// Every radio the account can see; one `key=value` entry per radio.
    RadioList(Vec<String>),
    /// Response to `application connect`. A missing handle is a refusal.
    ConnectReady {
        serial: String,
        handle: Option<String>,
    },
    TestConnection(TestResult),
    UserSettings(UserSettings),
    /// Our public address as seen by the relay.
    Info { public_ip: String },
    /// The relay rejected the bearer token.
    RegistrationInvalid,
    Unknown(String),
}

impl RelayMessage {
    pub fn parse_line(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(3, ' ');
        let category = parts.next().unwrap_or_default();
        let verb = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default();

        match (category, verb) {
            ("radio", "list") => Self::RadioList(
                rest.split('|')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_owned)
                    .collect(),
            ),
            ("radio", "connect_ready") => {
                let pairs = key_values(rest);
                match lookup(&pairs, "serial").filter(|s| !s.is_empty()) {
                    Some(serial) => Self::ConnectReady {
                        serial: serial.to_owned(),
                        handle: lookup(&pairs, "handle")
                            .filter(|h| !h.is_empty())
                            .map(str::to_owned),
                    },
                    None => Self::Unknown(line.to_owned()),
                }
            }
            ("radio", "test_connection") => {
                Self::TestConnection(TestResult::from_pairs(&key_values(rest)))
            }
            ("application", "user_settings") => {
                let pairs = key_values(rest);
                let field = |key| lookup(&pairs, key).unwrap_or_default().to_owned();
                Self::UserSettings(UserSettings {
                    callsign: field("callsign"),
                    first_name: field("first_name"),
                    last_name: field("last_name"),
                })
            }
            ("application", "info") => Self::Info {
                public_ip: lookup(&key_values(rest), "public_ip")
                    .unwrap_or_default()
                    .to_owned(),
            },
            ("application", "registration_invalid") => Self::RegistrationInvalid,
            _ => Self::Unknown(line.to_owned()),
        }
    }
}
