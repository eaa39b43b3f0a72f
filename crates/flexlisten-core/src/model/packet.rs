// ── Radio discovery record ──
//
// One `Packet` per radio sighting. LAN broadcasts and SmartLink
// `radio list` entries share the same `key=value` vocabulary (with a few
// WAN spellings), so both are parsed here.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use flexlisten_api::protocol::{key_values, parse_bool};
use serde::Serialize;
use strum::{Display, EnumString};
use tracing::{error, trace};

use crate::config::ParseMode;
use crate::error::CoreError;

/// Where a record was heard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
pub enum PacketSource {
    /// LAN broadcast.
    #[strum(serialize = "Local")]
    Lan,
    /// SmartLink relay.
    #[strum(serialize = "Smartlink")]
    Wan,
}

/// Every key a radio (or the relay) is known to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
enum DiscoveryToken {
    Callsign,
    GuiClientHandles,
    GuiClientHosts,
    GuiClientIps,
    GuiClientPrograms,
    GuiClientStations,
    #[strum(serialize = "inuse_host", serialize = "inusehost")]
    InUseHost,
    #[strum(serialize = "inuse_ip", serialize = "inuseip")]
    InUseIp,
    Model,
    #[strum(serialize = "nickname", serialize = "radio_name")]
    Nickname,
    Port,
    #[strum(serialize = "ip", serialize = "public_ip")]
    PublicIp,
    PublicTlsPort,
    PublicUdpPort,
    PublicUpnpTlsPort,
    PublicUpnpUdpPort,
    Serial,
    Status,
    UpnpSupported,
    Version,

    // Recognized but not stored.
    AvailableClients,
    AvailablePanadapters,
    AvailableSlices,
    DiscoveryProtocolVersion,
    FpcMac,
    LastSeen,
    LicensedClients,
    MaxLicensedVersion,
    MaxPanadapters,
    MaxSlices,
    RadioLicenseId,
    RequiresAdditionalLicense,
    WanConnected,
}

/// A discovered radio.
///
/// Identity is `(serial, public_ip)`; see [`Packet::key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Packet {
    pub source: PacketSource,
    pub last_seen: DateTime<Utc>,

    // ── Identity ──
    pub serial: String,
    pub nickname: String,
    pub callsign: String,
    pub model: String,
    pub version: String,
    pub status: String,

    // ── Network ──
    pub port: u16,
    pub inuse_host: String,
    pub inuse_ip: String,
    pub public_ip: String,
    pub public_tls_port: Option<u16>,
    pub public_udp_port: Option<u16>,
    pub public_upnp_tls_port: Option<u16>,
    pub public_upnp_udp_port: Option<u16>,
    pub upnp_supported: bool,

    // ── Connected stations (parallel CSV lists) ──
    pub gui_client_handles: String,
    pub gui_client_programs: String,
    pub gui_client_stations: String,
    pub gui_client_hosts: String,
    pub gui_client_ips: String,

    // ── SmartLink session (never part of change detection) ──
    pub wan_handle: Option<String>,
    pub negotiated_hole_punch_port: Option<u16>,
    pub requires_hole_punch: bool,
    pub is_port_forward_on: bool,
}

impl Packet {
    /// An empty record stamped with the current time.
    pub fn new(source: PacketSource) -> Self {
        Self {
            source,
            last_seen: Utc::now(),
            serial: String::new(),
            nickname: String::new(),
            callsign: String::new(),
            model: String::new(),
            version: String::new(),
            status: String::new(),
            port: 0,
            inuse_host: String::new(),
            inuse_ip: String::new(),
            public_ip: String::new(),
            public_tls_port: None,
            public_udp_port: None,
            public_upnp_tls_port: None,
            public_upnp_udp_port: None,
            upnp_supported: false,
            gui_client_handles: String::new(),
            gui_client_programs: String::new(),
            gui_client_stations: String::new(),
            gui_client_hosts: String::new(),
            gui_client_ips: String::new(),
            wan_handle: None,
            negotiated_hole_punch_port: None,
            requires_hole_punch: false,
            is_port_forward_on: false,
        }
    }

    /// Stable identity: serial followed by public IP.
    pub fn key(&self) -> String {
        format!("{}{}", self.serial, self.public_ip)
    }

    /// Parse a discovery payload. See [`parse_packet`].
    pub fn parse(payload: &str, source: PacketSource, mode: ParseMode) -> Result<Self, CoreError> {
        parse_packet(payload, source, mode)
    }

    /// Whether `self` differs from `known` in any field worth an
    /// `updated` event. Timestamp, source, and session fields are ignored.
    pub fn is_different(&self, known: &Packet) -> bool {
        self.status != known.status
            || self.gui_client_handles != known.gui_client_handles
            || self.gui_client_programs != known.gui_client_programs
            || self.gui_client_stations != known.gui_client_stations
            || self.gui_client_ips != known.gui_client_ips
            || self.port != known.port
            || self.inuse_host != known.inuse_host
            || self.inuse_ip != known.inuse_ip
            || self.public_ip != known.public_ip
            || self.public_tls_port != known.public_tls_port
            || self.public_udp_port != known.public_udp_port
            || self.public_upnp_tls_port != known.public_upnp_tls_port
            || self.public_upnp_udp_port != known.public_upnp_udp_port
            || self.callsign != known.callsign
            || self.model != known.model
            || self.nickname != known.nickname
    }

    /// Copy the SmartLink session fields from an earlier record of the
    /// same radio. Discovery payloads never carry them.
    pub(crate) fn inherit_session(&mut self, known: &Packet) {
        self.wan_handle.clone_from(&known.wan_handle);
        self.negotiated_hole_punch_port = known.negotiated_hole_punch_port;
        self.requires_hole_punch = known.requires_hole_punch;
        self.is_port_forward_on = known.is_port_forward_on;
    }

    /// Label used in log lines.
    pub(crate) fn origin(&self) -> &'static str {
        match self.source {
            PacketSource::Lan => "Lan",
            PacketSource::Wan => "Wan",
        }
    }
}

/// Parse whitespace-separated `key=value` tokens into a [`Packet`].
///
/// In [`ParseMode::Strict`] an unknown key rejects the whole payload; in
/// [`ParseMode::Lenient`] it is skipped. Station CSV fields have DEL
/// (0x7F) characters removed. Malformed numbers leave the field unset.
pub fn parse_packet(payload: &str, source: PacketSource, mode: ParseMode) -> Result<Packet, CoreError> {
    let mut packet = Packet::new(source);

    for (key, value) in key_values(payload) {
        let Ok(token) = DiscoveryToken::from_str(key) else {
            if mode == ParseMode::Strict {
                error!(key, value, "unknown discovery key");
                return Err(CoreError::UnknownDiscoveryKey {
                    key: key.to_owned(),
                    value: value.to_owned(),
                });
            }
            trace!(key, value, "skipping unknown discovery key");
            continue;
        };

        match token {
            DiscoveryToken::Callsign => packet.callsign = value.to_owned(),
            DiscoveryToken::GuiClientHandles => packet.gui_client_handles = strip_del(value),
            DiscoveryToken::GuiClientHosts => packet.gui_client_hosts = strip_del(value),
            DiscoveryToken::GuiClientIps => packet.gui_client_ips = strip_del(value),
            DiscoveryToken::GuiClientPrograms => packet.gui_client_programs = strip_del(value),
            DiscoveryToken::GuiClientStations => packet.gui_client_stations = strip_del(value),
            DiscoveryToken::InUseHost => packet.inuse_host = value.to_owned(),
            DiscoveryToken::InUseIp => packet.inuse_ip = value.to_owned(),
            DiscoveryToken::Model => packet.model = value.to_owned(),
            DiscoveryToken::Nickname => packet.nickname = value.to_owned(),
            DiscoveryToken::Port => packet.port = parse_port(value).unwrap_or_default(),
            DiscoveryToken::PublicIp => packet.public_ip = value.to_owned(),
            DiscoveryToken::PublicTlsPort => packet.public_tls_port = parse_port(value),
            DiscoveryToken::PublicUdpPort => packet.public_udp_port = parse_port(value),
            DiscoveryToken::PublicUpnpTlsPort => packet.public_upnp_tls_port = parse_port(value),
            DiscoveryToken::PublicUpnpUdpPort => packet.public_upnp_udp_port = parse_port(value),
            DiscoveryToken::Serial => packet.serial = value.to_owned(),
            DiscoveryToken::Status => packet.status = value.to_owned(),
            DiscoveryToken::UpnpSupported => packet.upnp_supported = parse_bool(value),
            DiscoveryToken::Version => packet.version = value.to_owned(),

            DiscoveryToken::AvailableClients
            | DiscoveryToken::AvailablePanadapters
            | DiscoveryToken::AvailableSlices
            | DiscoveryToken::DiscoveryProtocolVersion
            | DiscoveryToken::FpcMac
            | DiscoveryToken::LastSeen
            | DiscoveryToken::LicensedClients
            | DiscoveryToken::MaxLicensedVersion
            | DiscoveryToken::MaxPanadapters
            | DiscoveryToken::MaxSlices
            | DiscoveryToken::RadioLicenseId
            | DiscoveryToken::RequiresAdditionalLicense
            | DiscoveryToken::WanConnected => {}
        }
    }

    Ok(packet)
}

fn strip_del(value: &str) -> String {
    value.replace('\u{7f}', "")
}

fn parse_port(value: &str) -> Option<u16> {
    value.trim().parse().ok()
}
