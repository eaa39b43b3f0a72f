// ── Connected stations ──

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;

use super::packet::Packet;

/// Client handle assigned by the radio, rendered as hex on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct Handle(pub u32);

impl FromStr for Handle {
    type Err = std::num::ParseIntError;

    /// Accepts `0x1A2B`, `0X1A2B`, or bare `1A2B`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u32::from_str_radix(digits, 16).map(Handle)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// A control client connected to a radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuiClient {
    pub handle: Handle,
    pub station: String,
    pub program: String,
    pub ip: String,
    /// Empty when the radio does not report hosts.
    pub host: String,
    /// Serial of the radio this station is connected to.
    pub serial: String,
    /// [`Packet::key`] of the owning radio.
    pub radio_key: String,
    /// Client identifier, learned after connecting to the radio.
    pub client_id: Option<String>,
    /// Set once the `completed` event has been published for this station.
    pub completed: bool,
}

impl GuiClient {
    /// Every essential property is known.
    pub fn is_complete(&self) -> bool {
        self.handle.0 != 0
            && self.client_id.is_some()
            && !self.program.is_empty()
            && !self.station.is_empty()
    }
}

/// Zip a radio's parallel station CSV lists into stations keyed by handle.
///
/// Entries missing a handle, station, program, or IP are skipped. Lists
/// of unequal length yield no stations at all.
pub fn parse_stations(packet: &Packet) -> IndexMap<Handle, GuiClient> {
    let mut stations = IndexMap::new();

    if packet.gui_client_handles.is_empty()
        || packet.gui_client_programs.is_empty()
        || packet.gui_client_stations.is_empty()
    {
        return stations;
    }

    let handles: Vec<&str> = packet.gui_client_handles.split(',').collect();
    let programs: Vec<&str> = packet.gui_client_programs.split(',').collect();
    let names: Vec<&str> = packet.gui_client_stations.split(',').collect();
    let ips: Vec<&str> = packet.gui_client_ips.split(',').collect();
    let hosts: Vec<&str> = packet.gui_client_hosts.split(',').collect();

    if programs.len() != handles.len() || names.len() != handles.len() || ips.len() != handles.len() {
        return stations;
    }

    for (i, raw_handle) in handles.iter().enumerate() {
        let Ok(handle) = raw_handle.parse::<Handle>() else {
            continue;
        };
        let (station, program, ip) = (names[i], programs[i], ips[i]);
        if station.is_empty() || program.is_empty() || ip.is_empty() {
            continue;
        }
        stations.insert(
            handle,
            GuiClient {
                handle,
                station: station.to_owned(),
                program: program.to_owned(),
                ip: ip.to_owned(),
                host: hosts.get(i).copied().unwrap_or_default().to_owned(),
                serial: packet.serial.clone(),
                radio_key: packet.key(),
                client_id: None,
                completed: false,
            },
        );
    }

    stations
}
