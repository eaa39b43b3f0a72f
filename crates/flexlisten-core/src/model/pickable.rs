use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::packet::Packet;

/// A row in a radio or station picker.
///
/// Regenerated from the store on every radio or station change, so `id`
/// is only stable within a single snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Pickable {
    pub id: Uuid,
    pub packet: Arc<Packet>,
    /// For a radio row, the radio's station list as broadcast; for a
    /// station row, that station's name.
    pub station: String,
    pub is_default: bool,
}

impl Pickable {
    pub(crate) fn new(packet: Arc<Packet>, station: String, is_default: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            packet,
            station,
            is_default,
        }
    }
}

/// The application's preferred radio (and optionally station), used to
/// flag [`Pickable::is_default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultSelection {
    pub serial: String,
    pub station: Option<String>,
}

impl DefaultSelection {
    pub(crate) fn matches_radio(&self, packet: &Packet) -> bool {
        self.serial == packet.serial
    }

    pub(crate) fn matches_station(&self, packet: &Packet, station: &str) -> bool {
        self.matches_radio(packet) && self.station.as_deref() == Some(station)
    }
}
