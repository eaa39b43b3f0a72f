// ── Store change events ──

use std::sync::Arc;

use strum::Display;

use super::gui_client::GuiClient;
use super::packet::Packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PacketAction {
    Added,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ClientAction {
    Added,
    Removed,
    /// Published once, when a station first becomes complete.
    Completed,
}

/// A radio was added, changed, or removed.
#[derive(Debug, Clone)]
pub struct PacketEvent {
    pub action: PacketAction,
    pub packet: Arc<Packet>,
}

/// A station was added, removed, or completed.
#[derive(Debug, Clone)]
pub struct ClientEvent {
    pub action: ClientAction,
    pub client: Arc<GuiClient>,
}
