// ── Domain model ──
//
// Value types for discovered radios, their connected stations, the
// derived picker rows, and the change events the store publishes.

pub mod event;
pub mod gui_client;
pub mod packet;
pub mod pickable;

pub use event::{ClientAction, ClientEvent, PacketAction, PacketEvent};
pub use gui_client::{GuiClient, Handle, parse_stations};
pub use packet::{Packet, PacketSource, parse_packet};
pub use pickable::{DefaultSelection, Pickable};
