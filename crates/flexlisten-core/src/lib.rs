// flexlisten-core: Discovery engine between flexlisten-api and consumers (radio pickers, station lists).
//
// Snapshots and entity streams always reflect every applied change. The
// event channels are bounded (`EVENT_CHANNEL_SIZE`); a subscriber that
// falls that far behind skips ahead and should resync from a snapshot.

pub mod config;
pub mod error;
pub mod lan;
pub mod listener;
pub mod model;
pub mod store;
pub mod wan;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ConnectionMode, LanConfig, ListenerConfig, ParseMode, WanConfig, WanCredentials};
pub use error::CoreError;
pub use lan::LanListener;
pub use listener::Listener;
pub use store::{ApplyOutcome, DataStore, EVENT_CHANNEL_SIZE, EntityStream};
pub use wan::{WanListener, WanState};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ClientAction, ClientEvent, DefaultSelection, GuiClient, Handle, Packet, PacketAction,
    PacketEvent, PacketSource, Pickable,
};

// Relay payload types surface through the WAN listener's streams.
pub use flexlisten_api::{TestResult, UserSettings};
