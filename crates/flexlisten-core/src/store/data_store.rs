// ── Central reactive data store ──
//
// The single owner of known radios and their stations. Every mutation
// runs under one lock: records are updated, events are broadcast in
// apply order, derived picker rows are rebuilt, and only then are the
// snapshots republished.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexMap;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use super::collection::EntityCollection;
use super::subscription::EntityStream;
use crate::model::{
    ClientAction, ClientEvent, DefaultSelection, GuiClient, Handle, Packet, PacketAction,
    PacketEvent, PacketSource, Pickable, parse_stations,
};

/// Events a subscriber may fall behind by before it starts losing them.
///
/// Event channels are bounded. A receiver that lags further gets
/// `RecvError::Lagged(n)` and continues with the newest events; the
/// snapshots and entity streams are complete regardless, so a lagging
/// consumer resynchronizes from a snapshot.
pub const EVENT_CHANNEL_SIZE: usize = 1024;

/// Stations are keyed by owning radio, then handle.
type StationKey = (String, Handle);

/// What [`DataStore::apply`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// First sighting of this radio.
    Added,
    /// Known radio with changed fields.
    Updated,
    /// Known radio, nothing interesting changed; only `last_seen` moved.
    Refreshed,
}

/// Central reactive store for discovered radios and their stations.
///
/// Mutations from the LAN listener, the WAN listener, and sweep timers
/// are serialized by one mutex. Change events go out on `broadcast`
/// channels in the order they were applied; full snapshots are published
/// through `watch` channels.
pub struct DataStore {
    state: Mutex<StoreState>,
    packet_events: broadcast::Sender<Arc<PacketEvent>>,
    client_events: broadcast::Sender<Arc<ClientEvent>>,
}

struct StoreState {
    packets: EntityCollection<String, Packet>,
    gui_clients: EntityCollection<StationKey, GuiClient>,
    pickable_radios: EntityCollection<Uuid, Pickable>,
    pickable_stations: EntityCollection<Uuid, Pickable>,
    default_selection: Option<DefaultSelection>,
}

impl DataStore {
    pub fn new() -> Self {
        let (packet_events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (client_events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Self {
            state: Mutex::new(StoreState {
                packets: EntityCollection::new(),
                gui_clients: EntityCollection::new(),
                pickable_radios: EntityCollection::new(),
                pickable_stations: EntityCollection::new(),
                default_selection: None,
            }),
            packet_events,
            client_events,
        }
    }

    // ── Reconciliation ───────────────────────────────────────────────

    /// Merge one sighting into the store.
    pub fn apply(&self, packet: Packet) -> ApplyOutcome {
        let mut state = self.lock();
        let key = packet.key();

        let outcome = match state.packets.get(&key).cloned() {
            None => {
                let stations = parse_stations(&packet);
                let (stored, _) = state.packets.upsert(key, packet);
                info!(
                    origin = stored.origin(),
                    nickname = %stored.nickname,
                    serial = %stored.serial,
                    "packet ADDED"
                );
                self.emit_packet(PacketAction::Added, stored);
                for client in stations.into_values() {
                    self.add_station(&mut state, client);
                }
                ApplyOutcome::Added
            }
            Some(known) if packet.is_different(&known) => {
                let mut packet = packet;
                packet.inherit_session(&known);
                let stations = parse_stations(&packet);
                let (stored, _) = state.packets.upsert(key.clone(), packet);
                info!(
                    origin = stored.origin(),
                    nickname = %stored.nickname,
                    serial = %stored.serial,
                    "packet UPDATED"
                );
                self.emit_packet(PacketAction::Updated, stored);
                self.reconcile_stations(&mut state, &key, stations);
                ApplyOutcome::Updated
            }
            Some(known) => {
                let mut refreshed = (*known).clone();
                refreshed.last_seen = packet.last_seen;
                state.packets.upsert(key, refreshed);
                ApplyOutcome::Refreshed
            }
        };

        if outcome != ApplyOutcome::Refreshed {
            state.rebuild_pickables();
        }
        state.publish();
        outcome
    }

    /// Remove every radio matching `predicate`, along with its stations.
    /// Returns the number of radios removed.
    pub fn remove_where(&self, mut predicate: impl FnMut(&Packet) -> bool) -> usize {
        let mut state = self.lock();
        let doomed: Vec<String> = state
            .packets
            .iter()
            .filter(|(_, packet)| predicate(packet))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            self.remove_packet(&mut state, key);
        }
        if !doomed.is_empty() {
            state.rebuild_pickables();
            state.publish();
        }
        doomed.len()
    }

    /// Remove radios from `source` not seen within `timeout` of `now`.
    pub fn remove_stale(&self, source: PacketSource, timeout: Duration, now: DateTime<Utc>) -> usize {
        let limit = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
        self.remove_where(|p| p.source == source && (now - p.last_seen).abs() > limit)
    }

    /// Remove radios from `source` whose key is not in `keep`.
    pub fn prune_source(&self, source: PacketSource, keep: &HashSet<String>) -> usize {
        self.remove_where(|p| p.source == source && !keep.contains(&p.key()))
    }

    /// Record a station's client identifier, publishing `completed` if
    /// that makes the station complete for the first time.
    ///
    /// Returns `false` if no such station is known.
    pub fn update_station(&self, radio_key: &str, handle: Handle, client_id: &str) -> bool {
        let mut state = self.lock();
        let key = (radio_key.to_owned(), handle);
        let Some(existing) = state.gui_clients.get(&key) else {
            return false;
        };

        let mut client = (**existing).clone();
        client.client_id = Some(client_id.to_owned());
        let completes = mark_completion(&mut client);
        let (stored, _) = state.gui_clients.upsert(key, client);
        if completes {
            self.announce_completed(stored);
        }
        state.publish();
        true
    }

    /// Update SmartLink session fields on every WAN record of `serial`.
    /// Session fields never produce events.
    pub(crate) fn update_session(&self, serial: &str, mut update: impl FnMut(&mut Packet)) -> usize {
        let mut state = self.lock();
        let matching: Vec<(String, Packet)> = state
            .packets
            .iter()
            .filter(|(_, p)| p.source == PacketSource::Wan && p.serial == serial)
            .map(|(key, p)| (key.clone(), (**p).clone()))
            .collect();

        let count = matching.len();
        for (key, mut packet) in matching {
            update(&mut packet);
            state.packets.upsert(key, packet);
        }
        state.publish();
        count
    }

    /// Set (or clear) the preferred radio/station and re-flag picker rows.
    pub fn set_default_selection(&self, selection: Option<DefaultSelection>) {
        let mut state = self.lock();
        state.default_selection = selection;
        state.rebuild_pickables();
        state.publish();
    }

    // ── Lookups ──────────────────────────────────────────────────────

    /// First radio matching `predicate`, in first-seen order.
    pub fn find_packet(&self, mut predicate: impl FnMut(&Packet) -> bool) -> Option<Arc<Packet>> {
        self.lock()
            .packets
            .values()
            .find(|packet| predicate(packet))
            .cloned()
    }

    pub fn packet_by_key(&self, key: &str) -> Option<Arc<Packet>> {
        self.lock().packets.get(key).cloned()
    }

    pub fn packet_count(&self) -> usize {
        self.lock().packets.len()
    }

    pub fn gui_client_count(&self) -> usize {
        self.lock().gui_clients.len()
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn packets_snapshot(&self) -> Arc<Vec<Arc<Packet>>> {
        self.lock().packets.snapshot()
    }

    pub fn gui_clients_snapshot(&self) -> Arc<Vec<Arc<GuiClient>>> {
        self.lock().gui_clients.snapshot()
    }

    pub fn pickable_radios_snapshot(&self) -> Arc<Vec<Arc<Pickable>>> {
        self.lock().pickable_radios.snapshot()
    }

    pub fn pickable_stations_snapshot(&self) -> Arc<Vec<Arc<Pickable>>> {
        self.lock().pickable_stations.snapshot()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_packets(&self) -> EntityStream<Packet> {
        EntityStream::new(self.lock().packets.subscribe())
    }

    pub fn subscribe_gui_clients(&self) -> EntityStream<GuiClient> {
        EntityStream::new(self.lock().gui_clients.subscribe())
    }

    pub fn subscribe_pickable_radios(&self) -> EntityStream<Pickable> {
        EntityStream::new(self.lock().pickable_radios.subscribe())
    }

    pub fn subscribe_pickable_stations(&self) -> EntityStream<Pickable> {
        EntityStream::new(self.lock().pickable_stations.subscribe())
    }

    /// Radio add/update/delete events, in apply order. Bounded by
    /// [`EVENT_CHANNEL_SIZE`].
    pub fn packet_events(&self) -> broadcast::Receiver<Arc<PacketEvent>> {
        self.packet_events.subscribe()
    }

    /// Station add/remove/completed events, in apply order. Bounded by
    /// [`EVENT_CHANNEL_SIZE`].
    pub fn client_events(&self) -> broadcast::Receiver<Arc<ClientEvent>> {
        self.client_events.subscribe()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("data store lock poisoned")
    }

    fn emit_packet(&self, action: PacketAction, packet: Arc<Packet>) {
        let _ = self.packet_events.send(Arc::new(PacketEvent { action, packet }));
    }

    fn emit_client(&self, action: ClientAction, client: Arc<GuiClient>) {
        let _ = self.client_events.send(Arc::new(ClientEvent { action, client }));
    }

    fn announce_completed(&self, client: Arc<GuiClient>) {
        info!(
            handle = %client.handle,
            station = %client.station,
            program = %client.program,
            client_id = client.client_id.as_deref().unwrap_or_default(),
            "guiClient COMPLETED"
        );
        self.emit_client(ClientAction::Completed, client);
    }

    fn add_station(&self, state: &mut StoreState, mut client: GuiClient) {
        let completes = mark_completion(&mut client);
        let key = (client.radio_key.clone(), client.handle);
        let (stored, _) = state.gui_clients.upsert(key, client);
        info!(handle = %stored.handle, station = %stored.station, "guiClient ADDED");
        self.emit_client(ClientAction::Added, Arc::clone(&stored));
        if completes {
            self.announce_completed(stored);
        }
    }

    /// Diff a radio's freshly parsed stations against the stored ones.
    /// Surviving stations keep their client id and completion state.
    fn reconcile_stations(&self, state: &mut StoreState, radio_key: &str, fresh: IndexMap<Handle, GuiClient>) {
        let gone: Vec<StationKey> = state
            .gui_clients
            .iter()
            .filter(|((owner, handle), _)| owner == radio_key && !fresh.contains_key(handle))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &gone {
            if let Some(client) = state.gui_clients.remove(key) {
                info!(handle = %client.handle, station = %client.station, "guiClient REMOVED");
                self.emit_client(ClientAction::Removed, client);
            }
        }

        for (handle, mut client) in fresh {
            let key = (radio_key.to_owned(), handle);
            let Some(existing) = state.gui_clients.get(&key).cloned() else {
                self.add_station(state, client);
                continue;
            };
            client.client_id.clone_from(&existing.client_id);
            client.completed = existing.completed;
            let completes = mark_completion(&mut client);
            let (stored, _) = state.gui_clients.upsert(key, client);
            if completes {
                self.announce_completed(stored);
            }
        }
    }

    fn remove_packet(&self, state: &mut StoreState, key: &str) {
        let Some(packet) = state.packets.remove(key) else {
            return;
        };
        info!(
            origin = packet.origin(),
            nickname = %packet.nickname,
            serial = %packet.serial,
            last_seen = %packet.last_seen.format("%H:%M:%S"),
            "packet REMOVED"
        );
        self.emit_packet(PacketAction::Deleted, packet);

        let stations: Vec<StationKey> = state
            .gui_clients
            .iter()
            .filter(|((owner, _), _)| owner == key)
            .map(|(k, _)| k.clone())
            .collect();
        for station in &stations {
            if let Some(client) = state.gui_clients.remove(station) {
                debug!(handle = %client.handle, station = %client.station, "guiClient REMOVED with radio");
                self.emit_client(ClientAction::Removed, client);
            }
        }
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Flag a station as completed if it just became complete. Returns
/// whether the `completed` event is due.
fn mark_completion(client: &mut GuiClient) -> bool {
    if client.completed || !client.is_complete() {
        return false;
    }
    client.completed = true;
    true
}

impl StoreState {
    /// Regenerate both picker lists from the current radios and stations.
    fn rebuild_pickables(&mut self) {
        let default = self.default_selection.as_ref();

        let radios: Vec<(Uuid, Pickable)> = self
            .packets
            .values()
            .map(|packet| {
                let is_default = default.is_some_and(|d| d.matches_radio(packet));
                let row = Pickable::new(Arc::clone(packet), packet.gui_client_stations.clone(), is_default);
                (row.id, row)
            })
            .collect();

        let mut stations = Vec::new();
        for (key, packet) in self.packets.iter() {
            for client in self.gui_clients.values().filter(|c| &c.radio_key == key) {
                let is_default = default.is_some_and(|d| d.matches_station(packet, &client.station));
                let row = Pickable::new(Arc::clone(packet), client.station.clone(), is_default);
                stations.push((row.id, row));
            }
        }

        self.pickable_radios.replace_all(radios);
        self.pickable_stations.replace_all(stations);
    }

    fn publish(&mut self) {
        self.packets.publish();
        self.gui_clients.publish();
        self.pickable_radios.publish();
        self.pickable_stations.publish();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn radio(source: PacketSource, serial: &str, ip: &str) -> Packet {
        let mut packet = Packet::new(source);
        packet.serial = serial.into();
        packet.public_ip = ip.into();
        packet.nickname = "Shack".into();
        packet.status = "Available".into();
        packet
    }

    fn with_stations(mut packet: Packet, handles: &str, stations: &str) -> Packet {
        let count = handles.split(',').count();
        packet.gui_client_handles = handles.into();
        packet.gui_client_stations = stations.into();
        packet.gui_client_programs = vec!["SmartSDR-Win"; count].join(",");
        packet.gui_client_ips = vec!["10.0.0.9"; count].join(",");
        packet
    }

    fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn add_update_refresh() {
        let store = DataStore::new();
        let mut events = store.packet_events();

        assert_eq!(store.apply(radio(PacketSource::Lan, "1", "10.0.0.5")), ApplyOutcome::Added);
        assert_eq!(store.apply(radio(PacketSource::Lan, "1", "10.0.0.5")), ApplyOutcome::Refreshed);

        let mut changed = radio(PacketSource::Lan, "1", "10.0.0.5");
        changed.status = "In_Use".into();
        assert_eq!(store.apply(changed), ApplyOutcome::Updated);

        let actions: Vec<PacketAction> = drain(&mut events).iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![PacketAction::Added, PacketAction::Updated]);
        assert_eq!(store.packet_count(), 1);
        assert_eq!(store.packets_snapshot()[0].status, "In_Use");
    }

    #[test]
    fn refresh_moves_last_seen_only() {
        let store = DataStore::new();
        let first = radio(PacketSource::Lan, "1", "10.0.0.5");
        let seen = first.last_seen;
        store.apply(first);

        let mut again = radio(PacketSource::Lan, "1", "10.0.0.5");
        again.last_seen = seen + TimeDelta::seconds(5);
        again.version = "4.0".into();
        store.apply(again);

        let stored = store.packet_by_key("110.0.0.5").unwrap();
        assert_eq!(stored.last_seen, seen + TimeDelta::seconds(5));
        assert_eq!(stored.version, "");
    }

    #[test]
    fn same_serial_different_ip_is_two_radios() {
        let store = DataStore::new();
        store.apply(radio(PacketSource::Lan, "1", "10.0.0.5"));
        store.apply(radio(PacketSource::Wan, "1", "203.0.113.9"));
        assert_eq!(store.packet_count(), 2);
    }

    #[test]
    fn new_radio_emits_packet_before_stations() {
        let store = DataStore::new();
        let mut packets = store.packet_events();
        let mut clients = store.client_events();

        store.apply(with_stations(radio(PacketSource::Lan, "1", "10.0.0.5"), "0x1,0x2", "Shack,Phone"));

        let added = drain(&mut packets);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].action, PacketAction::Added);

        let stations: Vec<(ClientAction, String)> = drain(&mut clients)
            .iter()
            .map(|e| (e.action, e.client.station.clone()))
            .collect();
        assert_eq!(
            stations,
            vec![
                (ClientAction::Added, "Shack".to_owned()),
                (ClientAction::Added, "Phone".to_owned()),
            ]
        );
        assert_eq!(store.gui_client_count(), 2);
    }

    #[test]
    fn station_diff_removes_then_adds() {
        let store = DataStore::new();
        store.apply(with_stations(radio(PacketSource::Lan, "1", "10.0.0.5"), "0xA,0xB", "A,B"));
        assert!(store.update_station("110.0.0.5", Handle(0xB), "client-b"));

        let mut clients = store.client_events();
        store.apply(with_stations(radio(PacketSource::Lan, "1", "10.0.0.5"), "0xB,0xC", "B,C"));

        let events: Vec<(ClientAction, Handle)> = drain(&mut clients)
            .iter()
            .map(|e| (e.action, e.client.handle))
            .collect();
        assert_eq!(
            events,
            vec![(ClientAction::Removed, Handle(0xA)), (ClientAction::Added, Handle(0xC))]
        );

        // B survived the update with its identifier.
        let survivor = store
            .gui_clients_snapshot()
            .iter()
            .find(|c| c.handle == Handle(0xB))
            .cloned()
            .unwrap();
        assert_eq!(survivor.client_id.as_deref(), Some("client-b"));
        assert!(survivor.completed);
    }

    #[test]
    fn completed_is_published_once() {
        let store = DataStore::new();
        store.apply(with_stations(radio(PacketSource::Lan, "1", "10.0.0.5"), "0x1", "Shack"));
        let mut clients = store.client_events();

        assert!(store.update_station("110.0.0.5", Handle(1), "id-1"));
        assert!(store.update_station("110.0.0.5", Handle(1), "id-2"));
        assert!(!store.update_station("110.0.0.5", Handle(9), "id-9"));

        let actions: Vec<ClientAction> = drain(&mut clients).iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![ClientAction::Completed]);
    }

    #[test]
    fn removing_a_radio_removes_its_stations() {
        let store = DataStore::new();
        store.apply(with_stations(radio(PacketSource::Lan, "1", "10.0.0.5"), "0x1,0x2", "A,B"));
        store.apply(with_stations(radio(PacketSource::Lan, "2", "10.0.0.6"), "0x1", "C"));
        let mut packets = store.packet_events();
        let mut clients = store.client_events();

        assert_eq!(store.remove_where(|p| p.serial == "1"), 1);

        assert_eq!(drain(&mut packets)[0].action, PacketAction::Deleted);
        let removed: Vec<String> = drain(&mut clients)
            .iter()
            .inspect(|e| assert_eq!(e.action, ClientAction::Removed))
            .map(|e| e.client.station.clone())
            .collect();
        assert_eq!(removed, vec!["A".to_owned(), "B".to_owned()]);
        assert_eq!(store.gui_client_count(), 1);
        assert_eq!(store.pickable_stations_snapshot().len(), 1);
    }

    #[test]
    fn stale_sweep_spares_other_source() {
        let store = DataStore::new();
        let now = Utc::now();

        let mut old_lan = radio(PacketSource::Lan, "1", "10.0.0.5");
        old_lan.last_seen = now - TimeDelta::seconds(30);
        let mut old_wan = radio(PacketSource::Wan, "2", "203.0.113.9");
        old_wan.last_seen = now - TimeDelta::seconds(30);
        let mut fresh_lan = radio(PacketSource::Lan, "3", "10.0.0.7");
        fresh_lan.last_seen = now - TimeDelta::seconds(2);
        store.apply(old_lan);
        store.apply(old_wan);
        store.apply(fresh_lan);

        assert_eq!(store.remove_stale(PacketSource::Lan, Duration::from_secs(10), now), 1);
        let serials: Vec<String> = store.packets_snapshot().iter().map(|p| p.serial.clone()).collect();
        assert_eq!(serials, vec!["2".to_owned(), "3".to_owned()]);
    }

    #[test]
    fn prune_keeps_listed_keys() {
        let store = DataStore::new();
        store.apply(radio(PacketSource::Wan, "1", "203.0.113.9"));
        store.apply(radio(PacketSource::Wan, "2", "203.0.113.9"));
        store.apply(radio(PacketSource::Lan, "3", "10.0.0.7"));

        let keep: HashSet<String> = ["1203.0.113.9".to_owned()].into();
        assert_eq!(store.prune_source(PacketSource::Wan, &keep), 1);
        assert_eq!(store.packet_count(), 2);
    }

    #[test]
    fn pickables_follow_default_selection() {
        let store = DataStore::new();
        store.apply(with_stations(radio(PacketSource::Lan, "1", "10.0.0.5"), "0x1,0x2", "Shack,Phone"));
        store.apply(radio(PacketSource::Lan, "2", "10.0.0.6"));

        let radios = store.pickable_radios_snapshot();
        assert_eq!(radios.len(), 2);
        assert_eq!(radios[0].station, "Shack,Phone");
        assert!(radios.iter().all(|r| !r.is_default));

        store.set_default_selection(Some(DefaultSelection {
            serial: "1".into(),
            station: Some("Phone".into()),
        }));

        let radios = store.pickable_radios_snapshot();
        assert!(radios[0].is_default);
        assert!(!radios[1].is_default);

        let stations = store.pickable_stations_snapshot();
        let flagged: Vec<(&str, bool)> = stations.iter().map(|s| (s.station.as_str(), s.is_default)).collect();
        assert_eq!(flagged, vec![("Shack", false), ("Phone", true)]);
    }

    #[test]
    fn session_updates_touch_wan_records_silently() {
        let store = DataStore::new();
        store.apply(radio(PacketSource::Lan, "1", "10.0.0.5"));
        store.apply(radio(PacketSource::Wan, "1", "203.0.113.9"));
        let mut events = store.packet_events();

        let touched = store.update_session("1", |p| p.wan_handle = Some("0x1234".into()));
        assert_eq!(touched, 1);
        assert!(drain(&mut events).is_empty());

        assert_eq!(store.packet_by_key("110.0.0.5").unwrap().wan_handle, None);
        assert_eq!(
            store.packet_by_key("1203.0.113.9").unwrap().wan_handle.as_deref(),
            Some("0x1234")
        );

        // A later relay update keeps the negotiated handle.
        let mut moved = radio(PacketSource::Wan, "1", "203.0.113.9");
        moved.status = "In_Use".into();
        store.apply(moved);
        assert_eq!(
            store.packet_by_key("1203.0.113.9").unwrap().wan_handle.as_deref(),
            Some("0x1234")
        );
    }

    #[tokio::test]
    async fn subscribers_wake_on_apply() {
        let store = DataStore::new();
        let mut radios = store.subscribe_pickable_radios();
        assert!(radios.current().is_empty());

        store.apply(radio(PacketSource::Lan, "1", "10.0.0.5"));
        let snap = radios.changed().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].packet.serial, "1");
    }

    #[test]
    fn lagging_subscriber_skips_ahead_but_snapshots_are_whole() {
        let store = DataStore::new();
        let mut events = store.packet_events();
        let total = EVENT_CHANNEL_SIZE + 10;

        for n in 0..total {
            store.apply(radio(PacketSource::Lan, &n.to_string(), "10.0.0.5"));
        }

        assert_eq!(
            events.try_recv().unwrap_err(),
            broadcast::error::TryRecvError::Lagged(10)
        );
        let next = events.try_recv().unwrap();
        assert_eq!(next.packet.serial, "10");
        assert_eq!(store.packets_snapshot().len(), total);
    }
}
