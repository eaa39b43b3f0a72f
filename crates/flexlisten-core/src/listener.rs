// ── Listener facade ──
//
// Owns the store and at most one listener per source. Mode changes stop
// and clear disabled sources, then start newly enabled ones; relay
// commands are forwarded to the WAN listener when one is running.

use std::net::SocketAddr;
use std::sync::{Arc, MutexGuard};

use flexlisten_api::{Authenticator, FrameDecoder, TestResult, UserSettings};
use secrecy::SecretString;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::{ConnectionMode, ListenerConfig, WanCredentials};
use crate::error::CoreError;
use crate::lan::LanListener;
use crate::model::{
    ClientEvent, DefaultSelection, GuiClient, Handle, Packet, PacketEvent, PacketSource, Pickable,
};
use crate::store::{DataStore, EntityStream};
use crate::wan::{RelayFeeds, WanListener, WanState};

/// Entry point for applications.
///
/// Cheaply cloneable via `Arc<ListenerInner>`. Construct once, then call
/// [`set_connection_mode`](Self::set_connection_mode) to start
/// discovering. Radios and stations are read through snapshots, entity
/// streams, or the event channels.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

struct ListenerInner {
    config: ListenerConfig,
    store: Arc<DataStore>,
    decoder: Arc<dyn FrameDecoder>,
    authenticator: Arc<dyn Authenticator>,
    lan: Mutex<Option<LanListener>>,
    wan: Mutex<Option<Arc<WanListener>>>,
    /// Session still logging in or connecting. Kept out of `wan` so the
    /// facade stays usable while it waits.
    wan_starting: std::sync::Mutex<Option<Arc<WanListener>>>,
    feeds: Arc<RelayFeeds>,
}

impl ListenerInner {
    fn lock_starting(&self) -> MutexGuard<'_, Option<Arc<WanListener>>> {
        self.wan_starting.lock().expect("wan start lock poisoned")
    }

    /// Abandon a WAN start that has not finished yet.
    fn cancel_wan_start(&self) {
        let starting = self.lock_starting().take();
        if let Some(listener) = starting {
            debug!("abandoning WAN start");
            listener.stop();
        }
    }
}

impl Listener {
    /// Create a listener with nothing running.
    ///
    /// `decoder` unwraps LAN broadcast frames; `authenticator` issues
    /// SmartLink tokens.
    pub fn new(
        config: ListenerConfig,
        decoder: Arc<dyn FrameDecoder>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                config,
                store: Arc::new(DataStore::new()),
                decoder,
                authenticator,
                lan: Mutex::new(None),
                wan: Mutex::new(None),
                wan_starting: std::sync::Mutex::new(None),
                feeds: Arc::new(RelayFeeds::default()),
            }),
        }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.inner.config
    }

    /// Access the underlying DataStore.
    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    // ── Mode changes ─────────────────────────────────────────────────

    /// Start and stop listeners to match `mode`.
    ///
    /// A source that is already running is left alone, so repeating a
    /// mode is a no-op. Records from disabled sources are removed, and
    /// a disabled source is stopped even if enabling the other one fails.
    ///
    /// A LAN start failure does not keep WAN from starting; the first
    /// error is returned once both have been attempted. While the WAN
    /// session logs in and connects the rest of the facade stays usable,
    /// and [`shutdown`](Self::shutdown) or a mode without WAN abandons
    /// the start with `WanStartCancelled`. Asking for WAN while a start
    /// is already underway returns immediately.
    pub async fn set_connection_mode(&self, mode: ConnectionMode) -> Result<(), CoreError> {
        let ConnectionMode {
            lan: want_lan,
            wan: want_wan,
            credentials,
        } = mode;
        let inner = &self.inner;
        debug!(lan = want_lan, wan = want_wan, "connection mode requested");

        let mut lan_error = None;
        let needs_wan_start = {
            let mut lan = inner.lan.lock().await;
            let mut wan = inner.wan.lock().await;

            if !want_lan {
                if let Some(listener) = lan.take() {
                    listener.stop();
                    inner.store.remove_where(|p| p.source == PacketSource::Lan);
                }
            }
            if !want_wan {
                inner.cancel_wan_start();
                if let Some(listener) = wan.take() {
                    listener.stop();
                    inner.store.remove_where(|p| p.source == PacketSource::Wan);
                }
            }

            if want_lan && lan.is_none() {
                match LanListener::start(
                    &inner.config.lan,
                    inner.config.parse_mode,
                    Arc::clone(&inner.store),
                    Arc::clone(&inner.decoder),
                ) {
                    Ok(listener) => *lan = Some(listener),
                    Err(e) => {
                        warn!(error = %e, "Lan listener failed to start");
                        lan_error = Some(e);
                    }
                }
            }

            if want_wan && !wan.as_ref().is_some_and(|listener| listener.is_running()) {
                if wan.take().is_some() {
                    // The last session dropped; its radios are stale.
                    inner.store.remove_where(|p| p.source == PacketSource::Wan);
                }
                true
            } else {
                false
            }
        };

        if needs_wan_start {
            if let Err(e) = self.start_wan_listener(credentials.as_ref()).await {
                return Err(lan_error.unwrap_or(e));
            }
        }
        if let Some(e) = lan_error {
            return Err(e);
        }
        Ok(())
    }

    /// Enable WAN discovery with a user/password token exchange, keeping
    /// LAN discovery as it is.
    pub async fn start_wan(&self, user: &str, password: SecretString) -> Result<(), CoreError> {
        let lan = self.inner.lan.lock().await.is_some();
        self.set_connection_mode(ConnectionMode {
            lan,
            wan: true,
            credentials: Some(WanCredentials::Password {
                user: user.to_owned(),
                password,
            }),
        })
        .await
    }

    /// Stop both listeners. Stored records are kept.
    pub async fn shutdown(&self) {
        self.inner.cancel_wan_start();
        if let Some(listener) = self.inner.lan.lock().await.take() {
            listener.stop();
        }
        if let Some(listener) = self.inner.wan.lock().await.take() {
            listener.stop();
        }
        info!("listener shut down");
    }

    /// Run a WAN start without holding the `lan` or `wan` locks, then
    /// install the session unless it was abandoned on the way.
    async fn start_wan_listener(&self, credentials: Option<&WanCredentials>) -> Result<(), CoreError> {
        let inner = &self.inner;
        let (listener, credentials) = {
            let mut starting = inner.lock_starting();
            if starting.is_some() {
                debug!("WAN start already in progress");
                return Ok(());
            }
            let credentials = credentials.ok_or_else(|| CoreError::Config {
                message: "SmartLink credentials are required to enable WAN discovery".into(),
            })?;
            let listener = Arc::new(WanListener::with_feeds(
                inner.config.wan.clone(),
                inner.config.parse_mode,
                Arc::clone(&inner.store),
                Arc::clone(&inner.feeds),
            ));
            *starting = Some(Arc::clone(&listener));
            (listener, credentials)
        };

        let result = listener.start(inner.authenticator.as_ref(), credentials).await;

        let mut wan = inner.wan.lock().await;
        let current = inner
            .lock_starting()
            .take_if(|starting| Arc::ptr_eq(starting, &listener))
            .is_some();
        result?;
        if !current {
            listener.stop();
            return Err(CoreError::WanStartCancelled);
        }
        *wan = Some(listener);
        Ok(())
    }

    /// The WAN listener, if one is running.
    async fn active_wan(&self) -> Option<Arc<WanListener>> {
        self.inner
            .wan
            .lock()
            .await
            .as_ref()
            .filter(|listener| listener.is_running())
            .map(Arc::clone)
    }

    pub async fn is_lan_running(&self) -> bool {
        self.inner.lan.lock().await.as_ref().is_some_and(LanListener::is_running)
    }

    pub async fn is_wan_running(&self) -> bool {
        self.active_wan().await.is_some()
    }

    /// Address the LAN discovery socket is bound to, if LAN is running.
    pub async fn lan_local_addr(&self) -> Option<SocketAddr> {
        self.inner.lan.lock().await.as_ref().map(LanListener::local_addr)
    }

    // ── Relay commands ───────────────────────────────────────────────
    //
    // Without a running WAN listener these are no-ops, except `connect`,
    // which has nothing to resolve and fails.

    pub async fn test_connection(&self, serial: &str) -> Result<(), CoreError> {
        match self.active_wan().await {
            Some(wan) => wan.test_connection(serial).await,
            None => Ok(()),
        }
    }

    /// Broker a SmartLink session to `serial`, returning the WAN handle.
    pub async fn connect(&self, serial: &str, hole_punch_port: u16) -> Result<String, CoreError> {
        let wan = self.active_wan().await.ok_or(CoreError::WanNotActive)?;
        wan.connect(serial, hole_punch_port).await
    }

    pub async fn disconnect(&self, serial: &str) -> Result<(), CoreError> {
        match self.active_wan().await {
            Some(wan) => wan.disconnect(serial).await,
            None => Ok(()),
        }
    }

    pub async fn disconnect_client(&self, serial: &str, handle: Handle) -> Result<(), CoreError> {
        match self.active_wan().await {
            Some(wan) => wan.disconnect_client(serial, handle).await,
            None => Ok(()),
        }
    }

    // ── Store pass-throughs ──────────────────────────────────────────

    pub fn find_packet(&self, predicate: impl FnMut(&Packet) -> bool) -> Option<Arc<Packet>> {
        self.inner.store.find_packet(predicate)
    }

    /// Record a station's client identifier. See [`DataStore::update_station`].
    pub fn update_station(&self, radio_key: &str, handle: Handle, client_id: &str) -> bool {
        self.inner.store.update_station(radio_key, handle, client_id)
    }

    pub fn set_default_selection(&self, selection: Option<DefaultSelection>) {
        self.inner.store.set_default_selection(selection);
    }

    pub fn packets_snapshot(&self) -> Arc<Vec<Arc<Packet>>> {
        self.inner.store.packets_snapshot()
    }

    pub fn gui_clients_snapshot(&self) -> Arc<Vec<Arc<GuiClient>>> {
        self.inner.store.gui_clients_snapshot()
    }

    pub fn pickable_radios_snapshot(&self) -> Arc<Vec<Arc<Pickable>>> {
        self.inner.store.pickable_radios_snapshot()
    }

    pub fn pickable_stations_snapshot(&self) -> Arc<Vec<Arc<Pickable>>> {
        self.inner.store.pickable_stations_snapshot()
    }

    pub fn packets(&self) -> EntityStream<Packet> {
        self.inner.store.subscribe_packets()
    }

    pub fn gui_clients(&self) -> EntityStream<GuiClient> {
        self.inner.store.subscribe_gui_clients()
    }

    pub fn pickable_radios(&self) -> EntityStream<Pickable> {
        self.inner.store.subscribe_pickable_radios()
    }

    pub fn pickable_stations(&self) -> EntityStream<Pickable> {
        self.inner.store.subscribe_pickable_stations()
    }

    pub fn packet_events(&self) -> broadcast::Receiver<Arc<PacketEvent>> {
        self.inner.store.packet_events()
    }

    pub fn client_events(&self) -> broadcast::Receiver<Arc<ClientEvent>> {
        self.inner.store.client_events()
    }

    // ── Relay feeds ──────────────────────────────────────────────────
    //
    // These survive WAN restarts, so a receiver taken before the first
    // mode change keeps working.

    pub fn wan_state(&self) -> watch::Receiver<WanState> {
        self.inner.feeds.state()
    }

    pub fn test_results(&self) -> broadcast::Receiver<Arc<TestResult>> {
        self.inner.feeds.test_results()
    }

    pub fn user_settings(&self) -> Option<UserSettings> {
        self.inner.feeds.user_settings()
    }

    pub fn public_ip(&self) -> Option<String> {
        self.inner.feeds.public_ip()
    }
}
