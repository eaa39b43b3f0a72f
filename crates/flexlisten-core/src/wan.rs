// ── SmartLink (WAN) discovery listener ──
//
// Authenticates, opens a TLS session to the relay, registers, and then
// runs two tasks over the split stream: a writer that serializes commands
// and keep-alive pings, and a reader that folds relay lines into the
// store. Either task failing tears the whole session down.

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use flexlisten_api::protocol::{RelayCommand, RelayMessage, TestResult, UserSettings};
use flexlisten_api::session::{self, RelayReader, RelayWriter};
use flexlisten_api::transport::{connect_tcp, upgrade_tls};
use flexlisten_api::{Authenticator, IdToken};
use strum::Display;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{ParseMode, WanConfig, WanCredentials};
use crate::error::CoreError;
use crate::model::{Handle, Packet, PacketSource};
use crate::store::DataStore;

const COMMAND_CHANNEL_SIZE: usize = 64;
const TEST_RESULT_CHANNEL_SIZE: usize = 64;

/// Lifecycle of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum WanState {
    Idle,
    Connecting,
    TlsNegotiating,
    Registering,
    Active,
}

// ── Relay feeds ──────────────────────────────────────────────────────

/// Channels that outlive any single relay session, so subscribers keep
/// their receivers across reconnects.
pub(crate) struct RelayFeeds {
    state: watch::Sender<WanState>,
    test_results: broadcast::Sender<Arc<TestResult>>,
    user_settings: watch::Sender<Option<UserSettings>>,
    public_ip: watch::Sender<Option<String>>,
}

impl RelayFeeds {
    pub(crate) fn state(&self) -> watch::Receiver<WanState> {
        self.state.subscribe()
    }

    pub(crate) fn test_results(&self) -> broadcast::Receiver<Arc<TestResult>> {
        self.test_results.subscribe()
    }

    pub(crate) fn user_settings(&self) -> Option<UserSettings> {
        self.user_settings.borrow().clone()
    }

    pub(crate) fn public_ip(&self) -> Option<String> {
        self.public_ip.borrow().clone()
    }
}

impl Default for RelayFeeds {
    fn default() -> Self {
        let (state, _) = watch::channel(WanState::Idle);
        let (test_results, _) = broadcast::channel(TEST_RESULT_CHANNEL_SIZE);
        let (user_settings, _) = watch::channel(None);
        let (public_ip, _) = watch::channel(None);
        Self {
            state,
            test_results,
            user_settings,
            public_ip,
        }
    }
}

// ── Listener ─────────────────────────────────────────────────────────

type ConnectWaiter = oneshot::Sender<Result<String, CoreError>>;

/// A command queued for the writer task, with its write acknowledgement.
struct CommandEnvelope {
    command: RelayCommand,
    response_tx: oneshot::Sender<Result<(), CoreError>>,
}

/// One relay session. Not restartable: once stopped (by the owner or by
/// a disconnect) a new listener has to be created.
pub struct WanListener {
    inner: Arc<WanInner>,
}

struct WanInner {
    config: WanConfig,
    parse_mode: ParseMode,
    store: Arc<DataStore>,
    feeds: Arc<RelayFeeds>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: tokio::sync::Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    /// Outstanding `connect` requests, keyed by radio serial.
    pending: Mutex<HashMap<String, ConnectWaiter>>,
    cancel: CancellationToken,
    stopped: AtomicBool,
}

impl WanListener {
    pub fn new(config: WanConfig, parse_mode: ParseMode, store: Arc<DataStore>) -> Self {
        Self::with_feeds(config, parse_mode, store, Arc::new(RelayFeeds::default()))
    }

    pub(crate) fn with_feeds(
        config: WanConfig,
        parse_mode: ParseMode,
        store: Arc<DataStore>,
        feeds: Arc<RelayFeeds>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        Self {
            inner: Arc::new(WanInner {
                config,
                parse_mode,
                store,
                feeds,
                command_tx,
                command_rx: tokio::sync::Mutex::new(Some(command_rx)),
                pending: Mutex::new(HashMap::new()),
                cancel: CancellationToken::new(),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Authenticate, connect, and register with the relay.
    ///
    /// On failure the listener is left stopped and the error is returned;
    /// nothing is retried. Calling [`stop`](Self::stop) from another task
    /// abandons a start that is still waiting on login, connect, or the
    /// handshake, and it returns `WanStartCancelled`.
    pub async fn start(
        &self,
        authenticator: &dyn Authenticator,
        credentials: &WanCredentials,
    ) -> Result<(), CoreError> {
        let result = tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => Err(CoreError::WanStartCancelled),
            result = self.open_session(authenticator, credentials) => result,
        };
        if let Err(e) = &result {
            warn!(error = %e, "Wan listener failed to start");
            self.inner.teardown(disconnected);
        }
        result
    }

    async fn open_session(
        &self,
        authenticator: &dyn Authenticator,
        credentials: &WanCredentials,
    ) -> Result<(), CoreError> {
        let config = &self.inner.config;
        config.validate()?;

        let token = match credentials {
            WanCredentials::Interactive { email, force_login } => {
                authenticator.authenticate(email, *force_login).await?
            }
            WanCredentials::Password { user, password } => {
                authenticator.request_tokens(user, password).await?
            }
        };
        debug!("relay token acquired");

        self.inner.set_state(WanState::Connecting);
        let tcp = connect_tcp(&config.host, config.port, config.connect_timeout).await?;

        self.inner.set_state(WanState::TlsNegotiating);
        let tls = upgrade_tls(tcp, &config.host)
            .await
            .map_err(|e| match e {
                flexlisten_api::Error::Tls(reason) => CoreError::ConnectionFailed {
                    host: config.host.clone(),
                    reason,
                },
                other => other.into(),
            })?;
        debug!(host = %config.host, "relay TLS negotiated");

        self.attach(tls, token).await
    }

    /// Register over an already-secured stream and spawn the session tasks.
    pub(crate) async fn attach<S>(&self, stream: S, token: IdToken) -> Result<(), CoreError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let inner = &self.inner;
        inner.config.validate()?;
        if inner.cancel.is_cancelled() {
            return Err(CoreError::WanDisconnected);
        }
        let Some(commands) = inner.command_rx.lock().await.take() else {
            return Err(CoreError::Internal("WAN listener already started".into()));
        };

        inner.set_state(WanState::Registering);
        let (reader, mut writer) = session::split(stream, inner.config.read_idle_timeout);
        let register = RelayCommand::Register {
            name: inner.config.app_name.clone(),
            platform: inner.config.platform.clone(),
            token,
        };
        writer.send(&register, Some(inner.config.write_timeout)).await?;
        debug!(name = %inner.config.app_name, "registration sent");

        tokio::spawn(writer_task(Arc::clone(inner), writer, commands));
        tokio::spawn(reader_task(Arc::clone(inner), reader));

        inner.set_state(WanState::Active);
        info!(host = %inner.config.host, "Wan listener STARTED");
        Ok(())
    }

    /// Close the session. Pending connects fail with `WanDisconnected`.
    pub fn stop(&self) {
        self.inner.teardown(disconnected);
    }

    pub fn is_running(&self) -> bool {
        !self.inner.stopped.load(Ordering::Acquire) && self.state() == WanState::Active
    }

    pub fn state(&self) -> WanState {
        *self.inner.feeds.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WanState> {
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

    // ── Relay commands ───────────────────────────────────────────────

    /// Ask the relay to broker a session to `serial` and wait for the
    /// WAN handle.
    ///
    /// Connects to different radios may overlap; a second connect to the
    /// same radio while one is outstanding fails with `ConnectPending`.
    pub async fn connect(&self, serial: &str, hole_punch_port: u16) -> Result<String, CoreError> {
        if !self.is_running() {
            return Err(CoreError::WanNotActive);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.lock_pending();
            if self.inner.cancel.is_cancelled() {
                return Err(CoreError::WanDisconnected);
            }
            if pending.get(serial).is_some_and(|waiter| !waiter.is_closed()) {
                return Err(CoreError::ConnectPending {
                    serial: serial.to_owned(),
                });
            }
            pending.insert(serial.to_owned(), tx);
        }

        self.inner.store.update_session(serial, |packet| {
            packet.negotiated_hole_punch_port = Some(hole_punch_port);
        });
        debug!(%serial, hole_punch_port, "requesting relay connect");

        let command = RelayCommand::Connect {
            serial: serial.to_owned(),
            hole_punch_port,
        };
        if let Err(e) = self.send(command).await {
            self.inner.lock_pending().remove(serial);
            return Err(e);
        }

        rx.await.unwrap_or(Err(CoreError::WanDisconnected))
    }

    /// Ask the relay to probe a radio's reachability. The result arrives
    /// on [`test_results`](Self::test_results).
    pub async fn test_connection(&self, serial: &str) -> Result<(), CoreError> {
        self.send(RelayCommand::TestConnection {
            serial: serial.to_owned(),
        })
        .await
    }

    /// Disconnect every station on a radio.
    pub async fn disconnect(&self, serial: &str) -> Result<(), CoreError> {
        self.send(RelayCommand::DisconnectUsers {
            serial: serial.to_owned(),
            handle: None,
        })
        .await
    }

    /// Disconnect one station from a radio.
    pub async fn disconnect_client(&self, serial: &str, handle: Handle) -> Result<(), CoreError> {
        self.send(RelayCommand::DisconnectUsers {
            serial: serial.to_owned(),
            handle: Some(handle.0),
        })
        .await
    }

    /// Queue a command for the writer and wait until it is on the wire.
    async fn send(&self, command: RelayCommand) -> Result<(), CoreError> {
        if !self.is_running() {
            return Err(CoreError::WanNotActive);
        }
        let (response_tx, response_rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx,
            })
            .await
            .map_err(|_| CoreError::WanDisconnected)?;
        response_rx.await.unwrap_or(Err(CoreError::WanDisconnected))
    }
}

impl Drop for WanListener {
    fn drop(&mut self) {
        self.stop();
    }
}

impl WanInner {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, ConnectWaiter>> {
        self.pending.lock().expect("pending connect lock poisoned")
    }

    /// Publish a state change unless this session has already stopped.
    fn set_state(&self, next: WanState) {
        self.feeds.state.send_if_modified(|state| {
            if self.stopped.load(Ordering::Acquire) || *state == next {
                return false;
            }
            debug!(from = %state, to = %next, "wan state");
            *state = next;
            true
        });
    }

    /// Stop both tasks and fail every pending connect with `cause()`.
    /// Only the first call publishes `Idle`.
    fn teardown(&self, cause: fn() -> CoreError) {
        let first = !self.stopped.swap(true, Ordering::AcqRel);
        self.cancel.cancel();

        let pending: Vec<(String, ConnectWaiter)> = self.lock_pending().drain().collect();
        for (serial, waiter) in pending {
            debug!(%serial, "failing pending connect");
            let _ = waiter.send(Err(cause()));
        }

        if first {
            self.feeds.state.send_replace(WanState::Idle);
            info!(host = %self.config.host, "Wan listener STOPPED");
        }
    }

    // ── Inbound dispatch ─────────────────────────────────────────────

    /// Handle one inbound line. `Break` carries the error pending
    /// connects should fail with.
    fn dispatch(&self, message: RelayMessage) -> ControlFlow<fn() -> CoreError> {
        if self.cancel.is_cancelled() {
            return ControlFlow::Break(disconnected);
        }

        match message {
            RelayMessage::RadioList(entries) => self.apply_radio_list(&entries),
            RelayMessage::ConnectReady { serial, handle } => self.resolve_connect(&serial, handle),
            RelayMessage::TestConnection(result) => self.record_test_result(result),
            RelayMessage::UserSettings(settings) => {
                debug!(callsign = %settings.callsign, "relay user settings");
                self.feeds.user_settings.send_replace(Some(settings));
            }
            RelayMessage::Info { public_ip } => {
                debug!(%public_ip, "relay reported public address");
                self.feeds.public_ip.send_replace(Some(public_ip));
            }
            RelayMessage::RegistrationInvalid => {
                warn!("relay rejected the registration token");
                return ControlFlow::Break(registration_invalid);
            }
            RelayMessage::Unknown(line) => trace!(%line, "unhandled relay line"),
        }
        ControlFlow::Continue(())
    }

    /// Upsert every listed radio, then drop WAN radios the relay no
    /// longer lists. A list with unparseable entries is not pruned.
    fn apply_radio_list(&self, entries: &[String]) {
        let mut keep = HashSet::with_capacity(entries.len());
        let mut complete = true;

        for entry in entries {
            match Packet::parse(entry, PacketSource::Wan, self.parse_mode) {
                Ok(packet) => {
                    keep.insert(packet.key());
                    self.store.apply(packet);
                }
                Err(e) => {
                    complete = false;
                    debug!(error = %e, "relay radio entry dropped");
                }
            }
        }

        if complete {
            self.store.prune_source(PacketSource::Wan, &keep);
        }
    }

    fn resolve_connect(&self, serial: &str, handle: Option<String>) {
        let waiter = self.lock_pending().remove(serial);

        let result = match handle {
            Some(handle) => {
                self.store.update_session(serial, |packet| {
                    packet.wan_handle = Some(handle.clone());
                });
                info!(%serial, %handle, "relay connect ready");
                Ok(handle)
            }
            None => {
                warn!(%serial, "relay refused connect");
                Err(CoreError::ConnectRejected {
                    serial: serial.to_owned(),
                    reason: "relay returned no handle".into(),
                })
            }
        };

        match waiter {
            Some(waiter) => {
                let _ = waiter.send(result);
            }
            None => debug!(%serial, "connect_ready with no pending request"),
        }
    }

    fn record_test_result(&self, result: TestResult) {
        let success = result.is_success();
        let requires_hole_punch = !success && result.nat_supports_hole_punch;
        let port_forward = result.forward_tcp_port_working && result.forward_udp_port_working;

        self.store.update_session(&result.serial, |packet| {
            packet.requires_hole_punch = requires_hole_punch;
            packet.is_port_forward_on = port_forward;
        });
        info!(serial = %result.serial, success, "relay test_connection result");
        let _ = self.feeds.test_results.send(Arc::new(result));
    }
}

impl WanConfig {
    fn validate(&self) -> Result<(), CoreError> {
        if self.ping_interval.is_zero() {
            return Err(CoreError::Config {
                message: "WAN ping interval must be non-zero".into(),
            });
        }
        Ok(())
    }
}

// ── Session tasks ────────────────────────────────────────────────────

/// Serialize queued commands and keep-alive pings onto the relay stream.
async fn writer_task<W>(
    inner: Arc<WanInner>,
    mut writer: RelayWriter<W>,
    mut commands: mpsc::Receiver<CommandEnvelope>,
) where
    W: AsyncWrite + Unpin + Send,
{
    let cancel = inner.cancel.clone();
    let write_timeout = inner.config.write_timeout;
    let period = inner.config.ping_interval;
    let mut ping = tokio::time::interval_at(Instant::now() + period, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let (command, response_tx, timeout) = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = commands.recv() => {
                let Some(envelope) = envelope else { break };
                (envelope.command, Some(envelope.response_tx), Some(write_timeout))
            }
            _ = ping.tick() => (RelayCommand::Ping, None, None),
        };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CoreError::WanDisconnected),
            sent = writer.send(&command, timeout) => sent.map_err(CoreError::from),
        };
        let failure = result.as_ref().err().map(ToString::to_string);
        if let Some(response_tx) = response_tx {
            let _ = response_tx.send(result);
        }

        match failure {
            Some(_) if cancel.is_cancelled() => break,
            Some(error) => {
                warn!(command = command.name(), %error, "relay write failed");
                break;
            }
            None => trace!(command = command.name(), "relay command sent"),
        }
    }

    let _ = tokio::time::timeout(write_timeout, writer.shutdown()).await;
    inner.teardown(disconnected);
}

/// Fold relay lines into the store until the stream fails or closes.
async fn reader_task<R>(inner: Arc<WanInner>, mut reader: RelayReader<R>)
where
    R: AsyncRead + Unpin + Send,
{
    let cancel = inner.cancel.clone();

    let cause: fn() -> CoreError = loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break disconnected,
            message = reader.next_message() => message,
        };

        match message {
            Ok(message) => {
                if let ControlFlow::Break(cause) = inner.dispatch(message) {
                    break cause;
                }
            }
            Err(e) => {
                warn!(error = %e, "relay read failed");
                break disconnected;
            }
        }
    };

    inner.teardown(cause);
}

fn disconnected() -> CoreError {
    CoreError::WanDisconnected
}

fn registration_invalid() -> CoreError {
    CoreError::RegistrationInvalid
}
