// ── LAN discovery listener ──
//
// Receives radio broadcasts on the discovery port and feeds them to the
// store. A second task sweeps LAN records that have gone quiet. Both
// tasks stop when the listener is stopped or dropped; stored records are
// left for the owner to clear.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use flexlisten_api::FrameDecoder;
use flexlisten_api::transport::bind_discovery_socket;
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{LanConfig, ParseMode};
use crate::error::CoreError;
use crate::model::{Packet, PacketSource};
use crate::store::DataStore;

/// Largest datagram we accept.
const MAX_DATAGRAM: usize = 65_535;

/// A running LAN listener. Dropping it stops both background tasks.
pub struct LanListener {
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

impl LanListener {
    /// Bind the discovery socket and spawn the receive and sweep tasks.
    ///
    /// Must be called from within a Tokio runtime. Bind failures are
    /// returned immediately; nothing is spawned in that case.
    pub fn start(
        config: &LanConfig,
        parse_mode: ParseMode,
        store: Arc<DataStore>,
        decoder: Arc<dyn FrameDecoder>,
    ) -> Result<Self, CoreError> {
        if config.check_interval.is_zero() {
            return Err(CoreError::Config {
                message: "LAN check interval must be non-zero".into(),
            });
        }

        let socket = bind_discovery_socket(config.port)?;
        let local_addr = socket.local_addr().map_err(|e| CoreError::BindFailed {
            port: config.port,
            reason: e.to_string(),
        })?;

        let cancel = CancellationToken::new();
        tokio::spawn(receive_task(
            socket,
            parse_mode,
            Arc::clone(&store),
            decoder,
            cancel.clone(),
        ));
        tokio::spawn(sweep_task(
            store,
            config.check_interval,
            config.timeout,
            cancel.clone(),
        ));

        info!(%local_addr, "Lan listener STARTED");
        Ok(Self { local_addr, cancel })
    }

    /// Address the discovery socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop receiving and sweeping. Safe to call more than once.
    pub fn stop(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        info!(local_addr = %self.local_addr, "Lan listener STOPPED");
    }
}

impl Drop for LanListener {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn receive_task(
    socket: UdpSocket,
    parse_mode: ParseMode,
    store: Arc<DataStore>,
    decoder: Arc<dyn FrameDecoder>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0_u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, from)) => {
                    handle_datagram(&buf[..len], from, parse_mode, &store, decoder.as_ref());
                }
                Err(e) => warn!(error = %e, "discovery receive failed"),
            },
        }
    }

    // The socket closes when this task returns.
    debug!("discovery receive task exited");
}

fn handle_datagram(
    datagram: &[u8],
    from: SocketAddr,
    parse_mode: ParseMode,
    store: &DataStore,
    decoder: &dyn FrameDecoder,
) {
    let Some(frame) = decoder.decode(datagram) else {
        trace!(%from, len = datagram.len(), "undecodable datagram");
        return;
    };
    let Some(text) = frame.discovery_text() else {
        trace!(%from, class = ?frame.class, "ignoring non-discovery frame");
        return;
    };

    match Packet::parse(text, PacketSource::Lan, parse_mode) {
        Ok(packet) => {
            store.apply(packet);
        }
        Err(e) => debug!(%from, error = %e, "discovery payload dropped"),
    }
}

/// Remove LAN radios not heard from within `timeout`.
async fn sweep_task(
    store: Arc<DataStore>,
    check_interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(check_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let removed = store.remove_stale(PacketSource::Lan, timeout, Utc::now());
                if removed > 0 {
                    debug!(removed, "stale LAN radios swept");
                }
            }
        }
    }
}
