#![allow(clippy::unwrap_used)]
// Integration tests for the `Listener` facade over loopback sockets.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flexlisten_api::{Authenticator, IdToken, PassthroughDecoder, StaticToken};
use flexlisten_core::{
    ClientAction, ConnectionMode, CoreError, Handle, LanConfig, Listener, ListenerConfig,
    PacketAction, ParseMode, WanConfig, WanCredentials, WanState,
};
use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};
use tokio::net::{TcpListener, UdpSocket};

// ── Helpers ─────────────────────────────────────────────────────────

const PAYLOAD: &str = "serial=1234 ip=10.0.0.5 status=Available gui_client_handles=0x1 \
    gui_client_programs=SmartSDR gui_client_stations=Main gui_client_ips=10.0.0.9";

/// Refuses every login, remembering what it was asked.
#[derive(Default)]
struct RefusingAuth {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl Authenticator for RefusingAuth {
    async fn authenticate(&self, email: &str, force_login: bool) -> Result<IdToken, flexlisten_api::Error> {
        self.calls.lock().unwrap().push(format!("interactive {email} force={force_login}"));
        Err(flexlisten_api::Error::Authentication {
            message: "login cancelled".into(),
        })
    }

    async fn request_tokens(&self, user: &str, password: &SecretString) -> Result<IdToken, flexlisten_api::Error> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("password {user}:{}", password.expose_secret()));
        Err(flexlisten_api::Error::Authentication {
            message: "bad password".into(),
        })
    }
}

fn config(wan: WanConfig) -> ListenerConfig {
    ListenerConfig {
        lan: LanConfig {
            port: 0,
            ..LanConfig::default()
        },
        wan,
        parse_mode: ParseMode::Strict,
    }
}

fn lan_listener() -> Listener {
    Listener::new(
        config(WanConfig::default()),
        Arc::new(PassthroughDecoder),
        Arc::new(RefusingAuth::default()),
    )
}

fn interactive() -> WanCredentials {
    WanCredentials::Interactive {
        email: "op@example.com".into(),
        force_login: true,
    }
}

async fn broadcast(listener: &Listener, payload: &str) {
    let port = listener.lan_local_addr().await.unwrap().port();
    let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    sender
        .send_to(payload.as_bytes(), SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
        .await
        .unwrap();
}

// ── LAN ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_repeated_lan_mode_keeps_listener() {
    let listener = lan_listener();

    listener.set_connection_mode(ConnectionMode::lan_only()).await.unwrap();
    let first = listener.lan_local_addr().await.unwrap();
    listener.set_connection_mode(ConnectionMode::lan_only()).await.unwrap();
    let second = listener.lan_local_addr().await.unwrap();

    assert_eq!(first, second);
    assert!(listener.is_lan_running().await);
}

#[tokio::test]
async fn test_lan_broadcast_end_to_end() {
    let listener = lan_listener();
    let mut packets = listener.packet_events();
    let mut clients = listener.client_events();
    listener.set_connection_mode(ConnectionMode::lan_only()).await.unwrap();

    broadcast(&listener, PAYLOAD).await;

    let added = packets.recv().await.unwrap();
    assert_eq!(added.action, PacketAction::Added);
    assert_eq!(added.packet.serial, "1234");
    assert_eq!(added.packet.public_ip, "10.0.0.5");

    let station = clients.recv().await.unwrap();
    assert_eq!(station.action, ClientAction::Added);
    assert_eq!(station.client.handle, Handle(1));
    assert_eq!(station.client.station, "Main");

    let radios = listener
        .pickable_radios()
        .wait_for(|rows| !rows.is_empty())
        .await
        .unwrap();
    assert_eq!(radios.len(), 1);
    assert_eq!(radios[0].station, "Main");
    assert_eq!(listener.pickable_stations_snapshot().len(), 1);

    // The client id arrives later, completing the station.
    let key = added.packet.key();
    assert!(listener.update_station(&key, Handle(1), "client-1"));
    let completed = clients.recv().await.unwrap();
    assert_eq!(completed.action, ClientAction::Completed);

    let found = listener.find_packet(|p| p.status == "Available").unwrap();
    assert_eq!(found.serial, "1234");
}

#[tokio::test]
async fn test_disabling_lan_clears_lan_records() {
    let listener = lan_listener();
    let mut packets = listener.packet_events();
    listener.set_connection_mode(ConnectionMode::lan_only()).await.unwrap();

    broadcast(&listener, PAYLOAD).await;
    packets.recv().await.unwrap();

    listener.set_connection_mode(ConnectionMode::default()).await.unwrap();

    let deleted = packets.recv().await.unwrap();
    assert_eq!(deleted.action, PacketAction::Deleted);
    assert!(listener.packets_snapshot().is_empty());
    assert!(listener.gui_clients_snapshot().is_empty());
    assert!(!listener.is_lan_running().await);
    assert_eq!(listener.lan_local_addr().await, None);
}

#[tokio::test]
async fn test_shutdown_keeps_records() {
    let listener = lan_listener();
    let mut packets = listener.packet_events();
    listener.set_connection_mode(ConnectionMode::lan_only()).await.unwrap();

    broadcast(&listener, PAYLOAD).await;
    packets.recv().await.unwrap();

    listener.shutdown().await;
    assert!(!listener.is_lan_running().await);
    assert_eq!(listener.packets_snapshot().len(), 1);
}

// ── WAN start failures ──────────────────────────────────────────────

#[tokio::test]
async fn test_authentication_failure_is_reported() {
    let auth = Arc::new(RefusingAuth::default());
    let listener = Listener::new(
        config(WanConfig::default()),
        Arc::new(PassthroughDecoder),
        Arc::clone(&auth) as Arc<dyn Authenticator>,
    );

    let err = listener
        .set_connection_mode(ConnectionMode::wan_only(interactive()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AuthenticationFailed { ref message } if message == "login cancelled"));

    let err = listener
        .start_wan("op", SecretString::from("hunter2".to_owned()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AuthenticationFailed { .. }));

    assert_eq!(
        *auth.calls.lock().unwrap(),
        vec![
            "interactive op@example.com force=true".to_owned(),
            "password op:hunter2".to_owned(),
        ]
    );
    assert!(!listener.is_wan_running().await);
    assert_eq!(*listener.wan_state().borrow(), WanState::Idle);
}

#[tokio::test]
async fn test_lan_failure_still_attempts_wan() {
    let auth = Arc::new(RefusingAuth::default());
    let mut config = config(WanConfig::default());
    config.lan.check_interval = Duration::ZERO;
    let listener = Listener::new(
        config,
        Arc::new(PassthroughDecoder),
        Arc::clone(&auth) as Arc<dyn Authenticator>,
    );

    let err = listener
        .set_connection_mode(ConnectionMode::both(interactive()))
        .await
        .unwrap_err();

    // The LAN error comes first; the WAN login was still tried.
    assert!(matches!(err, CoreError::Config { .. }));
    assert_eq!(
        *auth.calls.lock().unwrap(),
        vec!["interactive op@example.com force=true".to_owned()]
    );
    assert!(!listener.is_lan_running().await);
    assert!(!listener.is_wan_running().await);
}

#[tokio::test]
async fn test_wan_requires_credentials() {
    let listener = lan_listener();
    let err = listener
        .set_connection_mode(ConnectionMode {
            lan: false,
            wan: true,
            credentials: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Config { .. }));
}

#[tokio::test]
async fn test_connect_refused_is_reported() {
    // Grab a free port, then close it so the connect is refused.
    let port = {
        let probe = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        probe.local_addr().unwrap().port()
    };
    let wan = WanConfig {
        host: "127.0.0.1".into(),
        port,
        connect_timeout: Duration::from_secs(2),
        ..WanConfig::default()
    };
    let listener = Listener::new(
        config(wan),
        Arc::new(PassthroughDecoder),
        Arc::new(StaticToken::new(IdToken::new("tok"))),
    );

    let err = listener
        .set_connection_mode(ConnectionMode::wan_only(interactive()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ConnectionFailed { ref host, .. } if *host == format!("127.0.0.1:{port}")));
    assert!(!listener.is_wan_running().await);
}

#[tokio::test]
async fn test_tls_failure_is_a_start_failure() {
    // A peer that accepts and hangs up before the handshake.
    let relay = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = relay.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (socket, _) = relay.accept().await.unwrap();
        drop(socket);
    });

    let wan = WanConfig {
        host: "127.0.0.1".into(),
        port,
        ..WanConfig::default()
    };
    let listener = Listener::new(
        config(wan),
        Arc::new(PassthroughDecoder),
        Arc::new(StaticToken::new(IdToken::new("tok"))),
    );

    let err = listener
        .set_connection_mode(ConnectionMode::wan_only(interactive()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ConnectionFailed { ref host, .. } if host == "127.0.0.1"));
    assert_eq!(*listener.wan_state().borrow(), WanState::Idle);
}

// ── Commands without a relay session ────────────────────────────────

#[tokio::test]
async fn test_commands_without_wan() {
    let listener = lan_listener();

    listener.test_connection("1234").await.unwrap();
    listener.disconnect("1234").await.unwrap();
    listener.disconnect_client("1234", Handle(1)).await.unwrap();
    assert!(matches!(
        listener.connect("1234", 4993).await,
        Err(CoreError::WanNotActive)
    ));
    assert_eq!(listener.public_ip(), None);
    assert_eq!(listener.user_settings(), None);
}
