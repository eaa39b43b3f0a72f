// Socket setup shared by both listeners.
//
// The LAN side needs a broadcast-capable IPv4 UDP socket with port reuse
// so several applications on one host can hear the same radios. The WAN
// side needs a TCP connection (IPv4 preferred) upgraded to TLS with the
// relay hostname pinned as the expected certificate identity.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpStream, UdpSocket};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::error::Error;

/// Well-known FlexRadio discovery port.
pub const DISCOVERY_PORT: u16 = 4992;

/// Default SmartLink relay endpoint.
pub const RELAY_HOST: &str = "smartlink.flexradio.com";
pub const RELAY_PORT: u16 = 443;

// ── UDP ──────────────────────────────────────────────────────────────

/// Bind the discovery socket on `0.0.0.0:port`.
///
/// Must be called from within a Tokio runtime.
pub fn bind_discovery_socket(port: u16) -> Result<UdpSocket, Error> {
    let bind_err = |source| Error::Bind { port, source };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true).map_err(bind_err)?;
    socket.set_broadcast(true).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;

    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into()).map_err(bind_err)?;

    let socket = UdpSocket::from_std(socket.into()).map_err(bind_err)?;
    debug!(port, "discovery socket bound");
    Ok(socket)
}

// ── TCP ──────────────────────────────────────────────────────────────

/// Resolve `host` and connect, preferring an IPv4 address.
pub async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, Error> {
    let connect_err = |source| Error::Connect {
        host: host.to_owned(),
        port,
        source,
    };

    let attempt = async {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(connect_err)?
            .collect();
        let addr = addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                connect_err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "host resolved to no addresses",
                ))
            })?;
        debug!(%addr, "connecting to relay");
        TcpStream::connect(addr).await.map_err(connect_err)
    };

    let stream = tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| Error::timeout(timeout))??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

// ── TLS ──────────────────────────────────────────────────────────────

/// Client TLS configuration trusting the Mozilla root set.
pub fn tls_connector() -> Result<TlsConnector, Error> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Run the TLS handshake over `stream`, verifying the peer as `host`.
pub async fn upgrade_tls<S>(stream: S, host: &str) -> Result<TlsStream<S>, Error>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let server_name =
        ServerName::try_from(host.to_owned()).map_err(|_| Error::InvalidServerName(host.to_owned()))?;
    let connector = tls_connector()?;
    let stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| Error::Tls(e.to_string()))?;
    debug!(host, "TLS session established");
    Ok(stream)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn two_listeners_share_a_port() {
        let first = bind_discovery_socket(0).unwrap();
        let port = first.local_addr().unwrap().port();

        // Reuse-port lets a second process-local listener bind alongside.
        #[cfg(unix)]
        {
            let second = bind_discovery_socket(port).unwrap();
            assert_eq!(second.local_addr().unwrap().port(), port);
        }
    }

    #[tokio::test]
    async fn connect_refused_is_a_connect_error() {
        // Grab a free port and close it again so nothing is listening.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let err = connect_tcp("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connect { port: p, .. } if p == port));
    }

    #[tokio::test]
    async fn connect_reaches_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let stream = connect_tcp("127.0.0.1", port, Duration::from_secs(2)).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn tls_rejects_invalid_server_name() {
        let (client, _server) = tokio::io::duplex(64);
        let err = upgrade_tls(client, "not a hostname").await.unwrap_err();
        assert!(matches!(err, Error::InvalidServerName(_)));
    }

    #[tokio::test]
    async fn tls_handshake_failure_is_tls_error() {
        let (client, server) = tokio::io::duplex(4096);
        drop(server);
        let err = upgrade_tls(client, RELAY_HOST).await.unwrap_err();
        assert!(matches!(err, Error::Tls(_)));
    }
}
