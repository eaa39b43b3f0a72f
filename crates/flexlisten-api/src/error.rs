use thiserror::Error;

/// Top-level error type for the `flexlisten-api` crate.
///
/// Covers every failure mode of the wire layer: identity provider,
/// UDP bind, TCP connect, TLS, and the relay line stream.
/// `flexlisten-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The identity provider refused to issue a token.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// The discovery socket could not be created or bound.
    #[error("Cannot bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// TCP connection to the relay failed (DNS, refused, unreachable).
    #[error("Cannot connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The relay host is not a valid TLS server name.
    #[error("Invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// Connect, write, or read-idle deadline elapsed.
    #[error("Operation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Relay stream ────────────────────────────────────────────────
    /// The relay closed the connection.
    #[error("Relay connection closed")]
    Closed,

    /// An inbound line exceeded the codec's maximum length.
    #[error("Relay line exceeds maximum length")]
    LineTooLong,

    /// Any other socket-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if the error means the relay session is gone and
    /// the listener must tear down.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Io(_) | Self::Timeout { .. } | Self::Tls(_) | Self::LineTooLong
        )
    }

    pub(crate) fn timeout(after: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_secs: after.as_secs(),
        }
    }
}

impl From<tokio_util::codec::LinesCodecError> for Error {
    fn from(err: tokio_util::codec::LinesCodecError) -> Self {
        match err {
            tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => Self::LineTooLong,
            tokio_util::codec::LinesCodecError::Io(e) => Self::Io(e),
        }
    }
}
