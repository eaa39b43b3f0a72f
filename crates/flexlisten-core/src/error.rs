// ── Core error types ──
//
// User-facing errors from flexlisten-core. Consumers never see socket or
// codec failures directly: the `From<flexlisten_api::Error>` impl
// translates transport-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Listener startup ─────────────────────────────────────────────
    #[error("Cannot bind discovery port {port}: {reason}")]
    BindFailed { port: u16, reason: String },

    #[error("Cannot connect to relay at {host}: {reason}")]
    ConnectionFailed { host: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Relay operation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("WAN start was cancelled")]
    WanStartCancelled,

    // ── Relay session ────────────────────────────────────────────────
    #[error("Relay connection lost")]
    WanDisconnected,

    #[error("WAN listener is not active")]
    WanNotActive,

    #[error("A connect request for radio {serial} is already pending")]
    ConnectPending { serial: String },

    #[error("Relay refused connection to radio {serial}: {reason}")]
    ConnectRejected { serial: String, reason: String },

    #[error("Relay rejected the registration token")]
    RegistrationInvalid,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Unknown discovery key: {key}={value}")]
    UnknownDiscoveryKey { key: String, value: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<flexlisten_api::Error> for CoreError {
    fn from(err: flexlisten_api::Error) -> Self {
        match err {
            flexlisten_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            flexlisten_api::Error::Bind { port, source } => CoreError::BindFailed {
                port,
                reason: source.to_string(),
            },
            flexlisten_api::Error::Connect { host, port, source } => CoreError::ConnectionFailed {
                host: format!("{host}:{port}"),
                reason: source.to_string(),
            },
            flexlisten_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                host: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            flexlisten_api::Error::InvalidServerName(name) => CoreError::Config {
                message: format!("Invalid relay host name: {name}"),
            },
            flexlisten_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            flexlisten_api::Error::Closed
            | flexlisten_api::Error::LineTooLong
            | flexlisten_api::Error::Io(_) => CoreError::WanDisconnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_map_to_domain() {
        let err: CoreError = flexlisten_api::Error::Connect {
            host: "relay".into(),
            port: 443,
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        }
        .into();
        assert!(matches!(err, CoreError::ConnectionFailed { ref host, .. } if host == "relay:443"));

        let err: CoreError = flexlisten_api::Error::Closed.into();
        assert!(matches!(err, CoreError::WanDisconnected));

        let err: CoreError = flexlisten_api::Error::Authentication {
            message: "expired".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Authentication failed: expired");
    }
}
