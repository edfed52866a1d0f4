//! Web-layer error types.
//!
//! [`WebError`] covers broker startup and the HTTP client.  Store outcomes
//! reaching an HTTP handler are rendered by [`crate::api::ApiError`] instead.

use nexa_vault::VaultError;

/// Unified error type for the broker server and client.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    // -- Startup ------------------------------------------------------------
    /// Another process already holds the broker port.
    #[error("port already in use: {addr} (is another session broker running?)")]
    PortInUse { addr: String },

    /// The configured bind address is reachable from other hosts.
    #[error("refusing to bind non-loopback address: {addr}")]
    NonLoopbackBind { addr: String },

    // -- Client -------------------------------------------------------------
    /// The broker answered with a status the client does not expect.
    #[error("broker returned {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    /// The broker did not become healthy in time.
    #[error("broker not ready after {attempts} attempts")]
    NotReady { attempts: u32 },

    // -- Underlying errors --------------------------------------------------
    /// Store setup failed.
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    /// Socket or server I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error from `reqwest`.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenience alias used throughout the web crate.
pub type Result<T> = std::result::Result<T, WebError>;
