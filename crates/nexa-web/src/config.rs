//! Broker configuration.
//!
//! Values are layered, later sources winning:
//!
//! 1. Built-in defaults (`127.0.0.1:8765`, 30 minute TTL).
//! 2. The `[session]` table of `config/default.toml`.
//! 3. `NEXA_SESSION_BIND`, `NEXA_SESSION_PORT` and `NEXA_SESSION_TTL`.
//!
//! Command-line flags are applied on top by the binary.  A value that does
//! not parse is skipped with a warning rather than aborting startup.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use nexa_vault::DEFAULT_TTL;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8765;

/// Default bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default location of the TOML config file, relative to the working
/// directory.
pub const CONFIG_PATH: &str = "config/default.toml";

/// Settings for one broker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Address to bind.  Must be a loopback address.
    pub bind_addr: String,
    /// Port to listen on.
    pub port: u16,
    /// Lifetime of a stored token.
    pub ttl: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.into(),
            port: DEFAULT_PORT,
            ttl: DEFAULT_TTL,
        }
    }
}

impl BrokerConfig {
    /// Load defaults, then `config/default.toml`, then the environment.
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_file(Path::new(CONFIG_PATH));
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Return the `host:port` string this broker binds to.
    pub fn addr(&self) -> String {
        match self.bind_addr.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{ip}]:{}", self.port),
            _ => format!("{}:{}", self.bind_addr, self.port),
        }
    }

    /// Whether `bind_addr` names the local host only.
    pub fn is_loopback(&self) -> bool {
        if self.bind_addr.eq_ignore_ascii_case("localhost") {
            return true;
        }
        self.bind_addr
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
    }

    /// Merge the `[session]` table from the TOML file at `path`.  A missing
    /// or unreadable file leaves the config unchanged.
    pub fn apply_file(&mut self, path: &Path) {
        let Ok(content) = std::fs::read_to_string(path) else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return;
        };
        self.apply_toml(&content);
    }

    /// Merge the `[session]` table from TOML text.
    pub fn apply_toml(&mut self, content: &str) {
        let table: toml::Table = match content.parse() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed config file");
                return;
            }
        };

        let Some(toml::Value::Table(session)) = table.get("session") else {
            return;
        };

        if let Some(bind) = session.get("bind_addr").and_then(|v| v.as_str()) {
            self.bind_addr = bind.to_owned();
        }
        if let Some(port) = session.get("port").and_then(|v| v.as_integer()) {
            match u16::try_from(port) {
                Ok(p) => self.port = p,
                Err(_) => tracing::warn!(port, "ignoring out-of-range port in config"),
            }
        }
        if let Some(ttl) = session.get("ttl_secs").and_then(|v| v.as_integer()) {
            match u64::try_from(ttl) {
                Ok(secs) => self.ttl = ttl_from_secs(secs),
                Err(_) => tracing::warn!(ttl, "ignoring negative ttl_secs in config"),
            }
        }
    }

    /// Merge environment overrides, reading variables through `get`.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = get("NEXA_SESSION_BIND") {
            self.bind_addr = bind;
        }
        if let Some(port) = get("NEXA_SESSION_PORT") {
            match port.trim().parse() {
                Ok(p) => self.port = p,
                Err(_) => tracing::warn!(value = %port, "ignoring invalid NEXA_SESSION_PORT"),
            }
        }
        if let Some(ttl) = get("NEXA_SESSION_TTL") {
            match ttl.trim().parse() {
                Ok(secs) => self.ttl = ttl_from_secs(secs),
                Err(_) => tracing::warn!(value = %ttl, "ignoring invalid NEXA_SESSION_TTL"),
            }
        }
    }
}

/// Zero is clamped to one second.
pub fn ttl_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}
