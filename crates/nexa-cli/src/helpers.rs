//! Shared helper functions used across CLI subcommands.

use std::io::BufRead;

use anyhow::{Context, Result, bail};
use nexa_web::BrokerConfig;
use nexa_web::config::ttl_from_secs;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// Respects `RUST_LOG` if set, otherwise falls back to `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Layer CLI flags over the loaded broker config.
pub fn resolve_config(
    mut config: BrokerConfig,
    port: Option<u16>,
    ttl_secs: Option<u64>,
) -> BrokerConfig {
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(secs) = ttl_secs {
        config.ttl = ttl_from_secs(secs);
    }
    config
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Read one token line from `reader`, trimming the trailing newline.
pub fn read_token(reader: impl BufRead) -> Result<String> {
    let line = reader
        .lines()
        .next()
        .transpose()
        .context("failed to read token from stdin")?
        .unwrap_or_default();

    let token = line.trim().to_owned();
    if token.is_empty() {
        bail!("no token provided");
    }
    Ok(token)
}
