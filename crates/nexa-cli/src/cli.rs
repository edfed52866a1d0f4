//! CLI argument definitions for the session broker.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use clap::{Parser, Subcommand};
use nexa_web::client::default_url;

/// Nexa session broker -- holds the model-hub token for one developer session.
#[derive(Parser)]
#[command(
    name = "nexa-session",
    version,
    about = "Nexa session broker -- ephemeral in-memory credential store",
    long_about = "Holds a bearer token encrypted in memory for the length of a \
                  development session and serves it to local processes over a \
                  loopback HTTP API. Restarting the broker forgets the token."
)]
pub struct Cli {
    /// Broker URL used by the client subcommands.
    #[arg(
        long,
        global = true,
        env = "NEXA_SESSION_URL",
        default_value_t = default_url()
    )]
    pub url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the broker in the foreground.
    Serve {
        /// Port to listen on (overrides config and NEXA_SESSION_PORT).
        #[arg(long, short)]
        port: Option<u16>,

        /// Token lifetime in seconds (overrides config and NEXA_SESSION_TTL).
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Start a background broker unless one already answers at --url.
    Ensure {
        /// Port for a newly started broker.
        #[arg(long, short)]
        port: Option<u16>,

        /// Token lifetime in seconds for a newly started broker.
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Show whether a broker is running.
    Status,

    /// Store a token.  Reads one line from stdin when TOKEN is omitted.
    SetToken {
        /// The token.  Prefer stdin so it stays out of shell history.
        token: Option<String>,
    },

    /// Print the stored token.
    GetToken,

    /// Discard the stored token.
    ClearToken,
}
