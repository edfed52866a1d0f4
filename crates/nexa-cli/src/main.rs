//! CLI entry point for the Nexa session broker.
//!
//! `nexa-session serve` runs the broker; the remaining subcommands are thin
//! clients over its loopback API, used by the orchestrator scripts.

mod cli;
mod helpers;

use std::process::{Command, ExitCode, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nexa_vault::SessionStore;
use nexa_web::{BrokerClient, BrokerConfig, BrokerServer, Startup, TokenStatus};
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::helpers::{init_tracing, read_token, resolve_config};

/// Printed whenever no usable token is available, whatever the reason.
const REPROMPT: &str = "No valid token in session. Please provide the credential again.";

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, ttl } => cmd_serve(port, ttl).await,
        Commands::Ensure { port, ttl } => cmd_ensure(&cli.url, port, ttl).await,
        Commands::Status => cmd_status(&cli.url).await,
        Commands::SetToken { token } => cmd_set_token(&cli.url, token).await,
        Commands::GetToken => cmd_get_token(&cli.url).await,
        Commands::ClearToken => cmd_clear_token(&cli.url).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: serve
// ---------------------------------------------------------------------------

async fn cmd_serve(port: Option<u16>, ttl: Option<u64>) -> Result<ExitCode> {
    init_tracing("info");

    let config = resolve_config(BrokerConfig::load(), port, ttl);
    info!(addr = %config.addr(), ttl_secs = config.ttl.as_secs(), "starting session broker");

    let store = SessionStore::new(config.ttl).context("failed to initialise session store")?;
    let server = BrokerServer::new(config, Arc::new(store));

    server.start().await.context("session broker failed")?;
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Subcommand: ensure
// ---------------------------------------------------------------------------

async fn cmd_ensure(url: &str, port: Option<u16>, ttl: Option<u64>) -> Result<ExitCode> {
    init_tracing("info");
    let client = BrokerClient::new(url)?;

    let startup = client
        .ensure_running(|| spawn_detached_broker(port, ttl))
        .await
        .context("session broker did not start")?;

    match startup {
        Startup::AlreadyRunning => eprintln!("Session broker already running at {url}."),
        Startup::Launched => eprintln!("Session broker started at {url}."),
    }
    Ok(ExitCode::SUCCESS)
}

/// Launch `nexa-session serve` in the background with no attached stdio.
/// The child is not waited on and outlives this process.
fn spawn_detached_broker(port: Option<u16>, ttl: Option<u64>) -> std::io::Result<()> {
    let mut cmd = Command::new(std::env::current_exe()?);
    cmd.arg("serve");
    if let Some(port) = port {
        cmd.arg("--port").arg(port.to_string());
    }
    if let Some(ttl) = ttl {
        cmd.arg("--ttl").arg(ttl.to_string());
    }

    let child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    info!(pid = child.id(), "spawned session broker");
    Ok(())
}

// ---------------------------------------------------------------------------
// Client subcommands
// ---------------------------------------------------------------------------

async fn cmd_status(url: &str) -> Result<ExitCode> {
    init_tracing("warn");
    let client = BrokerClient::new(url)?;

    match client.health().await {
        Ok(health) => {
            println!("{}", serde_json::to_string_pretty(&health)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::debug!(error = %e, "health check failed");
            println!("session broker not running at {url}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn cmd_set_token(url: &str, token: Option<String>) -> Result<ExitCode> {
    init_tracing("warn");

    let token = match token {
        Some(t) => t,
        None => read_token(std::io::stdin().lock())?,
    };

    let client = BrokerClient::new(url)?;
    let expires_in = client
        .set_token(&token)
        .await
        .context("failed to store token")?;

    eprintln!("Token stored securely in session (expires in {expires_in}s).");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_get_token(url: &str) -> Result<ExitCode> {
    init_tracing("warn");
    let client = BrokerClient::new(url)?;

    match client.get_token().await.context("failed to reach session broker")? {
        TokenStatus::Valid { token, .. } => {
            println!("{token}");
            Ok(ExitCode::SUCCESS)
        }
        status => {
            tracing::debug!(?status, "no usable token");
            eprintln!("{REPROMPT}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn cmd_clear_token(url: &str) -> Result<ExitCode> {
    init_tracing("warn");
    BrokerClient::new(url)?
        .clear_token()
        .await
        .context("failed to clear token")?;

    eprintln!("Token cleared.");
    Ok(ExitCode::SUCCESS)
}
