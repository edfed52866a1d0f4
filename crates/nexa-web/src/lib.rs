//! Loopback HTTP surface for the Nexa session broker.
//!
//! This crate exposes a [`SessionStore`](nexa_vault::SessionStore) over a
//! small JSON API bound to the local host:
//!
//! - `POST /set_token`: store the bearer token.
//! - `GET /get_token`: read it back with its remaining lifetime.
//! - `POST /clear_token`: discard it.
//! - `GET /health`: liveness and uptime.
//!
//! It also ships [`BrokerClient`], the typed client used by the orchestrator
//! and the training service.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod server;
pub mod state;

pub use client::{BrokerClient, Startup, TokenStatus};
pub use config::BrokerConfig;
pub use error::{Result, WebError};
pub use server::{BrokerServer, acquire_port};
pub use state::AppState;
