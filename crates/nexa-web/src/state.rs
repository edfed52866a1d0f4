//! Shared application state for the broker.
//!
//! [`AppState`] is wrapped in an `Arc` and handed to every Axum handler.  The
//! store is constructed by the caller, so tests can run independent brokers
//! side by side.

use std::sync::Arc;
use std::time::Instant;

use nexa_vault::SessionStore;

/// Shared state accessible from every Axum handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The single-slot token store.
    pub store: Arc<SessionStore>,

    /// When this broker started, for `/health` uptime.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            started_at: Instant::now(),
        }
    }

    /// Whole seconds since startup.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
