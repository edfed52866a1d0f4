//! Broker startup: port guard, router, and serve loop.
//!
//! [`acquire_port`] is the single-instance guard.  It binds the broker port
//! up front and fails with [`WebError::PortInUse`] if another process holds
//! it; the bound socket is then handed to the server, so nothing can take
//! the port between the check and `listen`.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use nexa_vault::SessionStore;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::BrokerConfig;
use crate::error::{Result, WebError};
use crate::state::AppState;

/// The session broker HTTP server.
pub struct BrokerServer {
    config: BrokerConfig,
    state: Arc<AppState>,
}

impl BrokerServer {
    /// Create a server around an already-constructed store.
    pub fn new(config: BrokerConfig, store: Arc<SessionStore>) -> Self {
        Self {
            config,
            state: Arc::new(AppState::new(store)),
        }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        self.config.addr()
    }

    /// Build the Axum router with all routes registered.
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state))
    }

    /// Bind the configured port.  See [`acquire_port`].
    pub async fn bind(&self) -> Result<tokio::net::TcpListener> {
        if !self.config.is_loopback() {
            return Err(WebError::NonLoopbackBind {
                addr: self.config.bind_addr.clone(),
            });
        }
        acquire_port(&self.addr()).await
    }

    /// Serve on `listener` until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`WebError::Io`] if the accept loop fails.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let router = self.router();
        let local = listener.local_addr()?;

        tracing::info!(
            addr = %local,
            ttl_secs = self.config.ttl.as_secs(),
            "session broker listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("session broker stopped");
        Ok(())
    }

    /// Bind, then serve until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`WebError::PortInUse`] if another broker is already running.
    pub async fn start(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_signal()).await
    }
}

/// Build the broker router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/set_token", post(api::set_token))
        .route("/get_token", get(api::get_token))
        .route("/clear_token", post(api::clear_token))
        .route("/health", get(api::health))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` for listening, failing fast if it is already taken.
///
/// The listener is registered with the tokio runtime driving this future.
///
/// # Errors
///
/// - [`WebError::PortInUse`] if another process is bound to `addr`.
/// - [`WebError::Io`] for any other bind failure.
pub async fn acquire_port(addr: &str) -> Result<tokio::net::TcpListener> {
    let std_listener = std::net::TcpListener::bind(addr).map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            tracing::error!(addr = %addr, "session broker port already in use");
            WebError::PortInUse {
                addr: addr.to_owned(),
            }
        } else {
            WebError::Io(e)
        }
    })?;
    std_listener.set_nonblocking(true)?;
    Ok(tokio::net::TcpListener::from_std(std_listener)?)
}

/// Map a handler panic to the generic 500 body.  The panic payload is not
/// logged: it may echo request data.
fn panic_response(_payload: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("handler panicked");
    api::error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        api::INTERNAL_ERROR_MESSAGE,
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
