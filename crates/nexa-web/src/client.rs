//! HTTP client for processes that consume the broker.
//!
//! The interactive orchestrator uses [`BrokerClient`] to check whether a
//! broker is up, store the token the user typed, and read it back before a
//! training job; the training service only calls
//! [`BrokerClient::get_token`].

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;

use crate::api::{
    ClearTokenResponse, ErrorResponse, GetTokenResponse, HealthResponse, SetTokenRequest,
    SetTokenResponse,
};
use crate::config::DEFAULT_PORT;
use crate::error::{Result, WebError};

/// Default broker base URL.
pub fn default_url() -> String {
    format!("http://127.0.0.1:{DEFAULT_PORT}")
}

/// Readiness polls made after launching a broker.
pub const READY_ATTEMPTS: u32 = 20;

/// Pause between readiness polls.
pub const READY_INTERVAL: Duration = Duration::from_millis(250);

/// How [`BrokerClient::ensure_running`] found the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// A broker was already answering; nothing was launched.
    AlreadyRunning,
    /// A broker was launched and became ready.
    Launched,
}

/// Outcome of asking the broker for the token.
pub enum TokenStatus {
    /// A valid token and its remaining lifetime in seconds.
    Valid { token: String, expires_in: u64 },
    /// Nothing stored.
    NotFound,
    /// The token outlived its TTL and the broker purged it.
    Expired,
    /// The broker refused the entry as tampered or corrupted.
    Invalid,
}

impl TokenStatus {
    /// The token, if valid.  Every other outcome means the user must supply
    /// the credential again.
    pub fn into_token(self) -> Option<String> {
        match self {
            Self::Valid { token, .. } => Some(token),
            _ => None,
        }
    }
}

impl fmt::Debug for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid { expires_in, .. } => f
                .debug_struct("Valid")
                .field("token", &"[REDACTED]")
                .field("expires_in", expires_in)
                .finish(),
            Self::NotFound => f.write_str("NotFound"),
            Self::Expired => f.write_str("Expired"),
            Self::Invalid => f.write_str("Invalid"),
        }
    }
}

/// Client for one broker.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    base_url: String,
    http: reqwest::Client,
}

impl BrokerClient {
    /// Create a client for the broker at `base_url` (e.g.
    /// `http://127.0.0.1:8765`).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Store `token` in the broker.  Returns the TTL in seconds.
    pub async fn set_token(&self, token: &str) -> Result<u64> {
        let resp = self
            .http
            .post(self.url("/set_token"))
            .json(&SetTokenRequest {
                token: token.to_owned(),
            })
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(unexpected(resp).await);
        }
        let body: SetTokenResponse = resp.json().await?;
        Ok(body.expires_in)
    }

    /// Fetch the token.
    pub async fn get_token(&self) -> Result<TokenStatus> {
        let resp = self.http.get(self.url("/get_token")).send().await?;

        match resp.status() {
            StatusCode::OK => {
                let body: GetTokenResponse = resp.json().await?;
                Ok(TokenStatus::Valid {
                    token: body.token,
                    expires_in: body.expires_in,
                })
            }
            StatusCode::NOT_FOUND => Ok(TokenStatus::NotFound),
            StatusCode::UNAUTHORIZED => Ok(TokenStatus::Expired),
            StatusCode::FORBIDDEN => Ok(TokenStatus::Invalid),
            _ => Err(unexpected(resp).await),
        }
    }

    /// Clear the stored token.
    pub async fn clear_token(&self) -> Result<()> {
        let resp = self.http.post(self.url("/clear_token")).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(unexpected(resp).await);
        }
        let _: ClearTokenResponse = resp.json().await?;
        Ok(())
    }

    /// Query `/health`.
    pub async fn health(&self) -> Result<HealthResponse> {
        let resp = self.http.get(self.url("/health")).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(unexpected(resp).await);
        }
        Ok(resp.json().await?)
    }

    /// Whether a broker answers at this URL.
    pub async fn is_running(&self) -> bool {
        self.health().await.is_ok()
    }

    /// Poll `/health` until it answers, up to `attempts` times, sleeping
    /// `interval` between tries.
    pub async fn wait_until_ready(
        &self,
        attempts: u32,
        interval: Duration,
    ) -> Result<HealthResponse> {
        for attempt in 1..=attempts {
            match self.health().await {
                Ok(health) => return Ok(health),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "broker not ready yet");
                    if attempt < attempts {
                        tokio::time::sleep(interval).await;
                    }
                }
            }
        }
        Err(WebError::NotReady { attempts })
    }

    /// Make sure a broker answers at this URL.
    ///
    /// If one is already up, `launch` is not called.  Otherwise `launch`
    /// starts one and `/health` is polled [`READY_ATTEMPTS`] times,
    /// [`READY_INTERVAL`] apart.
    ///
    /// # Errors
    ///
    /// - [`WebError::Io`] if `launch` fails.
    /// - [`WebError::NotReady`] if the launched broker never answers.
    pub async fn ensure_running<F>(&self, launch: F) -> Result<Startup>
    where
        F: FnOnce() -> std::io::Result<()>,
    {
        if self.is_running().await {
            tracing::debug!(url = %self.base_url, "session broker already running");
            return Ok(Startup::AlreadyRunning);
        }

        tracing::info!(url = %self.base_url, "starting session broker");
        launch()?;
        self.wait_until_ready(READY_ATTEMPTS, READY_INTERVAL).await?;
        Ok(Startup::Launched)
    }
}

async fn unexpected(resp: reqwest::Response) -> WebError {
    let status = resp.status().as_u16();
    let message = match resp.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => "unreadable response body".into(),
    };
    WebError::UnexpectedStatus { status, message }
}
