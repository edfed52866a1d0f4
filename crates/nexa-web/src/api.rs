//! REST API route handlers.
//!
//! Each handler translates one request into one [`SessionStore`] call and
//! renders the outcome.  Store errors map onto statuses as follows:
//!
//! | Outcome              | Status |
//! |----------------------|--------|
//! | empty/malformed body | 400    |
//! | not found            | 404    |
//! | expired              | 401    |
//! | tampered / corrupted | 403    |
//! | anything else        | 500    |
//!
//! Error bodies are `{"error": "..."}` with a fixed message per status; the
//! token never appears in a response other than a successful `/get_token`.
//!
//! [`SessionStore`]: nexa_vault::SessionStore

use std::fmt;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nexa_vault::{SlotStatus, VaultError};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Body of `POST /set_token`.
#[derive(Deserialize, Serialize)]
pub struct SetTokenRequest {
    pub token: String,
}

impl fmt::Debug for SetTokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetTokenRequest")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Response of `POST /set_token`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SetTokenResponse {
    pub status: String,
    pub expires_in: u64,
}

/// Response of `GET /get_token`.
#[derive(Serialize, Deserialize)]
pub struct GetTokenResponse {
    pub token: String,
    pub expires_in: u64,
}

impl fmt::Debug for GetTokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetTokenResponse")
            .field("token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Response of `POST /clear_token`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClearTokenResponse {
    pub status: String,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Seconds since the broker started.
    pub uptime: u64,
    /// Whether an unexpired token is currently held.
    #[serde(default)]
    pub token_present: bool,
}

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An error leaving an API handler.
#[derive(Debug)]
pub enum ApiError {
    /// The request body was missing or not valid JSON of the right shape.
    MalformedBody,
    /// A store operation failed.
    Vault(VaultError),
}

impl From<VaultError> for ApiError {
    fn from(e: VaultError) -> Self {
        Self::Vault(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(reason = %rejection.body_text(), "rejected request body");
        Self::MalformedBody
    }
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedBody => StatusCode::BAD_REQUEST,
            Self::Vault(e) => match e {
                VaultError::InvalidToken { .. } => StatusCode::BAD_REQUEST,
                VaultError::TokenNotFound => StatusCode::NOT_FOUND,
                VaultError::TokenExpired { .. } => StatusCode::UNAUTHORIZED,
                VaultError::TokenTampered | VaultError::DecryptionFailed { .. } => {
                    StatusCode::FORBIDDEN
                }
                VaultError::EncryptionFailed { .. }
                | VaultError::KeyDerivationFailed { .. }
                | VaultError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Client-facing message.  Fixed per outcome; never derived from input.
    pub fn message(&self) -> &'static str {
        match self {
            Self::MalformedBody => "No token provided",
            Self::Vault(e) => match e {
                VaultError::InvalidToken { .. } => "No token provided",
                VaultError::TokenNotFound => "No token found",
                VaultError::TokenExpired { .. } => "Token expired",
                VaultError::TokenTampered => "Token signature mismatch",
                VaultError::DecryptionFailed { .. } => "Token invalid",
                _ => INTERNAL_ERROR_MESSAGE,
            },
        }
    }
}

/// Body text of every 500 response.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            if let Self::Vault(e) = &self {
                tracing::error!(error = %e, "unhandled error in session api");
            }
        }
        error_response(status, self.message())
    }
}

/// Render `{"error": message}` with `status`.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_owned(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /set_token`
pub async fn set_token(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SetTokenRequest>, JsonRejection>,
) -> Result<Json<SetTokenResponse>, ApiError> {
    let Json(req) = payload?;
    let ttl = state.store.set(&req.token)?;

    Ok(Json(SetTokenResponse {
        status: "stored".into(),
        expires_in: ttl.as_secs(),
    }))
}

/// `GET /get_token`
pub async fn get_token(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GetTokenResponse>, ApiError> {
    let token = state.store.get()?;

    Ok(Json(GetTokenResponse {
        token: token.expose().to_owned(),
        expires_in: token.expires_in,
    }))
}

/// `POST /clear_token`
pub async fn clear_token(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClearTokenResponse>, ApiError> {
    state.store.clear()?;

    Ok(Json(ClearTokenResponse {
        status: "cleared".into(),
    }))
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    let token_present = matches!(state.store.status()?, SlotStatus::Occupied { .. });

    Ok(Json(HealthResponse {
        status: "ok".into(),
        uptime: state.uptime_secs(),
        token_present,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: VaultError) -> u16 {
        ApiError::from(e).status().as_u16()
    }

    #[test]
    fn vault_errors_map_to_statuses() {
        assert_eq!(
            status_of(VaultError::InvalidToken {
                reason: "empty".into()
            }),
            400
        );
        assert_eq!(status_of(VaultError::TokenNotFound), 404);
        assert_eq!(status_of(VaultError::TokenExpired { overdue_secs: 1 }), 401);
        assert_eq!(status_of(VaultError::TokenTampered), 403);
        assert_eq!(
            status_of(VaultError::DecryptionFailed {
                reason: "bad tag".into()
            }),
            403
        );
        assert_eq!(status_of(VaultError::Internal("lock".into())), 500);
        assert_eq!(ApiError::MalformedBody.status().as_u16(), 400);
    }

    #[test]
    fn internal_message_hides_detail() {
        let err = ApiError::from(VaultError::Internal("hf_leaky detail".into()));
        assert_eq!(err.message(), INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn payload_debug_is_redacted() {
        let req = SetTokenRequest {
            token: "hf_abc123".into(),
        };
        let resp = GetTokenResponse {
            token: "hf_abc123".into(),
            expires_in: 10,
        };
        assert!(!format!("{req:?}").contains("hf_abc123"));
        assert!(!format!("{resp:?}").contains("hf_abc123"));
    }
}
