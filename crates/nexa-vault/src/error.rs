//! Vault error types.
//!
//! Every store operation surfaces its outcome through [`VaultError`].  The
//! store-level variants map one-to-one onto the broker's HTTP statuses so
//! callers can tell "never set" from "set but stale" from "set but
//! compromised".  No variant ever carries token material in its message.

/// Unified error type for the Nexa session vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Validation ---------------------------------------------------------
    /// The submitted token was empty or whitespace only.
    #[error("invalid token: {reason}")]
    InvalidToken { reason: String },

    // -- Store outcomes -----------------------------------------------------
    /// The slot is empty: no token was stored, or it was cleared.
    #[error("no token found")]
    TokenNotFound,

    /// The stored token outlived its TTL and has been purged.
    #[error("token expired {overdue_secs}s ago")]
    TokenExpired { overdue_secs: u64 },

    /// The token decrypted, but its integrity signature does not match.
    #[error("token signature mismatch")]
    TokenTampered,

    // -- Crypto errors ------------------------------------------------------
    /// Encryption failed (bad key length, RNG failure, ring internal error).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// The cipher layer rejected the ciphertext (wrong key or corrupted
    /// data).  No plaintext is produced.
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    /// Master secret generation or key derivation failed.
    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors, e.g. a stored token that is
    /// not valid UTF-8.
    #[error("internal vault error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Whether this error means the caller must supply the credential again.
    ///
    /// NotFound, Expired, Tampered and Corrupted all funnel into the same
    /// user-facing prompt.
    pub fn requires_new_token(&self) -> bool {
        matches!(
            self,
            Self::TokenNotFound
                | Self::TokenExpired { .. }
                | Self::TokenTampered
                | Self::DecryptionFailed { .. }
        )
    }
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_outcomes_require_new_token() {
        assert!(VaultError::TokenNotFound.requires_new_token());
        assert!(VaultError::TokenExpired { overdue_secs: 3 }.requires_new_token());
        assert!(VaultError::TokenTampered.requires_new_token());
        assert!(!VaultError::Internal("boom".into()).requires_new_token());
        assert!(
            !VaultError::InvalidToken {
                reason: "empty".into()
            }
            .requires_new_token()
        );
    }

    #[test]
    fn display_is_stable() {
        assert_eq!(VaultError::TokenNotFound.to_string(), "no token found");
        assert_eq!(
            VaultError::TokenExpired { overdue_secs: 1 }.to_string(),
            "token expired 1s ago"
        );
    }
}
