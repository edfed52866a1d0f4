//! Single-slot, in-memory encrypted token store.
//!
//! [`SessionStore`] holds at most one [`SessionEntry`]: the bearer token
//! encrypted with AES-256-GCM, the time it was stored, and an HMAC over the
//! plaintext and that time.  Nothing is ever written to disk.
//!
//! # Lifecycle
//!
//! The slot moves `Empty -> Occupied -> Empty`.  [`SessionStore::set`]
//! fills (or replaces) it, [`SessionStore::clear`] empties it, and
//! [`SessionStore::get`] empties it as a side effect when the entry has
//! outlived its TTL.  A read of an occupied slot resolves to one of:
//!
//! | Outcome   | Result                                  | Slot afterwards |
//! |-----------|-----------------------------------------|-----------------|
//! | valid     | `Ok(SessionToken)`                      | unchanged       |
//! | expired   | `Err(VaultError::TokenExpired)`         | emptied         |
//! | corrupted | `Err(VaultError::DecryptionFailed)`     | unchanged       |
//! | tampered  | `Err(VaultError::TokenTampered)`        | unchanged       |
//!
//! Every operation takes the same mutex, so concurrent callers observe some
//! serial order of whole operations.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use crate::crypto::{self, DerivedKey, MasterSecret, NONCE_LEN_BYTES};
use crate::error::{Result, VaultError};
use crate::expiry::{Clock, ExpiryPolicy, Freshness, SystemClock};
use crate::signer::{Signature, Signer};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The stored credential record.
struct SessionEntry {
    ciphertext: Vec<u8>,
    nonce: [u8; NONCE_LEN_BYTES],
    timestamp: DateTime<Utc>,
    signature: Signature,
}

/// A token read back from the store, with the seconds it has left.
pub struct SessionToken {
    token: Zeroizing<String>,
    /// Whole seconds until the entry expires, rounded down.
    pub expires_in: u64,
}

impl SessionToken {
    /// The plaintext token.
    pub fn expose(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// What the slot holds, determined without decrypting anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Empty,
    Occupied { expires_in: u64 },
    /// Past its TTL but not yet purged by a read.
    Stale,
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// The broker's token store.
///
/// Construct one per broker process and share it behind an `Arc`.  Dropping
/// it wipes the derived key; a new store cannot read anything an old one
/// wrote.
///
/// # Example
///
/// ```rust
/// # use std::time::Duration;
/// # use nexa_vault::store::SessionStore;
/// # fn example() -> nexa_vault::Result<()> {
/// let store = SessionStore::new(Duration::from_secs(1800))?;
///
/// store.set("hf_abc123")?;
/// let token = store.get()?;
/// assert_eq!(token.expose(), "hf_abc123");
///
/// store.clear()?;
/// assert!(store.get().is_err());
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
pub struct SessionStore {
    slot: Mutex<Option<SessionEntry>>,
    key: DerivedKey,
    signer: Signer,
    policy: ExpiryPolicy,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Create a store with a freshly generated master secret and the wall
    /// clock.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::KeyDerivationFailed`] if the CSPRNG fails.
    pub fn new(ttl: Duration) -> Result<Self> {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a store with a fresh master secret that reads time from
    /// `clock`.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let master = MasterSecret::generate()?;
        Ok(Self::from_master(&master, ExpiryPolicy::new(ttl), clock))
    }

    /// Build a store from an existing master secret.
    ///
    /// The key is derived once here and held for the store's lifetime.
    pub fn from_master(
        master: &MasterSecret,
        policy: ExpiryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let key = crypto::derive_key(master);
        let signer = Signer::new(master);

        tracing::debug!(ttl_secs = policy.ttl().as_secs(), "session store ready");

        Self {
            slot: Mutex::new(None),
            key,
            signer,
            policy,
            clock,
        }
    }

    /// The TTL applied to every entry.
    pub fn ttl(&self) -> Duration {
        self.policy.ttl()
    }

    /// Lock the slot.  A poisoned lock is recovered: the slot only ever
    /// changes by whole-value assignment.
    fn lock(&self) -> MutexGuard<'_, Option<SessionEntry>> {
        self.slot.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("session store lock was poisoned; recovering");
            self.slot.clear_poison();
            PoisonError::into_inner(poisoned)
        })
    }

    // -- Operations ---------------------------------------------------------

    /// Encrypt and store `token`, replacing any existing entry.
    ///
    /// Returns the TTL the new entry was stored with.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidToken`] for an empty or blank token; the
    /// existing entry, if any, is left untouched.
    pub fn set(&self, token: &str) -> Result<Duration> {
        if token.trim().is_empty() {
            return Err(VaultError::InvalidToken {
                reason: "token must not be empty".into(),
            });
        }

        let (nonce, ciphertext) = crypto::encrypt(token.as_bytes(), &self.key)?;

        let mut slot = self.lock();
        let timestamp = self.clock.now();
        let signature = self.signer.sign(token.as_bytes(), timestamp);
        let replaced = slot
            .replace(SessionEntry {
                ciphertext,
                nonce,
                timestamp,
                signature,
            })
            .is_some();
        drop(slot);

        tracing::info!(
            ttl_secs = self.ttl().as_secs(),
            replaced,
            "token stored in session"
        );

        Ok(self.ttl())
    }

    /// Decrypt, verify and return the stored token.
    ///
    /// # Errors
    ///
    /// - [`VaultError::TokenNotFound`] if the slot is empty.
    /// - [`VaultError::TokenExpired`] if the entry is past its TTL.  The slot
    ///   is emptied, so the next call reports `TokenNotFound`.
    /// - [`VaultError::DecryptionFailed`] if the cipher layer rejects the
    ///   entry.
    /// - [`VaultError::TokenTampered`] if the integrity signature does not
    ///   match the decrypted token.
    pub fn get(&self) -> Result<SessionToken> {
        let mut slot = self.lock();
        let stored_at = slot
            .as_ref()
            .ok_or(VaultError::TokenNotFound)?
            .timestamp;

        let expires_in = match self.policy.check(stored_at, self.clock.now()) {
            Freshness::Fresh { remaining_secs } => remaining_secs,
            Freshness::Expired { overdue_secs } => {
                *slot = None;
                tracing::warn!(overdue_secs, "token expired and cleared from session");
                return Err(VaultError::TokenExpired { overdue_secs });
            }
        };

        let entry = slot.as_ref().ok_or(VaultError::TokenNotFound)?;
        let plaintext = crypto::decrypt(&entry.nonce, &entry.ciphertext, &self.key)
            .inspect_err(|_| tracing::error!("stored token failed to decrypt"))?;

        if !self
            .signer
            .verify(&plaintext, entry.timestamp, &entry.signature)
        {
            tracing::error!("token signature mismatch");
            return Err(VaultError::TokenTampered);
        }
        drop(slot);

        let token = std::str::from_utf8(&plaintext)
            .map_err(|_| VaultError::Internal("stored token is not valid UTF-8".into()))?
            .to_owned();

        Ok(SessionToken {
            token: Zeroizing::new(token),
            expires_in,
        })
    }

    /// Empty the slot.  Idempotent.
    pub fn clear(&self) -> Result<()> {
        let had_entry = self.lock().take().is_some();
        tracing::info!(had_entry, "token cleared from session");
        Ok(())
    }

    /// Report what the slot holds without decrypting or purging.
    pub fn status(&self) -> Result<SlotStatus> {
        let slot = self.lock();
        Ok(match slot.as_ref() {
            None => SlotStatus::Empty,
            Some(entry) => match self.policy.check(entry.timestamp, self.clock.now()) {
                Freshness::Fresh { remaining_secs } => SlotStatus::Occupied {
                    expires_in: remaining_secs,
                },
                Freshness::Expired { .. } => SlotStatus::Stale,
            },
        })
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
