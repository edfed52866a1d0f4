//! AES-256-GCM encryption and PBKDF2 key derivation using the `ring` crate.
//!
//! This module holds the key material for a broker session:
//!
//! - [`MasterSecret`]: 256 random bits generated once per process. It is the
//!   root of every key and is never serialized.
//! - [`DerivedKey`]: the AES-256-GCM key, derived from the master secret with
//!   PBKDF2-HMAC-SHA256 under a fixed application salt.
//!
//! Both live in [`Zeroizing`] buffers and are wiped when dropped, so a broker
//! restart leaves nothing behind that could decrypt an old entry.

use std::fmt;
use std::num::NonZeroU32;

use ring::aead::{
    self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey,
};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};

/// Length of the master secret and the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Domain-separating salt for the session key.  Changing it changes every
/// derived key.
const KDF_SALT: &[u8] = b"nexa-session";

/// PBKDF2 iteration count.
const PBKDF2_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => unreachable!(),
};

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Key material
// ---------------------------------------------------------------------------

/// The per-process root secret.
pub struct MasterSecret(Zeroizing<[u8; KEY_LEN]>);

impl MasterSecret {
    /// Generate a fresh master secret from the system CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::KeyDerivationFailed`] if the CSPRNG fails.
    pub fn generate() -> Result<Self> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        SystemRandom::new()
            .fill(&mut bytes[..])
            .map_err(|_| VaultError::KeyDerivationFailed {
                reason: "failed to generate master secret".into(),
            })?;
        Ok(Self(bytes))
    }

    /// Build a master secret from known bytes.
    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.0[..]
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret([REDACTED])")
    }
}

/// The AES-256-GCM key derived from a [`MasterSecret`].
pub struct DerivedKey(Zeroizing<[u8; KEY_LEN]>);

impl DerivedKey {
    fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Derive the session encryption key from `master` with PBKDF2-HMAC-SHA256.
///
/// Deterministic: the same master secret always yields the same key.
pub fn derive_key(master: &MasterSecret) -> DerivedKey {
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::derive(
        PBKDF2_ALG,
        PBKDF2_ITERATIONS,
        KDF_SALT,
        master.expose(),
        &mut out[..],
    );
    tracing::debug!(iterations = PBKDF2_ITERATIONS.get(), "derived session key");
    DerivedKey(out)
}

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// Yields exactly one nonce, then errors, so a bound key is never reused.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under `key` with a fresh random 96-bit nonce.
///
/// Returns `(nonce, ciphertext)`; the 128-bit GCM tag is appended to the
/// ciphertext.  No associated data is used.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if nonce generation or sealing
/// fails.
pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> Result<([u8; NONCE_LEN_BYTES], Vec<u8>)> {
    let mut nonce = [0u8; NONCE_LEN_BYTES];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random nonce".into(),
        })?;

    let unbound = UnboundKey::new(AEAD_ALG, key.as_bytes()).map_err(|_| {
        VaultError::EncryptionFailed {
            reason: "failed to create AES-256-GCM key".into(),
        }
    })?;
    let mut sealing_key = SealingKey::new(unbound, SingleNonce(Some(nonce)));

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    Ok((nonce, in_out))
}

/// Decrypt `ciphertext` (tag included) under `key` and `nonce`.
///
/// The plaintext is returned in a [`Zeroizing`] buffer.
///
/// # Errors
///
/// Returns [`VaultError::DecryptionFailed`] if the tag does not verify.  No
/// partial output is ever returned.
pub fn decrypt(
    nonce: &[u8; NONCE_LEN_BYTES],
    ciphertext: &[u8],
    key: &DerivedKey,
) -> Result<Zeroizing<Vec<u8>>> {
    let unbound = UnboundKey::new(AEAD_ALG, key.as_bytes()).map_err(|_| {
        VaultError::DecryptionFailed {
            reason: "failed to create AES-256-GCM key".into(),
        }
    })?;
    let mut opening_key = OpeningKey::new(unbound, SingleNonce(Some(*nonce)));

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = opening_key
        .open_in_place(Aad::empty(), &mut in_out[..])
        .map_err(|_| VaultError::DecryptionFailed {
            reason: "authentication failed".into(),
        })?
        .len();
    in_out.truncate(plaintext_len);

    Ok(in_out)
}
