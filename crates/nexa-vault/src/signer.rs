//! HMAC-SHA256 integrity signatures over `(token, timestamp)`.
//!
//! The signature is independent of the AES-GCM tag: it binds the *decrypted*
//! token to the timestamp it was stored with, so an entry whose metadata was
//! swapped or rewritten is refused even when its ciphertext still decrypts.

use std::fmt;

use chrono::{DateTime, Utc};
use ring::hmac;

use crate::crypto::MasterSecret;

/// Length of an HMAC-SHA256 tag in bytes.
pub const TAG_LEN: usize = 32;

/// A signature produced by [`Signer::sign`].
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Raw tag bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn corrupt(&mut self) {
        if let Some(byte) = self.0.first_mut() {
            *byte ^= 0x01;
        }
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({} bytes)", self.0.len())
    }
}

/// Keyed signer bound to one broker session's master secret.
pub struct Signer {
    key: hmac::Key,
}

impl Signer {
    /// Build a signer keyed by `master`.
    pub fn new(master: &MasterSecret) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, master.expose()),
        }
    }

    /// Sign `token` as stored at `timestamp`.
    pub fn sign(&self, token: &[u8], timestamp: DateTime<Utc>) -> Signature {
        let tag = hmac::sign(&self.key, &canonical_message(token, timestamp));
        Signature(tag.as_ref().to_vec())
    }

    /// Check `signature` against `(token, timestamp)` in constant time.
    pub fn verify(&self, token: &[u8], timestamp: DateTime<Utc>, signature: &Signature) -> bool {
        hmac::verify(
            &self.key,
            &canonical_message(token, timestamp),
            signature.as_bytes(),
        )
        .is_ok()
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Signer([REDACTED])")
    }
}

/// `len(token) as u64 BE || token || timestamp_micros as i64 BE`.
///
/// The length prefix keeps a token ending in digits from colliding with a
/// different token/timestamp split.
fn canonical_message(token: &[u8], timestamp: DateTime<Utc>) -> Vec<u8> {
    let mut msg = Vec::with_capacity(8 + token.len() + 8);
    msg.extend_from_slice(&(token.len() as u64).to_be_bytes());
    msg.extend_from_slice(token);
    msg.extend_from_slice(&timestamp.timestamp_micros().to_be_bytes());
    msg
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::crypto::KEY_LEN;

    fn signer() -> Signer {
        Signer::new(&MasterSecret::from_bytes([3u8; KEY_LEN]))
    }

    #[test]
    fn sign_then_verify() {
        let signer = signer();
        let now = Utc::now();
        let sig = signer.sign(b"hf_abc123", now);
        assert_eq!(sig.as_bytes().len(), TAG_LEN);
        assert!(signer.verify(b"hf_abc123", now, &sig));
    }

    #[test]
    fn different_token_fails() {
        let signer = signer();
        let now = Utc::now();
        let sig = signer.sign(b"hf_abc123", now);
        assert!(!signer.verify(b"hf_abc124", now, &sig));
    }

    #[test]
    fn shifted_timestamp_fails() {
        let signer = signer();
        let now = Utc::now();
        let sig = signer.sign(b"hf_abc123", now);
        assert!(!signer.verify(b"hf_abc123", now + TimeDelta::microseconds(1), &sig));
    }

    #[test]
    fn other_session_key_fails() {
        let now = Utc::now();
        let sig = signer().sign(b"tok", now);
        let other = Signer::new(&MasterSecret::from_bytes([4u8; KEY_LEN]));
        assert!(!other.verify(b"tok", now, &sig));
    }

    #[test]
    fn corrupted_signature_fails() {
        let signer = signer();
        let now = Utc::now();
        let mut sig = signer.sign(b"tok", now);
        sig.corrupt();
        assert!(!signer.verify(b"tok", now, &sig));
    }
}
