//! In-memory credential vault for the Nexa session broker.
//!
//! This crate holds one bearer token per broker session, encrypted in process
//! memory, signed for integrity, and bounded by a TTL.  Nothing here touches
//! the filesystem: restarting the process discards the master secret and with
//! it every stored token.
//!
//! # Modules
//!
//! - [`crypto`]: master secret, PBKDF2 key derivation, AES-256-GCM.
//! - [`signer`]: HMAC-SHA256 over `(token, timestamp)`.
//! - [`expiry`]: TTL policy and the [`Clock`] it reads.
//! - [`store`]: the single-slot [`SessionStore`].
//! - [`error`]: unified error types.
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use nexa_vault::SessionStore;
//!
//! # fn example() -> nexa_vault::Result<()> {
//! let store = SessionStore::new(Duration::from_secs(1800))?;
//! store.set("hf_abc123")?;
//!
//! match store.get() {
//!     Ok(token) => assert_eq!(token.expose(), "hf_abc123"),
//!     Err(e) if e.requires_new_token() => { /* prompt the user again */ }
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod crypto;
pub mod error;
pub mod expiry;
pub mod signer;
pub mod store;

pub use error::{Result, VaultError};
pub use expiry::{Clock, DEFAULT_TTL, ExpiryPolicy, ManualClock, SystemClock};
pub use store::{SessionStore, SessionToken, SlotStatus};
