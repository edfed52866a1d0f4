//! TTL policy and the clock it reads.
//!
//! Expiry is evaluated lazily: the store consults [`ExpiryPolicy::check`] on
//! every read and nowhere else.  There is no background reaper.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Default token lifetime: 30 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(1800);

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the current time for the store.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.  Used to step past the TTL in
/// tests without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Start the clock at the current wall-clock time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Result of checking an entry's age against the TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Still valid; `remaining_secs` is whole seconds left, rounded down.
    Fresh { remaining_secs: u64 },
    /// Past the TTL by `overdue_secs` (rounded down).
    Expired { overdue_secs: u64 },
}

/// Fixed-TTL expiry shared by every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    ttl: Duration,
}

impl ExpiryPolicy {
    /// Create a policy with the given TTL.  A zero TTL is raised to one
    /// second.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: ttl.max(Duration::from_secs(1)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Classify an entry stored at `stored_at`, as seen at `now`.
    ///
    /// `elapsed > ttl` is expired; `elapsed == ttl` is fresh with zero
    /// seconds left.  A clock that moved backwards counts as zero elapsed.
    pub fn check(&self, stored_at: DateTime<Utc>, now: DateTime<Utc>) -> Freshness {
        let elapsed = (now - stored_at).to_std().unwrap_or(Duration::ZERO);

        if elapsed > self.ttl {
            Freshness::Expired {
                overdue_secs: (elapsed - self.ttl).as_secs(),
            }
        } else {
            Freshness::Fresh {
                remaining_secs: (self.ttl - elapsed).as_secs(),
            }
        }
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
