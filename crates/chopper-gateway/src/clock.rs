//! Time source abstraction
//!
//! Token expiry needs wall-clock seconds, bucket refill needs a monotonic
//! instant. Both come from one [`Clock`] so tests can drive them with a
//! [`ManualClock`] instead of sleeping.

use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Source of wall-clock and monotonic time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock time in whole seconds since the unix epoch.
    ///
    /// Returns `None` if the system clock is set before the epoch.
    fn unix_now(&self) -> Option<u64>;

    /// Monotonic instant for elapsed-time arithmetic
    fn monotonic_now(&self) -> Instant;
}

/// Production clock backed by `SystemTime` and `Instant`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_now(&self) -> Option<u64> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs())
    }

    fn monotonic_now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
///
/// Both readings advance together, so a test that advances by one second
/// sees one more second of wall time and one more second of bucket refill.
#[derive(Debug)]
pub struct ManualClock {
    unix_origin: u64,
    monotonic_origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Start at the given unix timestamp (seconds)
    pub fn starting_at(unix_secs: u64) -> Self {
        Self {
            unix_origin: unix_secs,
            monotonic_origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Time elapsed since construction
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        // 2023-11-14T22:13:20Z
        Self::starting_at(1_700_000_000)
    }
}

impl Clock for ManualClock {
    fn unix_now(&self) -> Option<u64> {
        Some(self.unix_origin + self.offset.lock().as_secs())
    }

    fn monotonic_now(&self) -> Instant {
        self.monotonic_origin + *self.offset.lock()
    }
}
