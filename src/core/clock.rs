//! Injectable time source
//!
//! Every timestamp the pipeline produces (manifests, TTL checks, rate-limit
//! refill, job records) comes from a [`Clock`] so tests can substitute a
//! frozen one. Nothing inside the pipeline reads the ambient wall clock.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Time source abstraction
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Frozen clock for tests
///
/// Returns a fixed instant until explicitly advanced.
///
/// # Examples
///
/// ```
/// use caravan::core::clock::{Clock, FrozenClock};
/// use chrono::{Duration, TimeZone, Utc};
///
/// let clock = FrozenClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
/// let before = clock.now();
/// clock.advance(Duration::seconds(30));
/// assert_eq!(clock.now() - before, Duration::seconds(30));
/// ```
#[derive(Debug)]
pub struct FrozenClock {
    now: Mutex<DateTime<Utc>>,
}

impl FrozenClock {
    /// Creates a frozen clock pinned to the given instant
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    /// Moves the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("frozen clock lock poisoned");
        *now += by;
    }

    /// Pins the clock to a new instant
    pub fn set(&self, at: DateTime<Utc>) {
        let mut now = self.now.lock().expect("frozen clock lock poisoned");
        *now = at;
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("frozen clock lock poisoned")
    }
}
