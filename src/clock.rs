//! Monotonic time source for the rolling window.
//!
//! Time is expressed as a [`Duration`] since an arbitrary, fixed origin so
//! tests can drive the window deterministically with [`ManualClock`].

use chrono::NaiveTime;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// A monotonic clock.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Local time of day, used to stamp diagnostic entries.
    fn time_of_day(&self) -> NaiveTime {
        chrono::Local::now().time()
    }
}

/// [`Clock`] backed by [`Instant`], with its origin at construction time.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock for tests and simulations.
///
/// Starts at zero. Unlike a real monotonic clock it can be set backwards,
/// which the rolling window treats as "no time has passed". Its time of day
/// is midnight plus the elapsed time, so stamps are deterministic too.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: Duration) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn time_of_day(&self) -> NaiveTime {
        let secs = self.now().as_secs() % 86_400;
        NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, 0).unwrap_or_default()
    }
}
