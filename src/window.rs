//! Bucketed rolling window.
//!
//! A fixed ring of `size` buckets, each covering `interval` of time, so the
//! whole ring covers the trailing `size × interval`. Writes always land in the
//! bucket at `offset`; before every write the window is advanced to "now",
//! clearing the buckets it skips over so stale slices are recycled rather than
//! reallocated.
//!
//! ```text
//!   oldest ───────────────────────────────► newest
//!   [offset+1] [offset+2] ... [offset-1] [offset]
//!                                         ▲ current, partially filled
//! ```
//!
//! Slice boundaries are kept aligned to multiples of `interval` from the
//! window's creation: advancing moves `last_time` by whole intervals, never to
//! the arrival time of the triggering call.

use crate::clock::Clock;
use crate::config::ConfigError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Outcomes recorded during one time slice.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bucket {
    /// Sum of recorded values (1.0 for success, 0.0 for failure).
    pub sum: f64,
    /// Number of recorded values.
    pub count: i64,
}

impl Bucket {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn reset(&mut self) {
        *self = Bucket::default();
    }
}

struct WindowState {
    buckets: Vec<Bucket>,
    /// Bucket currently receiving writes.
    offset: usize,
    /// Start of the slice covered by `buckets[offset]`.
    last_time: Duration,
}

/// Trailing-window histogram of outcomes. Safe to share between threads;
/// every read and write is serialised by one lock.
pub struct RollingWindow {
    state: Mutex<WindowState>,
    size: usize,
    interval: Duration,
    ignore_current: bool,
    clock: Arc<dyn Clock>,
}

impl RollingWindow {
    pub fn new(
        size: usize,
        interval: Duration,
        ignore_current: bool,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::ZeroBuckets);
        }
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval {
                window: interval,
                buckets: size,
            });
        }

        let last_time = clock.now();
        Ok(Self {
            state: Mutex::new(WindowState {
                buckets: vec![Bucket::default(); size],
                offset: 0,
                last_time,
            }),
            size,
            interval,
            ignore_current,
            clock,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record one outcome in the current bucket.
    pub fn add(&self, value: f64) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.advance(&mut state, now);
        let offset = state.offset;
        state.buckets[offset].add(value);
    }

    /// Visit every bucket that is still inside the window, oldest first.
    ///
    /// With `ignore_current` set, the bucket being written is skipped until
    /// the window moves past it.
    pub fn reduce<F>(&self, mut f: F)
    where
        F: FnMut(&Bucket),
    {
        let now = self.clock.now();
        let state = self.state.lock();

        let span = self.span(&state, now);
        let count = if span == 0 && self.ignore_current {
            self.size - 1
        } else {
            self.size - span
        };

        // Buckets offset+1 ..= offset+span have expired but are not reset
        // until the next write; start right after them.
        let start = state.offset + span + 1;
        for i in 0..count {
            f(&state.buckets[(start + i) % self.size]);
        }
    }

    /// Sum of values and of counts across the live buckets.
    pub fn totals(&self) -> (f64, i64) {
        let mut sum = 0.0;
        let mut count = 0;
        self.reduce(|bucket| {
            sum += bucket.sum;
            count += bucket.count;
        });
        (sum, count)
    }

    fn advance(&self, state: &mut WindowState, now: Duration) {
        let span = self.span(state, now);
        if span == 0 {
            return;
        }

        for i in 0..span {
            state.buckets[(state.offset + i + 1) % self.size].reset();
        }
        state.offset = (state.offset + span) % self.size;

        let elapsed = now.saturating_sub(state.last_time);
        state.last_time = now - remainder(elapsed, self.interval);
    }

    /// Number of whole slices since `last_time`, clamped to `[0, size]`.
    /// A clock that moved backwards counts as no elapsed slices.
    fn span(&self, state: &WindowState, now: Duration) -> usize {
        let elapsed = now.saturating_sub(state.last_time);
        let slices = elapsed.as_nanos() / self.interval.as_nanos();
        usize::try_from(slices).map_or(self.size, |s| s.min(self.size))
    }
}

fn remainder(elapsed: Duration, interval: Duration) -> Duration {
    let rem = elapsed.as_nanos() % interval.as_nanos();
    // rem < interval, which already fits in a Duration
    Duration::new(
        (rem / 1_000_000_000) as u64,
        (rem % 1_000_000_000) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const INTERVAL: Duration = Duration::from_millis(100);

    fn window(size: usize, ignore_current: bool) -> (RollingWindow, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let window = RollingWindow::new(size, INTERVAL, ignore_current, clock.clone()).unwrap();
        (window, clock)
    }

    fn counts(window: &RollingWindow) -> Vec<i64> {
        let mut out = Vec::new();
        window.reduce(|b| out.push(b.count));
        out
    }

    #[test]
    fn rejects_zero_size_or_interval() {
        let clock = Arc::new(ManualClock::new());
        assert!(matches!(
            RollingWindow::new(0, INTERVAL, false, clock.clone()),
            Err(ConfigError::ZeroBuckets)
        ));
        assert!(matches!(
            RollingWindow::new(3, Duration::ZERO, false, clock),
            Err(ConfigError::ZeroInterval { .. })
        ));
    }

    #[test]
    fn adds_within_one_slice_share_a_bucket() {
        let (window, clock) = window(3, false);
        window.add(1.0);
        clock.advance(Duration::from_millis(50));
        window.add(0.0);
        window.add(1.0);

        assert_eq!(counts(&window), vec![0, 0, 3]);
        assert_eq!(window.totals(), (2.0, 3));
    }

    #[test]
    fn reduce_visits_oldest_to_newest() {
        let (window, clock) = window(3, false);
        window.add(1.0);
        clock.advance(INTERVAL);
        window.add(1.0);
        window.add(1.0);
        clock.advance(INTERVAL);
        window.add(1.0);
        window.add(1.0);
        window.add(1.0);

        assert_eq!(counts(&window), vec![1, 2, 3]);
    }

    #[test]
    fn buckets_expire_after_a_full_window() {
        let (window, clock) = window(3, false);
        window.add(1.0);
        clock.advance(Duration::from_millis(200));
        window.add(5.0);

        clock.advance(INTERVAL);
        // first bucket is now exactly size × interval old
        assert_eq!(window.totals(), (5.0, 1));

        clock.advance(Duration::from_secs(10));
        assert_eq!(window.totals(), (0.0, 0));
    }

    #[test]
    fn skipped_buckets_are_reset_before_reuse() {
        let (window, clock) = window(4, false);
        for _ in 0..4 {
            window.add(1.0);
            clock.advance(INTERVAL);
        }
        // every bucket holds one success; jump two slices and write
        clock.advance(INTERVAL);
        window.add(0.0);

        let mut buckets = Vec::new();
        window.reduce(|b| buckets.push(*b));
        assert_eq!(buckets.iter().map(|b| b.count).sum::<i64>(), 3);
        assert_eq!(buckets.last().unwrap().sum, 0.0);
    }

    #[test]
    fn write_after_long_idle_sees_clean_window() {
        let (window, clock) = window(3, false);
        for _ in 0..10 {
            window.add(1.0);
        }
        clock.advance(Duration::from_secs(60));
        window.add(0.0);
        assert_eq!(window.totals(), (0.0, 1));
    }

    #[test]
    fn slice_boundaries_stay_aligned() {
        let (window, clock) = window(3, false);
        clock.advance(Duration::from_millis(150));
        window.add(1.0);
        // 150ms in: current slice started at 100ms, so 199ms is still inside it
        clock.advance(Duration::from_millis(49));
        window.add(1.0);
        assert_eq!(counts(&window), vec![0, 0, 2]);

        clock.advance(Duration::from_millis(1));
        window.add(1.0);
        assert_eq!(counts(&window), vec![0, 2, 1]);
    }

    #[test]
    fn ignore_current_excludes_open_bucket() {
        let (window, clock) = window(3, true);
        window.add(1.0);
        window.add(1.0);
        assert_eq!(window.totals(), (0.0, 0));

        clock.advance(INTERVAL);
        assert_eq!(window.totals(), (2.0, 2));

        window.add(1.0);
        assert_eq!(window.totals(), (2.0, 2));
    }

    #[test]
    fn clock_moving_backwards_keeps_current_bucket() {
        let (window, clock) = window(3, false);
        clock.set(Duration::from_millis(250));
        window.add(1.0);
        clock.set(Duration::from_millis(10));
        window.add(1.0);
        assert_eq!(counts(&window), vec![0, 0, 2]);
    }

    #[test]
    fn concurrent_writers_lose_nothing() {
        let (window, _clock) = window(4, false);
        let window = Arc::new(window);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let window = window.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        window.add(1.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(window.totals(), (8_000.0, 8_000));
    }
}
