//! Diagnostics decorator.
//!
//! [`LoggedThrottle`] wraps any [`Throttle`] without changing its decisions.
//! It keeps the last [`HISTORY_CAPACITY`] failure reasons in an
//! [`ErrorHistory`] ring, and whenever the wrapped throttle sheds a call it
//! sends a report naming the breaker, the process, and those reasons to a
//! [`ReportSink`].
//!
//! The ring has its own lock, separate from the rolling window's, so writing
//! diagnostics never contends with admission statistics.

use crate::clock::Clock;
use crate::error::ServiceUnavailable;
use crate::report::{ProcessIdentity, ReportSink};
use crate::state::WindowStats;
use crate::throttle::{failure_reason, Promise, Throttle};
use parking_lot::Mutex;
use std::fmt::{self, Display};
use std::sync::Arc;

/// Number of failure reasons retained.
pub const HISTORY_CAPACITY: usize = 5;

const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Default)]
struct Ring {
    reasons: [String; HISTORY_CAPACITY],
    /// Next write position.
    index: usize,
    /// Filled slots, capped at capacity.
    count: usize,
}

/// Fixed-capacity ring of `"<HH:MM:SS> <reason>"` entries, stamped with the
/// clock's time of day.
pub struct ErrorHistory {
    ring: Mutex<Ring>,
    clock: Arc<dyn Clock>,
}

impl ErrorHistory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            ring: Mutex::default(),
            clock,
        }
    }

    /// Record a reason, overwriting the oldest entry once full.
    pub fn add(&self, reason: &str) {
        let entry = format!("{} {reason}", self.clock.time_of_day().format(TIME_FORMAT));
        let mut ring = self.ring.lock();
        let index = ring.index;
        ring.reasons[index] = entry;
        ring.index = (index + 1) % HISTORY_CAPACITY;
        ring.count = (ring.count + 1).min(HISTORY_CAPACITY);
    }

    /// Retained entries, most recent first.
    pub fn recent(&self) -> Vec<String> {
        let ring = self.ring.lock();
        (1..=ring.count)
            .map(|back| ring.reasons[(ring.index + HISTORY_CAPACITY - back) % HISTORY_CAPACITY].clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Display for ErrorHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.recent().join("\n"))
    }
}

/// [`Throttle`] decorator that records failure reasons and reports shedding.
pub struct LoggedThrottle<T> {
    name: String,
    inner: T,
    errors: Arc<ErrorHistory>,
    sink: Arc<dyn ReportSink>,
    identity: ProcessIdentity,
}

impl<T: Throttle> LoggedThrottle<T> {
    pub fn new(
        name: impl Into<String>,
        inner: T,
        sink: Arc<dyn ReportSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            inner,
            errors: Arc::new(ErrorHistory::new(clock)),
            sink,
            identity: ProcessIdentity::current(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn errors(&self) -> &ErrorHistory {
        &self.errors
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn log_rejection(&self, err: ServiceUnavailable) -> ServiceUnavailable {
        self.sink.report(&format!(
            "proc({}), callee: {}, breaker is open and requests dropped\nlast errors:\n{}",
            self.identity, self.name, self.errors
        ));
        err
    }
}

impl<T: Throttle> Throttle for LoggedThrottle<T> {
    type Promise = LoggedPromise<T::Promise>;

    fn allow(&self) -> Result<Self::Promise, ServiceUnavailable> {
        match self.inner.allow() {
            Ok(promise) => Ok(LoggedPromise {
                inner: promise,
                errors: self.errors.clone(),
            }),
            Err(err) => Err(self.log_rejection(err)),
        }
    }

    fn do_req<R, E, F, A>(&self, call: F, acceptable: A) -> Result<Result<R, E>, ServiceUnavailable>
    where
        F: FnOnce() -> Result<R, E>,
        A: FnOnce(&Result<R, E>) -> bool,
        E: Display,
    {
        let errors = &self.errors;
        self.inner
            .do_req(call, |result| {
                let accepted = acceptable(result);
                if !accepted {
                    errors.add(&failure_reason(result));
                }
                accepted
            })
            .map_err(|err| self.log_rejection(err))
    }

    fn stats(&self) -> WindowStats {
        self.inner.stats()
    }
}

/// Promise that records the rejection reason before settling the inner promise.
#[must_use = "settle the promise with accept() or reject() to record the outcome"]
pub struct LoggedPromise<P> {
    inner: P,
    errors: Arc<ErrorHistory>,
}

impl<P: Promise> Promise for LoggedPromise<P> {
    fn accept(self) {
        self.inner.accept();
    }

    fn reject(self, reason: &str) {
        self.errors.add(reason);
        self.inner.reject(reason);
    }
}
