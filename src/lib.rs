//! # adaptive-circuit-breaker
//!
//! A self-tuning circuit breaker that sheds load **probabilistically** instead
//! of flipping between open and closed.
//!
//! ## How it decides
//!
//! Outcomes of recent calls are kept in a bucketed rolling window (by default
//! 40 buckets of 250 ms, i.e. the last 10 seconds). Before each call the window
//! is aggregated and a rejection probability is computed:
//!
//! ```text
//! drop_ratio = max(0, (total - protection - k * accepts) / (total + 1))
//! ```
//!
//! * `total` – outcomes observed in the window
//! * `accepts` – of those, the successful ones
//! * `protection` – below this volume nothing is ever rejected (default 5)
//! * `k` – sensitivity; lower sheds more aggressively (default 1.5)
//!
//! A healthy dependency keeps `k * accepts` above `total` and the ratio stays at
//! zero. As failures pile up, an increasing share of calls fails fast with
//! [`ServiceUnavailable`]. Admitted calls keep feeding the window, so the
//! breaker recovers on its own once the dependency does; there is no half-open
//! timer.
//!
//! ## Layers
//!
//! ```text
//! CircuitBreaker ──► LoggedThrottle ──► AdaptiveThrottle ──► RollingWindow
//!   (facade)          (diagnostics)      (admission)          (statistics)
//! ```
//!
//! Each layer implements [`Throttle`]; the diagnostics layer keeps the last few
//! failure reasons and sends them to a [`ReportSink`] whenever a call is shed.
//!
//! ## Quick Start
//!
//! ```rust
//! use adaptive_circuit_breaker::{BreakerConfig, CircuitBreaker, Promise};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BreakerConfig::builder().name("user-service").build()?;
//! let breaker = CircuitBreaker::new(config)?;
//!
//! // Wrapped mode: the breaker runs the call and records its outcome.
//! let value = breaker.run(|| Ok::<_, std::io::Error>(42))?;
//! assert_eq!(value, 42);
//!
//! // Manual mode: ask first, report later.
//! match breaker.allow() {
//!     Ok(promise) => promise.accept(),
//!     Err(unavailable) => eprintln!("shed: {unavailable}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! | Feature | Default | Description |
//! |---|---|---|
//! | `axum` | no | Enables the [`middleware`] tower layer for axum services |

pub mod adaptive;
pub mod clock;
pub mod config;
pub mod error;
pub mod logged;
pub mod proba;
pub mod report;
pub mod state;
pub mod throttle;
pub mod window;

#[cfg(feature = "axum")]
pub mod middleware;

pub use config::{BreakerConfig, BreakerConfigBuilder, ConfigError};
pub use error::{BreakerError, ServiceUnavailable};
pub use report::{ReportSink, TracingSink};
pub use state::{BreakerStats, BreakerStatus, WindowStats};
pub use throttle::{default_acceptable, Promise, Throttle};

use adaptive::{AdaptivePromise, AdaptiveThrottle};
use clock::{Clock, MonotonicClock};
use logged::{LoggedPromise, LoggedThrottle};
use proba::{Probability, RandomProbability};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use throttle::{failure_reason, PendingOutcome};

/// Promise handed out by [`CircuitBreaker::allow`].
pub type BreakerPromise = LoggedPromise<AdaptivePromise>;

/// Circuit breaker for one protected dependency.
///
/// Clone it freely; all clones share the same statistics and history.
#[derive(Clone)]
pub struct CircuitBreaker {
    throttle: Arc<LoggedThrottle<AdaptiveThrottle>>,
}

impl CircuitBreaker {
    /// Breaker with the system clock, an entropy-seeded probability source and
    /// reports going to `tracing`.
    pub fn new(config: BreakerConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    /// Start building a breaker with injected collaborators.
    pub fn builder(config: BreakerConfig) -> CircuitBreakerBuilder {
        CircuitBreakerBuilder {
            config,
            clock: None,
            probability: None,
            sink: None,
        }
    }

    pub fn name(&self) -> &str {
        self.throttle.name()
    }

    /// Admission check for a call the caller runs itself.
    ///
    /// On success the returned promise must be settled with
    /// [`accept`](Promise::accept) or [`reject`](Promise::reject) once the
    /// call finishes; an unsettled promise leaves the statistics uncorrected.
    pub fn allow(&self) -> Result<BreakerPromise, ServiceUnavailable> {
        self.throttle.allow()
    }

    /// Run `call` if admitted; any `Err` counts as a failure.
    pub fn run<T, E, F>(&self, call: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        self.run_with_acceptable(call, default_acceptable::<T, E>)
    }

    /// Run `call` if admitted; `acceptable` decides whether its result counts
    /// as a success. The call's own error is returned unchanged either way.
    pub fn run_with_acceptable<T, E, F, A>(&self, call: F, acceptable: A) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        A: FnOnce(&Result<T, E>) -> bool,
        E: Display,
    {
        self.throttle.do_req(call, acceptable)?.map_err(BreakerError::Call)
    }

    /// Run `call` if admitted, otherwise return whatever `fallback` produces.
    pub fn run_with_fallback<T, E, F, B>(&self, call: F, fallback: B) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        B: FnOnce(ServiceUnavailable) -> Result<T, E>,
        E: Display,
    {
        self.run_with_fallback_and_acceptable(call, fallback, default_acceptable::<T, E>)
    }

    pub fn run_with_fallback_and_acceptable<T, E, F, B, A>(
        &self,
        call: F,
        fallback: B,
        acceptable: A,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        B: FnOnce(ServiceUnavailable) -> Result<T, E>,
        A: FnOnce(&Result<T, E>) -> bool,
        E: Display,
    {
        match self.throttle.do_req(call, acceptable) {
            Ok(result) => result,
            Err(unavailable) => fallback(unavailable),
        }
    }

    /// Await `call` if admitted; any `Err` counts as a failure.
    ///
    /// If the returned future is dropped before `call` completes, the call is
    /// recorded as a failure.
    pub async fn run_async<T, E, Fut>(&self, call: Fut) -> Result<T, BreakerError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_async_with_acceptable(call, default_acceptable::<T, E>).await
    }

    pub async fn run_async_with_acceptable<T, E, Fut, A>(
        &self,
        call: Fut,
        acceptable: A,
    ) -> Result<T, BreakerError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        A: FnOnce(&Result<T, E>) -> bool,
        E: Display,
    {
        let pending = PendingOutcome::new(self.allow()?);
        let result = call.await;
        let success = acceptable(&result);
        pending.settle(success, || failure_reason(&result));
        result.map_err(BreakerError::Call)
    }

    /// Window totals and drop ratio, without copying the error history.
    pub fn window_stats(&self) -> WindowStats {
        self.throttle.stats()
    }

    /// Current statistics and recent failure reasons.
    pub fn stats(&self) -> BreakerStats {
        let window = self.throttle.stats();
        BreakerStats {
            name: self.name().to_string(),
            status: window.status(),
            accepts: window.accepts,
            total: window.total,
            drop_ratio: window.drop_ratio,
            recent_errors: self.throttle.errors().recent(),
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Builder for [`CircuitBreaker`] with injectable clock, probability source and
/// report sink.
pub struct CircuitBreakerBuilder {
    config: BreakerConfig,
    clock: Option<Arc<dyn Clock>>,
    probability: Option<Arc<dyn Probability>>,
    sink: Option<Arc<dyn ReportSink>>,
}

impl CircuitBreakerBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn probability(mut self, probability: Arc<dyn Probability>) -> Self {
        self.probability = Some(probability);
        self
    }

    /// Where shedding reports go. Default: [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<CircuitBreaker, ConfigError> {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let probability = self
            .probability
            .unwrap_or_else(|| Arc::new(RandomProbability::new()));
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));

        let adaptive = AdaptiveThrottle::new(&self.config, clock.clone(), probability)?;
        let throttle = LoggedThrottle::new(self.config.name, adaptive, sink, clock);
        Ok(CircuitBreaker {
            throttle: Arc::new(throttle),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::proba::FixedProbability;

    fn breaker(draw: f64) -> CircuitBreaker {
        CircuitBreaker::builder(BreakerConfig::builder().name("orders").build().unwrap())
            .clock(Arc::new(ManualClock::new()))
            .probability(Arc::new(FixedProbability(draw)))
            .sink(Arc::new(|_: &str| {}))
            .build()
            .unwrap()
    }

    #[test]
    fn clones_share_state() {
        let a = breaker(1.0);
        let b = a.clone();
        a.allow().unwrap().accept();
        assert_eq!(b.stats().total, 1);
        assert_eq!(b.name(), "orders");
    }

    #[test]
    fn run_passes_call_error_through() {
        let breaker = breaker(1.0);
        let err = breaker.run(|| Err::<(), _>("bad gateway")).unwrap_err();
        assert!(matches!(err, BreakerError::Call("bad gateway")));
        let stats = breaker.stats();
        assert_eq!((stats.accepts, stats.total), (0.0, 1));
        assert_eq!(stats.recent_errors.len(), 1);
    }

    #[test]
    fn fallback_replaces_rejected_call() {
        let breaker = breaker(0.0);
        for _ in 0..6 {
            breaker.allow().unwrap().reject("down");
        }
        let value = breaker.run_with_fallback(
            || Ok::<_, String>("live"),
            |unavailable| {
                assert_eq!(unavailable, ServiceUnavailable);
                Ok("cached")
            },
        );
        assert_eq!(value, Ok("cached"));
        assert_eq!(breaker.stats().status, BreakerStatus::Shedding);
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = BreakerConfig {
            buckets: 0,
            ..BreakerConfig::default()
        };
        assert_eq!(CircuitBreaker::new(config).unwrap_err(), ConfigError::ZeroBuckets);

        let unnamed = BreakerConfig {
            name: String::new(),
            ..BreakerConfig::default()
        };
        assert_eq!(CircuitBreaker::new(unnamed).unwrap_err(), ConfigError::EmptyName);
    }

    #[test]
    fn window_stats_skip_error_history() {
        let breaker = breaker(1.0);
        breaker.allow().unwrap().reject("timeout");
        breaker.allow().unwrap().accept();

        let window = breaker.window_stats();
        let full = breaker.stats();
        assert_eq!((window.accepts, window.total), (full.accepts, full.total));
        assert_eq!(window.drop_ratio, full.drop_ratio);
        assert_eq!(full.recent_errors.len(), 1);
    }

    #[test]
    fn history_stamps_follow_injected_clock() {
        let clock = Arc::new(ManualClock::new());
        clock.set(std::time::Duration::from_secs(14 * 3_600 + 5 * 60));
        let breaker = CircuitBreaker::builder(BreakerConfig::default())
            .clock(clock)
            .probability(Arc::new(FixedProbability(1.0)))
            .sink(Arc::new(|_: &str| {}))
            .build()
            .unwrap();
        breaker.allow().unwrap().reject("refused");
        assert_eq!(breaker.stats().recent_errors, vec!["14:05:00 refused"]);
    }
}
