//! Adaptive admission: client-side throttling driven by the rolling window.
//!
//! For every admission check the window is aggregated into `accepts` (sum of
//! success-weighted outcomes) and `total` (number of outcomes), and
//!
//! ```text
//! drop_ratio = max(0, (total - protection - k * accepts) / (total + 1))
//! ```
//!
//! is compared against one uniform draw. Below `protection` outcomes nothing is
//! ever rejected. Above it, the rejection probability grows smoothly as
//! successes fall behind `total / k`, and falls again as soon as admitted calls
//! succeed, so there is no separate half-open state.

use crate::clock::Clock;
use crate::config::{BreakerConfig, ConfigError};
use crate::error::ServiceUnavailable;
use crate::proba::Probability;
use crate::state::WindowStats;
use crate::throttle::{Promise, Throttle};
use crate::window::RollingWindow;
use std::fmt::Display;
use std::sync::Arc;
use tracing::debug;

const SUCCESS: f64 = 1.0;
const FAILURE: f64 = 0.0;

/// Probability of rejecting the next call given the window aggregate.
pub fn drop_ratio(k: f64, protection: u64, accepts: f64, total: i64) -> f64 {
    let total = total as f64;
    let weighted_accepts = k * accepts;
    ((total - protection as f64 - weighted_accepts) / (total + 1.0)).max(0.0)
}

/// The statistical admission engine.
pub struct AdaptiveThrottle {
    k: f64,
    protection: u64,
    stat: Arc<RollingWindow>,
    proba: Arc<dyn Probability>,
}

impl AdaptiveThrottle {
    pub fn new(
        config: &BreakerConfig,
        clock: Arc<dyn Clock>,
        proba: Arc<dyn Probability>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let stat = RollingWindow::new(
            config.buckets,
            config.bucket_interval(),
            config.ignore_current_bucket,
            clock,
        )?;
        Ok(Self {
            k: config.k,
            protection: config.protection,
            stat: Arc::new(stat),
            proba,
        })
    }

    /// The window backing this throttle.
    pub fn window(&self) -> &RollingWindow {
        &self.stat
    }

    fn accept(&self) -> Result<(), ServiceUnavailable> {
        let (accepts, total) = self.stat.totals();
        let ratio = drop_ratio(self.k, self.protection, accepts, total);
        if ratio <= 0.0 {
            return Ok(());
        }

        if self.proba.true_on(ratio) {
            debug!(drop_ratio = ratio, accepts, total, "Adaptive breaker rejected call");
            return Err(ServiceUnavailable);
        }
        Ok(())
    }

    fn mark_success(&self) {
        self.stat.add(SUCCESS);
    }

    fn mark_failure(&self) {
        self.stat.add(FAILURE);
    }
}

impl Throttle for AdaptiveThrottle {
    type Promise = AdaptivePromise;

    fn allow(&self) -> Result<AdaptivePromise, ServiceUnavailable> {
        self.accept()?;
        Ok(AdaptivePromise {
            stat: self.stat.clone(),
        })
    }

    fn do_req<T, E, F, A>(&self, call: F, acceptable: A) -> Result<Result<T, E>, ServiceUnavailable>
    where
        F: FnOnce() -> Result<T, E>,
        A: FnOnce(&Result<T, E>) -> bool,
        E: Display,
    {
        self.accept()?;

        let guard = FailOnUnwind {
            throttle: self,
            settled: false,
        };
        let result = call();
        let success = acceptable(&result);
        guard.settle(success);

        Ok(result)
    }

    fn stats(&self) -> WindowStats {
        let (accepts, total) = self.stat.totals();
        WindowStats {
            accepts,
            total,
            drop_ratio: drop_ratio(self.k, self.protection, accepts, total),
        }
    }
}

/// Records a failure if dropped unsettled, i.e. while unwinding out of the
/// wrapped call or the acceptability predicate.
struct FailOnUnwind<'a> {
    throttle: &'a AdaptiveThrottle,
    settled: bool,
}

impl FailOnUnwind<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        if success {
            self.throttle.mark_success();
        } else {
            self.throttle.mark_failure();
        }
    }
}

impl Drop for FailOnUnwind<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.throttle.mark_failure();
        }
    }
}

/// Promise bound to an [`AdaptiveThrottle`]'s window.
///
/// The reason passed to [`reject`](Promise::reject) is not retained here;
/// wrap the throttle in a [`LoggedThrottle`](crate::logged::LoggedThrottle)
/// to keep it.
#[must_use = "settle the promise with accept() or reject() to record the outcome"]
pub struct AdaptivePromise {
    stat: Arc<RollingWindow>,
}

impl Promise for AdaptivePromise {
    fn accept(self) {
        self.stat.add(SUCCESS);
    }

    fn reject(self, _reason: &str) {
        self.stat.add(FAILURE);
    }
}
