//! The admit-and-report interface shared by the admission core and its
//! decorators.
//!
//! A [`Throttle`] answers one question per call (may it proceed?) and accounts
//! for the outcome afterwards, either through a [`Promise`] the caller settles
//! later or by wrapping the call itself. Decorators implement the same trait
//! and hold the throttle they wrap, so layers compose at construction time.

use crate::error::ServiceUnavailable;
use std::fmt::Display;

/// Deferred outcome report for one admitted call.
///
/// Both methods consume the promise, so at most one outcome can be reported.
/// Dropping a promise without settling it records nothing.
pub trait Promise {
    /// The call succeeded.
    fn accept(self);
    /// The call failed, for the given human-readable reason.
    fn reject(self, reason: &str);
}

/// Admission gate plus outcome accounting.
pub trait Throttle: Send + Sync {
    type Promise: Promise + Send + 'static;

    /// Admission check for a call the caller will run and settle itself.
    fn allow(&self) -> Result<Self::Promise, ServiceUnavailable>;

    /// Admission check, then run `call` and account for its result.
    ///
    /// `acceptable` classifies the result as success or failure. The outer
    /// `Err` means the call was rejected and never ran; otherwise the call's
    /// own result is returned untouched. If `call` or `acceptable` panics, a
    /// failure is recorded before the panic continues unwinding.
    fn do_req<T, E, F, A>(&self, call: F, acceptable: A) -> Result<Result<T, E>, ServiceUnavailable>
    where
        F: FnOnce() -> Result<T, E>,
        A: FnOnce(&Result<T, E>) -> bool,
        E: Display;

    /// Current aggregate of the statistics driving admission.
    fn stats(&self) -> crate::state::WindowStats;
}

/// Default acceptability: a call succeeded iff it returned `Ok`.
pub fn default_acceptable<T, E>(result: &Result<T, E>) -> bool {
    result.is_ok()
}

/// Failure reason recorded for a result the predicate refused.
pub(crate) fn failure_reason<T, E: Display>(result: &Result<T, E>) -> String {
    match result {
        Err(e) => e.to_string(),
        Ok(_) => "call returned an unacceptable result".to_string(),
    }
}

pub(crate) const CANCELLED_REASON: &str = "call was cancelled or panicked before completing";

/// Holds a promise across an await point. If dropped before
/// [`settle`](Self::settle) (the future was cancelled or panicked), the
/// promise is rejected.
pub(crate) struct PendingOutcome<P: Promise> {
    promise: Option<P>,
}

impl<P: Promise> PendingOutcome<P> {
    pub(crate) fn new(promise: P) -> Self {
        Self {
            promise: Some(promise),
        }
    }

    pub(crate) fn settle(mut self, success: bool, reason: impl FnOnce() -> String) {
        if let Some(promise) = self.promise.take() {
            if success {
                promise.accept();
            } else {
                promise.reject(&reason());
            }
        }
    }
}

impl<P: Promise> Drop for PendingOutcome<P> {
    fn drop(&mut self) {
        if let Some(promise) = self.promise.take() {
            promise.reject(CANCELLED_REASON);
        }
    }
}
