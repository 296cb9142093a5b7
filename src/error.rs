//! Error types surfaced to callers of the breaker.

use thiserror::Error;

/// Returned when the breaker sheds a call. Always the same value, so callers
/// can tell "breaker tripped" apart from "call failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("circuit breaker is open")]
pub struct ServiceUnavailable;

/// Outcome of a wrapped call that did not succeed.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker rejected the call; it was never invoked.
    #[error(transparent)]
    Unavailable(#[from] ServiceUnavailable),
    /// The call ran and returned this error, passed through unchanged.
    #[error("{0}")]
    Call(E),
}

impl<E> BreakerError<E> {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BreakerError::Unavailable(_))
    }

    /// The call's own error, if the call ran.
    pub fn into_call(self) -> Option<E> {
        match self {
            BreakerError::Call(e) => Some(e),
            BreakerError::Unavailable(_) => None,
        }
    }
}
