//! Breaker statistics types.

use serde::{Deserialize, Serialize};

/// Coarse view of what the breaker is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerStatus {
    /// Drop ratio is zero; every call is admitted.
    Closed,
    /// Drop ratio is positive; calls are rejected with that probability.
    Shedding,
}

impl std::fmt::Display for BreakerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerStatus::Closed => write!(f, "closed"),
            BreakerStatus::Shedding => write!(f, "shedding"),
        }
    }
}

/// Aggregate of the rolling window at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    /// Sum of success-weighted values in the live buckets.
    pub accepts: f64,
    /// Number of outcomes in the live buckets.
    pub total: i64,
    /// Probability that the next admission check rejects.
    pub drop_ratio: f64,
}

impl WindowStats {
    pub fn status(&self) -> BreakerStatus {
        if self.drop_ratio > 0.0 {
            BreakerStatus::Shedding
        } else {
            BreakerStatus::Closed
        }
    }
}

/// Snapshot of one breaker, suitable for health endpoints and dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStats {
    pub name: String,
    pub status: BreakerStatus,
    pub accepts: f64,
    pub total: i64,
    pub drop_ratio: f64,
    /// Recent failure reasons, most recent first.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub recent_errors: Vec<String>,
}
