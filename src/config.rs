//! Configuration for the adaptive circuit breaker.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised when a configuration cannot drive a rolling window or the
/// admission formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("breaker name must not be empty")]
    EmptyName,
    #[error("bucket count must be greater than 0")]
    ZeroBuckets,
    #[error("bucket interval must be non-zero (window {window:?} split into {buckets} buckets)")]
    ZeroInterval { window: Duration, buckets: usize },
    #[error("sensitivity k must be a finite number >= 1.0, got {0}")]
    InvalidSensitivity(f64),
}

/// Configuration for one breaker instance.
///
/// Build with [`BreakerConfig::builder()`] or deserialize from an application
/// config file (`window` is expressed in milliseconds there).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Name of the protected dependency, used in diagnostic reports.
    ///
    /// Default: `"default"`.
    pub name: String,

    /// Total trailing duration covered by the rolling window.
    ///
    /// Default: 10 seconds.
    #[serde(rename = "window_ms", with = "duration_ms")]
    pub window: Duration,

    /// Number of buckets the window is split into. Each bucket covers
    /// `window / buckets`.
    ///
    /// Default: 40 (250 ms per bucket).
    pub buckets: usize,

    /// Sensitivity multiplier applied to observed successes. Lower values shed
    /// load more aggressively.
    ///
    /// Default: 1.5.
    pub k: f64,

    /// Minimum number of observed outcomes before the breaker may reject.
    ///
    /// Default: 5.
    pub protection: u64,

    /// Exclude the bucket currently being written when aggregating, as long
    /// as the window has not advanced past it.
    ///
    /// Default: `false`.
    pub ignore_current_bucket: bool,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            window: Duration::from_secs(10),
            buckets: 40,
            k: 1.5,
            protection: 5,
            ignore_current_bucket: false,
        }
    }
}

impl BreakerConfig {
    /// Start building a config from the defaults.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::default()
    }

    /// Duration of a single bucket.
    pub fn bucket_interval(&self) -> Duration {
        match u32::try_from(self.buckets) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.window / n,
        }
    }

    /// Check that the config names a dependency and can drive a rolling window
    /// and the admission formula.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.buckets == 0 {
            return Err(ConfigError::ZeroBuckets);
        }
        if self.bucket_interval().is_zero() {
            return Err(ConfigError::ZeroInterval {
                window: self.window,
                buckets: self.buckets,
            });
        }
        if !self.k.is_finite() || self.k < 1.0 {
            return Err(ConfigError::InvalidSensitivity(self.k));
        }
        Ok(())
    }
}

/// Builder for [`BreakerConfig`].
#[derive(Default)]
pub struct BreakerConfigBuilder {
    inner: BreakerConfig,
}

impl BreakerConfigBuilder {
    /// Name of the protected dependency. Must not be blank.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    /// Total trailing window duration.
    pub fn window(mut self, window: Duration) -> Self {
        self.inner.window = window;
        self
    }

    /// Number of buckets in the window.
    pub fn buckets(mut self, buckets: usize) -> Self {
        self.inner.buckets = buckets;
        self
    }

    /// Sensitivity multiplier (must be >= 1.0).
    pub fn k(mut self, k: f64) -> Self {
        self.inner.k = k;
        self
    }

    /// Minimum traffic volume below which nothing is rejected.
    pub fn protection(mut self, protection: u64) -> Self {
        self.inner.protection = protection;
        self
    }

    pub fn ignore_current_bucket(mut self, ignore: bool) -> Self {
        self.inner.ignore_current_bucket = ignore;
        self
    }

    /// Consume the builder and return the validated config.
    pub fn build(self) -> Result<BreakerConfig, ConfigError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
