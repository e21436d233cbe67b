use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::{ErrorKind, Result};

/// Default maximum number of attempts started per period, 20
pub const DEFAULT_MAX_CALLS_PER_PERIOD: u32 = 20;
/// Default length of the counting period, one second
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);
/// Default maximum number of attempts in flight at once, 100
pub const DEFAULT_MAX_CONCURRENT: usize = 100;
/// Default number of retries per record, 3
pub const DEFAULT_RETRY_LIMIT: u32 = 3;
/// Default backoff step between retries, 3 seconds
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(3);

/// Hard ceiling on the query rate accepted by the platform.
///
/// Configurations asking for more are rejected instead of over-querying.
pub const MAX_QUERIES_PER_SECOND: f64 = 500.0;

/// Rate limiting, concurrency and retry settings of a [`RateGate`](super::RateGate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum number of attempts started within any window of `period`
    #[serde(default = "default_max_calls_per_period")]
    pub max_calls_per_period: u32,

    /// Length of the rolling window the call limit applies to
    #[serde(default = "default_period", with = "humantime_serde")]
    pub period: Duration,

    /// Maximum number of attempts in flight at the same time
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Number of retries after the first attempt of a record
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Backoff step; the n-th retry waits `retry_base_delay * (n - 1)`
    #[serde(default = "default_retry_base_delay", with = "humantime_serde")]
    pub retry_base_delay: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls_per_period: default_max_calls_per_period(),
            period: default_period(),
            max_concurrent: default_max_concurrent(),
            retry_limit: default_retry_limit(),
            retry_base_delay: default_retry_base_delay(),
        }
    }
}

const fn default_max_calls_per_period() -> u32 {
    DEFAULT_MAX_CALLS_PER_PERIOD
}

const fn default_period() -> Duration {
    DEFAULT_PERIOD
}

const fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

const fn default_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}

const fn default_retry_base_delay() -> Duration {
    DEFAULT_RETRY_BASE_DELAY
}

impl RateLimitConfig {
    /// The configured rate in calls per second
    #[must_use]
    pub fn calls_per_second(&self) -> f64 {
        f64::from(self.max_calls_per_period) / self.period.as_secs_f64()
    }

    /// Total number of attempts a single record may get
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.retry_limit.saturating_add(1)
    }

    /// Check that the configuration can be enforced.
    ///
    /// # Errors
    ///
    /// Returns an error if any limit is zero, if the concurrency limit is
    /// larger than a semaphore can hold, or if the configured rate exceeds
    /// [`MAX_QUERIES_PER_SECOND`].
    pub fn validate(&self) -> Result<()> {
        if self.max_calls_per_period == 0 {
            return Err(ErrorKind::InvalidRateLimit(
                "maximum calls per period must be at least 1".to_string(),
            ));
        }
        if self.period.is_zero() {
            return Err(ErrorKind::InvalidRateLimit(
                "period must be longer than zero".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(ErrorKind::InvalidRateLimit(
                "maximum concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent > Semaphore::MAX_PERMITS {
            return Err(ErrorKind::InvalidRateLimit(format!(
                "maximum concurrency must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        let requested = self.calls_per_second();
        if requested > MAX_QUERIES_PER_SECOND {
            return Err(ErrorKind::RateCeilingExceeded {
                requested,
                ceiling: MAX_QUERIES_PER_SECOND,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate_limit_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.max_calls_per_period, 20);
        assert_eq!(config.period, Duration::from_secs(1));
        assert_eq!(config.max_concurrent, 100);
        assert_eq!(config.max_attempts(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let config = RateLimitConfig {
            max_calls_per_period: 0,
            ..RateLimitConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ErrorKind::InvalidRateLimit(_))
        ));

        let config = RateLimitConfig {
            max_concurrent: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RateLimitConfig {
            period: Duration::ZERO,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unbounded_concurrency_is_rejected() {
        let config = RateLimitConfig {
            max_concurrent: usize::MAX,
            ..RateLimitConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ErrorKind::InvalidRateLimit(_))
        ));

        let config = RateLimitConfig {
            max_concurrent: Semaphore::MAX_PERMITS,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_ceiling() {
        let config = RateLimitConfig {
            max_calls_per_period: 501,
            ..RateLimitConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ErrorKind::RateCeilingExceeded { .. })
        ));

        // The same number of calls spread over a longer period is fine
        let config = RateLimitConfig {
            max_calls_per_period: 1000,
            period: Duration::from_secs(10),
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_ok());

        // A short period can push a small call count over the ceiling
        let config = RateLimitConfig {
            max_calls_per_period: 10,
            period: Duration::from_millis(10),
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = RateLimitConfig {
            max_calls_per_period: 15,
            period: Duration::from_millis(1500),
            max_concurrent: 5,
            retry_limit: 2,
            retry_base_delay: Duration::from_millis(200),
        };

        let toml = toml::to_string(&config).unwrap();
        let deserialized: RateLimitConfig = toml::from_str(&toml).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_config_defaults_from_partial_toml() {
        let config: RateLimitConfig = toml::from_str(
            r#"
            max_calls_per_period = 5
            retry_base_delay = "500ms"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_calls_per_period, 5);
        assert_eq!(config.retry_base_delay, Duration::from_millis(500));
        assert_eq!(config.period, DEFAULT_PERIOD);
        assert_eq!(config.retry_limit, DEFAULT_RETRY_LIMIT);
    }
}
