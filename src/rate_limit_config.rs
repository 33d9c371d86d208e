use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the sliding-window rate limiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Window capacity; a group is limited once it holds this many hits
    pub max_hits: usize,
    /// Length of the sliding window
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// How often the idle sweep runs
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// Groups idle for longer than this are evicted by the sweep
    #[serde(with = "humantime_serde")]
    pub max_idle: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_hits: 10,
            interval: Duration::from_secs(1),
            cleanup_interval: Duration::from_secs(60),
            max_idle: Duration::from_secs(300),
        }
    }
}

impl RateLimiterConfig {
    pub fn new(max_hits: usize, interval: Duration, cleanup_interval: Duration, max_idle: Duration) -> Self {
        Self {
            max_hits,
            interval,
            cleanup_interval,
            max_idle,
        }
    }

    /// Convenience constructor taking every duration in milliseconds.
    pub fn from_millis(max_hits: usize, interval: u64, cleanup_interval: u64, max_idle: u64) -> Self {
        Self::new(
            max_hits,
            Duration::from_millis(interval),
            Duration::from_millis(cleanup_interval),
            Duration::from_millis(max_idle),
        )
    }

    /// Validate limiter parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.max_hits == 0 {
            return Err("max_hits must be greater than 0".to_string());
        }
        if self.interval.as_millis() == 0 {
            return Err("interval must be at least 1ms".to_string());
        }
        if self.cleanup_interval.as_millis() == 0 {
            return Err("cleanup_interval must be at least 1ms".to_string());
        }
        if self.max_idle.as_millis() == 0 {
            return Err("max_idle must be at least 1ms".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RateLimiterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        assert!(RateLimiterConfig::from_millis(0, 1000, 500, 1200).validate().is_err());
        assert!(RateLimiterConfig::from_millis(3, 0, 500, 1200).validate().is_err());
        assert!(RateLimiterConfig::from_millis(3, 1000, 0, 1200).validate().is_err());
        assert!(RateLimiterConfig::from_millis(3, 1000, 500, 0).validate().is_err());
    }

    #[test]
    fn test_humantime_durations() {
        let config: RateLimiterConfig = serde_json::from_str(
            r#"{"max_hits": 3, "interval": "1s", "cleanup_interval": "500ms", "max_idle": "1s 200ms"}"#,
        )
        .unwrap();

        assert_eq!(config, RateLimiterConfig::from_millis(3, 1000, 500, 1200));
    }
}
